//! Keyword selection: per-item chosen words plus filter/sort views over
//! provider-returned keyword lists.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::types::{ItemId, KeywordMetadata, Platform};

/// Ordering applied to a keyword view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeywordOrder {
    /// Relevance, highest first. Ties keep provider order.
    #[default]
    Relevance,
    Alphabetical,
}

/// Filter and ordering for a view over one result's keywords.
#[derive(Debug, Clone, Default)]
pub struct KeywordFilter {
    /// Keep only keywords tagged for this platform.
    pub platform: Option<Platform>,
    /// Keep only keywords scoring at least this relevance.
    pub min_relevance: u8,
    pub order: KeywordOrder,
}

impl KeywordFilter {
    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn min_relevance(mut self, min: u8) -> Self {
        self.min_relevance = min;
        self
    }

    pub fn order(mut self, order: KeywordOrder) -> Self {
        self.order = order;
        self
    }
}

/// Filtered, ordered view over a result's keyword list.
pub fn keyword_view<'a>(
    keywords: &'a [KeywordMetadata],
    filter: &KeywordFilter,
) -> Vec<&'a KeywordMetadata> {
    let mut view: Vec<&KeywordMetadata> = keywords
        .iter()
        .filter(|k| k.relevance >= filter.min_relevance)
        .filter(|k| match filter.platform {
            Some(p) => k.platforms.contains(&p),
            None => true,
        })
        .collect();

    match filter.order {
        KeywordOrder::Relevance => view.sort_by(|a, b| b.relevance.cmp(&a.relevance)),
        KeywordOrder::Alphabetical => view.sort_by(|a, b| a.word.cmp(&b.word)),
    }
    view
}

/// User-chosen keyword words, keyed per item.
///
/// Membership only: insertion order is irrelevant. An entry exists only
/// for items with at least one selected word, and is purged together
/// with its item.
pub struct SelectionModel {
    selected: Mutex<HashMap<ItemId, HashSet<String>>>,
}

impl Default for SelectionModel {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionModel {
    pub fn new() -> Self {
        Self {
            selected: Mutex::new(HashMap::new()),
        }
    }

    /// Flip one word's membership. Double invocation with the same word
    /// returns the set to its original state.
    pub fn toggle(&self, id: ItemId, word: &str) {
        let Ok(mut selected) = self.selected.lock() else {
            return;
        };
        let set = selected.entry(id).or_default();
        if !set.remove(word) {
            set.insert(word.to_string());
        }
        if set.is_empty() {
            selected.remove(&id);
        }
    }

    /// Replace an item's selection with exactly the given words.
    pub fn select_all<I>(&self, id: ItemId, words: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let Ok(mut selected) = self.selected.lock() else {
            return;
        };
        let set: HashSet<String> = words.into_iter().map(Into::into).collect();
        if set.is_empty() {
            selected.remove(&id);
        } else {
            selected.insert(id, set);
        }
    }

    /// Copy of the selected words for one item.
    pub fn selected_for(&self, id: ItemId) -> HashSet<String> {
        self.selected
            .lock()
            .ok()
            .and_then(|s| s.get(&id).cloned())
            .unwrap_or_default()
    }

    pub fn is_selected(&self, id: ItemId, word: &str) -> bool {
        self.selected
            .lock()
            .map(|s| s.get(&id).is_some_and(|set| set.contains(word)))
            .unwrap_or(false)
    }

    /// Cross-batch aggregation: every selected word, unique and sorted.
    pub fn selected_words(&self) -> Vec<String> {
        let mut words: Vec<String> = self
            .selected
            .lock()
            .map(|s| {
                s.values()
                    .flat_map(|set| set.iter().cloned())
                    .collect::<HashSet<String>>()
                    .into_iter()
                    .collect()
            })
            .unwrap_or_default();
        words.sort();
        words
    }

    /// Purge the entry for one removed item.
    pub fn clear_item(&self, id: ItemId) {
        if let Ok(mut selected) = self.selected.lock() {
            selected.remove(&id);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut selected) = self.selected.lock() {
            selected.clear();
        }
    }
}
