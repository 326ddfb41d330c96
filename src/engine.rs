//! The batch processing engine: intake, bounded-concurrency scheduling,
//! and the boundary the presentation layer consumes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::IntakeError;
use crate::normalize::{normalize, NormalizeOptions};
use crate::provider::AnalysisProvider;
use crate::selection::{keyword_view, KeywordFilter, SelectionModel};
use crate::store::ItemStore;
use crate::types::{BatchItem, ItemId, ItemStatus, RawImage, CONCURRENCY_LIMIT};

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Maximum concurrent provider calls during a batch run.
    pub concurrency: usize,
    /// Intake settings for batch file submission.
    pub batch_intake: NormalizeOptions,
    /// Intake settings for live capture.
    pub capture_intake: NormalizeOptions,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            concurrency: CONCURRENCY_LIMIT,
            batch_intake: NormalizeOptions::batch(),
            capture_intake: NormalizeOptions::capture(),
        }
    }
}

impl EngineOptions {
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

/// Batch analysis engine over a pluggable [`AnalysisProvider`].
///
/// Cheap to clone; clones share the same store, selection model, and
/// batch-run guard, so the engine can be handed to spawned tasks.
pub struct BatchEngine<P: AnalysisProvider> {
    store: Arc<ItemStore>,
    selection: Arc<SelectionModel>,
    provider: Arc<P>,
    options: EngineOptions,
    batch_running: Arc<AtomicBool>,
}

impl<P: AnalysisProvider> Clone for BatchEngine<P> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            selection: Arc::clone(&self.selection),
            provider: Arc::clone(&self.provider),
            options: self.options.clone(),
            batch_running: Arc::clone(&self.batch_running),
        }
    }
}

impl<P: AnalysisProvider> BatchEngine<P> {
    pub fn new(provider: P) -> Self {
        Self::with_options(provider, EngineOptions::default())
    }

    pub fn with_options(provider: P, options: EngineOptions) -> Self {
        Self {
            store: Arc::new(ItemStore::new()),
            selection: Arc::new(SelectionModel::new()),
            provider: Arc::new(provider),
            options,
            batch_running: Arc::new(AtomicBool::new(false)),
        }
    }

    // -- Intake --

    /// Submit a batch of images.
    ///
    /// Each input is normalized independently; rejected inputs create no
    /// item. All accepted items are inserted as one atomic prepend-batch
    /// (newest first) with status `Pending`. The returned vector is
    /// aligned with the input order.
    pub fn submit(&self, images: Vec<RawImage>) -> Vec<Result<ItemId, IntakeError>> {
        self.submit_with(images, self.options.batch_intake.clone())
    }

    /// Submit one live-captured frame (higher re-encode quality).
    pub fn submit_capture(&self, image: RawImage) -> Result<ItemId, IntakeError> {
        self.submit_with(vec![image], self.options.capture_intake.clone())
            .pop()
            .unwrap_or_else(|| Err(IntakeError::InvalidInput("empty submission".into())))
    }

    fn submit_with(
        &self,
        images: Vec<RawImage>,
        intake: NormalizeOptions,
    ) -> Vec<Result<ItemId, IntakeError>> {
        let mut outcomes = Vec::with_capacity(images.len());
        let mut entries = Vec::new();

        for raw in images {
            match normalize(&raw, &intake) {
                Ok(normalized) => {
                    let meta = BatchItem {
                        id: uuid::Uuid::new_v4(),
                        file_name: raw.file_name,
                        width: normalized.width,
                        height: normalized.height,
                        status: ItemStatus::Pending,
                        result: None,
                        error: None,
                        submitted_at: chrono::Utc::now().to_rfc3339(),
                    };
                    outcomes.push(Ok(meta.id));
                    entries.push((meta, normalized.preview, normalized.payload));
                }
                Err(e) => {
                    tracing::debug!(file = ?raw.file_name, error = %e, "rejected at intake");
                    outcomes.push(Err(e));
                }
            }
        }

        if !entries.is_empty() {
            if let Err(e) = self.store.insert_batch(entries) {
                tracing::error!(error = %e, "failed to insert intake batch");
            }
        }
        outcomes
    }

    // -- Scheduling --

    /// Run one analysis for one item.
    ///
    /// At most one attempt is ever in flight per id; a call that loses
    /// the claim race (or targets a terminal/missing item) returns with
    /// no observable effect. Provider errors land on the item and never
    /// propagate.
    pub async fn analyze_one(&self, id: ItemId) {
        match self.store.begin(id) {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                tracing::error!(%id, error = %e, "failed to claim item");
                return;
            }
        }

        let outcome = match self.store.payload(id) {
            Some(payload) => self
                .provider
                .analyze(&payload)
                .await
                .map_err(|e| e.to_string()),
            None => Err(ItemStore::payload_lost_message(id)),
        };

        if let Err(e) = self.store.finish(id, outcome) {
            tracing::error!(%id, error = %e, "failed to record analysis outcome");
        }
    }

    /// Analyze every eligible item with bounded concurrency.
    ///
    /// Takes a snapshot of items whose status is `Pending` or `Error`;
    /// items becoming eligible later in the run are not picked up.
    /// Ignored when a run is already in progress or nothing is eligible.
    /// Completion order across items is unspecified; individual failures
    /// never abort sibling work.
    pub async fn process_all(&self) {
        if self
            .batch_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("batch run already in progress, ignoring");
            return;
        }

        let eligible = self.store.eligible_ids();
        if eligible.is_empty() {
            self.batch_running.store(false, Ordering::SeqCst);
            return;
        }

        let workers = self.options.concurrency.min(eligible.len());
        tracing::info!(items = eligible.len(), workers, "starting batch run");

        let queue = Arc::new(Mutex::new(VecDeque::from(eligible)));
        let mut handles = Vec::with_capacity(workers);

        for _ in 0..workers {
            let engine = self.clone();
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                loop {
                    // Mutually exclusive dequeue; one item at a time per worker.
                    let next = queue.lock().ok().and_then(|mut q| q.pop_front());
                    let Some(id) = next else { break };
                    engine.analyze_one(id).await;
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }

        self.batch_running.store(false, Ordering::SeqCst);
        tracing::info!("batch run finished");
    }

    /// Whether a batch run is currently in progress.
    pub fn is_batch_running(&self) -> bool {
        self.batch_running.load(Ordering::SeqCst)
    }

    // -- Item lifecycle --

    /// Remove one item, its payload, preview, and selection entry. An
    /// analysis still in flight for it will have its write discarded.
    pub fn remove(&self, id: ItemId) {
        if let Err(e) = self.store.remove(id) {
            tracing::error!(%id, error = %e, "failed to remove item");
        }
        self.selection.clear_item(id);
    }

    /// Remove every item and selection entry.
    pub fn clear_all(&self) {
        if let Err(e) = self.store.clear() {
            tracing::error!(error = %e, "failed to clear store");
        }
        self.selection.clear();
    }

    // -- Keyword selection --

    /// Flip one keyword's selection for an item.
    ///
    /// Selecting a word requires it to exist in the item's current
    /// result; deselection is always honored.
    pub fn toggle_keyword(&self, id: ItemId, word: &str) {
        if !self.selection.is_selected(id, word) && !self.result_has_word(id, word) {
            tracing::debug!(%id, word, "ignoring selection of unknown keyword");
            return;
        }
        self.selection.toggle(id, word);
    }

    /// Replace an item's selection with the given words, keeping only
    /// words present in the item's current result.
    pub fn select_all<I>(&self, id: ItemId, words: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let Some(item) = self.store.get(id) else {
            return;
        };
        let Some(result) = item.result else { return };
        let known: std::collections::HashSet<&str> =
            result.keywords.iter().map(|k| k.word.as_str()).collect();
        let words: Vec<String> = words
            .into_iter()
            .map(Into::into)
            .filter(|w| known.contains(w.as_str()))
            .collect();
        self.selection.select_all(id, words);
    }

    /// Select exactly the words visible through the given filter view of
    /// the item's result keywords.
    pub fn select_filtered(&self, id: ItemId, filter: &KeywordFilter) {
        let Some(item) = self.store.get(id) else {
            return;
        };
        let Some(result) = item.result else { return };
        let words: Vec<String> = keyword_view(&result.keywords, filter)
            .into_iter()
            .map(|k| k.word.clone())
            .collect();
        self.selection.select_all(id, words);
    }

    /// Selected words for one item.
    pub fn selected_keywords(&self, id: ItemId) -> std::collections::HashSet<String> {
        self.selection.selected_for(id)
    }

    /// Every selected word across the batch, unique and sorted.
    pub fn selected_words(&self) -> Vec<String> {
        self.selection.selected_words()
    }

    // -- Reads --

    /// Point-in-time copy of all items, newest batch first.
    pub fn snapshot(&self) -> Vec<BatchItem> {
        self.store.snapshot()
    }

    /// Copy of one item's record.
    pub fn get(&self, id: ItemId) -> Option<BatchItem> {
        self.store.get(id)
    }

    /// Copy of one item's preview rendition for display.
    pub fn preview_bytes(&self, id: ItemId) -> Option<Vec<u8>> {
        self.store.preview_bytes(id)
    }

    /// Release probe for one item's preview.
    pub fn preview_probe(&self, id: ItemId) -> Option<crate::normalize::PreviewProbe> {
        self.store.preview_probe(id)
    }

    fn result_has_word(&self, id: ItemId, word: &str) -> bool {
        self.store
            .get(id)
            .and_then(|item| item.result)
            .is_some_and(|r| r.keywords.iter().any(|k| k.word == word))
    }
}
