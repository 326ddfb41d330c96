use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::error::PAYLOAD_LOST;
use crate::normalize::PreviewHandle;
use crate::types::{AnalysisResult, BatchItem, ItemId, ItemStatus};

/// An item as held by the store: the reader-facing record plus the
/// resources the item exclusively owns.
struct StoredItem {
    meta: BatchItem,
    preview: PreviewHandle,
}

/// Authoritative collection of batch items and their states.
///
/// The only component permitted to mutate item status/result/error.
/// Items are kept in display order (newest batch first). Encoded payloads
/// live in a side map keyed by id so reader snapshots never carry them.
///
/// Single-flight: `begin` and `finish` bracket one analysis attempt per
/// id; the in-flight set guarantees at most one attempt is bracketed for
/// a given id at any time, and `finish` silently drops writes for ids
/// that were removed mid-flight.
pub struct ItemStore {
    items: Mutex<Vec<StoredItem>>,
    payloads: Mutex<HashMap<ItemId, Arc<Vec<u8>>>>,
    in_flight: Mutex<HashSet<ItemId>>,
}

impl Default for ItemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemStore {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            payloads: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Insert one normalized batch at the front of the display order,
    /// atomically with respect to concurrent reads. Input order is kept
    /// within the batch.
    pub fn insert_batch(
        &self,
        batch: Vec<(BatchItem, PreviewHandle, Vec<u8>)>,
    ) -> anyhow::Result<()> {
        let mut items = self.items.lock().map_err(|e| anyhow::anyhow!("{}", e))?;
        let mut payloads = self.payloads.lock().map_err(|e| anyhow::anyhow!("{}", e))?;

        for (meta, preview, payload) in batch.into_iter().rev() {
            payloads.insert(meta.id, Arc::new(payload));
            items.insert(0, StoredItem { meta, preview });
        }
        Ok(())
    }

    /// Claim an item for one analysis attempt.
    ///
    /// Atomically transitions an eligible item (`Pending` or `Error`,
    /// not already in flight) to `Processing`, clearing any prior result
    /// and error in the same critical section so readers never observe
    /// `Processing` next to stale terminal state. Returns `false` when
    /// the item is missing, terminal, or already claimed.
    pub fn begin(&self, id: ItemId) -> anyhow::Result<bool> {
        let mut items = self.items.lock().map_err(|e| anyhow::anyhow!("{}", e))?;
        let mut in_flight = self.in_flight.lock().map_err(|e| anyhow::anyhow!("{}", e))?;

        if in_flight.contains(&id) {
            return Ok(false);
        }
        let Some(item) = items.iter_mut().find(|i| i.meta.id == id) else {
            return Ok(false);
        };
        match item.meta.status {
            ItemStatus::Pending | ItemStatus::Error => {}
            ItemStatus::Processing | ItemStatus::Completed => return Ok(false),
        }

        item.meta.status = ItemStatus::Processing;
        item.meta.error = None;
        item.meta.result = None;
        in_flight.insert(id);
        Ok(true)
    }

    /// Record the outcome of a claimed attempt and release the claim.
    ///
    /// If the item was removed while the attempt was in flight the write
    /// is discarded; removal mid-flight is not an error.
    pub fn finish(
        &self,
        id: ItemId,
        outcome: Result<AnalysisResult, String>,
    ) -> anyhow::Result<()> {
        let mut items = self.items.lock().map_err(|e| anyhow::anyhow!("{}", e))?;
        let mut in_flight = self.in_flight.lock().map_err(|e| anyhow::anyhow!("{}", e))?;

        in_flight.remove(&id);

        let Some(item) = items.iter_mut().find(|i| i.meta.id == id) else {
            tracing::debug!(%id, "discarding analysis write for removed item");
            return Ok(());
        };

        match outcome {
            Ok(result) => {
                item.meta.status = ItemStatus::Completed;
                item.meta.result = Some(result);
                item.meta.error = None;
            }
            Err(message) => {
                tracing::warn!(%id, %message, "analysis failed");
                item.meta.status = ItemStatus::Error;
                item.meta.error = Some(message);
                item.meta.result = None;
            }
        }
        Ok(())
    }

    /// Payload lookup for one analysis attempt.
    pub fn payload(&self, id: ItemId) -> Option<Arc<Vec<u8>>> {
        self.payloads.lock().ok()?.get(&id).cloned()
    }

    /// Message used when a claimed item's payload has vanished.
    pub fn payload_lost_message(id: ItemId) -> String {
        format!("{} {}", PAYLOAD_LOST, id)
    }

    /// Remove one item, dropping its payload and releasing its preview.
    pub fn remove(&self, id: ItemId) -> anyhow::Result<()> {
        let mut items = self.items.lock().map_err(|e| anyhow::anyhow!("{}", e))?;
        let mut payloads = self.payloads.lock().map_err(|e| anyhow::anyhow!("{}", e))?;

        items.retain(|i| i.meta.id != id);
        payloads.remove(&id);
        Ok(())
    }

    /// Remove every item, dropping all payloads and previews.
    pub fn clear(&self) -> anyhow::Result<()> {
        let mut items = self.items.lock().map_err(|e| anyhow::anyhow!("{}", e))?;
        let mut payloads = self.payloads.lock().map_err(|e| anyhow::anyhow!("{}", e))?;

        items.clear();
        payloads.clear();
        Ok(())
    }

    /// Point-in-time copy of every item in display order.
    pub fn snapshot(&self) -> Vec<BatchItem> {
        self.items
            .lock()
            .map(|items| items.iter().map(|i| i.meta.clone()).collect())
            .unwrap_or_default()
    }

    /// Copy of one item's preview rendition for display.
    pub fn preview_bytes(&self, id: ItemId) -> Option<Vec<u8>> {
        self.items
            .lock()
            .ok()?
            .iter()
            .find(|i| i.meta.id == id)
            .map(|i| i.preview.bytes().to_vec())
    }

    /// Release probe for one item's preview.
    pub fn preview_probe(&self, id: ItemId) -> Option<crate::normalize::PreviewProbe> {
        self.items
            .lock()
            .ok()?
            .iter()
            .find(|i| i.meta.id == id)
            .map(|i| i.preview.probe())
    }

    /// Copy of one item's reader-facing record.
    pub fn get(&self, id: ItemId) -> Option<BatchItem> {
        self.items
            .lock()
            .ok()?
            .iter()
            .find(|i| i.meta.id == id)
            .map(|i| i.meta.clone())
    }

    /// Ids whose status makes them candidates for a scheduler run.
    pub fn eligible_ids(&self) -> Vec<ItemId> {
        self.items
            .lock()
            .map(|items| {
                items
                    .iter()
                    .filter(|i| matches!(i.meta.status, ItemStatus::Pending | ItemStatus::Error))
                    .map(|i| i.meta.id)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.items.lock().map(|i| i.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
