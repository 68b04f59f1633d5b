//! Persistent single-worker search queue
//!
//! Searches run one at a time in the order they were enqueued. The queue is
//! written to the durable store after every change so it survives restarts.
//! An item that was mid-flight when the process died is dropped on restore:
//! there is no way to know whether that call finished.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::SearchApi;
use crate::error::{MirrorResult, QueueError};
use crate::events::{AppEvent, EventBus};
use crate::models::{QueueItem, QueueStatus, SearchRequest, SearchResult};
use crate::storage::DurableStore;

/// Key the queue is persisted under
pub const QUEUE_STORE_KEY: &str = "search_queue";

/// Fixed pause between finishing one item and starting the next
pub const DRAIN_DELAY: Duration = Duration::from_millis(500);

/// On-disk shape of the queue
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedQueue {
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    items: Vec<QueueItem>,
}

#[derive(Debug)]
struct QueueState {
    items: Vec<QueueItem>,
    next_id: u64,
    /// Set while a drain loop is running, including the pause between items
    busy: bool,
}

impl QueueState {
    fn count(&self, status: QueueStatus) -> usize {
        self.items.iter().filter(|i| i.status == status).count()
    }
}

struct QueueInner {
    api: Arc<dyn SearchApi>,
    store: Arc<dyn DurableStore>,
    bus: EventBus,
    state: Mutex<QueueState>,
    /// Revision counter, bumped on every change
    changes: watch::Sender<u64>,
}

/// Cloneable handle to the search queue
#[derive(Clone)]
pub struct SearchQueue {
    inner: Arc<QueueInner>,
}

impl SearchQueue {
    /// Load the queue from `store`, or start empty if nothing usable is there
    pub fn restore(api: Arc<dyn SearchApi>, store: Arc<dyn DurableStore>, bus: EventBus) -> Self {
        let persisted = load_persisted(store.as_ref());
        let before = persisted.items.len();

        let items: Vec<QueueItem> = persisted
            .items
            .into_iter()
            .filter(|item| item.status != QueueStatus::Processing)
            .collect();
        if items.len() < before {
            info!(
                "Dropped {} search(es) that were in flight when the queue was last saved",
                before - items.len()
            );
        }

        // The counter must stay above every restored id with room to grow
        let max_id = items.iter().map(|i| i.id).max().unwrap_or(0);
        let (items, next_id) = match max_id
            .checked_add(1)
            .map(|n| n.max(persisted.next_id).max(1))
            .filter(|&n| n < u64::MAX)
        {
            Some(next_id) => (items, next_id),
            None => {
                warn!("Saved search queue has out-of-range ids, starting empty");
                (Vec::new(), 1)
            }
        };
        let (changes, _) = watch::channel(0);

        Self {
            inner: Arc::new(QueueInner {
                api,
                store,
                bus,
                state: Mutex::new(QueueState {
                    items,
                    next_id,
                    busy: false,
                }),
                changes,
            }),
        }
    }

    /// Add a request to the end of the queue and start draining
    pub fn enqueue(&self, request: SearchRequest) -> MirrorResult<u64> {
        let id = {
            let mut state = self.lock();
            let id = state.next_id;
            state.next_id = id
                .checked_add(1)
                .filter(|&n| n < u64::MAX)
                .ok_or(QueueError::IdsExhausted)?;
            debug!("Enqueued search {} ({})", id, request.query());
            state.items.push(QueueItem::new(id, request));
            self.commit(&state);
            id
        };
        self.spawn_drain();
        Ok(id)
    }

    /// Remove an item; items being processed cannot be removed
    pub fn remove(&self, id: u64) -> MirrorResult<QueueItem> {
        let mut state = self.lock();
        let pos = state
            .items
            .iter()
            .position(|i| i.id == id)
            .ok_or(QueueError::NotFound(id))?;
        if state.items[pos].status == QueueStatus::Processing {
            return Err(QueueError::InFlight(id).into());
        }
        let item = state.items.remove(pos);
        self.commit(&state);
        Ok(item)
    }

    /// Put a failed item back to pending and start draining
    pub fn retry(&self, id: u64) -> MirrorResult<()> {
        {
            let mut state = self.lock();
            let item = state
                .items
                .iter_mut()
                .find(|i| i.id == id)
                .ok_or(QueueError::NotFound(id))?;
            if item.status != QueueStatus::Error {
                return Err(QueueError::NotRetryable(id).into());
            }
            item.status = QueueStatus::Pending;
            item.error_message = None;
            self.commit(&state);
        }
        self.spawn_drain();
        Ok(())
    }

    /// Remove every completed and failed item, returning how many went
    pub fn clear_finished(&self) -> usize {
        let mut state = self.lock();
        let before = state.items.len();
        state
            .items
            .retain(|i| matches!(i.status, QueueStatus::Pending | QueueStatus::Processing));
        let removed = before - state.items.len();
        if removed > 0 {
            self.commit(&state);
        }
        removed
    }

    /// Snapshot of all items in queue order
    pub fn items(&self) -> Vec<QueueItem> {
        self.lock().items.clone()
    }

    pub fn get(&self, id: u64) -> Option<QueueItem> {
        self.lock().items.iter().find(|i| i.id == id).cloned()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().count(QueueStatus::Pending)
    }

    pub fn is_busy(&self) -> bool {
        self.lock().busy
    }

    /// Receiver that changes whenever the queue does
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.changes.subscribe()
    }

    /// Start a drain in the background, if a runtime is available
    pub fn spawn_drain(&self) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let queue = self.clone();
                handle.spawn(async move { queue.drain().await });
            }
            Err(_) => debug!("No runtime; search queue will drain on next explicit call"),
        }
    }

    /// Work through pending items one at a time until none are left
    ///
    /// Returns immediately if another drain is already running.
    pub async fn drain(&self) {
        {
            let mut state = self.lock();
            if state.busy {
                return;
            }
            state.busy = true;
        }
        let mut guard = DrainGuard {
            queue: self,
            current: None,
            released: false,
        };

        loop {
            let Some((id, request)) = self.claim_next() else {
                break;
            };
            guard.current = Some(id);

            let result = self.inner.api.execute_search(&request).await;
            self.finish(id, result);
            guard.current = None;

            if self.pending_count() == 0 {
                continue;
            }
            tokio::time::sleep(DRAIN_DELAY).await;
        }

        // claim_next already cleared the busy flag
        guard.released = true;
    }

    /// Wait until nothing is pending or processing, draining if needed
    pub async fn wait_idle(&self) {
        let mut changes = self.subscribe();
        self.drain().await;

        loop {
            {
                let state = self.lock();
                if !state.busy && state.count(QueueStatus::Pending) == 0 {
                    return;
                }
            }
            if changes.changed().await.is_err() {
                return;
            }
        }
    }

    /// Mark the next pending item as processing.
    ///
    /// When nothing is pending the busy flag is released under the same
    /// lock, so an enqueue racing with the end of a drain always starts a
    /// new one.
    fn claim_next(&self) -> Option<(u64, SearchRequest)> {
        let mut state = self.lock();
        let Some(item) = state
            .items
            .iter_mut()
            .find(|i| i.status == QueueStatus::Pending)
        else {
            state.busy = false;
            self.commit(&state);
            return None;
        };

        item.status = QueueStatus::Processing;
        let claimed = (item.id, item.request.clone());
        debug!("Processing search {}", claimed.0);
        self.commit(&state);
        Some(claimed)
    }

    fn finish(&self, id: u64, result: MirrorResult<SearchResult>) {
        let mut state = self.lock();
        let Some(item) = state.items.iter_mut().find(|i| i.id == id) else {
            return;
        };

        match result {
            Ok(results) => {
                debug!("Search {} completed with {} hits", id, results.hits.len());
                item.status = QueueStatus::Completed;
                item.results = Some(results);
                item.error_message = None;
            }
            Err(e) => {
                warn!("Search {} failed: {}", id, e);
                item.status = QueueStatus::Error;
                item.error_message = Some(e.to_string());
            }
        }
        self.commit(&state);
    }

    /// Persist the current state and notify observers
    fn commit(&self, state: &QueueState) {
        let snapshot = PersistedQueue {
            next_id: state.next_id,
            items: state.items.clone(),
        };
        match serde_json::to_string(&snapshot) {
            Ok(json) => {
                if let Err(e) = self.inner.store.save(QUEUE_STORE_KEY, &json) {
                    warn!(
                        "Failed to persist search queue: {} {}",
                        e,
                        e.recovery_suggestion().unwrap_or_default()
                    );
                }
            }
            Err(e) => warn!("Failed to serialize search queue: {}", e),
        }

        self.inner.changes.send_modify(|rev| *rev += 1);
        self.inner.bus.publish(AppEvent::QueueChanged {
            pending: state.count(QueueStatus::Pending),
            processing: state.count(QueueStatus::Processing),
        });
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Releases the busy flag if a drain is dropped part way through
///
/// An item interrupted this way is marked as failed so it can be retried.
struct DrainGuard<'a> {
    queue: &'a SearchQueue,
    current: Option<u64>,
    released: bool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let mut state = self.queue.lock();
        if let Some(id) = self.current {
            if let Some(item) = state.items.iter_mut().find(|i| i.id == id) {
                item.status = QueueStatus::Error;
                item.error_message = Some("Search was interrupted".to_string());
            }
        }
        state.busy = false;
        self.queue.commit(&state);
    }
}

fn load_persisted(store: &dyn DurableStore) -> PersistedQueue {
    let raw = match store.load(QUEUE_STORE_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return PersistedQueue::default(),
        Err(e) => {
            warn!("Could not read saved search queue, starting empty: {}", e);
            return PersistedQueue::default();
        }
    };

    match serde_json::from_str(&raw) {
        Ok(queue) => queue,
        Err(e) => {
            warn!("Saved search queue is malformed, starting empty: {}", e);
            PersistedQueue::default()
        }
    }
}
