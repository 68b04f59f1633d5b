//! Typed event bus
//!
//! Components publish a small, fixed set of events. Consumers subscribe for
//! as long as they care and get their own channel; dropping the
//! `Subscription` unsubscribes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;
use tracing::debug;

use crate::models::{Job, JobId, JobKind};

/// Events emitted by the core
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// A sync job was accepted by the remote API
    JobIssued { job_id: JobId, kind: JobKind },
    /// A poll returned a job that is still running
    JobProgress(Job),
    /// A polled job reached a terminal state
    JobFinished(Job),
    /// The displayed structure is stale and should be fetched again
    StructureReloadRequested,
    /// A new structure snapshot is available
    StructureReloaded { folders: usize, notes: usize },
    /// The search queue changed and was persisted
    QueueChanged { pending: usize, processing: usize },
}

struct BusInner {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<u64, mpsc::UnboundedSender<AppEvent>>>,
}

/// Cloneable handle to the shared event bus
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                next_id: AtomicU64::new(1),
                subscribers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().insert(id, tx);
        debug!("Event subscriber {} registered", id);

        Subscription {
            id,
            rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver an event to every live subscriber
    pub fn publish(&self, event: AppEvent) {
        let mut subscribers = self.lock();
        subscribers.retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, mpsc::UnboundedSender<AppEvent>>> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }
}

/// A live subscription; unsubscribes on drop
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<AppEvent>,
    bus: Weak<BusInner>,
}

impl Subscription {
    /// Wait for the next event. Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<AppEvent> {
        self.rx.recv().await
    }

    /// Take an event if one is already queued
    pub fn try_recv(&mut self) -> Option<AppEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.subscribers
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&self.id);
            debug!("Event subscriber {} removed", self.id);
        }
    }
}
