//! Fetches the structure from the configured backend and keeps the latest
//! built tree.

use std::sync::{Arc, RwLock};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Backend, Structure, StructureSource};
use crate::api::StructureApi;
use crate::error::MirrorResult;
use crate::events::{AppEvent, EventBus};
use crate::models::{tree_totals, TreeNode};

/// Owner of the current tree snapshot
///
/// Reloads may be triggered by the user or by a finished job; they can
/// overlap, and whichever finishes last replaces the snapshot.
#[derive(Clone)]
pub struct StructureService {
    api: Arc<dyn StructureApi>,
    backend: Backend,
    bus: EventBus,
    current: Arc<RwLock<Vec<TreeNode>>>,
}

impl StructureService {
    pub fn new(api: Arc<dyn StructureApi>, backend: Backend, bus: EventBus) -> Self {
        Self {
            api,
            backend,
            bus,
            current: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Fetch the raw snapshot for the configured backend
    pub async fn fetch(&self) -> MirrorResult<Structure> {
        debug!("Fetching {} structure", self.backend);
        Ok(match self.backend {
            Backend::Flat => Structure::Flat(self.api.get_flat_structure().await?),
            Backend::Nested => Structure::Nested(self.api.get_nested_structure().await?),
        })
    }

    /// Fetch, build, and publish a fresh tree
    pub async fn reload(&self) -> MirrorResult<Vec<TreeNode>> {
        let structure = self.fetch().await?;
        let tree = structure.build()?;
        let (folders, notes) = tree_totals(&tree);

        *self.current.write().unwrap_or_else(|e| e.into_inner()) = tree.clone();
        info!("Structure reloaded: {} folders, {} notes", folders, notes);
        self.bus
            .publish(AppEvent::StructureReloaded { folders, notes });

        Ok(tree)
    }

    /// The most recently built tree (empty before the first reload)
    pub fn current(&self) -> Vec<TreeNode> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Reload whenever a reload is requested on the bus
    ///
    /// The listener holds its own subscription; aborting the returned handle
    /// drops it and unsubscribes.
    pub fn spawn_reload_listener(&self) -> JoinHandle<()> {
        let mut subscription = self.bus.subscribe();
        let service = self.clone();

        tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                if event != AppEvent::StructureReloadRequested {
                    continue;
                }
                if let Err(e) = service.reload().await {
                    warn!("Structure reload failed: {}", e);
                }
            }
        })
    }
}
