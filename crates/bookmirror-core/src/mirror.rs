//! Unified entry point
//!
//! `Mirror` wires the configured HTTP client, the durable store and the
//! event bus into the three services:
//!
//! ```ignore
//! let mirror = Mirror::open(Config::load()?)?;
//! let tree = mirror.structure().reload().await?;
//! let id = mirror.search().enqueue(SearchRequest::keyword("dune", 2))?;
//! ```

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::api::{HttpApi, SearchApi, StructureApi, SyncApi};
use crate::config::Config;
use crate::error::{MirrorError, MirrorResult};
use crate::events::EventBus;
use crate::jobs::JobOrchestrator;
use crate::search::SearchQueue;
use crate::storage::{DurableStore, FileStore};
use crate::structure::StructureService;

/// All services for one configured library mirror
pub struct Mirror {
    config: Config,
    bus: EventBus,
    structure: StructureService,
    jobs: JobOrchestrator,
    search: SearchQueue,
}

impl Mirror {
    /// Build the services from `config`, talking HTTP to `api_url`
    pub fn open(config: Config) -> MirrorResult<Self> {
        let url = config
            .api_url
            .as_deref()
            .ok_or_else(|| MirrorError::Validation("api_url".to_string()))?;
        let api = Arc::new(
            HttpApi::with_timeout(url, config.request_timeout())?
                .with_read_token(config.access_token.clone()),
        );
        let store = Arc::new(FileStore::open(&config.data_dir)?);
        debug!("Opened mirror for {} ({} backend)", url, config.backend);

        Ok(Self::with_parts(config, api.clone(), api.clone(), api, store))
    }

    /// Build the services over arbitrary API and store implementations
    pub fn with_parts(
        config: Config,
        sync: Arc<dyn SyncApi>,
        structure: Arc<dyn StructureApi>,
        search: Arc<dyn SearchApi>,
        store: Arc<dyn DurableStore>,
    ) -> Self {
        let bus = EventBus::new();

        let structure = StructureService::new(structure, config.backend, bus.clone());
        let jobs = JobOrchestrator::new(sync, config.credentials(), bus.clone());
        let search = SearchQueue::restore(search, store, bus.clone());

        Self {
            config,
            bus,
            structure,
            jobs,
            search,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shared event bus; subscribe here to observe jobs, reloads and the queue
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    pub fn structure(&self) -> &StructureService {
        &self.structure
    }

    pub fn jobs(&self) -> &JobOrchestrator {
        &self.jobs
    }

    pub fn search(&self) -> &SearchQueue {
        &self.search
    }

    /// Reload the tree whenever a job completes
    pub fn watch_jobs(&self) -> JoinHandle<()> {
        self.structure.spawn_reload_listener()
    }
}
