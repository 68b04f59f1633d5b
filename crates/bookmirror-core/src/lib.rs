//! bookmirror core library
//!
//! Mirrors a local ebook library into one of two note-taking backends and
//! keeps track of the work the server does on our behalf.
//!
//! # Architecture
//!
//! - **Structure**: both backend shapes are normalized into one `TreeNode`
//!   forest; building is pure, fetching lives in `StructureService`
//! - **Jobs**: sync work runs remotely; `JobOrchestrator` issues jobs and
//!   polls them to a terminal state
//! - **Search**: a persisted queue that runs one search at a time
//!
//! Components talk to each other through a typed `EventBus`.
//!
//! # Quick Start
//!
//! ```text
//! let mirror = Mirror::open(Config::load()?)?;
//! let _listener = mirror.watch_jobs();
//!
//! let job_id = mirror.jobs().issue(JobKind::FullSync, &SyncParams::default()).await?;
//! let outcome = mirror.jobs().poller(job_id).join().await;
//! ```
//!
//! # Modules
//!
//! - `mirror`: Unified entry point
//! - `structure`: Tree building for both backends
//! - `jobs`: Job issuing and polling
//! - `search`: Persistent search queue
//! - `api`: Remote API traits and the HTTP client
//! - `storage`: Durable key/value store
//! - `events`: Typed in-process event bus
//! - `config`: Application configuration

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod jobs;
pub mod mirror;
pub mod models;
pub mod search;
pub mod storage;
pub mod structure;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::{MirrorError, MirrorResult, QueueError};
pub use events::{AppEvent, EventBus, Subscription};
pub use jobs::{JobOrchestrator, PollOutcome, PollTask};
pub use mirror::Mirror;
pub use models::{
    FlatFolder, FlatNote, Job, JobKind, JobStatus, NestedSourceNode, NestedType, NodeKind,
    QueueItem, QueueStatus, SearchHit, SearchRequest, SearchResult, TreeNode,
};
pub use search::SearchQueue;
pub use storage::{DurableStore, FileStore, MemoryStore, StoreError};
pub use structure::{Backend, Structure, StructureService, StructureSource};
