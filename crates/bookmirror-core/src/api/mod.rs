//! Remote API contracts
//!
//! The core talks to the backend through three narrow traits so tests and
//! alternative transports can stand in for the HTTP client:
//!
//! - `SyncApi`: issue sync jobs and read their status
//! - `StructureApi`: fetch the mirrored hierarchy in either backend shape
//! - `SearchApi`: execute one search, request/response
//!
//! `HttpApi` implements all three over JSON/HTTP.

mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MirrorResult;
use crate::models::{Job, JobId, JobKind, SearchRequest, SearchResult};
use crate::structure::{FlatStructure, NestedStructure};

pub use http::HttpApi;

/// Credentials sent with job-issuing calls
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: String,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Parameters of a sync job
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncParams {
    /// Book to mirror, required for `sync_book`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub book_id: Option<String>,
    /// Overwrite notes even when they look unchanged
    #[serde(default)]
    pub force: bool,
}

impl SyncParams {
    pub fn for_book(book_id: impl Into<String>) -> Self {
        Self {
            book_id: Some(book_id.into()),
            force: false,
        }
    }
}

/// Job issuing and status
#[async_trait]
pub trait SyncApi: Send + Sync {
    /// Start a job; fails with `MirrorError::Auth` on rejected credentials
    async fn issue_sync_job(
        &self,
        kind: JobKind,
        credentials: &Credentials,
        params: &SyncParams,
    ) -> MirrorResult<JobId>;

    /// Current state of a job
    async fn get_job(&self, job_id: &str) -> MirrorResult<Job>;
}

/// Structure snapshots
#[async_trait]
pub trait StructureApi: Send + Sync {
    async fn get_flat_structure(&self) -> MirrorResult<FlatStructure>;

    async fn get_nested_structure(&self) -> MirrorResult<NestedStructure>;
}

/// One-shot search execution
#[async_trait]
pub trait SearchApi: Send + Sync {
    async fn execute_search(&self, request: &SearchRequest) -> MirrorResult<SearchResult>;
}
