//! Issues sync jobs and watches them to completion

use std::sync::Arc;

use tracing::info;

use super::poll::{PollOutcome, PollTask};
use crate::api::{Credentials, SyncApi, SyncParams};
use crate::error::{MirrorError, MirrorResult};
use crate::events::{AppEvent, EventBus};
use crate::models::{Job, JobId, JobKind};

/// Client-side driver for remote sync jobs
///
/// The orchestrator never changes a job's status; it only issues jobs and
/// observes them.
#[derive(Clone)]
pub struct JobOrchestrator {
    api: Arc<dyn SyncApi>,
    credentials: Option<Credentials>,
    bus: EventBus,
}

impl JobOrchestrator {
    pub fn new(api: Arc<dyn SyncApi>, credentials: Option<Credentials>, bus: EventBus) -> Self {
        Self {
            api,
            credentials,
            bus,
        }
    }

    /// Start a remote job and return its id
    ///
    /// Missing credentials or parameters are rejected here, before any
    /// network call is made.
    pub async fn issue(&self, kind: JobKind, params: &SyncParams) -> MirrorResult<JobId> {
        let credentials = self.validate(kind, params)?;

        let job_id = self.api.issue_sync_job(kind, credentials, params).await?;
        info!("Issued {} job {}", kind, job_id);
        self.bus.publish(AppEvent::JobIssued {
            job_id: job_id.clone(),
            kind,
        });

        Ok(job_id)
    }

    fn validate(&self, kind: JobKind, params: &SyncParams) -> MirrorResult<&Credentials> {
        let credentials = self
            .credentials
            .as_ref()
            .filter(|c| !c.access_token.trim().is_empty())
            .ok_or_else(|| MirrorError::Validation("access_token".to_string()))?;

        let has_book = params
            .book_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty());
        if kind == JobKind::SyncBook && !has_book {
            return Err(MirrorError::Validation("book_id".to_string()));
        }
        // Only known kinds can be started
        if kind == JobKind::Other {
            return Err(MirrorError::Validation("type".to_string()));
        }

        Ok(credentials)
    }

    /// Create an unstarted poll task for `job_id`, wired to the event bus
    pub fn poller(&self, job_id: impl Into<JobId>) -> PollTask {
        PollTask::new(job_id, Arc::clone(&self.api)).with_bus(self.bus.clone())
    }

    /// Poll `job_id` until it is terminal, then call `on_terminal`
    ///
    /// Keep the returned task alive for as long as the result matters;
    /// dropping it stops polling.
    pub fn poll_until_terminal<F>(&self, job_id: impl Into<JobId>, on_terminal: F) -> PollTask
    where
        F: FnOnce(Job) + Send + 'static,
    {
        let mut task = self.poller(job_id).on_terminal(on_terminal);
        task.start();
        task
    }

    /// One-off status read
    pub async fn job_status(&self, job_id: &str) -> MirrorResult<Job> {
        self.api.get_job(job_id).await
    }

    /// Issue a job and wait until polling ends
    pub async fn run_to_completion(
        &self,
        kind: JobKind,
        params: &SyncParams,
    ) -> MirrorResult<(JobId, PollOutcome)> {
        let job_id = self.issue(kind, params).await?;
        let mut task = self.poller(job_id.clone());
        let outcome = task.join().await;
        Ok((job_id, outcome))
    }
}
