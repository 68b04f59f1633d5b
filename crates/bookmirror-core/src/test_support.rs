//! Scriptable in-process stand-in for the remote API, shared by unit tests

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::api::{Credentials, SearchApi, StructureApi, SyncApi, SyncParams};
use crate::error::{MirrorError, MirrorResult};
use crate::models::{Job, JobId, JobKind, JobStatus, SearchHit, SearchRequest, SearchResult};
use crate::structure::{FlatStructure, NestedStructure};

/// What the n-th `get_job` call returns
#[derive(Debug, Clone, Copy)]
pub enum JobStep {
    Status(JobStatus),
    NetworkError,
}

#[derive(Default)]
pub struct MockApi {
    /// Steps for successive `get_job` calls; the last one repeats
    pub job_script: Mutex<Vec<JobStep>>,
    pub job_calls: Mutex<Vec<tokio::time::Instant>>,
    pub issue_calls: AtomicUsize,
    pub issue_error: Mutex<Option<MirrorError>>,
    pub flat: Mutex<FlatStructure>,
    pub nested: Mutex<NestedStructure>,
    pub structure_calls: AtomicUsize,
    pub fail_queries: Mutex<HashSet<String>>,
    pub search_delay: Mutex<Duration>,
    pub search_calls: Mutex<Vec<String>>,
    pub search_times: Mutex<Vec<tokio::time::Instant>>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_job_script(self, steps: Vec<JobStep>) -> Self {
        *self.job_script.lock().unwrap() = steps;
        self
    }

    pub fn with_failing_query(self, query: &str) -> Self {
        self.fail_queries.lock().unwrap().insert(query.to_string());
        self
    }

    pub fn with_search_delay(self, delay: Duration) -> Self {
        *self.search_delay.lock().unwrap() = delay;
        self
    }

    pub fn job_call_count(&self) -> usize {
        self.job_calls.lock().unwrap().len()
    }

    pub fn search_queries(&self) -> Vec<String> {
        self.search_calls.lock().unwrap().clone()
    }
}

pub fn job_with_status(id: &str, status: JobStatus) -> Job {
    Job {
        id: id.to_string(),
        kind: JobKind::FullSync,
        status,
        total_items: 10,
        completed_items: if status == JobStatus::Completed { 10 } else { 3 },
        error_message: (status == JobStatus::Failed).then(|| "backend exploded".to_string()),
        created_at: Some(Utc::now()),
        completed_at: status.is_terminal().then(Utc::now),
    }
}

#[async_trait]
impl SyncApi for MockApi {
    async fn issue_sync_job(
        &self,
        kind: JobKind,
        _credentials: &Credentials,
        _params: &SyncParams,
    ) -> MirrorResult<JobId> {
        let n = self.issue_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.issue_error.lock().unwrap().take() {
            return Err(err);
        }
        Ok(format!("{}-{}", kind, n + 1))
    }

    async fn get_job(&self, job_id: &str) -> MirrorResult<Job> {
        let call = {
            let mut calls = self.job_calls.lock().unwrap();
            calls.push(tokio::time::Instant::now());
            calls.len() - 1
        };
        let step = {
            let script = self.job_script.lock().unwrap();
            script
                .get(call)
                .or_else(|| script.last())
                .copied()
                .unwrap_or(JobStep::Status(JobStatus::Queued))
        };
        match step {
            JobStep::Status(status) => Ok(job_with_status(job_id, status)),
            JobStep::NetworkError => Err(MirrorError::Network("connection reset".to_string())),
        }
    }
}

#[async_trait]
impl StructureApi for MockApi {
    async fn get_flat_structure(&self) -> MirrorResult<FlatStructure> {
        self.structure_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.flat.lock().unwrap().clone())
    }

    async fn get_nested_structure(&self) -> MirrorResult<NestedStructure> {
        self.structure_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.nested.lock().unwrap().clone())
    }
}

#[async_trait]
impl SearchApi for MockApi {
    async fn execute_search(&self, request: &SearchRequest) -> MirrorResult<SearchResult> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.search_calls
            .lock()
            .unwrap()
            .push(request.query().to_string());
        self.search_times
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());

        let delay = *self.search_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_queries.lock().unwrap().contains(request.query()) {
            return Err(MirrorError::Network("search backend unreachable".to_string()));
        }

        Ok(SearchResult {
            query: request.query().to_string(),
            hits: vec![SearchHit {
                id: format!("hit-{}", request.query()),
                title: format!("Result for {}", request.query()),
                snippet: None,
                score: 0.9,
            }],
            total: 1,
        })
    }
}
