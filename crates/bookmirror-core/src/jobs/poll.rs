//! Scheduled job polling
//!
//! A `PollTask` checks a job's status on a fixed interval until the job is
//! terminal, the attempt budget runs out, or the task is cancelled. The
//! first check happens one interval after `start()`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::SyncApi;
use crate::error::{MirrorError, MirrorResult};
use crate::events::{AppEvent, EventBus};
use crate::models::{Job, JobId, JobStatus};

/// Fixed time between status checks
pub const POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Status checks before giving up (about five minutes)
pub const MAX_POLL_ATTEMPTS: u32 = 150;

/// Called once with the job when it reaches a terminal state
pub type TerminalCallback = Box<dyn FnOnce(Job) + Send + 'static>;

/// How often and how long to poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PollPolicy {
    interval: Duration,
    max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: POLL_INTERVAL,
            max_attempts: MAX_POLL_ATTEMPTS,
        }
    }
}

/// How a poll task ended
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The job completed or failed
    Terminal(Job),
    /// The attempt budget ran out; the job may still be running remotely
    Exhausted { attempts: u32 },
    /// The task was cancelled before a terminal state was seen
    Cancelled { attempts: u32 },
}

impl PollOutcome {
    /// Completed job, `JobFailed` error, or `None` when polling gave up
    pub fn into_result(self) -> MirrorResult<Option<Job>> {
        match self {
            PollOutcome::Terminal(job) if job.status == JobStatus::Failed => {
                Err(MirrorError::JobFailed {
                    message: job
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "no error message reported".to_string()),
                    job_id: job.id,
                })
            }
            PollOutcome::Terminal(job) => Ok(Some(job)),
            PollOutcome::Exhausted { .. } | PollOutcome::Cancelled { .. } => Ok(None),
        }
    }
}

/// Handle to a scheduled poll of one job
///
/// Dropping the handle cancels the poll, so a consumer that goes away never
/// leaves a recurring call behind.
pub struct PollTask {
    job_id: JobId,
    api: Arc<dyn SyncApi>,
    policy: PollPolicy,
    bus: Option<EventBus>,
    on_terminal: Option<TerminalCallback>,
    cancel_tx: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<PollOutcome>>,
    outcome: Option<PollOutcome>,
}

impl PollTask {
    /// Create an unstarted task
    pub fn new(job_id: impl Into<JobId>, api: Arc<dyn SyncApi>) -> Self {
        Self {
            job_id: job_id.into(),
            api,
            policy: PollPolicy::default(),
            bus: None,
            on_terminal: None,
            cancel_tx: None,
            handle: None,
            outcome: None,
        }
    }

    #[cfg(test)]
    fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Publish progress and completion events on `bus`
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Set the callback fired when the job becomes terminal
    pub fn on_terminal<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(Job) + Send + 'static,
    {
        self.on_terminal = Some(Box::new(callback));
        self
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Start polling. Does nothing if the task was already started.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) {
        if self.handle.is_some() || self.outcome.is_some() {
            return;
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.cancel_tx = Some(cancel_tx);

        debug!(
            "Polling job {} every {:?} (max {} attempts)",
            self.job_id, self.policy.interval, self.policy.max_attempts
        );
        self.handle = Some(tokio::spawn(poll_loop(
            self.job_id.clone(),
            Arc::clone(&self.api),
            self.policy,
            self.bus.clone(),
            self.on_terminal.take(),
            cancel_rx,
        )));
    }

    /// Stop polling. Safe to call repeatedly and after the task ended.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(true);
            debug!("Polling of job {} cancelled", self.job_id);
        }
    }

    /// Whether the poll loop is still running
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Wait for the task to end and return how it ended
    ///
    /// Starts the task first if needed.
    pub async fn join(&mut self) -> PollOutcome {
        if let Some(ref outcome) = self.outcome {
            return outcome.clone();
        }
        self.start();

        let outcome = match self.handle.take() {
            Some(handle) => handle
                .await
                .unwrap_or(PollOutcome::Cancelled { attempts: 0 }),
            None => PollOutcome::Cancelled { attempts: 0 },
        };
        self.cancel_tx = None;
        self.outcome = Some(outcome.clone());
        outcome
    }
}

impl Drop for PollTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn poll_loop(
    job_id: JobId,
    api: Arc<dyn SyncApi>,
    policy: PollPolicy,
    bus: Option<EventBus>,
    mut on_terminal: Option<TerminalCallback>,
    mut cancel_rx: watch::Receiver<bool>,
) -> PollOutcome {
    let mut ticker = interval_at(Instant::now() + policy.interval, policy.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut attempts = 0u32;

    loop {
        tokio::select! {
            biased;
            // Fires on an explicit cancel and when the handle is dropped
            _ = cancel_rx.changed() => {
                return PollOutcome::Cancelled { attempts };
            }
            _ = ticker.tick() => {}
        }

        attempts += 1;
        let result = api.get_job(&job_id).await;

        // A call already in flight runs to completion; its result is dropped
        if *cancel_rx.borrow() || cancel_rx.has_changed().is_err() {
            return PollOutcome::Cancelled { attempts };
        }

        match result {
            Ok(job) if job.is_terminal() => {
                info!(
                    "Job {} {} after {} checks",
                    job.id, job.status, attempts
                );
                if let Some(ref bus) = bus {
                    bus.publish(AppEvent::JobFinished(job.clone()));
                    if job.status == JobStatus::Completed {
                        bus.publish(AppEvent::StructureReloadRequested);
                    }
                }
                if let Some(callback) = on_terminal.take() {
                    callback(job.clone());
                }
                return PollOutcome::Terminal(job);
            }
            Ok(job) => {
                debug!(
                    "Job {} {} ({}/{} items), check {}",
                    job.id, job.status, job.completed_items, job.total_items, attempts
                );
                if let Some(ref bus) = bus {
                    bus.publish(AppEvent::JobProgress(job));
                }
            }
            Err(e) if e.is_transient() => {
                debug!("Status check {} for job {} failed, retrying: {}", attempts, job_id, e);
            }
            Err(e) => {
                warn!("Status check {} for job {} failed: {}", attempts, job_id, e);
            }
        }

        if attempts >= policy.max_attempts {
            warn!(
                "Stopped polling job {} after {} checks without a terminal state",
                job_id, attempts
            );
            return PollOutcome::Exhausted { attempts };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{JobStep, MockApi};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce(Job) + Send + 'static) {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_cb = Arc::clone(&fired);
        (fired, move |_job: Job| {
            fired_cb.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_on_third_check() {
        let api = Arc::new(MockApi::new().with_job_script(vec![
            JobStep::Status(JobStatus::Queued),
            JobStep::Status(JobStatus::Processing),
            JobStep::Status(JobStatus::Completed),
        ]));
        let (fired, callback) = counter();
        let started = Instant::now();

        let mut task = PollTask::new("job-1", api.clone()).on_terminal(callback);
        task.start();
        let outcome = task.join().await;

        assert!(matches!(outcome, PollOutcome::Terminal(ref job) if job.status == JobStatus::Completed));
        assert_eq!(api.job_call_count(), 3);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        let calls = api.job_calls.lock().unwrap().clone();
        assert_eq!(calls[0] - started, POLL_INTERVAL);
        for pair in calls.windows(2) {
            assert_eq!(pair[1] - pair[0], POLL_INTERVAL);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_budget() {
        let api = Arc::new(
            MockApi::new().with_job_script(vec![JobStep::Status(JobStatus::Processing)]),
        );
        let (fired, callback) = counter();
        let started = Instant::now();

        let mut task = PollTask::new("job-2", api.clone()).on_terminal(callback);
        let outcome = task.join().await;

        assert_eq!(outcome, PollOutcome::Exhausted { attempts: 150 });
        assert_eq!(api.job_call_count(), 150);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(Instant::now() - started, POLL_INTERVAL * 150);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_do_not_stop_polling() {
        let api = Arc::new(MockApi::new().with_job_script(vec![
            JobStep::NetworkError,
            JobStep::NetworkError,
            JobStep::Status(JobStatus::Processing),
            JobStep::Status(JobStatus::Failed),
        ]));
        let (fired, callback) = counter();

        let mut task = PollTask::new("job-3", api.clone()).on_terminal(callback);
        let outcome = task.join().await;

        assert_eq!(api.job_call_count(), 4);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        let err = outcome.into_result().unwrap_err();
        assert!(matches!(err, MirrorError::JobFailed { ref message, .. } if message == "backend exploded"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_count_toward_budget() {
        let api = Arc::new(MockApi::new().with_job_script(vec![JobStep::NetworkError]));
        let small = PollPolicy {
            interval: Duration::from_millis(100),
            max_attempts: 5,
        };

        let mut task = PollTask::new("job-4", api.clone()).with_policy(small);
        assert_eq!(task.join().await, PollOutcome::Exhausted { attempts: 5 });
        assert_eq!(api.job_call_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_polling_and_skips_callback() {
        let api = Arc::new(
            MockApi::new().with_job_script(vec![JobStep::Status(JobStatus::Processing)]),
        );
        let (fired, callback) = counter();

        let mut task = PollTask::new("job-5", api.clone()).on_terminal(callback);
        task.start();
        assert!(task.is_running());

        tokio::time::sleep(Duration::from_millis(4500)).await;
        task.cancel();
        task.cancel();

        let outcome = task.join().await;
        assert_eq!(outcome, PollOutcome::Cancelled { attempts: 2 });
        assert!(!task.is_running());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(api.job_call_count(), 2);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        // Cancelling after the end is harmless
        task.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let api = Arc::new(
            MockApi::new().with_job_script(vec![JobStep::Status(JobStatus::Processing)]),
        );

        let mut task = PollTask::new("job-6", api.clone());
        task.start();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        drop(task);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(api.job_call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_terminal_is_noop() {
        let api = Arc::new(
            MockApi::new().with_job_script(vec![JobStep::Status(JobStatus::Completed)]),
        );

        let mut task = PollTask::new("job-7", api.clone());
        let first = task.join().await;
        task.cancel();
        let second = task.join().await;

        assert_eq!(first, second);
        assert_eq!(api.job_call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_requests_reload() {
        let api = Arc::new(
            MockApi::new().with_job_script(vec![JobStep::Status(JobStatus::Completed)]),
        );
        let bus = EventBus::new();
        let mut events = bus.subscribe();

        let mut task = PollTask::new("job-8", api).with_bus(bus);
        task.join().await;

        assert!(matches!(events.try_recv(), Some(AppEvent::JobFinished(_))));
        assert_eq!(events.try_recv(), Some(AppEvent::StructureReloadRequested));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_does_not_request_reload() {
        let api = Arc::new(MockApi::new().with_job_script(vec![
            JobStep::Status(JobStatus::Processing),
            JobStep::Status(JobStatus::Failed),
        ]));
        let bus = EventBus::new();
        let mut events = bus.subscribe();

        let mut task = PollTask::new("job-9", api).with_bus(bus);
        task.join().await;

        assert!(matches!(events.try_recv(), Some(AppEvent::JobProgress(_))));
        assert!(matches!(events.try_recv(), Some(AppEvent::JobFinished(ref j)) if j.status == JobStatus::Failed));
        assert_eq!(events.try_recv(), None);
    }
}
