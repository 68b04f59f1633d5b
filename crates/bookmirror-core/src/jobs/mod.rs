//! Remote job orchestration
//!
//! Sync work runs on the server. The client issues a job, gets an id back,
//! and polls the job's status until it completes or fails:
//!
//! 1. `JobOrchestrator::issue` validates locally, then makes one call
//! 2. `JobOrchestrator::poll_until_terminal` returns a running `PollTask`
//! 3. On completion the task publishes `StructureReloadRequested`
//!
//! Polling gives up silently after a fixed number of checks; the job may
//! still finish remotely.

mod orchestrator;
mod poll;

pub use orchestrator::JobOrchestrator;
pub use poll::{PollOutcome, PollTask, TerminalCallback, MAX_POLL_ATTEMPTS, POLL_INTERVAL};
