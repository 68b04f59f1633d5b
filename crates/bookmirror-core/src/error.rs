//! Error types for core operations
//!
//! Pure transformations (the tree builders) return these errors to the caller.
//! Asynchronous flows record failures on the affected entity instead, see
//! `QueueItem::error_message` and `Job::error_message`.

use thiserror::Error;

use crate::storage::StoreError;

/// Errors produced by the core
#[derive(Error, Debug)]
pub enum MirrorError {
    /// A required parameter was missing; rejected before any network call
    #[error("Missing required parameter: {0}")]
    Validation(String),

    /// The remote API rejected our credentials
    #[error("Authentication rejected by remote API: {0}")]
    Auth(String),

    /// A single call failed at the transport level
    #[error("Network error: {0}")]
    Network(String),

    /// The remote API answered with a non-success status
    #[error("Remote API returned {status}: {message}")]
    Http { status: u16, message: String },

    /// A response body could not be decoded
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The remote system reports the job itself failed
    #[error("Job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    /// Folder hierarchy contains a cycle
    #[error("Folder hierarchy contains a cycle at '{id}' (path: {})", path.join(" > "))]
    StructuralCycle { id: String, path: Vec<String> },

    /// Queue operation rejected
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Durable store failure
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Reasons a queue operation can be rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("No queue item with id {0}")]
    NotFound(u64),

    #[error("Queue item {0} is being processed and cannot be removed")]
    InFlight(u64),

    #[error("Queue item {0} has not failed; only failed items can be retried")]
    NotRetryable(u64),

    #[error("Search queue has run out of item ids; clear it to continue")]
    IdsExhausted,
}

impl MirrorError {
    /// Whether the failure is worth retrying without reconfiguration
    pub fn is_transient(&self) -> bool {
        match self {
            MirrorError::Network(_) => true,
            MirrorError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Message suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            MirrorError::Auth(_) => {
                "The backend rejected the access token. Update it with \
                 `bookmirror config set access_token <token>`."
                    .to_string()
            }
            MirrorError::Validation(param) => {
                format!("Cannot start the operation: '{}' is not set.", param)
            }
            MirrorError::Storage(e) => match e.recovery_suggestion() {
                Some(hint) => format!("{}. {}", e, hint),
                None => e.to_string(),
            },
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for MirrorError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            MirrorError::Decode(error.to_string())
        } else if let Some(status) = error.status() {
            MirrorError::Http {
                status: status.as_u16(),
                message: error.to_string(),
            }
        } else {
            MirrorError::Network(error.to_string())
        }
    }
}

impl From<serde_json::Error> for MirrorError {
    fn from(error: serde_json::Error) -> Self {
        MirrorError::Decode(error.to_string())
    }
}

/// Result type for core operations
pub type MirrorResult<T> = Result<T, MirrorError>;
