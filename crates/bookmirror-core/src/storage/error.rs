//! Durable store errors

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// ENOSPC and EDQUOT on Linux
const DISK_FULL_CODES: [i32; 2] = [28, 122];

/// Failure to save or load a stored value
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to create store directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Permission denied on '{path}'")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Disk full while writing '{path}'")]
    DiskFull {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Keys become file names, so only a safe alphabet is accepted
    #[error("Invalid store key '{0}': keys may only contain letters, digits, '-' and '_'")]
    InvalidKey(String),

    /// The temp file was written but could not replace the old value
    #[error("Could not replace '{to}' with '{from}': {source}")]
    Replace {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    /// Classify a failed write to `path`
    pub fn from_io(error: io::Error, path: PathBuf) -> Self {
        if error.kind() == io::ErrorKind::PermissionDenied {
            StoreError::PermissionDenied {
                path,
                source: error,
            }
        } else if is_disk_full(&error) {
            StoreError::DiskFull {
                path,
                source: error,
            }
        } else {
            StoreError::Write {
                path,
                source: error,
            }
        }
    }

    /// Classify a failed read of `path`
    pub fn from_read(error: io::Error, path: PathBuf) -> Self {
        if error.kind() == io::ErrorKind::PermissionDenied {
            StoreError::PermissionDenied {
                path,
                source: error,
            }
        } else {
            StoreError::Read {
                path,
                source: error,
            }
        }
    }

    /// What the user can do about it, if anything
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StoreError::DiskFull { .. } => Some("Free up disk space and try again."),
            StoreError::PermissionDenied { .. } | StoreError::CreateDir { .. } => Some(
                "Check permissions on the data directory, or point BOOKMIRROR_DATA_DIR somewhere writable.",
            ),
            _ => None,
        }
    }
}

fn is_disk_full(error: &io::Error) -> bool {
    if error
        .raw_os_error()
        .is_some_and(|code| DISK_FULL_CODES.contains(&code))
    {
        return true;
    }
    let msg = error.to_string().to_lowercase();
    msg.contains("no space left") || msg.contains("quota exceeded")
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
