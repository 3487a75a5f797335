//! Error types for the transfer system with context and resumability information

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the transfer engine, local store and manager
#[derive(Error, Debug)]
pub enum TransferError {
    /// Network-level failure while talking to the remote server
    #[error("network error while fetching '{url}'")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-success status code
    #[error("server returned {status} for '{url}'")]
    HttpStatus { url: String, status: u16 },

    /// File system failure while staging or finalizing a download
    #[error("storage operation failed while {operation} '{path}'")]
    Storage {
        path: PathBuf,
        operation: FileOperation,
        #[source]
        source: std::io::Error,
    },

    /// URL could not be parsed or has no usable file name
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl {
        url: String,
        reason: String,
        #[source]
        source: Option<url::ParseError>,
    },
}

/// File operation kinds for storage error context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOperation {
    Write,
    Create,
    Delete,
    Move,
    Metadata,
    CreateDir,
}

impl std::fmt::Display for FileOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileOperation::Write => write!(f, "writing"),
            FileOperation::Create => write!(f, "creating"),
            FileOperation::Delete => write!(f, "deleting"),
            FileOperation::Move => write!(f, "moving"),
            FileOperation::Metadata => write!(f, "reading metadata of"),
            FileOperation::CreateDir => write!(f, "creating directory"),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransferError>;

impl TransferError {
    /// Check whether a later `resume` can pick this transfer up again.
    ///
    /// Network transport errors are transient; everything else either
    /// needs caller intervention or a restart from zero.
    pub fn is_resumable(&self) -> bool {
        match self {
            TransferError::Network { source, .. } => {
                // 4xx means the request itself is wrong; retrying won't help
                source
                    .status()
                    .map_or(true, |status| status.is_server_error() || status.as_u16() == 429)
            }
            TransferError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            TransferError::Storage { .. } => false,
            TransferError::InvalidUrl { .. } => false,
        }
    }

    /// Error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            TransferError::Network { .. } => "network",
            TransferError::HttpStatus { .. } => "http_status",
            TransferError::Storage { .. } => "storage",
            TransferError::InvalidUrl { .. } => "invalid_url",
        }
    }

    pub(crate) fn storage(path: impl Into<PathBuf>, operation: FileOperation, source: std::io::Error) -> Self {
        TransferError::Storage {
            path: path.into(),
            operation,
            source,
        }
    }
}
