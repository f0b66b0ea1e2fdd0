use bytes::Bytes;
use thiserror::Error;

/// Errors reported by collaborators (transports, publishers) through their
/// completion callbacks.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The task was cancelled before it finished. Download tasks attach
    /// opaque resume data when the partial transfer can be continued.
    #[error("Task cancelled")]
    Cancelled { resume_data: Option<Bytes> },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Session has been invalidated")]
    SessionInvalidated,

    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Cancellation without resume data.
    pub fn cancelled() -> Self {
        Self::Cancelled { resume_data: None }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Resume data attached to a cancelled download, if any.
    pub fn resume_data(&self) -> Option<&Bytes> {
        match self {
            Self::Cancelled { resume_data } => resume_data.as_ref(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
