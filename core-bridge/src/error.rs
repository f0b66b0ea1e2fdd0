use bridge_traits::BridgeError;
use bytes::Bytes;
use thiserror::Error;

/// Failure of a single-result bridged call.
#[derive(Error, Debug)]
pub enum Error {
    /// The collaborator refused to create the task.
    #[error("Task creation failed: {0}")]
    TaskCreation(#[source] BridgeError),

    /// The completion callback reported a failure.
    #[error("Upstream failure: {0}")]
    Upstream(#[source] BridgeError),

    /// The caller's context was cancelled.
    #[error("Operation cancelled")]
    Cancelled { resume_data: Option<Bytes> },

    /// A successful upstream result could not be finalized.
    #[error("Post-processing failed ({context}): {source}")]
    PostProcessing {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
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

    pub fn post_processing(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::PostProcessing {
            context: context.into(),
            source,
        }
    }
}

/// Completion-callback failures: cancellation keeps its own variant so callers
/// can distinguish it, everything else is an upstream failure.
impl From<BridgeError> for Error {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Cancelled { resume_data } => Error::Cancelled { resume_data },
            other => Error::Upstream(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
