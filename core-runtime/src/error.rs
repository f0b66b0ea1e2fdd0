//! Errors raised while assembling a session, before any task exists.

use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    /// The default transport could not be constructed.
    #[error("Failed to initialize default transport: {0}")]
    Transport(#[source] BridgeError),
}

pub type Result<T> = std::result::Result<T, Error>;
