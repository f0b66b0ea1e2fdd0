//! # Core Runtime Module
//!
//! Ambient infrastructure shared by the session façade:
//! - Logging and tracing setup
//! - Session configuration with fail-fast validation
//!
//! ## Overview
//!
//! Nothing here bridges anything. This crate decides which transport a
//! session talks to (configuration-time strategy selection) and how the
//! bridges' `tracing` events reach the host.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{SessionConfig, SessionConfigBuilder};
pub use error::{Error, Result};
