//! # Session Configuration
//!
//! Builds the [`SessionConfig`] a compatibility session is created from.
//!
//! ## Overview
//!
//! The configuration decides which transport the session drives. That is the
//! only place the choice is made: there is one bridge implementation and the
//! transport behind it is picked here, at configuration time.
//!
//! ## Dependencies
//!
//! - `Transport` - Creates the callback-driven tasks (desktop default: reqwest)
//! - `TaskDelegate` - Session-wide event handler (optional)
//!
//! When the `desktop-shims` feature is enabled, a `ReqwestTransport` built
//! from the timeouts, user agent and staging directory below is injected if
//! no transport was provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::SessionConfig;
//! use std::time::Duration;
//!
//! let config = SessionConfig::builder()
//!     .request_timeout(Duration::from_secs(30))
//!     .user_agent("my-app/1.0")
//!     .download_dir("/var/tmp/my-app")
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ## Error Handling
//!
//! `build()` fails fast with [`Error::Config`] for inconsistent settings and
//! with [`Error::CapabilityMissing`] when no transport is available.

use crate::error::{Error, Result};
use bridge_traits::{TaskDelegate, Transport};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_MAX_IDLE_PER_HOST: usize = 8;

/// Configuration of one compatibility session.
///
/// Use [`SessionConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct SessionConfig {
    /// Upper bound for a whole request, redirects included
    pub request_timeout: Duration,

    /// Upper bound for establishing a connection
    pub connect_timeout: Duration,

    pub user_agent: String,

    /// Durable destination for finished downloads
    pub download_dir: PathBuf,

    /// Where the transport keeps in-progress download files
    /// (`None`: the transport's own default)
    pub staging_dir: Option<PathBuf>,

    pub max_idle_per_host: usize,

    /// Headers added to every request that does not set them itself
    pub default_headers: HashMap<String, String>,

    /// Free-form label for logs and debugging
    pub session_description: Option<String>,

    /// Session-wide delegate
    pub delegate: Option<Arc<dyn TaskDelegate>>,

    pub transport: Arc<dyn Transport>,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("request_timeout", &self.request_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("user_agent", &self.user_agent)
            .field("download_dir", &self.download_dir)
            .field("staging_dir", &self.staging_dir)
            .field("max_idle_per_host", &self.max_idle_per_host)
            .field(
                "default_headers",
                &self.default_headers.keys().collect::<Vec<_>>(),
            )
            .field("session_description", &self.session_description)
            .field(
                "delegate",
                &self.delegate.as_ref().map(|_| "TaskDelegate { ... }"),
            )
            .field("transport", &"Transport { ... }")
            .finish()
    }
}

impl SessionConfig {
    /// Creates a new builder for constructing a `SessionConfig`.
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Timeouts are non-zero
    /// - The connect timeout does not exceed the request timeout
    /// - The user agent is not empty
    /// - The download directory is not empty
    pub fn validate(&self) -> Result<()> {
        validate_fields(
            self.request_timeout,
            self.connect_timeout,
            &self.user_agent,
            &self.download_dir,
        )
    }
}

fn validate_fields(
    request_timeout: Duration,
    connect_timeout: Duration,
    user_agent: &str,
    download_dir: &Path,
) -> Result<()> {
    if request_timeout.is_zero() {
        return Err(Error::Config(
            "Request timeout must be greater than zero".to_string(),
        ));
    }

    if connect_timeout.is_zero() {
        return Err(Error::Config(
            "Connect timeout must be greater than zero".to_string(),
        ));
    }

    if connect_timeout > request_timeout {
        return Err(Error::Config(format!(
            "Connect timeout ({:?}) exceeds request timeout ({:?})",
            connect_timeout, request_timeout
        )));
    }

    if user_agent.trim().is_empty() {
        return Err(Error::Config("User agent cannot be empty".to_string()));
    }

    if download_dir.as_os_str().is_empty() {
        return Err(Error::Config("Download directory cannot be empty".to_string()));
    }

    Ok(())
}

fn default_user_agent() -> String {
    format!("compat-session/{}", env!("CARGO_PKG_VERSION"))
}

fn default_download_dir() -> PathBuf {
    std::env::temp_dir().join("compat-session")
}

#[cfg(not(feature = "desktop-shims"))]
fn transport_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "Transport".to_string(),
        message: "A Transport implementation is required to create tasks. \
                 Desktop: enable the 'desktop-shims' feature to use the default ReqwestTransport. \
                 Otherwise: inject a transport with SessionConfigBuilder::transport()."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_transport(settings: &Settings) -> Result<Arc<dyn Transport>> {
    use bridge_desktop::{ReqwestTransport, TransportOptions};

    let mut options = TransportOptions {
        request_timeout: settings.request_timeout,
        connect_timeout: settings.connect_timeout,
        user_agent: settings.user_agent.clone(),
        max_idle_per_host: settings.max_idle_per_host,
        default_headers: settings.default_headers.clone(),
        ..TransportOptions::default()
    };
    if let Some(dir) = &settings.staging_dir {
        options.staging_dir = dir.clone();
    }

    let transport = ReqwestTransport::new(options).map_err(Error::Transport)?;
    let transport: Arc<dyn Transport> = Arc::new(transport);
    Ok(transport)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_transport(_settings: &Settings) -> Result<Arc<dyn Transport>> {
    Err(transport_missing_error())
}

/// Resolved plain settings, shared by validation and transport defaults.
struct Settings {
    request_timeout: Duration,
    connect_timeout: Duration,
    user_agent: String,
    staging_dir: Option<PathBuf>,
    max_idle_per_host: usize,
    default_headers: HashMap<String, String>,
}

/// Builder for constructing [`SessionConfig`] instances.
#[derive(Default)]
pub struct SessionConfigBuilder {
    request_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    user_agent: Option<String>,
    download_dir: Option<PathBuf>,
    staging_dir: Option<PathBuf>,
    max_idle_per_host: Option<usize>,
    default_headers: HashMap<String, String>,
    session_description: Option<String>,
    delegate: Option<Arc<dyn TaskDelegate>>,
    transport: Option<Arc<dyn Transport>>,
}

impl SessionConfigBuilder {
    /// Default: 60 seconds
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Default: 10 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Sets where finished downloads are moved to.
    ///
    /// Default: `compat-session` under the OS temp directory.
    pub fn download_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.download_dir = Some(path.into());
        self
    }

    pub fn staging_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.staging_dir = Some(path.into());
        self
    }

    pub fn max_idle_per_host(mut self, max: usize) -> Self {
        self.max_idle_per_host = Some(max);
        self
    }

    /// Adds a header sent with every request. Can be called repeatedly.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    pub fn session_description(mut self, description: impl Into<String>) -> Self {
        self.session_description = Some(description.into());
        self
    }

    pub fn delegate(mut self, delegate: Arc<dyn TaskDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// Use `transport` instead of the platform default.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Builds the final configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when a setting is invalid
    /// - [`Error::CapabilityMissing`] when no transport was provided and the
    ///   `desktop-shims` feature is disabled
    pub fn build(self) -> Result<SessionConfig> {
        let settings = Settings {
            request_timeout: self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            connect_timeout: self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            user_agent: self.user_agent.unwrap_or_else(default_user_agent),
            staging_dir: self.staging_dir,
            max_idle_per_host: self.max_idle_per_host.unwrap_or(DEFAULT_MAX_IDLE_PER_HOST),
            default_headers: self.default_headers,
        };

        let download_dir = self.download_dir.unwrap_or_else(default_download_dir);

        // Fail on bad settings before a default transport is built from them.
        validate_fields(
            settings.request_timeout,
            settings.connect_timeout,
            &settings.user_agent,
            &download_dir,
        )?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => provide_default_transport(&settings)?,
        };

        let config = SessionConfig {
            request_timeout: settings.request_timeout,
            connect_timeout: settings.connect_timeout,
            user_agent: settings.user_agent,
            download_dir,
            staging_dir: settings.staging_dir,
            max_idle_per_host: settings.max_idle_per_host,
            default_headers: settings.default_headers,
            session_description: self.session_description,
            delegate: self.delegate,
            transport,
        };

        Ok(config)
    }
}
