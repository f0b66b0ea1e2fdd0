//! # Compatibility Session
//!
//! Async façade over a callback-driven transport.
//!
//! ## Overview
//!
//! [`CompatSession`] exposes data, upload and download transfers as
//! cancellable `async fn`s. Underneath, each call drives exactly one
//! transport task through the single-result bridge from `core-bridge`:
//!
//! - Per-call delegates ([`RequestOptions::delegate`]) take precedence over
//!   the session delegate for their task; the [`DelegateRouter`] decides who
//!   sees each event
//! - Downloads are moved out of the transport's staging area into the
//!   configured download directory before the call returns
//! - Cancelled downloads carry resume data for
//!   [`CompatSession::download_resuming`]
//!
//! ## Feature Flags
//!
//! - `desktop-shims` (default): `SessionConfig::builder().build()` wires the
//!   reqwest transport from `bridge-desktop`
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::SessionConfig;
//! use core_session::{CompatSession, RequestOptions};
//! use core_async::sync::CancellationToken;
//!
//! let session = CompatSession::new(SessionConfig::builder().build()?);
//! let token = CancellationToken::new();
//!
//! let (path, response) = session
//!     .download_from_url(
//!         "https://example.com/archive.zip",
//!         RequestOptions::new().cancellation(token.clone()),
//!     )
//!     .await?;
//! ```

pub mod download;
pub mod options;
pub mod router;
pub mod session;

pub use core_bridge::{Error, Result};
pub use download::persist_download;
pub use options::RequestOptions;
pub use router::DelegateRouter;
pub use session::{CompatSession, TaskGroups};

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop::ResumeData;
