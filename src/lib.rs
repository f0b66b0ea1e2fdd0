//! Workspace umbrella crate.
//!
//! Host applications can depend on `compat-workspace` and pick features instead
//! of wiring each crate individually:
//!
//! - `desktop-shims` (default): the [`CompatSession`] façade backed by the
//!   reqwest transport from `bridge-desktop`.
//! - `streams`: the publisher-to-stream bridge from `core-bridge` on its own.

#[cfg(feature = "desktop-shims")]
pub use core_session::{CompatSession, RequestOptions, TaskGroups};

#[cfg(feature = "streams")]
pub use core_bridge::{AsyncValues, PublisherExt, PublisherStream};
