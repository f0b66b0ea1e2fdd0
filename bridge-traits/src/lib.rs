//! # Collaborator Bridge Traits
//!
//! Capability traits for the external collaborators the compatibility bridges
//! adapt, plus the value types they exchange.
//!
//! ## Overview
//!
//! Nothing in this crate performs I/O. It fixes the contract between the
//! bridges in `core-bridge`/`core-session` and whoever implements the
//! callback-driven side (a network client, a reactive library, a test double).
//!
//! ## Traits
//!
//! ### Transfer tasks
//! - [`Transport`](transport::Transport) - Creates suspended data, upload and download tasks
//! - [`TransportTask`](transport::TransportTask) - One task: start once, cancel, complete once
//! - [`TaskDelegate`](delegate::TaskDelegate) - Receives task lifecycle events
//!
//! ### Publishers
//! - [`Publisher`](publisher::Publisher) - Push-based source with explicit demand
//! - [`Subscriber`](publisher::Subscriber) - Receives subscription, values and completion
//! - [`Subscription`](publisher::Subscription) - Upstream handle: request demand, cancel
//!
//! ## Implementations
//!
//! | Collaborator | Implementation Crate |
//! |--------------|---------------------|
//! | Transport    | `bridge-desktop` (reqwest) |
//! | Publisher    | `core-bridge::publishers` (`Sequence`, `Promise`) |
//!
//! ## Error Handling
//!
//! Collaborators report failures as [`BridgeError`](error::BridgeError).
//! Cancellation is always reported as [`BridgeError::Cancelled`] so callers
//! can tell it apart from genuine failures.
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync`: completion callbacks and publisher
//! events may arrive on any thread.

pub mod delegate;
pub mod error;
pub mod publisher;
pub mod redact;
pub mod transport;

pub use error::BridgeError;

// Re-export commonly used types
pub use delegate::{DelegateEvent, EventSet, ResponseDisposition, TaskDelegate};
pub use publisher::{Completion, Demand, Publisher, Subscriber, Subscription};
pub use transport::{
    DataCompletion, DownloadCompletion, DownloadSource, Method, Request, Response, TaskId,
    TaskKind, TaskMetrics, TaskState, TransferProgress, Transport, TransportTask, UploadSource,
};
