//! # Core Bridges
//!
//! Converts callback- and event-driven collaborators into cancellable,
//! suspend/resume Rust futures and streams.
//!
//! ## Overview
//!
//! Two bridges live here:
//!
//! - **Single-result task bridge** ([`with_cancellable_task`]): creates one
//!   transport task, starts it, and suspends the caller until the task's
//!   completion callback fires. Cancelling the caller's token cancels the
//!   task, whichever order the two events arrive in.
//! - **Streaming demand bridge** ([`PublisherStream`]): subscribes to a
//!   push-based publisher and exposes it as a [`futures::Stream`], requesting
//!   exactly one value per pull.
//!
//! Neither bridge touches bytes on a wire; they arbitrate control only.
//!
//! ## Guarantees
//!
//! - Every caller and every pull is resumed exactly once.
//! - Cancellation requested before a task is active cancels it the moment
//!   it becomes active; after completion it is a no-op.
//! - Pulls resolve in FIFO order with values in upstream emission order.
//! - Side effects that can re-enter a bridge run outside its lock.
//!
//! ## Usage
//!
//! ```ignore
//! use core_bridge::{PublisherExt, publishers::Sequence};
//! use futures::StreamExt;
//!
//! let mut values = Sequence::new([1, 2, 3]).values().infallible();
//! while let Some(value) = values.next().await {
//!     println!("{value}");
//! }
//! ```

pub mod cancel_state;
pub mod demand;
pub mod error;
pub mod publishers;
pub mod task_bridge;
pub mod values;

pub use cancel_state::{Cancel, CancellationState};
pub use demand::{DemandBridge, Pull, PullResult, PublisherStream};
pub use error::{Error, Result};
pub use publishers::{Fulfill, Promise, Sequence};
pub use task_bridge::{with_cancellable_task, CompletionSink};
pub use values::{first_value, AsyncValues, InfallibleStream, PublisherExt};
