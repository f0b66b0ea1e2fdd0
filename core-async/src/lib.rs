//! Runtime abstraction layer for the compatibility bridges.
//!
//! Every other crate in the workspace reaches the async runtime through this
//! crate instead of depending on Tokio directly. That keeps the bridges
//! themselves scheduler-agnostic: they only ever suspend on the primitives
//! re-exported here and resume wherever the caller's executor polls them.
//!
//! # Modules
//!
//! - `task`: Task spawning
//! - `fs`: Async file operations
//! - `time`: Sleep, timeouts and instants
//! - `sync`: Channels, async locks and cancellation tokens
//! - `runtime`: Runtime handles and `block_on`
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::CancellationToken;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let token = CancellationToken::new();
//!     let child = token.child_token();
//!
//!     let handle = core_async::task::spawn(async move {
//!         child.cancelled().await;
//!         "stopped"
//!     });
//!
//!     sleep(Duration::from_millis(5)).await;
//!     token.cancel();
//!     assert_eq!(handle.await.unwrap(), "stopped");
//! }
//! ```

// Re-export the async entry-point/test macros so downstream crates never need
// direct Tokio dependencies.
pub use core_async_macros::{main, test};

pub mod fs;
pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

// Re-export commonly used types at crate root for convenience
pub use task::spawn;
pub use time::{sleep, Duration, Instant};
