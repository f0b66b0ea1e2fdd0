//! Synchronization primitives.
//!
//! - `oneshot` carries a single completion from a callback into an awaiting
//!   caller.
//! - `CancellationToken` is the "surrounding context" a caller cancels to
//!   abandon an in-flight operation.
//! - The async locks and channels are re-exported for transports and tests.
//!
//! Short, non-awaiting critical sections inside the bridges use
//! `parking_lot::Mutex` directly rather than the async `Mutex` below.
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::oneshot;
//!
//! async fn example() {
//!     let (tx, rx) = oneshot::channel();
//!     std::thread::spawn(move || {
//!         let _ = tx.send("done");
//!     });
//!     assert_eq!(rx.await.unwrap(), "done");
//! }
//! ```

pub use tokio::sync::{mpsc, oneshot, Mutex, MutexGuard, Notify, RwLock};

pub use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFuture};
