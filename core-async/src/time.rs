//! Time-related re-exports.
//!
//! The bridges have no intrinsic timeouts; these exist for transports and for
//! callers that want to turn a deadline into a cancellation.
//!
//! ```rust
//! use core_async::time::{timeout, Duration};
//!
//! async fn example() {
//!     let result = timeout(Duration::from_millis(50), async { 7 }).await;
//!     assert_eq!(result.unwrap(), 7);
//! }
//! ```

pub use tokio::time::{error::Elapsed, sleep, sleep_until, timeout, Sleep, Timeout};

pub use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
