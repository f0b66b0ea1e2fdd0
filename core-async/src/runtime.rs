//! Runtime utilities that abstract over the underlying async executor.

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Runs the provided future to completion on a fresh current-thread runtime.
///
/// # Panics
///
/// Panics if the runtime cannot be built or when called from within another
/// runtime's worker thread.
pub fn block_on<F>(future: F) -> F::Output
where
    F: std::future::Future,
{
    Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("core_async::runtime::block_on: failed to build Tokio runtime")
        .block_on(future)
}

/// Returns a handle to the runtime driving the current task, if any.
///
/// Transports capture this at construction so that a later synchronous
/// `start()` call can spawn work even from a non-runtime thread.
pub fn current_handle() -> Option<Handle> {
    Handle::try_current().ok()
}
