//! Per-call options of the session operations.

use bridge_traits::TaskDelegate;
use core_async::sync::CancellationToken;
use std::fmt;
use std::sync::Arc;

/// Per-call settings: a task delegate and a cancellation token.
///
/// ```ignore
/// let token = CancellationToken::new();
/// let options = RequestOptions::new()
///     .delegate(progress_delegate)
///     .cancellation(token.clone());
/// let (body, response) = session.data(request, options).await?;
/// ```
#[derive(Clone, Default)]
pub struct RequestOptions {
    delegate: Option<Arc<dyn TaskDelegate>>,
    cancellation: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delegate consulted before the session delegate for this call's task.
    pub fn delegate(mut self, delegate: Arc<dyn TaskDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// Token that cancels this call, and with it the underlying task.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn task_delegate(&self) -> Option<&Arc<dyn TaskDelegate>> {
        self.delegate.as_ref()
    }

    pub fn cancellation_token(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    pub(crate) fn into_parts(self) -> (Option<Arc<dyn TaskDelegate>>, CancellationToken) {
        (self.delegate, self.cancellation.unwrap_or_default())
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("delegate", &self.delegate.as_ref().map(|_| "TaskDelegate { ... }"))
            .field(
                "cancelled",
                &self.cancellation.as_ref().map(CancellationToken::is_cancelled),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::EventSet;

    struct Silent;

    impl TaskDelegate for Silent {
        fn capabilities(&self) -> EventSet {
            EventSet::NONE
        }
    }

    #[test]
    fn test_defaults_have_no_delegate_and_fresh_token() {
        let options = RequestOptions::new();
        assert!(options.task_delegate().is_none());
        assert!(options.cancellation_token().is_none());

        let (delegate, token) = options.into_parts();
        assert!(delegate.is_none());
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_builder_keeps_token_linked() {
        let token = CancellationToken::new();
        let options = RequestOptions::new()
            .delegate(Arc::new(Silent))
            .cancellation(token.clone());
        assert!(options.task_delegate().is_some());

        token.cancel();
        let (_, linked) = options.into_parts();
        assert!(linked.is_cancelled());
        assert!(format!("{:?}", RequestOptions::new().cancellation(linked)).contains("Some(true)"));
    }
}
