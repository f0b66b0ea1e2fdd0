//! Streaming Demand Bridge
//!
//! Adapts a push-based [`Publisher`] into a pull-based [`Stream`]. Every pull
//! asks upstream for exactly one more value, so nothing is buffered beyond
//! what the consumer explicitly asked for.
//!
//! ```text
//! AwaitingSubscription(n) ──subscription──▶ Subscribed(upstream)
//!          │                                      │
//!          └────────completion / cancel───────────┴──▶ Terminal (absorbing)
//! ```
//!
//! Pulls wait in a FIFO queue and every one of them is resolved exactly once:
//! with a value, with the publisher's failure, or with end-of-sequence.
//! State changes happen under one `parking_lot` lock; requesting demand,
//! cancelling upstream and resolving pulls all happen after it is released,
//! because each of those may re-enter the bridge.

use bridge_traits::{Completion, Demand, Publisher, Subscriber, Subscription};
use core_async::sync::oneshot;
use futures::Stream;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, trace, warn};

/// What a pull resolves to: `None` is end-of-sequence.
pub type PullResult<T, E> = Option<Result<T, E>>;

type PullSender<T, E> = oneshot::Sender<PullResult<T, E>>;

enum Phase {
    AwaitingSubscription(Demand),
    Subscribed(Arc<dyn Subscription>),
    Terminal,
}

impl fmt::Debug for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::AwaitingSubscription(demand) => {
                f.debug_tuple("AwaitingSubscription").field(demand).finish()
            }
            Phase::Subscribed(_) => f.write_str("Subscribed"),
            Phase::Terminal => f.write_str("Terminal"),
        }
    }
}

struct Shared<T, E> {
    phase: Phase,
    pending: VecDeque<PullSender<T, E>>,
}

/// Subscriber side of the streaming bridge.
///
/// Single consumer: pulls are meant to come from one task at a time.
pub struct DemandBridge<T, E> {
    shared: Mutex<Shared<T, E>>,
}

impl<T, E> DemandBridge<T, E> {
    pub fn new() -> Self {
        Self {
            shared: Mutex::new(Shared {
                phase: Phase::AwaitingSubscription(Demand::NONE),
                pending: VecDeque::new(),
            }),
        }
    }

    /// Ask for the next element.
    ///
    /// Resolves immediately with end-of-sequence once the bridge is terminal.
    /// Before the subscription arrives the demand is accumulated and
    /// requested in one go when it does.
    pub fn pull(self: &Arc<Self>) -> Pull<T, E> {
        let (tx, rx) = oneshot::channel();
        let pull = Pull {
            bridge: Arc::clone(self),
            rx,
            resolved: false,
        };

        let mut shared = self.shared.lock();
        let upstream = match &mut shared.phase {
            Phase::Terminal => None,
            Phase::AwaitingSubscription(demand) => {
                *demand += Demand::max(1);
                Some(None)
            }
            Phase::Subscribed(subscription) => Some(Some(Arc::clone(subscription))),
        };

        match upstream {
            None => {
                drop(shared);
                let _ = tx.send(None);
            }
            Some(upstream) => {
                shared.pending.push_back(tx);
                drop(shared);
                if let Some(subscription) = upstream {
                    subscription.request(Demand::max(1));
                }
            }
        }
        pull
    }

    /// Tear the bridge down: pending pulls end, upstream is cancelled.
    /// Idempotent.
    pub fn cancel(&self) {
        let mut shared = self.shared.lock();
        let previous = mem::replace(&mut shared.phase, Phase::Terminal);
        let pending = mem::take(&mut shared.pending);
        drop(shared);

        match previous {
            Phase::Subscribed(upstream) => {
                debug!(pending = pending.len(), "Cancelling subscription");
                upstream.cancel();
            }
            Phase::AwaitingSubscription(_) => {
                debug!(pending = pending.len(), "Cancelled before subscription")
            }
            Phase::Terminal => {}
        }
        for tx in pending {
            let _ = tx.send(None);
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.shared.lock().phase, Phase::Terminal)
    }

    /// Number of pulls still waiting for a value.
    pub fn pending_pulls(&self) -> usize {
        self.shared.lock().pending.len()
    }
}

impl<T, E> Default for DemandBridge<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> fmt::Debug for DemandBridge<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.shared.lock();
        f.debug_struct("DemandBridge")
            .field("phase", &shared.phase)
            .field("pending", &shared.pending.len())
            .finish()
    }
}

impl<T: Send, E: Send> Subscriber<T, E> for DemandBridge<T, E> {
    fn receive_subscription(&self, subscription: Arc<dyn Subscription>) {
        let mut shared = self.shared.lock();
        let awaiting = match shared.phase {
            Phase::AwaitingSubscription(demand) => Some(demand),
            _ => None,
        };
        let Some(demand) = awaiting else {
            drop(shared);
            warn!("Received a subscription after subscribing or finishing; cancelling it");
            subscription.cancel();
            return;
        };
        shared.phase = Phase::Subscribed(Arc::clone(&subscription));
        drop(shared);

        debug!(%demand, "Subscribed");
        if !demand.is_none() {
            subscription.request(demand);
        }
    }

    fn receive(&self, input: T) -> Demand {
        let mut shared = self.shared.lock();
        if matches!(shared.phase, Phase::Subscribed(_)) {
            let next = shared.pending.pop_front();
            drop(shared);
            match next {
                Some(tx) => {
                    if tx.send(Some(Ok(input))).is_err() {
                        trace!("Pull abandoned before its value arrived");
                    }
                }
                None => warn!("Received a value with no pending pull; dropping it"),
            }
        } else {
            let stale = mem::take(&mut shared.pending);
            if let Phase::AwaitingSubscription(demand) = &mut shared.phase {
                // The drained pulls no longer want anything from upstream.
                *demand = Demand::NONE;
            }
            drop(shared);
            warn!(stale = stale.len(), "Received a value while not subscribed; dropping it");
            for tx in stale {
                let _ = tx.send(None);
            }
        }
        Demand::NONE
    }

    fn receive_completion(&self, completion: Completion<E>) {
        let mut shared = self.shared.lock();
        let previous = mem::replace(&mut shared.phase, Phase::Terminal);
        let pending = mem::take(&mut shared.pending);
        drop(shared);
        drop(previous);

        debug!(
            failed = matches!(completion, Completion::Failure(_)),
            pending = pending.len(),
            "Upstream completed"
        );
        let mut pending = pending.into_iter();
        if let Some(first) = pending.next() {
            let _ = first.send(match completion {
                Completion::Finished => None,
                Completion::Failure(error) => Some(Err(error)),
            });
        }
        for tx in pending {
            let _ = tx.send(None);
        }
    }
}

/// One outstanding pull. Dropping it before it resolves cancels the bridge.
#[must_use = "a pull does nothing unless awaited, and cancels the stream when dropped"]
pub struct Pull<T, E> {
    bridge: Arc<DemandBridge<T, E>>,
    rx: oneshot::Receiver<PullResult<T, E>>,
    resolved: bool,
}

impl<T, E> Future for Pull<T, E> {
    type Output = PullResult<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(outcome) => {
                this.resolved = true;
                Poll::Ready(outcome.unwrap_or(None))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T, E> Drop for Pull<T, E> {
    fn drop(&mut self) {
        if !self.resolved {
            self.bridge.cancel();
        }
    }
}

/// Pull-based view of one subscription to a publisher.
///
/// Subscribes when created; lazy, single-consumer and not restartable. Yields
/// values in upstream order, then ends silently or with exactly one error.
/// Dropping the stream cancels the subscription.
pub struct PublisherStream<T, E> {
    bridge: Arc<DemandBridge<T, E>>,
    pull: Option<Pull<T, E>>,
}

impl<T, E> PublisherStream<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new<P>(publisher: &P) -> Self
    where
        P: Publisher<Output = T, Failure = E> + ?Sized,
    {
        let bridge = Arc::new(DemandBridge::new());
        publisher.subscribe(bridge.clone());
        Self { bridge, pull: None }
    }
}

impl<T, E> PublisherStream<T, E> {
    /// Stop the stream early. Later polls yield `None`.
    pub fn cancel(&self) {
        self.bridge.cancel();
    }

    pub fn is_terminated(&self) -> bool {
        self.pull.is_none() && self.bridge.is_terminal()
    }
}

impl<T, E> Stream for PublisherStream<T, E> {
    type Item = Result<T, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let pull = this.pull.get_or_insert_with(|| this.bridge.pull());
        match Pin::new(pull).poll(cx) {
            Poll::Ready(item) => {
                this.pull = None;
                Poll::Ready(item)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T, E> Drop for PublisherStream<T, E> {
    fn drop(&mut self) {
        self.bridge.cancel();
    }
}

impl<T, E> fmt::Debug for PublisherStream<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublisherStream")
            .field("bridge", &self.bridge)
            .field("pulling", &self.pull.is_some())
            .finish()
    }
}
