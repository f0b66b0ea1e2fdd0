//! Reference publishers that honor demand.
//!
//! - [`Sequence`] emits a fixed list of values, then finishes (or fails).
//! - [`Promise`] emits a single value (or fails) once it is fulfilled.
//!
//! Both deliver their terminal event in place of the value after the last
//! one, so a consumer that pulls one element at a time always observes the
//! failure on the pull that follows the final value.

use bridge_traits::{Completion, Demand, Publisher, Subscriber, Subscription};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::trace;

use crate::values::first_value;

/// Publisher of a fixed list of values.
#[derive(Debug, Clone)]
pub struct Sequence<T, E = Infallible> {
    items: Vec<T>,
    failure: Option<E>,
}

impl<T> Sequence<T, Infallible> {
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            items: items.into_iter().collect(),
            failure: None,
        }
    }
}

impl<T, E> Sequence<T, E> {
    /// Emit `items`, then fail with `error` instead of finishing.
    pub fn failing(items: impl IntoIterator<Item = T>, error: E) -> Self {
        Self {
            items: items.into_iter().collect(),
            failure: Some(error),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T, E> Publisher for Sequence<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Output = T;
    type Failure = E;

    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T, E>>) {
        let subscription = Arc::new(SequenceSubscription {
            state: Mutex::new(SequenceState {
                subscriber: Some(subscriber.clone()),
                items: self.items.iter().cloned().collect(),
                failure: self.failure.clone(),
                demand: Demand::NONE,
                draining: false,
            }),
        });
        subscriber.receive_subscription(subscription);
    }
}

struct SequenceState<T, E> {
    /// `None` once finished or cancelled.
    subscriber: Option<Arc<dyn Subscriber<T, E>>>,
    items: VecDeque<T>,
    failure: Option<E>,
    demand: Demand,
    /// Set while one `request` call is delivering; nested requests only add
    /// demand.
    draining: bool,
}

struct SequenceSubscription<T, E> {
    state: Mutex<SequenceState<T, E>>,
}

enum Step<T, E> {
    Value(Arc<dyn Subscriber<T, E>>, T),
    Complete(Arc<dyn Subscriber<T, E>>, Completion<E>),
    Idle,
}

impl<T: Send, E: Send> Subscription for SequenceSubscription<T, E> {
    fn request(&self, demand: Demand) {
        {
            let mut state = self.state.lock();
            if state.subscriber.is_none() {
                return;
            }
            state.demand += demand;
            if state.draining {
                return;
            }
            state.draining = true;
        }

        loop {
            let step = {
                let mut state = self.state.lock();
                match state.subscriber.clone() {
                    Some(_) if state.demand.is_none() => Step::Idle,
                    Some(subscriber) => {
                        state.demand -= Demand::max(1);
                        match state.items.pop_front() {
                            Some(item) => Step::Value(subscriber, item),
                            None => {
                                state.subscriber = None;
                                let completion = match state.failure.take() {
                                    Some(error) => Completion::Failure(error),
                                    None => Completion::Finished,
                                };
                                Step::Complete(subscriber, completion)
                            }
                        }
                    }
                    None => Step::Idle,
                }
            };

            match step {
                Step::Value(subscriber, item) => {
                    let more = subscriber.receive(item);
                    if !more.is_none() {
                        self.state.lock().demand += more;
                    }
                }
                Step::Complete(subscriber, completion) => {
                    subscriber.receive_completion(completion);
                    self.state.lock().draining = false;
                    return;
                }
                Step::Idle => {
                    self.state.lock().draining = false;
                    return;
                }
            }
        }
    }

    fn cancel(&self) {
        let mut state = self.state.lock();
        trace!(remaining = state.items.len(), "Sequence subscription cancelled");
        state.subscriber = None;
        state.items.clear();
    }
}

/// Publisher of a single value produced later.
///
/// Like a promise: the first result passed to [`Fulfill::fulfill`] wins and
/// is replayed to every subscriber, each receiving it once it has requested
/// demand.
pub struct Promise<T, E = Infallible> {
    inner: Arc<PromiseInner<T, E>>,
}

struct PromiseInner<T, E> {
    state: Mutex<PromiseState<T, E>>,
}

struct PromiseState<T, E> {
    result: Option<Result<T, E>>,
    waiting: Vec<Arc<PromiseSubscription<T, E>>>,
}

/// Write side of a [`Promise`].
pub struct Fulfill<T, E = Infallible> {
    inner: Arc<PromiseInner<T, E>>,
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Run `attempt` right away with the write side of a new promise.
    pub fn new(attempt: impl FnOnce(Fulfill<T, E>)) -> Self {
        let (promise, fulfill) = Self::pending();
        attempt(fulfill);
        promise
    }

    /// An unfulfilled promise and its write side.
    pub fn pending() -> (Self, Fulfill<T, E>) {
        let inner = Arc::new(PromiseInner {
            state: Mutex::new(PromiseState {
                result: None,
                waiting: Vec::new(),
            }),
        });
        (
            Self {
                inner: inner.clone(),
            },
            Fulfill { inner },
        )
    }

    pub fn is_fulfilled(&self) -> bool {
        self.inner.state.lock().result.is_some()
    }

    /// Await the promised value.
    pub async fn value(&self) -> Result<T, E> {
        first_value(self).await
    }
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("fulfilled", &self.inner.state.lock().result.is_some())
            .finish()
    }
}

impl<T, E> Fulfill<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Resolve the promise. Only the first result of a promise counts.
    pub fn fulfill(self, result: Result<T, E>) {
        let waiting = {
            let mut state = self.inner.state.lock();
            if state.result.is_some() {
                trace!("Promise already fulfilled; ignoring result");
                return;
            }
            state.result = Some(result);
            std::mem::take(&mut state.waiting)
        };
        for subscription in waiting {
            subscription.deliver_if_ready();
        }
    }
}

impl<T, E> fmt::Debug for Fulfill<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fulfill").finish_non_exhaustive()
    }
}

impl<T, E> Publisher for Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    type Output = T;
    type Failure = E;

    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T, E>>) {
        let subscription = Arc::new(PromiseSubscription {
            promise: Arc::downgrade(&self.inner),
            state: Mutex::new(PromiseSubscriptionState {
                subscriber: Some(subscriber.clone()),
                requested: false,
            }),
        });
        {
            let mut state = self.inner.state.lock();
            if state.result.is_none() {
                state.waiting.push(subscription.clone());
            }
        }
        subscriber.receive_subscription(subscription);
    }
}

struct PromiseSubscription<T, E> {
    promise: Weak<PromiseInner<T, E>>,
    state: Mutex<PromiseSubscriptionState<T, E>>,
}

struct PromiseSubscriptionState<T, E> {
    subscriber: Option<Arc<dyn Subscriber<T, E>>>,
    requested: bool,
}

impl<T: Clone, E: Clone> PromiseSubscription<T, E> {
    fn deliver_if_ready(&self) {
        let Some(promise) = self.promise.upgrade() else {
            return;
        };
        let (subscriber, result) = {
            let mut state = self.state.lock();
            if !state.requested || state.subscriber.is_none() {
                return;
            }
            let Some(result) = promise.state.lock().result.clone() else {
                return;
            };
            match state.subscriber.take() {
                Some(subscriber) => (subscriber, result),
                None => return,
            }
        };

        match result {
            Ok(value) => {
                subscriber.receive(value);
                subscriber.receive_completion(Completion::Finished);
            }
            Err(error) => subscriber.receive_completion(Completion::Failure(error)),
        }
    }
}

impl<T, E> Subscription for PromiseSubscription<T, E>
where
    T: Clone + Send,
    E: Clone + Send,
{
    fn request(&self, demand: Demand) {
        if demand.is_none() {
            return;
        }
        self.state.lock().requested = true;
        self.deliver_if_ready();
    }

    fn cancel(&self) {
        self.state.lock().subscriber = None;
    }
}
