//! Publish/Subscribe Abstraction
//!
//! A push-based source with explicit demand. Subscribing yields at most one
//! [`Subscriber::receive_subscription`] call, then zero or more
//! [`Subscriber::receive`] calls (never more than the demand requested so
//! far), then exactly one [`Subscriber::receive_completion`], unless the
//! subscription is cancelled first.

use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::sync::Arc;

/// Number of values a subscriber is willing to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Demand(usize);

impl Demand {
    pub const NONE: Demand = Demand(0);
    pub const UNLIMITED: Demand = Demand(usize::MAX);

    pub const fn max(count: usize) -> Self {
        Demand(count)
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    pub const fn is_unlimited(self) -> bool {
        self.0 == usize::MAX
    }

    /// Finite count, or `None` for unlimited demand.
    pub const fn count(self) -> Option<usize> {
        if self.is_unlimited() {
            None
        } else {
            Some(self.0)
        }
    }
}

impl Add for Demand {
    type Output = Demand;

    fn add(self, rhs: Demand) -> Demand {
        Demand(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for Demand {
    fn add_assign(&mut self, rhs: Demand) {
        *self = *self + rhs;
    }
}

impl Sub for Demand {
    type Output = Demand;

    /// Unlimited demand stays unlimited; finite demand never underflows.
    fn sub(self, rhs: Demand) -> Demand {
        if self.is_unlimited() {
            self
        } else {
            Demand(self.0.saturating_sub(rhs.0))
        }
    }
}

impl SubAssign for Demand {
    fn sub_assign(&mut self, rhs: Demand) {
        *self = *self - rhs;
    }
}

impl fmt::Display for Demand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.count() {
            Some(count) => write!(f, "max({})", count),
            None => f.write_str("unlimited"),
        }
    }
}

/// Terminal event of a publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion<E> {
    Finished,
    Failure(E),
}

/// Upstream handle given to a subscriber.
pub trait Subscription: Send + Sync {
    /// Signal willingness to receive `demand` more values.
    fn request(&self, demand: Demand);

    /// Stop delivery. No completion is sent after cancellation.
    fn cancel(&self);
}

/// Receiver side of a publisher.
pub trait Subscriber<T, E>: Send + Sync {
    fn receive_subscription(&self, subscription: Arc<dyn Subscription>);

    /// Deliver one value; the returned demand is added to the outstanding
    /// demand.
    fn receive(&self, input: T) -> Demand;

    fn receive_completion(&self, completion: Completion<E>);
}

/// Push-based source of values.
pub trait Publisher {
    type Output: Send + 'static;
    type Failure: Send + 'static;

    fn subscribe(&self, subscriber: Arc<dyn Subscriber<Self::Output, Self::Failure>>);
}

impl<P: Publisher + ?Sized> Publisher for Arc<P> {
    type Output = P::Output;
    type Failure = P::Failure;

    fn subscribe(&self, subscriber: Arc<dyn Subscriber<Self::Output, Self::Failure>>) {
        (**self).subscribe(subscriber)
    }
}
