//! Sequence views over publishers.
//!
//! [`PublisherExt::values`] wraps a publisher in an [`AsyncValues`] view. The
//! view itself is inert; each call to [`AsyncValues::stream`] subscribes
//! once and returns a fresh [`PublisherStream`].

use bridge_traits::Publisher;
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::demand::PublisherStream;

/// Lazy element-sequence view of a publisher.
#[derive(Debug, Clone)]
pub struct AsyncValues<P> {
    publisher: P,
}

impl<P: Publisher> AsyncValues<P> {
    pub fn new(publisher: P) -> Self {
        Self { publisher }
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn into_inner(self) -> P {
        self.publisher
    }

    /// Subscribe and return the stream of values, ending with the
    /// publisher's failure if it fails.
    pub fn stream(&self) -> PublisherStream<P::Output, P::Failure> {
        PublisherStream::new(&self.publisher)
    }
}

impl<P: Publisher<Failure = Infallible>> AsyncValues<P> {
    /// Stream of plain values for publishers that cannot fail.
    pub fn infallible(&self) -> InfallibleStream<P::Output> {
        InfallibleStream {
            inner: self.stream(),
        }
    }
}

/// [`PublisherStream`] of a publisher that never fails.
#[derive(Debug)]
pub struct InfallibleStream<T> {
    inner: PublisherStream<T, Infallible>,
}

impl<T> InfallibleStream<T> {
    pub fn cancel(&self) {
        self.inner.cancel();
    }
}

impl<T> Stream for InfallibleStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.inner.poll_next_unpin(cx).map(|item| {
            item.map(|result| match result {
                Ok(value) => value,
                Err(never) => match never {},
            })
        })
    }
}

/// Extension methods for all publishers.
pub trait PublisherExt: Publisher + Sized {
    /// View the publisher as an asynchronous sequence of values.
    fn values(self) -> AsyncValues<Self> {
        AsyncValues::new(self)
    }
}

impl<P: Publisher> PublisherExt for P {}

/// Await the first value of a publisher expected to emit exactly one.
///
/// # Panics
///
/// Panics if the publisher finishes without emitting a value.
pub async fn first_value<P>(publisher: &P) -> Result<P::Output, P::Failure>
where
    P: Publisher + ?Sized,
{
    let mut stream = PublisherStream::new(publisher);
    match stream.next().await {
        Some(result) => result,
        None => panic!("single-value publisher finished without a value"),
    }
}
