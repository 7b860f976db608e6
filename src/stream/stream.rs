//! Minimal asynchronous iteration.
//!
//! Status and leak-report subscriptions implement [`Stream`] so async hosts can
//! `await` the next value instead of polling.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Asynchronous iterator.
///
/// `poll_next` returns `Poll::Pending` while no value is ready,
/// `Poll::Ready(Some(item))` for each value and `Poll::Ready(None)` once the
/// stream has ended.
pub trait Stream {
    /// The type of values yielded by the stream.
    type Item;

    /// Attempts to pull out the next value.
    ///
    /// Returning `Poll::Pending` loses no data.
    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>>;

    /// Bounds on the number of values that are immediately available.
    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, None)
    }
}

impl<S: Stream + Unpin + ?Sized> Stream for Box<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut **self).poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (**self).size_hint()
    }
}

impl<S: Stream + Unpin + ?Sized> Stream for &mut S {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut **self).poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (**self).size_hint()
    }
}

/// Convenience adapters for [`Stream`].
pub trait StreamExt: Stream {
    /// Resolves to the next value, or `None` once the stream has ended.
    fn next(&mut self) -> Next<'_, Self>
    where
        Self: Unpin,
    {
        Next { stream: self }
    }
}

impl<S: Stream + ?Sized> StreamExt for S {}

/// Future returned by [`StreamExt::next`].
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct Next<'a, S: ?Sized> {
    stream: &'a mut S,
}

impl<S: Stream + Unpin + ?Sized> Future for Next<'_, S> {
    type Output = Option<S::Item>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut *self.stream).poll_next(cx)
    }
}
