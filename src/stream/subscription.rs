//! Ordered fan-out of a current value to any number of subscribers.
//!
//! A [`Publisher`] holds the latest value. Each [`Subscription`] receives that
//! value first, then every value published after it subscribed, in publish
//! order. Queues are unbounded; a subscriber that never reads keeps its
//! backlog until it is dropped.
//!
//! The publisher is not internally synchronized. Its owner serializes
//! `publish` calls (the detector does so under its state lock), which is what
//! guarantees every subscriber sees the same order.

use super::Stream;
use core::fmt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Waker};

struct Inbox<T> {
    items: VecDeque<T>,
    waker: Option<Waker>,
    closed: bool,
}

struct Slot<T> {
    inbox: Mutex<Inbox<T>>,
}

impl<T> Slot<T> {
    fn deliver(&self, value: T) {
        let waker = {
            let mut inbox = self.inbox.lock();
            inbox.items.push_back(value);
            inbox.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    fn close(&self) {
        let waker = {
            let mut inbox = self.inbox.lock();
            inbox.closed = true;
            inbox.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

/// Holder of a current value with ordered delivery to subscribers.
pub struct Publisher<T> {
    current: T,
    subscribers: Vec<Weak<Slot<T>>>,
}

impl<T: Clone> Publisher<T> {
    /// Creates a publisher holding `initial`.
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self {
            current: initial,
            subscribers: Vec::new(),
        }
    }

    /// The most recently published value.
    #[must_use]
    pub fn current(&self) -> &T {
        &self.current
    }

    /// Subscribes; the current value is the first item delivered.
    ///
    /// Drops bookkeeping for subscriptions that have gone away, so a
    /// publisher that rarely publishes does not accumulate them.
    pub fn subscribe(&mut self) -> Subscription<T> {
        self.subscribers.retain(|subscriber| subscriber.strong_count() > 0);
        let slot = Arc::new(Slot {
            inbox: Mutex::new(Inbox {
                items: VecDeque::from([self.current.clone()]),
                waker: None,
                closed: false,
            }),
        });
        self.subscribers.push(Arc::downgrade(&slot));
        Subscription { slot }
    }

    /// Stores `value` and delivers it to every live subscriber.
    ///
    /// Returns the number of subscribers reached.
    pub fn publish(&mut self, value: T) -> usize {
        self.current = value;
        let mut reached = 0;
        let current = &self.current;
        self.subscribers.retain(|subscriber| match subscriber.upgrade() {
            Some(slot) => {
                slot.deliver(current.clone());
                reached += 1;
                true
            }
            None => false,
        });
        reached
    }

    /// Publishes `value` only if it differs from the current value.
    ///
    /// Returns true if it was published.
    pub fn publish_if_changed(&mut self, value: T) -> bool
    where
        T: PartialEq,
    {
        if self.current == value {
            return false;
        }
        self.publish(value);
        true
    }

    /// Number of subscriptions that have not been dropped.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .iter()
            .filter(|subscriber| subscriber.strong_count() > 0)
            .count()
    }
}

impl<T> Drop for Publisher<T> {
    fn drop(&mut self) {
        for slot in self.subscribers.drain(..).filter_map(|weak| weak.upgrade()) {
            slot.close();
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Publisher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("current", &self.current)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

/// Receiving end of a [`Publisher`].
///
/// Ends (yields `None` as a [`Stream`]) once the publisher is gone and the
/// backlog has been read.
pub struct Subscription<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Subscription<T> {
    /// Takes the next queued value without waiting.
    pub fn try_next(&mut self) -> Option<T> {
        self.slot.inbox.lock().items.pop_front()
    }

    /// Takes every queued value.
    pub fn drain(&mut self) -> Vec<T> {
        self.slot.inbox.lock().items.drain(..).collect()
    }

    /// Number of values waiting to be read.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.slot.inbox.lock().items.len()
    }

    /// Returns true once the publisher has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.slot.inbox.lock().closed
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let mut inbox = self.slot.inbox.lock();
        if let Some(item) = inbox.items.pop_front() {
            return Poll::Ready(Some(item));
        }
        if inbox.closed {
            return Poll::Ready(None);
        }
        inbox.waker = Some(cx.waker().clone());
        Poll::Pending
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let inbox = self.slot.inbox.lock();
        let queued = inbox.items.len();
        (queued, inbox.closed.then_some(queued))
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inbox = self.slot.inbox.lock();
        f.debug_struct("Subscription")
            .field("pending", &inbox.items.len())
            .field("closed", &inbox.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamExt;

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn subscriber_sees_current_then_updates() {
        init_test("subscriber_sees_current_then_updates");
        let mut publisher = Publisher::new(0_u32);
        publisher.publish(1);
        let mut sub = publisher.subscribe();
        publisher.publish(2);
        publisher.publish(3);

        let seen = sub.drain();
        crate::assert_with_log!(seen == [1, 2, 3], "current first", [1, 2, 3], seen);
        assert_eq!(sub.try_next(), None);
        crate::test_complete!("subscriber_sees_current_then_updates");
    }

    #[test]
    fn publish_if_changed_suppresses_repeats() {
        init_test("publish_if_changed_suppresses_repeats");
        let mut publisher = Publisher::new("idle");
        let mut sub = publisher.subscribe();
        assert!(!publisher.publish_if_changed("idle"));
        assert!(publisher.publish_if_changed("busy"));
        assert!(!publisher.publish_if_changed("busy"));
        assert!(publisher.publish_if_changed("idle"));
        assert_eq!(sub.drain(), ["idle", "busy", "idle"]);
        crate::test_complete!("publish_if_changed_suppresses_repeats");
    }

    #[test]
    fn dropped_subscriptions_are_pruned() {
        init_test("dropped_subscriptions_are_pruned");
        let mut publisher = Publisher::new(0_u8);
        let keep = publisher.subscribe();
        let gone = publisher.subscribe();
        assert_eq!(publisher.subscriber_count(), 2);
        drop(gone);
        let reached = publisher.publish(1);
        crate::assert_with_log!(reached == 1, "only live subscriber", 1, reached);
        assert_eq!(keep.pending(), 2);
        crate::test_complete!("dropped_subscriptions_are_pruned");
    }

    #[test]
    fn churned_subscriptions_do_not_accumulate_without_publish() {
        init_test("churned_subscriptions_do_not_accumulate_without_publish");
        let mut publisher = Publisher::new(0_u8);
        for _ in 0..10_000 {
            drop(publisher.subscribe());
        }
        let stored = publisher.subscribers.len();
        crate::assert_with_log!(stored <= 1, "stored subscribers bounded", "<= 1", stored);
        assert_eq!(publisher.subscriber_count(), 0);

        let keep = publisher.subscribe();
        drop(publisher.subscribe());
        let _next = publisher.subscribe();
        assert_eq!(publisher.subscribers.len(), 2);
        assert_eq!(keep.pending(), 1);
        crate::test_complete!("churned_subscriptions_do_not_accumulate_without_publish");
    }

    #[test]
    fn stream_ends_after_publisher_drop() {
        init_test("stream_ends_after_publisher_drop");
        let mut publisher = Publisher::new(10_i32);
        let mut sub = publisher.subscribe();
        publisher.publish(11);
        drop(publisher);
        assert!(sub.is_closed());

        let collected = futures_lite::future::block_on(async {
            let mut out = Vec::new();
            while let Some(value) = sub.next().await {
                out.push(value);
            }
            out
        });
        assert_eq!(collected, [10, 11]);
        crate::test_complete!("stream_ends_after_publisher_drop");
    }

    #[test]
    fn await_wakes_on_publish_from_other_thread() {
        init_test("await_wakes_on_publish_from_other_thread");
        let publisher = Arc::new(Mutex::new(Publisher::new(0_u64)));
        let mut sub = publisher.lock().subscribe();
        assert_eq!(sub.try_next(), Some(0));

        let producer = std::thread::spawn({
            let publisher = Arc::clone(&publisher);
            move || {
                std::thread::sleep(std::time::Duration::from_millis(5));
                publisher.lock().publish(42);
            }
        });
        let value = futures_lite::future::block_on(sub.next());
        producer.join().expect("producer thread");
        assert_eq!(value, Some(42));
        crate::test_complete!("await_wakes_on_publish_from_other_thread");
    }
}
