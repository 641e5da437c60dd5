//! Subscription
//!
//! Consumer-facing handle bound to one channel. Events addressed to the
//! channel are buffered in the subscription's own queue until the consumer
//! asks for them.
//!
//! # Lifecycle
//!
//! ```text
//! new() ──attach──► Attached ──unsubscribe() / drop / connection closed──► Closed
//! ```
//!
//! The queue is unbounded: a slow consumer accumulates memory rather than
//! losing events. `backlog()` reports how many events are waiting.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use super::counter::{Delivery, SubscriptionCounter};
use crate::domain::channel::{Channel, ChannelTag};
use crate::domain::error::ClientError;
use crate::domain::subscription::SubscriberId;

/// State shared between a subscription and its handles.
struct SubscriptionCore {
    id: SubscriberId,
    channel: Channel,
    counter: Arc<SubscriptionCounter>,
    closed: AtomicBool,
}

impl SubscriptionCore {
    fn unsubscribe(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!(tag = %self.channel.tag(), id = self.id, "Subscription closed");
        self.counter.detach(self.channel.tag(), self.id);
    }
}

/// Lazy sequence of events for one channel.
///
/// Iterate with [`Subscription::recv`] or as a [`Stream`]. The sequence
/// ends with `None` after [`Subscription::unsubscribe`] or an explicit
/// close of the connection; after an abnormal connection loss the last
/// item is `Some(Err(ClientError::Connection(..)))`.
///
/// Dropping the subscription unsubscribes it.
pub struct Subscription {
    core: Arc<SubscriptionCore>,
    events: mpsc::UnboundedReceiver<Delivery>,
}

impl Subscription {
    /// Attach a new subscription to `channel`.
    ///
    /// # Errors
    ///
    /// Returns the error of the first `Subscribe` dispatch, except
    /// `NotConnected`, which only defers the subscribe.
    pub fn new(
        counter: Arc<SubscriptionCounter>,
        channel: impl Into<Channel>,
    ) -> Result<Self, ClientError> {
        let channel = channel.into();
        let (tx, events) = mpsc::unbounded_channel();
        let id = counter.next_subscriber_id();

        counter.attach(&channel, id, tx)?;

        Ok(Self {
            core: Arc::new(SubscriptionCore {
                id,
                channel,
                counter,
                closed: AtomicBool::new(false),
            }),
            events,
        })
    }

    /// Channel tag this subscription is bound to.
    #[must_use]
    pub fn tag(&self) -> &ChannelTag {
        self.core.channel.tag()
    }

    /// Channel this subscription is bound to.
    #[must_use]
    pub fn channel(&self) -> &Channel {
        &self.core.channel
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the subscription is closed.
    pub async fn recv(&mut self) -> Option<Delivery> {
        if self.is_closed() {
            self.release();
            return None;
        }

        let delivery = self.events.recv().await;

        if self.is_closed() {
            self.release();
            return None;
        }

        delivery
    }

    /// Stop receiving events. Safe to call more than once.
    pub fn unsubscribe(&self) {
        self.core.unsubscribe();
    }

    /// Handle that can unsubscribe from another task.
    #[must_use]
    pub fn handle(&self) -> SubscriptionHandle {
        SubscriptionHandle {
            core: Arc::clone(&self.core),
        }
    }

    /// Check if the subscription was unsubscribed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.core.closed.load(Ordering::SeqCst)
    }

    /// Number of events waiting in the queue.
    #[must_use]
    pub fn backlog(&self) -> usize {
        self.events.len()
    }

    fn release(&mut self) {
        self.events.close();
        while self.events.try_recv().is_ok() {}
    }
}

impl Stream for Subscription {
    type Item = Delivery;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.is_closed() {
            self.release();
            return Poll::Ready(None);
        }

        match self.events.poll_recv(cx) {
            Poll::Ready(Some(_)) if self.is_closed() => {
                self.release();
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.core.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.core.id)
            .field("tag", self.core.channel.tag())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Cloneable handle that can close a subscription from any task.
#[derive(Clone)]
pub struct SubscriptionHandle {
    core: Arc<SubscriptionCore>,
}

impl SubscriptionHandle {
    /// Stop the subscription, waking a suspended consumer.
    pub fn unsubscribe(&self) {
        self.core.unsubscribe();
    }

    /// Check if the subscription was unsubscribed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.core.closed.load(Ordering::SeqCst)
    }
}
