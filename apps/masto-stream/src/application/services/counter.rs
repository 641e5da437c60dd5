//! Subscription Counter Service
//!
//! Shared reference-count table plus the routing step that feeds
//! subscriptions. One counter exists per client instance.
//!
//! # Server Round-Trips
//!
//! - First attach to a tag dispatches `Subscribe`. When the connection is
//!   not open yet the tag stays pending and is announced once it opens.
//!   Any other dispatch failure rolls the attach back and is returned.
//! - Last detach dispatches `Unsubscribe` if the tag was announced. A
//!   failure is logged and never resurrects the entry.
//! - Detaching an unknown subscriber does nothing.
//!
//! # Generations
//!
//! Each subscriber remembers how many times the connection had closed when
//! it attached. A closure only terminates subscribers attached before it,
//! so a subscription created while the router is still catching up with an
//! old `Closed` event survives and is announced on the next open.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::application::ports::ActionDispatcher;
use crate::domain::action::OutboundAction;
use crate::domain::channel::{Channel, ChannelTag, InboundEvent};
use crate::domain::error::ClientError;
use crate::domain::subscription::{
    Attach, Detach, SubscriberId, SubscriptionStats, SubscriptionTable,
};
use crate::infrastructure::metrics;

/// Item delivered to a subscription's queue.
pub type Delivery = Result<InboundEvent, ClientError>;

/// Producer half of a subscription's queue.
pub type EventSink = mpsc::UnboundedSender<Delivery>;

/// Source of the connection's closure count.
type GenerationSource = Box<dyn Fn() -> u64 + Send + Sync>;

/// Table entry of one subscriber.
struct Attached {
    generation: u64,
    sink: EventSink,
}

/// Reference-count table and event router shared by all subscriptions.
pub struct SubscriptionCounter {
    table: Mutex<SubscriptionTable<Attached>>,
    dispatcher: Arc<dyn ActionDispatcher>,
    generation: GenerationSource,
    next_id: AtomicU64,
}

impl SubscriptionCounter {
    /// Create a new counter dispatching through `dispatcher`.
    #[must_use]
    pub fn new(dispatcher: Arc<dyn ActionDispatcher>) -> Self {
        Self {
            table: Mutex::new(SubscriptionTable::new()),
            dispatcher,
            generation: Box::new(|| 0),
            next_id: AtomicU64::new(1),
        }
    }

    /// Read the connection's closure count from `source` on every attach.
    #[must_use]
    pub fn with_generation(mut self, source: impl Fn() -> u64 + Send + Sync + 'static) -> Self {
        self.generation = Box::new(source);
        self
    }

    /// Allocate a subscriber id.
    pub fn next_subscriber_id(&self) -> SubscriberId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Attach a subscriber to a channel.
    ///
    /// # Errors
    ///
    /// Returns the dispatch error of the first `Subscribe` unless it was
    /// `NotConnected`; the attach is rolled back in that case.
    pub fn attach(
        &self,
        channel: &Channel,
        id: SubscriberId,
        sink: EventSink,
    ) -> Result<(), ClientError> {
        let generation = (self.generation)();
        let mut table = self.table.lock();

        if table.attach(channel, id, Attached { generation, sink }) == Attach::First {
            match self.dispatcher.dispatch(OutboundAction::subscribe(channel)) {
                Ok(()) => {
                    table.mark_announced(channel.tag());
                    tracing::info!(tag = %channel.tag(), "Subscribed to stream");
                }
                Err(e) if e.is_not_connected() => {
                    tracing::debug!(
                        tag = %channel.tag(),
                        "Connection not open, subscribe deferred"
                    );
                }
                Err(e) => {
                    table.detach(channel.tag(), id);
                    tracing::warn!(tag = %channel.tag(), error = %e, "Subscribe failed");
                    return Err(e);
                }
            }
        }

        metrics::set_active_tags(table.stats().tag_count);
        Ok(())
    }

    /// Detach a subscriber from a tag.
    pub fn detach(&self, tag: &ChannelTag, id: SubscriberId) {
        let mut table = self.table.lock();

        if let Detach::Last { channel, announced } = table.detach(tag, id) {
            if announced {
                match self.dispatcher.dispatch(OutboundAction::unsubscribe(&channel)) {
                    Ok(()) => tracing::info!(tag = %tag, "Unsubscribed from stream"),
                    Err(e) => tracing::warn!(tag = %tag, error = %e, "Unsubscribe failed"),
                }
            }
            metrics::set_active_tags(table.stats().tag_count);
        }
    }

    /// Deliver an event to every subscriber of the tags it names.
    ///
    /// Returns the number of subscribers reached. Unknown tags are dropped.
    pub fn route(&self, event: &InboundEvent) -> usize {
        let table = self.table.lock();
        let mut delivered = 0;

        for tag in event.routing_tags() {
            for (_, attached) in table.sinks(&tag) {
                if attached.sink.send(Ok(event.clone())).is_ok() {
                    delivered += 1;
                }
            }
        }

        if delivered == 0 {
            tracing::trace!(stream = ?event.stream, "No subscribers for event");
        }

        delivered
    }

    /// Subscribe every tag the server has not been told about yet.
    pub fn announce_pending(&self) {
        let mut table = self.table.lock();

        for channel in table.unannounced() {
            match self.dispatcher.dispatch(OutboundAction::subscribe(&channel)) {
                Ok(()) => {
                    table.mark_announced(channel.tag());
                    tracing::info!(tag = %channel.tag(), "Subscribed to stream");
                }
                Err(e) => {
                    tracing::warn!(tag = %channel.tag(), error = %e, "Deferred subscribe failed");
                }
            }
        }
    }

    /// Handle the connection's `generation`-th closure.
    ///
    /// Terminates every subscription attached before that closure. With
    /// `reason` each receives the error as its last item; without it they
    /// end cleanly. Later subscriptions stay attached and become pending.
    pub fn close(&self, generation: u64, reason: Option<&ClientError>) {
        let mut table = self.table.lock();
        let closed = table.drain_matching(|attached| attached.generation < generation);
        let tag_count = table.stats().tag_count;
        drop(table);

        tracing::debug!(
            generation,
            subscriptions = closed.len(),
            remaining_tags = tag_count,
            abnormal = reason.is_some(),
            "Terminating subscriptions"
        );

        if let Some(error) = reason {
            for attached in &closed {
                let _ = attached.sink.send(Err(error.clone()));
            }
        }

        metrics::set_active_tags(tag_count);
    }

    /// Number of subscribers attached to a tag.
    #[must_use]
    pub fn refcount(&self, tag: &ChannelTag) -> usize {
        self.table.lock().refcount(tag)
    }

    /// Get table statistics.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        self.table.lock().stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockActionDispatcher;
    use crate::domain::action::ActionKind;
    use crate::domain::channel::{ConnectionState, EventPayload};

    fn sink() -> (EventSink, mpsc::UnboundedReceiver<Delivery>) {
        mpsc::unbounded_channel()
    }

    fn event(stream: &[&str], payload: &str) -> InboundEvent {
        InboundEvent {
            stream: stream.iter().map(|s| ChannelTag::from(*s)).collect(),
            event: "update".to_string(),
            payload: Some(EventPayload::Text(payload.to_string())),
        }
    }

    fn accepting(kind: ActionKind, times: usize) -> MockActionDispatcher {
        let mut dispatcher = MockActionDispatcher::new();
        dispatcher
            .expect_dispatch()
            .withf(move |a| a.kind() == kind)
            .times(times)
            .returning(|_| Ok(()));
        dispatcher
    }

    #[test]
    fn first_attach_subscribes_once() {
        let counter = SubscriptionCounter::new(Arc::new(accepting(ActionKind::Subscribe, 1)));
        let channel = Channel::list("42");

        counter.attach(&channel, 1, sink().0).unwrap();
        counter.attach(&channel, 2, sink().0).unwrap();

        assert_eq!(counter.refcount(channel.tag()), 2);
    }

    #[test]
    fn last_detach_unsubscribes_once() {
        let mut dispatcher = MockActionDispatcher::new();
        dispatcher
            .expect_dispatch()
            .withf(|a| a.kind() == ActionKind::Subscribe)
            .times(1)
            .returning(|_| Ok(()));
        dispatcher
            .expect_dispatch()
            .withf(|a| a.kind() == ActionKind::Unsubscribe)
            .times(1)
            .returning(|_| Ok(()));

        let counter = SubscriptionCounter::new(Arc::new(dispatcher));
        let channel = Channel::list("42");

        counter.attach(&channel, 1, sink().0).unwrap();
        counter.attach(&channel, 2, sink().0).unwrap();
        counter.detach(channel.tag(), 1);
        counter.detach(channel.tag(), 2);
        counter.detach(channel.tag(), 2);

        assert_eq!(counter.refcount(channel.tag()), 0);
    }

    #[test]
    fn detach_absent_tag_never_dispatches() {
        let mut dispatcher = MockActionDispatcher::new();
        dispatcher.expect_dispatch().never();

        let counter = SubscriptionCounter::new(Arc::new(dispatcher));
        counter.detach(&ChannelTag::from("public"), 7);
    }

    #[test]
    fn failed_subscribe_rolls_back() {
        let mut dispatcher = MockActionDispatcher::new();
        dispatcher
            .expect_dispatch()
            .times(1)
            .returning(|_| Err(ClientError::Encode("boom".to_string())));

        let counter = SubscriptionCounter::new(Arc::new(dispatcher));
        let channel = Channel::public();

        let err = counter.attach(&channel, 1, sink().0).unwrap_err();
        assert_eq!(err, ClientError::Encode("boom".to_string()));
        assert_eq!(counter.refcount(channel.tag()), 0);
    }

    #[test]
    fn not_connected_defers_subscribe() {
        let mut dispatcher = MockActionDispatcher::new();
        dispatcher.expect_dispatch().times(1).returning(|_| {
            Err(ClientError::NotConnected {
                state: ConnectionState::Disconnected,
            })
        });

        let counter = SubscriptionCounter::new(Arc::new(dispatcher));
        let channel = Channel::public();

        counter.attach(&channel, 1, sink().0).unwrap();
        assert_eq!(counter.refcount(channel.tag()), 1);
        assert_eq!(counter.stats().unannounced_count, 1);

        // Never announced, so the last detach stays local.
        counter.detach(channel.tag(), 1);
        assert_eq!(counter.stats().tag_count, 0);
    }

    #[test]
    fn announce_pending_subscribes_deferred_tags() {
        let mut dispatcher = MockActionDispatcher::new();
        let mut seq = mockall::Sequence::new();
        dispatcher
            .expect_dispatch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Err(ClientError::NotConnected {
                    state: ConnectionState::Connecting,
                })
            });
        dispatcher
            .expect_dispatch()
            .withf(|a| a.kind() == ActionKind::Subscribe)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let counter = SubscriptionCounter::new(Arc::new(dispatcher));
        counter.attach(&Channel::user(), 1, sink().0).unwrap();

        counter.announce_pending();
        assert_eq!(counter.stats().unannounced_count, 0);

        // Nothing left to announce.
        counter.announce_pending();
    }

    #[test]
    fn route_reaches_only_matching_tag() {
        let dispatcher = accepting(ActionKind::Subscribe, 2);
        let counter = SubscriptionCounter::new(Arc::new(dispatcher));

        let (public_tx, mut public_rx) = sink();
        let (user_tx, mut user_rx) = sink();
        counter.attach(&Channel::public(), 1, public_tx).unwrap();
        counter.attach(&Channel::user(), 2, user_tx).unwrap();

        let delivered = counter.route(&event(&["public"], "123"));

        assert_eq!(delivered, 1);
        assert_eq!(public_rx.try_recv().unwrap().unwrap().event, "update");
        assert!(user_rx.try_recv().is_err());
    }

    #[test]
    fn route_reaches_every_listed_tag() {
        let dispatcher = accepting(ActionKind::Subscribe, 2);
        let counter = SubscriptionCounter::new(Arc::new(dispatcher));

        let (a_tx, mut a_rx) = sink();
        let (b_tx, mut b_rx) = sink();
        counter.attach(&Channel::user(), 1, a_tx).unwrap();
        counter.attach(&Channel::user_notification(), 2, b_tx).unwrap();

        let delivered = counter.route(&event(&["user", "user:notification"], "x"));

        assert_eq!(delivered, 2);
        assert!(a_rx.try_recv().is_ok());
        assert!(b_rx.try_recv().is_ok());
    }

    #[test]
    fn route_reaches_parameterised_tag() {
        let dispatcher = accepting(ActionKind::Subscribe, 1);
        let counter = SubscriptionCounter::new(Arc::new(dispatcher));

        let (tx, mut rx) = sink();
        counter.attach(&Channel::list("42"), 1, tx).unwrap();

        assert_eq!(counter.route(&event(&["list", "42"], "x")), 1);
        assert_eq!(counter.route(&event(&["list", "43"], "x")), 0);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn close_with_error_notifies_and_forgets() {
        let dispatcher = accepting(ActionKind::Subscribe, 1);
        let counter = SubscriptionCounter::new(Arc::new(dispatcher));

        let (tx, mut rx) = sink();
        counter.attach(&Channel::public(), 1, tx).unwrap();

        let error = ClientError::Connection("reset".to_string());
        counter.close(1, Some(&error));

        assert_eq!(rx.try_recv().unwrap(), Err(error));
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert_eq!(counter.stats().tag_count, 0);

        // Detach after close is a no-op (mock would reject an unsubscribe).
        counter.detach(Channel::public().tag(), 1);
    }

    #[test]
    fn close_without_error_ends_cleanly() {
        let dispatcher = accepting(ActionKind::Subscribe, 1);
        let counter = SubscriptionCounter::new(Arc::new(dispatcher));

        let (tx, mut rx) = sink();
        counter.attach(&Channel::public(), 1, tx).unwrap();
        counter.close(1, None);

        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn close_spares_subscribers_attached_after_it() {
        let mut dispatcher = MockActionDispatcher::new();
        dispatcher
            .expect_dispatch()
            .withf(|a| a.kind() == ActionKind::Subscribe)
            .returning(|_| {
                Err(ClientError::NotConnected {
                    state: ConnectionState::Closed,
                })
            });

        let closures = Arc::new(AtomicU64::new(0));
        let source = Arc::clone(&closures);
        let counter = SubscriptionCounter::new(Arc::new(dispatcher))
            .with_generation(move || source.load(Ordering::SeqCst));

        let (old_tx, mut old_rx) = sink();
        counter.attach(&Channel::public(), 1, old_tx).unwrap();

        // The connection closes; a new subscriber attaches before the
        // closure is handled.
        closures.store(1, Ordering::SeqCst);
        let (new_tx, mut new_rx) = sink();
        counter.attach(&Channel::public(), 2, new_tx).unwrap();
        counter.attach(&Channel::user(), 3, sink().0).unwrap();

        counter.close(1, None);

        assert!(matches!(
            old_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert!(matches!(new_rx.try_recv(), Err(mpsc::error::TryRecvError::Empty)));
        assert_eq!(counter.refcount(Channel::public().tag()), 1);
        assert_eq!(counter.stats().unannounced_count, 2);
    }

    #[test]
    fn subscriber_ids_are_unique() {
        let counter = SubscriptionCounter::new(Arc::new(MockActionDispatcher::new()));
        let a = counter.next_subscriber_id();
        let b = counter.next_subscriber_id();
        assert_ne!(a, b);
    }
}
