//! Subscription Reference Counting
//!
//! Bookkeeping of which channel tags are subscribed and which subscribers
//! are attached to each of them.
//!
//! # Design
//!
//! The table tracks:
//! - Which subscribers are attached to each tag (the reference count is the
//!   number of attached subscribers)
//! - Whether the server has been told about the tag (`announced`)
//! - One sink per subscriber, used by the router to deliver events
//!
//! This allows multiple subscribers to share a tag while the server sees
//! exactly one subscribe on the first attach and one unsubscribe on the
//! last detach. Detaching an unknown subscriber is a no-op, which makes
//! double-dispose harmless.

use std::collections::HashMap;

use super::channel::{Channel, ChannelTag};

// =============================================================================
// Types
// =============================================================================

/// Unique identifier of one subscription within a client.
pub type SubscriberId = u64;

/// Outcome of attaching a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attach {
    /// The tag went 0→1; the server must be told.
    First,
    /// The tag was already subscribed.
    Additional,
    /// The subscriber was already attached to the tag.
    Duplicate,
}

/// Outcome of detaching a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum Detach {
    /// The tag went 1→0 and its entry was removed.
    Last {
        /// Channel of the removed entry.
        channel: Channel,
        /// Whether the server had been told about the tag.
        announced: bool,
    },
    /// Other subscribers remain attached.
    Remaining(usize),
    /// The subscriber was not attached (unknown tag or already detached).
    Absent,
}

/// Per-tag state.
#[derive(Debug)]
struct TagEntry<S> {
    channel: Channel,
    subscribers: HashMap<SubscriberId, S>,
    announced: bool,
}

// =============================================================================
// Subscription Table
// =============================================================================

/// Reference-count table keyed by channel tag.
///
/// `S` is the per-subscriber sink the router pushes events into.
///
/// # Example
///
/// ```rust
/// use masto_stream::domain::channel::Channel;
/// use masto_stream::domain::subscription::{Attach, Detach, SubscriptionTable};
///
/// let mut table = SubscriptionTable::<()>::new();
/// let channel = Channel::list("42");
///
/// assert_eq!(table.attach(&channel, 1, ()), Attach::First);
/// assert_eq!(table.attach(&channel, 2, ()), Attach::Additional);
///
/// assert_eq!(table.detach(channel.tag(), 1), Detach::Remaining(1));
/// assert!(matches!(table.detach(channel.tag(), 2), Detach::Last { .. }));
/// assert_eq!(table.detach(channel.tag(), 2), Detach::Absent);
/// ```
#[derive(Debug)]
pub struct SubscriptionTable<S> {
    entries: HashMap<ChannelTag, TagEntry<S>>,
}

impl<S> Default for SubscriptionTable<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> SubscriptionTable<S> {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Attach a subscriber to a channel.
    pub fn attach(&mut self, channel: &Channel, id: SubscriberId, sink: S) -> Attach {
        let entry = self
            .entries
            .entry(channel.tag().clone())
            .or_insert_with(|| TagEntry {
                channel: channel.clone(),
                subscribers: HashMap::new(),
                announced: false,
            });

        if entry.subscribers.contains_key(&id) {
            return Attach::Duplicate;
        }

        entry.subscribers.insert(id, sink);

        if entry.subscribers.len() == 1 {
            Attach::First
        } else {
            Attach::Additional
        }
    }

    /// Detach a subscriber from a tag.
    pub fn detach(&mut self, tag: &ChannelTag, id: SubscriberId) -> Detach {
        let Some(entry) = self.entries.get_mut(tag) else {
            return Detach::Absent;
        };

        if entry.subscribers.remove(&id).is_none() {
            return Detach::Absent;
        }

        if !entry.subscribers.is_empty() {
            return Detach::Remaining(entry.subscribers.len());
        }

        match self.entries.remove(tag) {
            Some(entry) => Detach::Last {
                channel: entry.channel,
                announced: entry.announced,
            },
            None => Detach::Absent,
        }
    }

    /// Record that the server has been told about a tag.
    pub fn mark_announced(&mut self, tag: &ChannelTag) {
        if let Some(entry) = self.entries.get_mut(tag) {
            entry.announced = true;
        }
    }

    /// Channels with attached subscribers the server has not been told about.
    #[must_use]
    pub fn unannounced(&self) -> Vec<Channel> {
        self.entries
            .values()
            .filter(|e| !e.announced)
            .map(|e| e.channel.clone())
            .collect()
    }

    /// Sinks of every subscriber attached to a tag.
    pub fn sinks(&self, tag: &ChannelTag) -> impl Iterator<Item = (SubscriberId, &S)> {
        self.entries
            .get(tag)
            .into_iter()
            .flat_map(|e| e.subscribers.iter().map(|(id, sink)| (*id, sink)))
    }

    /// Remove the subscribers whose sink matches `take`, returning their
    /// sinks.
    ///
    /// Entries left without subscribers are removed. The server forgets
    /// every subscription when the connection closes, so surviving entries
    /// are marked unannounced.
    pub fn drain_matching(&mut self, mut take: impl FnMut(&S) -> bool) -> Vec<S> {
        let mut drained = Vec::new();

        self.entries.retain(|_, entry| {
            let ids: Vec<SubscriberId> = entry
                .subscribers
                .iter()
                .filter(|&(_, sink)| take(sink))
                .map(|(id, _)| *id)
                .collect();

            drained.extend(ids.iter().filter_map(|id| entry.subscribers.remove(id)));
            entry.announced = false;
            !entry.subscribers.is_empty()
        });

        drained
    }

    /// Number of subscribers attached to a tag.
    #[must_use]
    pub fn refcount(&self, tag: &ChannelTag) -> usize {
        self.entries.get(tag).map_or(0, |e| e.subscribers.len())
    }

    /// Get table statistics.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        SubscriptionStats {
            tag_count: self.entries.len(),
            subscriber_count: self.entries.values().map(|e| e.subscribers.len()).sum(),
            unannounced_count: self.entries.values().filter(|e| !e.announced).count(),
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Table statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionStats {
    /// Number of distinct tags.
    pub tag_count: usize,
    /// Number of attached subscribers across all tags.
    pub subscriber_count: usize,
    /// Number of tags not yet announced to the server.
    pub unannounced_count: usize,
}

// =============================================================================
// Tests
// =============================================================================
