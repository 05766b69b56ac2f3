use crate::connection::{
    ConnectionHandle, ConnectionId, MetaValue, PATTERN_SUBS, PUBSUB_MODE, SUBSCRIPTIONS,
};
use crate::{Frame, glob};
use bytes::Bytes;
use hashbrown::{HashMap, HashSet};
use parking_lot::{Mutex, RwLock};
use std::time::Duration;
use triomphe::Arc;

type Handle = Arc<ConnectionHandle>;

/// The subscribers of one channel or one pattern.
#[derive(Debug, Default)]
struct Channel {
    subscribers: HashMap<ConnectionId, Handle>,
}

/// Everything one connection is subscribed to. The handle is borrowed
/// state: the hub looks it up and writes metadata through it, but the
/// connection's owner controls its lifecycle and must call
/// [`Pubsub::remove_connection`] on close.
#[derive(Debug)]
struct Subscription {
    handle: Handle,
    channels: HashSet<Bytes>,
    patterns: HashSet<Bytes>,
}

impl Subscription {
    fn count(&self) -> usize {
        self.channels.len() + self.patterns.len()
    }

    /// Mirror the subscription state into the connection's metadata.
    fn sync_metadata(&self) {
        self.handle
            .set_meta(PUBSUB_MODE, MetaValue::Bool(self.count() > 0));
        self.handle.set_meta(
            SUBSCRIPTIONS,
            MetaValue::Names(self.channels.iter().cloned().collect()),
        );
        self.handle.set_meta(
            PATTERN_SUBS,
            MetaValue::Names(self.patterns.iter().cloned().collect()),
        );
    }
}

/// The three registry maps. They stay mutually consistent: a connection
/// appears in a channel's subscriber map iff the channel appears in the
/// connection's record, and empty records are dropped on both sides.
#[derive(Default)]
struct Registry {
    channels: HashMap<Bytes, Arc<Mutex<Channel>>>,
    patterns: HashMap<Bytes, Arc<Mutex<Channel>>>,
    connections: HashMap<ConnectionId, Arc<Mutex<Subscription>>>,
}

/// Keeps track of channel and pattern subscriptions and fans published
/// messages out to subscribers on background tasks. The registry is
/// shared with those tasks so a dead subscriber can be dropped from it
/// after the publisher has moved on.
pub struct Pubsub {
    /// Outer lock; the per-channel and per-connection mutexes nest
    /// inside it.
    registry: Arc<RwLock<Registry>>,
    delivery_deadline: Duration,
}

impl Default for Pubsub {
    fn default() -> Self {
        Pubsub::new(Duration::from_secs(5))
    }
}

impl Pubsub {
    pub fn new(delivery_deadline: Duration) -> Self {
        Pubsub {
            registry: Arc::new(RwLock::new(Registry::default())),
            delivery_deadline,
        }
    }

    /// Subscribe a connection to a channel. Returns its total
    /// subscription count afterwards.
    pub fn subscribe(&self, handle: &Handle, channel: Bytes) -> usize {
        self.add(handle, channel, false)
    }

    /// Subscribe a connection to a glob pattern.
    pub fn psubscribe(&self, handle: &Handle, pattern: Bytes) -> usize {
        self.add(handle, pattern, true)
    }

    fn add(&self, handle: &Handle, name: Bytes, pattern: bool) -> usize {
        let mut registry = self.registry.write();
        let channels = if pattern {
            &mut registry.patterns
        } else {
            &mut registry.channels
        };
        channels
            .entry(name.clone())
            .or_default()
            .lock()
            .subscribers
            .insert(handle.id.clone(), handle.clone());

        let subscription = registry
            .connections
            .entry(handle.id.clone())
            .or_insert_with(|| {
                Arc::new(Mutex::new(Subscription {
                    handle: handle.clone(),
                    channels: HashSet::new(),
                    patterns: HashSet::new(),
                }))
            });
        let mut subscription = subscription.lock();
        if pattern {
            subscription.patterns.insert(name);
        } else {
            subscription.channels.insert(name);
        }
        subscription.sync_metadata();
        subscription.count()
    }

    /// Unsubscribe a connection from a channel. Returns its remaining
    /// subscription count.
    pub fn unsubscribe(&self, conn: &ConnectionId, channel: &Bytes) -> usize {
        self.remove(conn, channel, false)
    }

    pub fn punsubscribe(&self, conn: &ConnectionId, pattern: &Bytes) -> usize {
        self.remove(conn, pattern, true)
    }

    fn remove(&self, conn: &ConnectionId, name: &Bytes, pattern: bool) -> usize {
        let mut registry = self.registry.write();
        let channels = if pattern {
            &mut registry.patterns
        } else {
            &mut registry.channels
        };
        if let Some(channel) = channels.get(name) {
            let mut guard = channel.lock();
            guard.subscribers.remove(conn);
            let empty = guard.subscribers.is_empty();
            drop(guard);
            if empty {
                channels.remove(name);
            }
        }

        let Some(subscription) = registry.connections.get(conn) else {
            return 0;
        };
        let mut guard = subscription.lock();
        if pattern {
            guard.patterns.remove(name);
        } else {
            guard.channels.remove(name);
        }
        guard.sync_metadata();
        let remaining = guard.count();
        drop(guard);
        if remaining == 0 {
            registry.connections.remove(conn);
        }
        remaining
    }

    /// Drop every subscription a connection holds. Idempotent; called
    /// on delivery failure and by the connection owner on close.
    pub fn remove_connection(&self, conn: &ConnectionId) {
        remove_connection_from(&self.registry, conn);
    }

    /// Publish to direct subscribers of `channel` and to subscribers of
    /// every matching pattern. Each delivery runs on its own task with
    /// a write deadline; a failed or late delivery unsubscribes that
    /// connection everywhere. The publisher does not wait for
    /// deliveries. Returns the number of deliveries started. Must be
    /// called inside a tokio runtime.
    pub fn publish(&self, channel: &Bytes, message: &Bytes) -> usize {
        let mut deliveries: Vec<(Handle, Frame)> = Vec::new();
        {
            let registry = self.registry.read();
            if let Some(direct) = registry.channels.get(channel) {
                for handle in direct.lock().subscribers.values() {
                    let frame = Frame::Push(vec![
                        Frame::Bulk(Bytes::from_static(b"message")),
                        Frame::Bulk(channel.clone()),
                        Frame::Bulk(message.clone()),
                    ]);
                    deliveries.push((handle.clone(), frame));
                }
            }
            for (pattern, subscribers) in &registry.patterns {
                if !glob::matches(channel, pattern) {
                    continue;
                }
                for handle in subscribers.lock().subscribers.values() {
                    let frame = Frame::Push(vec![
                        Frame::Bulk(Bytes::from_static(b"pmessage")),
                        Frame::Bulk(pattern.clone()),
                        Frame::Bulk(channel.clone()),
                        Frame::Bulk(message.clone()),
                    ]);
                    deliveries.push((handle.clone(), frame));
                }
            }
        }

        let count = deliveries.len();
        for (handle, frame) in deliveries {
            let registry = self.registry.clone();
            let deadline = self.delivery_deadline;
            tokio::spawn(async move {
                let writer = handle.writer();
                match tokio::time::timeout(deadline, writer.send(frame)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => {
                        tracing::warn!(client = %handle.id, "pubsub delivery failed, unsubscribing");
                        remove_connection_from(&registry, &handle.id);
                    }
                    Err(_) => {
                        tracing::warn!(client = %handle.id, "pubsub delivery timed out, unsubscribing");
                        remove_connection_from(&registry, &handle.id);
                    }
                }
            });
        }
        count
    }

    /// Channels with at least one subscriber.
    pub fn channels(&self) -> Vec<Bytes> {
        self.registry.read().channels.keys().cloned().collect()
    }

    /// The number of direct subscribers of `channel`.
    pub fn numsub(&self, channel: &[u8]) -> usize {
        self.registry
            .read()
            .channels
            .get(channel)
            .map_or(0, |channel| channel.lock().subscribers.len())
    }

    /// The number of patterns with at least one subscriber.
    pub fn numpat(&self) -> usize {
        self.registry.read().patterns.len()
    }
}

fn remove_connection_from(registry: &RwLock<Registry>, conn: &ConnectionId) {
    let mut registry = registry.write();
    let Some(subscription) = registry.connections.remove(conn) else {
        return;
    };
    let subscription = subscription.lock();
    for name in &subscription.channels {
        if let Some(channel) = registry.channels.get(name) {
            let mut guard = channel.lock();
            guard.subscribers.remove(conn);
            let empty = guard.subscribers.is_empty();
            drop(guard);
            if empty {
                registry.channels.remove(name);
            }
        }
    }
    for name in &subscription.patterns {
        if let Some(channel) = registry.patterns.get(name) {
            let mut guard = channel.lock();
            guard.subscribers.remove(conn);
            let empty = guard.subscribers.is_empty();
            drop(guard);
            if empty {
                registry.patterns.remove(name);
            }
        }
    }
    subscription
        .handle
        .set_meta(PUBSUB_MODE, MetaValue::Bool(false));
    subscription
        .handle
        .set_meta(SUBSCRIPTIONS, MetaValue::Names(Vec::new()));
    subscription
        .handle
        .set_meta(PATTERN_SUBS, MetaValue::Names(Vec::new()));
}
