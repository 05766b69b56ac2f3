use crate::stream::StreamId;
use bytes::Bytes;
use hashbrown::HashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// One named consumer inside a group.
#[derive(Clone, Debug)]
pub struct Consumer {
    pub name: Bytes,

    /// When the consumer last read or was created, in epoch milliseconds.
    pub seen_ms: u64,

    /// The ids this consumer has been delivered but not yet acknowledged.
    pub pending: BTreeSet<StreamId>,
}

/// A delivered-but-unacknowledged entry.
#[derive(Clone, Debug)]
pub struct PendingEntry {
    /// The consumer the entry was last delivered to.
    pub consumer: Bytes,

    /// When the entry was last delivered, in epoch milliseconds.
    pub delivered_ms: u64,

    /// How many times the entry has been delivered.
    pub delivery_count: u64,
}

/// Aggregate view of a group's pending entries.
#[derive(Clone, Debug, Default)]
pub struct PendingSummary {
    pub count: usize,
    pub smallest: Option<StreamId>,
    pub greatest: Option<StreamId>,

    /// Pending counts per consumer, for consumers that have any.
    pub consumers: Vec<(Bytes, usize)>,
}

/// One row of a detailed XPENDING reply.
#[derive(Clone, Debug)]
pub struct PendingDetail {
    pub id: StreamId,
    pub consumer: Bytes,
    pub idle_ms: u64,
    pub delivery_count: u64,
}

/// Summary row for XINFO GROUPS.
#[derive(Clone, Debug)]
pub struct GroupInfo {
    pub name: Bytes,
    pub consumers: usize,
    pub pending: usize,
    pub last_delivered_id: StreamId,
}

/// Summary row for XINFO CONSUMERS.
#[derive(Clone, Debug)]
pub struct ConsumerInfo {
    pub name: Bytes,
    pub pending: usize,
    pub idle_ms: u64,
}

/// A consumer group: a delivery cursor over the stream plus the pending
/// entries list for deliveries that have not been acknowledged.
#[derive(Clone, Debug)]
pub struct ConsumerGroup {
    pub name: Bytes,
    pub last_delivered_id: StreamId,
    consumers: HashMap<Bytes, Consumer>,
    pending: BTreeMap<StreamId, PendingEntry>,
}

impl ConsumerGroup {
    pub fn new(name: Bytes, last_delivered_id: StreamId) -> Self {
        ConsumerGroup {
            name,
            last_delivered_id,
            consumers: HashMap::new(),
            pending: BTreeMap::new(),
        }
    }

    /// Look up a consumer, creating it if this is the first time the
    /// name is seen. Touches its last-seen time either way.
    pub fn consumer(&mut self, name: &Bytes, now_ms: u64) -> &mut Consumer {
        let consumer = self
            .consumers
            .entry(name.clone())
            .or_insert_with(|| Consumer {
                name: name.clone(),
                seen_ms: now_ms,
                pending: BTreeSet::new(),
            });
        consumer.seen_ms = now_ms;
        consumer
    }

    /// Record a delivery of `id` to `consumer` and advance the delivery
    /// cursor. Used for new-message (`>`) reads.
    pub fn record_delivery(&mut self, consumer: &Bytes, id: StreamId, now_ms: u64, noack: bool) {
        if !noack {
            self.pending.insert(
                id,
                PendingEntry {
                    consumer: consumer.clone(),
                    delivered_ms: now_ms,
                    delivery_count: 1,
                },
            );
            self.consumer(consumer, now_ms).pending.insert(id);
        }
        if id > self.last_delivered_id {
            self.last_delivered_id = id;
        }
    }

    /// The ids pending for `consumer` that are strictly greater than
    /// `after`, oldest first.
    pub fn pending_for(&self, consumer: &Bytes, after: StreamId) -> Vec<StreamId> {
        self.consumers
            .get(consumer)
            .map(|consumer| {
                consumer
                    .pending
                    .range((Bound::Excluded(after), Bound::Unbounded))
                    .copied()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Mark a pending entry as redelivered to its consumer.
    pub fn record_redelivery(&mut self, id: StreamId, now_ms: u64) {
        if let Some(entry) = self.pending.get_mut(&id) {
            entry.delivered_ms = now_ms;
            entry.delivery_count += 1;
        }
    }

    /// Acknowledge `ids`, returning how many pending entries were
    /// actually removed.
    pub fn ack(&mut self, ids: &[StreamId]) -> usize {
        let mut count = 0;
        for id in ids {
            if let Some(entry) = self.pending.remove(id) {
                count += 1;
                if let Some(consumer) = self.consumers.get_mut(&entry.consumer) {
                    consumer.pending.remove(id);
                }
            }
        }
        count
    }

    /// Remove a consumer, discarding its pending entries. Returns the
    /// number of entries discarded.
    pub fn remove_consumer(&mut self, name: &Bytes) -> usize {
        let Some(consumer) = self.consumers.remove(name) else {
            return 0;
        };
        for id in &consumer.pending {
            self.pending.remove(id);
        }
        consumer.pending.len()
    }

    pub fn set_id(&mut self, id: StreamId) {
        self.last_delivered_id = id;
    }

    pub fn consumers(&self) -> impl Iterator<Item = &Consumer> {
        self.consumers.values()
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn summary(&self) -> PendingSummary {
        let mut consumers: Vec<(Bytes, usize)> = self
            .consumers
            .values()
            .filter(|consumer| !consumer.pending.is_empty())
            .map(|consumer| (consumer.name.clone(), consumer.pending.len()))
            .collect();
        consumers.sort_by(|a, b| a.0.cmp(&b.0));

        PendingSummary {
            count: self.pending.len(),
            smallest: self.pending.keys().next().copied(),
            greatest: self.pending.keys().next_back().copied(),
            consumers,
        }
    }

    /// Detailed pending rows in `[start, end]`, optionally filtered to a
    /// single consumer and truncated to `count`.
    pub fn detail(
        &self,
        start: StreamId,
        end: StreamId,
        count: usize,
        consumer: Option<&Bytes>,
        now_ms: u64,
    ) -> Vec<PendingDetail> {
        self.pending
            .range(start..=end)
            .filter(|(_, entry)| consumer.is_none_or(|name| entry.consumer == *name))
            .take(count)
            .map(|(id, entry)| PendingDetail {
                id: *id,
                consumer: entry.consumer.clone(),
                idle_ms: now_ms.saturating_sub(entry.delivered_ms),
                delivery_count: entry.delivery_count,
            })
            .collect()
    }

    pub fn info(&self) -> GroupInfo {
        GroupInfo {
            name: self.name.clone(),
            consumers: self.consumers.len(),
            pending: self.pending.len(),
            last_delivered_id: self.last_delivered_id,
        }
    }

    pub fn consumer_infos(&self, now_ms: u64) -> Vec<ConsumerInfo> {
        let mut infos: Vec<ConsumerInfo> = self
            .consumers
            .values()
            .map(|consumer| ConsumerInfo {
                name: consumer.name.clone(),
                pending: consumer.pending.len(),
                idle_ms: now_ms.saturating_sub(consumer.seen_ms),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }
}
