mod blocked;
mod group;
mod id;

pub use blocked::ReadResult;
pub(crate) use blocked::Blocked;
pub use group::{
    Consumer, ConsumerGroup, ConsumerInfo, GroupInfo, PendingDetail, PendingEntry, PendingSummary,
};
pub use id::StreamId;

use crate::StoreError;
use bytes::Bytes;
use hashbrown::HashMap;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::ops::Bound;

/// How XADD and XTRIM cap a stream's length.
#[derive(Clone, Copy, Debug)]
pub struct TrimStrategy {
    pub max_len: u64,

    /// Trim to exactly `max_len`. When false, trimming overshoots by a
    /// small slack so repeated appends don't trim every time.
    pub exact: bool,
}

/// One entry: an id plus field/value pairs in insertion order.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamEntry {
    pub id: StreamId,
    pub fields: IndexMap<Bytes, Bytes>,
}

/// Point-in-time summary for XINFO STREAM.
#[derive(Clone, Debug)]
pub struct StreamInfo {
    pub length: usize,
    pub last_id: StreamId,
    pub first_id: Option<StreamId>,
    pub groups: usize,
    pub max_len: Option<u64>,
}

/// An append-only log of entries with strictly increasing ids, plus the
/// consumer groups reading it. Lives behind a per-stream lock; the
/// operations and locking order are in `db::stream`.
#[derive(Debug, Default)]
pub struct Stream {
    entries: BTreeMap<StreamId, StreamEntry>,
    last_id: StreamId,
    groups: HashMap<Bytes, ConsumerGroup>,
    max_len: Option<u64>,
    trim_exact: bool,
}

impl Stream {
    /// Append an entry. `id` of `None` auto-generates from the clock and
    /// the current top id; an explicit id must be strictly greater than
    /// the top id.
    pub fn append(
        &mut self,
        id: Option<StreamId>,
        fields: IndexMap<Bytes, Bytes>,
        now_ms: u64,
    ) -> Result<StreamId, StoreError> {
        let id = match id {
            Some(id) if id <= self.last_id => return Err(StoreError::IdTooSmall),
            Some(id) => id,
            None => StreamId::generate(self.last_id, now_ms),
        };
        self.entries.insert(id, StreamEntry { id, fields });
        self.last_id = id;
        Ok(id)
    }

    /// Apply a length cap, remembering it for XINFO. Returns the number
    /// of entries removed from the head.
    pub fn apply_cap(&mut self, cap: TrimStrategy, slack: f64) -> u64 {
        self.max_len = Some(cap.max_len);
        self.trim_exact = cap.exact;

        if cap.max_len == 0 || self.entries.len() as u64 <= cap.max_len {
            return 0;
        }

        let target = if cap.exact {
            cap.max_len
        } else {
            // Overshoot so the next few appends don't trim at all.
            #[expect(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let extra = (cap.max_len as f64 * slack) as u64;
            cap.max_len.saturating_sub(extra)
        };
        self.trim_to(target)
    }

    fn trim_to(&mut self, target: u64) -> u64 {
        let mut removed = 0;
        while self.entries.len() as u64 > target {
            if self.entries.pop_first().is_none() {
                break;
            }
            removed += 1;
        }
        removed
    }

    /// Entries with `start <= id <= end`, ascending, truncated to `count`.
    pub fn range(
        &self,
        start: StreamId,
        end: StreamId,
        count: Option<usize>,
    ) -> Vec<StreamEntry> {
        self.entries
            .range(start..=end)
            .take(count.unwrap_or(usize::MAX))
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    /// Entries with `start <= id <= end`, descending, truncated to `count`.
    pub fn rev_range(
        &self,
        start: StreamId,
        end: StreamId,
        count: Option<usize>,
    ) -> Vec<StreamEntry> {
        self.entries
            .range(start..=end)
            .rev()
            .take(count.unwrap_or(usize::MAX))
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    /// Entries with id strictly greater than `after`, ascending.
    pub fn entries_after(&self, after: StreamId, count: Option<usize>) -> Vec<StreamEntry> {
        self.entries
            .range((Bound::Excluded(after), Bound::Unbounded))
            .take(count.unwrap_or(usize::MAX))
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    pub fn get(&self, id: StreamId) -> Option<&StreamEntry> {
        self.entries.get(&id)
    }

    /// Remove matching ids. Pending-entries lists are left alone; an
    /// unacknowledged deleted entry stays pending until acked.
    pub fn delete(&mut self, ids: &[StreamId]) -> usize {
        ids.iter()
            .filter(|id| self.entries.remove(id).is_some())
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_id(&self) -> StreamId {
        self.last_id
    }

    pub fn first_id(&self) -> Option<StreamId> {
        self.entries.keys().next().copied()
    }

    /// Create a group. `last_delivered_id` of [`StreamId::MAX`] means
    /// "the current tail".
    pub fn create_group(&mut self, name: Bytes, id: StreamId) -> Result<(), StoreError> {
        if self.groups.contains_key(&name) {
            return Err(StoreError::BusyGroup);
        }
        let id = if id == StreamId::MAX { self.last_id } else { id };
        self.groups
            .insert(name.clone(), ConsumerGroup::new(name, id));
        Ok(())
    }

    pub fn destroy_group(&mut self, name: &Bytes) -> bool {
        self.groups.remove(name).is_some()
    }

    pub fn group(&self, name: &Bytes) -> Option<&ConsumerGroup> {
        self.groups.get(name)
    }

    pub fn group_mut(&mut self, name: &Bytes) -> Option<&mut ConsumerGroup> {
        self.groups.get_mut(name)
    }

    pub fn groups(&self) -> impl Iterator<Item = &ConsumerGroup> {
        self.groups.values()
    }

    pub fn has_groups(&self) -> bool {
        !self.groups.is_empty()
    }

    /// Deliver entries past the group's cursor to `consumer`, advancing
    /// the cursor and (without `noack`) recording them as pending.
    /// `None` when the group does not exist.
    pub fn deliver_new(
        &mut self,
        group: &Bytes,
        consumer: &Bytes,
        count: Option<usize>,
        noack: bool,
        now_ms: u64,
    ) -> Option<Vec<StreamEntry>> {
        let last = self.groups.get(group)?.last_delivered_id;
        let entries: Vec<StreamEntry> = self
            .entries
            .range((Bound::Excluded(last), Bound::Unbounded))
            .take(count.unwrap_or(usize::MAX))
            .map(|(_, entry)| entry.clone())
            .collect();

        let group = self.groups.get_mut(group)?;
        group.consumer(consumer, now_ms);
        for entry in &entries {
            group.record_delivery(consumer, entry.id, now_ms, noack);
        }
        Some(entries)
    }

    /// Re-deliver `consumer`'s own pending entries with ids past
    /// `after`, bumping their delivery counts. The group cursor does
    /// not move. Entries deleted from the log come back with no fields.
    /// `None` when the group does not exist.
    pub fn deliver_pending(
        &mut self,
        group: &Bytes,
        consumer: &Bytes,
        after: StreamId,
        count: Option<usize>,
        now_ms: u64,
    ) -> Option<Vec<StreamEntry>> {
        let group = self.groups.get_mut(group)?;
        group.consumer(consumer, now_ms);
        let ids: Vec<StreamId> = group
            .pending_for(consumer, after)
            .into_iter()
            .take(count.unwrap_or(usize::MAX))
            .collect();
        for id in &ids {
            group.record_redelivery(*id, now_ms);
        }

        Some(
            ids.into_iter()
                .map(|id| {
                    self.entries.get(&id).cloned().unwrap_or(StreamEntry {
                        id,
                        fields: IndexMap::new(),
                    })
                })
                .collect(),
        )
    }

    pub fn info(&self) -> StreamInfo {
        StreamInfo {
            length: self.entries.len(),
            last_id: self.last_id,
            first_id: self.first_id(),
            groups: self.groups.len(),
            max_len: self.max_len,
        }
    }
}
