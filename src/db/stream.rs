use crate::connection::ConnectionId;
use crate::db::Db;
use crate::stream::{
    ConsumerInfo, GroupInfo, PendingDetail, PendingSummary, ReadResult, Stream, StreamEntry,
    StreamId, StreamInfo, TrimStrategy,
};
use crate::{StoreError, now_ms};
use bytes::Bytes;
use indexmap::IndexMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

impl Db {
    /// Append an entry, apply any length cap and wake blocked readers.
    /// Returns the id of the new entry.
    pub fn xadd(
        &self,
        key: &Bytes,
        id: Option<StreamId>,
        fields: IndexMap<Bytes, Bytes>,
        cap: Option<TrimStrategy>,
    ) -> Result<StreamId, StoreError> {
        if fields.is_empty() {
            return Err(StoreError::Syntax);
        }

        let now = now_ms();
        let mut inner = self.write();
        let shared = inner.stream_or_default(key, now)?;
        let mut stream = shared.lock();
        // The map insert is done; readers of other keys can proceed
        // while we append under the per-stream lock.
        drop(inner);

        let id = stream.append(id, fields, now)?;
        if let Some(cap) = cap {
            stream.apply_cap(cap, self.config.trim_slack);
        }
        if let Some(entry) = stream.get(id).cloned() {
            self.notify_blocked_readers(key, &entry, &mut stream, now);
        }
        Ok(id)
    }

    pub fn xlen(&self, key: &[u8]) -> Result<usize, StoreError> {
        let inner = self.read();
        let Some(shared) = inner.get_stream(key, now_ms())? else {
            return Ok(0);
        };
        let len = shared.lock().len();
        Ok(len)
    }

    /// Entries with `start <= id <= end`, ascending.
    pub fn xrange(
        &self,
        key: &[u8],
        start: StreamId,
        end: StreamId,
        count: Option<usize>,
    ) -> Result<Vec<StreamEntry>, StoreError> {
        let inner = self.read();
        let Some(shared) = inner.get_stream(key, now_ms())? else {
            return Ok(Vec::new());
        };
        let entries = shared.lock().range(start, end, count);
        Ok(entries)
    }

    /// Entries with `start <= id <= end`, descending.
    pub fn xrevrange(
        &self,
        key: &[u8],
        end: StreamId,
        start: StreamId,
        count: Option<usize>,
    ) -> Result<Vec<StreamEntry>, StoreError> {
        let inner = self.read();
        let Some(shared) = inner.get_stream(key, now_ms())? else {
            return Ok(Vec::new());
        };
        let entries = shared.lock().rev_range(start, end, count);
        Ok(entries)
    }

    /// Remove entries by id, returning how many existed. Pending-entry
    /// lists keep any reference to a deleted id until it is acked.
    pub fn xdel(&self, key: &[u8], ids: &[StreamId]) -> Result<usize, StoreError> {
        let now = now_ms();
        let mut inner = self.write();
        let Some(shared) = inner.get_stream(key, now)? else {
            return Ok(0);
        };
        let mut stream = shared.lock();
        let removed = stream.delete(ids);
        let prunable = stream.is_empty() && !stream.has_groups();
        drop(stream);
        if prunable {
            inner.remove(key, now);
        }
        Ok(removed)
    }

    /// Cap the stream's length immediately. Returns the number of
    /// entries removed.
    pub fn xtrim(&self, key: &[u8], cap: TrimStrategy) -> Result<u64, StoreError> {
        let now = now_ms();
        let mut inner = self.write();
        let Some(shared) = inner.get_stream(key, now)? else {
            return Ok(0);
        };
        let mut stream = shared.lock();
        let removed = stream.apply_cap(cap, self.config.trim_slack);
        let prunable = stream.is_empty() && !stream.has_groups();
        drop(stream);
        if prunable {
            inner.remove(key, now);
        }
        Ok(removed)
    }

    /// Read entries past a per-stream id from each of `streams`, where
    /// [`StreamId::MAX`] means "whatever is appended after this call"
    /// (`$`). With `block`, an empty read parks until an append, the
    /// timeout (zero blocks forever), or cancellation; the woken reader
    /// receives exactly the entry that woke it.
    pub async fn xread(
        &self,
        conn: &ConnectionId,
        streams: Vec<(Bytes, StreamId)>,
        count: Option<usize>,
        block: Option<Duration>,
    ) -> Result<ReadResult, StoreError> {
        let now = now_ms();
        let (result, resolved) = self.read_attempt(&streams, count, now)?;
        if !result.is_empty() || block.is_none() {
            return Ok(result);
        }

        let (sender, receiver) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let token = self
            .blocked
            .lock()
            .park(resolved.clone(), conn, count, &sender, &cancel, now);
        tracing::debug!(client = %conn, streams = resolved.len(), "xread parked");

        // An append may have landed between the first attempt and
        // parking; a second look closes the window.
        let result = match self.read_attempt(&resolved, count, now) {
            Ok((result, _)) => result,
            Err(error) => {
                self.blocked.lock().unpark(token);
                return Err(error);
            }
        };
        if !result.is_empty() {
            self.blocked.lock().unpark(token);
            return Ok(result);
        }

        let result = self.await_wakeup(receiver, cancel, block.unwrap_or_default()).await;
        self.blocked.lock().unpark(token);
        Ok(result)
    }

    /// Read for `consumer` in `group` from each of `streams`.
    /// [`StreamId::MAX`] (`>`) delivers new entries and records them as
    /// pending; any other id re-reads the consumer's own pending
    /// entries after that id. Blocking behaves as in [`Db::xread`].
    #[expect(clippy::too_many_arguments)]
    pub async fn xreadgroup(
        &self,
        conn: &ConnectionId,
        group: &Bytes,
        consumer: &Bytes,
        streams: Vec<(Bytes, StreamId)>,
        count: Option<usize>,
        block: Option<Duration>,
        noack: bool,
    ) -> Result<ReadResult, StoreError> {
        let now = now_ms();
        let result = self.group_read_attempt(group, consumer, &streams, count, noack, now)?;
        if !result.is_empty() || block.is_none() {
            return Ok(result);
        }

        let keys: Vec<Bytes> = streams.iter().map(|(key, _)| key.clone()).collect();
        let (sender, receiver) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let token = self.blocked.lock().park_group(
            keys, group, consumer, noack, conn, count, &sender, &cancel, now,
        );
        tracing::debug!(client = %conn, group = ?group, "xreadgroup parked");

        let result = match self.group_read_attempt(group, consumer, &streams, count, noack, now) {
            Ok(result) => result,
            Err(error) => {
                self.blocked.lock().unpark(token);
                return Err(error);
            }
        };
        if !result.is_empty() {
            self.blocked.lock().unpark(token);
            return Ok(result);
        }

        let result = self.await_wakeup(receiver, cancel, block.unwrap_or_default()).await;
        self.blocked.lock().unpark(token);
        Ok(result)
    }

    /// Acknowledge pending entries. Returns how many were removed; a
    /// missing key or group acknowledges nothing.
    pub fn xack(&self, key: &[u8], group: &Bytes, ids: &[StreamId]) -> Result<usize, StoreError> {
        let inner = self.read();
        let Some(shared) = inner.get_stream(key, now_ms())? else {
            return Ok(0);
        };
        let mut stream = shared.lock();
        Ok(stream.group_mut(group).map_or(0, |group| group.ack(ids)))
    }

    /// Create a consumer group whose cursor starts at `id`
    /// ([`StreamId::MAX`] for the current tail). Without `mkstream` the
    /// stream must already exist.
    pub fn xgroup_create(
        &self,
        key: &Bytes,
        group: Bytes,
        id: StreamId,
        mkstream: bool,
    ) -> Result<(), StoreError> {
        let now = now_ms();
        let mut inner = self.write();
        let shared = match inner.get_stream(key, now)? {
            Some(shared) => shared,
            None if mkstream => inner.stream_or_default(key, now)?,
            None => return Err(StoreError::NoKey),
        };
        let mut stream = shared.lock();
        stream.create_group(group, id)
    }

    /// Remove a group and its pending state. Returns whether it existed.
    pub fn xgroup_destroy(&self, key: &[u8], group: &Bytes) -> Result<bool, StoreError> {
        let now = now_ms();
        let mut inner = self.write();
        let Some(shared) = inner.get_stream(key, now)? else {
            return Ok(false);
        };
        let mut stream = shared.lock();
        let removed = stream.destroy_group(group);
        let prunable = stream.is_empty() && !stream.has_groups();
        drop(stream);
        if prunable {
            inner.remove(key, now);
        }
        Ok(removed)
    }

    /// Remove a consumer from a group, discarding its pending entries.
    /// Returns how many were discarded.
    pub fn xgroup_delconsumer(
        &self,
        key: &[u8],
        group: &Bytes,
        consumer: &Bytes,
    ) -> Result<usize, StoreError> {
        let inner = self.read();
        let Some(shared) = inner.get_stream(key, now_ms())? else {
            return Err(StoreError::no_group(group, key));
        };
        let mut stream = shared.lock();
        let group = stream
            .group_mut(group)
            .ok_or_else(|| StoreError::no_group(group, key))?;
        Ok(group.remove_consumer(consumer))
    }

    /// Move a group's delivery cursor.
    pub fn xgroup_setid(&self, key: &[u8], group: &Bytes, id: StreamId) -> Result<(), StoreError> {
        let inner = self.read();
        let Some(shared) = inner.get_stream(key, now_ms())? else {
            return Err(StoreError::no_group(group, key));
        };
        let mut stream = shared.lock();
        let group = stream
            .group_mut(group)
            .ok_or_else(|| StoreError::no_group(group, key))?;
        group.set_id(id);
        Ok(())
    }

    /// Aggregate pending counts for a group.
    pub fn xpending(&self, key: &[u8], group: &Bytes) -> Result<PendingSummary, StoreError> {
        let inner = self.read();
        let Some(shared) = inner.get_stream(key, now_ms())? else {
            return Err(StoreError::no_group(group, key));
        };
        let stream = shared.lock();
        let group = stream
            .group(group)
            .ok_or_else(|| StoreError::no_group(group, key))?;
        Ok(group.summary())
    }

    /// Detailed pending rows in `[start, end]`, optionally filtered to
    /// one consumer, at most `count` of them.
    pub fn xpending_detail(
        &self,
        key: &[u8],
        group: &Bytes,
        start: StreamId,
        end: StreamId,
        count: usize,
        consumer: Option<&Bytes>,
    ) -> Result<Vec<PendingDetail>, StoreError> {
        let now = now_ms();
        let inner = self.read();
        let Some(shared) = inner.get_stream(key, now)? else {
            return Err(StoreError::no_group(group, key));
        };
        let stream = shared.lock();
        let group = stream
            .group(group)
            .ok_or_else(|| StoreError::no_group(group, key))?;
        Ok(group.detail(start, end, count, consumer, now))
    }

    pub fn xinfo_stream(&self, key: &[u8]) -> Result<StreamInfo, StoreError> {
        let inner = self.read();
        let Some(shared) = inner.get_stream(key, now_ms())? else {
            return Err(StoreError::NoSuchKey);
        };
        let info = shared.lock().info();
        Ok(info)
    }

    pub fn xinfo_groups(&self, key: &[u8]) -> Result<Vec<GroupInfo>, StoreError> {
        let inner = self.read();
        let Some(shared) = inner.get_stream(key, now_ms())? else {
            return Err(StoreError::NoSuchKey);
        };
        let stream = shared.lock();
        let mut infos: Vec<GroupInfo> = stream.groups().map(|group| group.info()).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    pub fn xinfo_consumers(
        &self,
        key: &[u8],
        group: &Bytes,
    ) -> Result<Vec<ConsumerInfo>, StoreError> {
        let now = now_ms();
        let inner = self.read();
        let Some(shared) = inner.get_stream(key, now)? else {
            return Err(StoreError::no_group(group, key));
        };
        let stream = shared.lock();
        let group = stream
            .group(group)
            .ok_or_else(|| StoreError::no_group(group, key))?;
        Ok(group.consumer_infos(now))
    }

    /// Cancel and drop every blocked reader belonging to `conn`. Called
    /// by the connection owner on close.
    pub fn cleanup_blocked_clients(&self, conn: &ConnectionId) -> usize {
        let dropped = self.blocked.lock().cleanup_connection(conn);
        if dropped > 0 {
            tracing::debug!(client = %conn, dropped, "blocked stream readers cleaned up");
        }
        dropped
    }

    /// One pass over `streams`: resolve `$` ids against the current
    /// tail and collect anything already past each start id.
    fn read_attempt(
        &self,
        streams: &[(Bytes, StreamId)],
        count: Option<usize>,
        now: u64,
    ) -> Result<(ReadResult, Vec<(Bytes, StreamId)>), StoreError> {
        let inner = self.read();
        let mut resolved = Vec::with_capacity(streams.len());
        let mut collected = Vec::new();
        for (key, from) in streams {
            let shared = inner.get_stream(key, now)?;
            let from = if *from == StreamId::MAX {
                shared
                    .as_ref()
                    .map_or(StreamId::MIN, |shared| shared.lock().last_id())
            } else {
                *from
            };
            resolved.push((key.clone(), from));
            if let Some(shared) = shared {
                let entries = shared.lock().entries_after(from, count);
                if !entries.is_empty() {
                    collected.push((key.clone(), entries));
                }
            }
        }
        Ok((ReadResult { streams: collected }, resolved))
    }

    fn group_read_attempt(
        &self,
        group: &Bytes,
        consumer: &Bytes,
        streams: &[(Bytes, StreamId)],
        count: Option<usize>,
        noack: bool,
        now: u64,
    ) -> Result<ReadResult, StoreError> {
        let inner = self.read();
        let mut collected = Vec::new();
        for (key, from) in streams {
            let Some(shared) = inner.get_stream(key, now)? else {
                return Err(StoreError::no_group(group, key));
            };
            let mut stream = shared.lock();
            let entries = if *from == StreamId::MAX {
                stream.deliver_new(group, consumer, count, noack, now)
            } else {
                stream.deliver_pending(group, consumer, *from, count, now)
            }
            .ok_or_else(|| StoreError::no_group(group, key))?;
            if !entries.is_empty() {
                collected.push((key.clone(), entries));
            }
        }
        Ok(ReadResult { streams: collected })
    }

    /// Wait for a wake-up, cancellation or the timeout. A zero timeout
    /// waits indefinitely.
    async fn await_wakeup(
        &self,
        mut receiver: mpsc::Receiver<ReadResult>,
        cancel: CancellationToken,
        block: Duration,
    ) -> ReadResult {
        let woken = if block.is_zero() {
            tokio::select! {
                result = receiver.recv() => result,
                () = cancel.cancelled() => None,
            }
        } else {
            tokio::select! {
                result = receiver.recv() => result,
                () = cancel.cancelled() => None,
                () = tokio::time::sleep(block) => None,
            }
        };
        woken.unwrap_or_default()
    }

    /// Hand the entry an XADD just appended to every reader it
    /// satisfies. Runs under the per-stream lock; the registry lock
    /// nests inside it. Fulfilled and cancelled readers are dropped
    /// from every key they were parked on.
    fn notify_blocked_readers(
        &self,
        key: &Bytes,
        entry: &StreamEntry,
        stream: &mut Stream,
        now: u64,
    ) {
        let mut blocked = self.blocked.lock();
        let mut fulfilled = Vec::new();

        if let Some(readers) = blocked.readers.get_mut(key) {
            readers.retain(|reader| {
                if reader.cancel.is_cancelled() {
                    return false;
                }
                if entry.id <= reader.from {
                    return true;
                }
                let result = ReadResult {
                    streams: vec![(key.clone(), vec![entry.clone()])],
                };
                if reader.sender.try_send(result).is_ok() {
                    tracing::debug!(
                        client = %reader.conn,
                        count = ?reader.count,
                        waited_ms = now.saturating_sub(reader.since_ms),
                        "blocked xread fulfilled"
                    );
                    fulfilled.push(reader.token);
                }
                // Sent, or the reader is gone; drop the record either way.
                false
            });
        }

        if let Some(readers) = blocked.group_readers.get_mut(key) {
            readers.retain(|reader| {
                if reader.cancel.is_cancelled() {
                    return false;
                }
                let Some(group) = stream.group_mut(&reader.group) else {
                    return false;
                };
                if group.last_delivered_id >= entry.id {
                    return true;
                }
                let result = ReadResult {
                    streams: vec![(key.clone(), vec![entry.clone()])],
                };
                if reader.sender.try_send(result).is_ok() {
                    group.consumer(&reader.consumer, now);
                    group.record_delivery(&reader.consumer, entry.id, now, reader.noack);
                    tracing::debug!(
                        client = %reader.conn,
                        count = ?reader.count,
                        waited_ms = now.saturating_sub(reader.since_ms),
                        "blocked xreadgroup fulfilled"
                    );
                    fulfilled.push(reader.token);
                }
                false
            });
        }

        for token in fulfilled {
            blocked.unpark(token);
        }
    }
}
