use crate::connection::ConnectionId;
use crate::stream::{StreamEntry, StreamId};
use bytes::Bytes;
use hashbrown::HashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Entries delivered to one read call, grouped per stream key.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReadResult {
    pub streams: Vec<(Bytes, Vec<StreamEntry>)>,
}

impl ReadResult {
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

/// A reader parked by a blocking XREAD, waiting for an append with an id
/// past `from`.
#[derive(Clone, Debug)]
pub(crate) struct BlockedReader {
    pub token: u64,
    pub conn: ConnectionId,
    pub from: StreamId,
    pub count: Option<usize>,
    pub sender: mpsc::Sender<ReadResult>,
    pub cancel: CancellationToken,
    pub since_ms: u64,
}

/// A reader parked by a blocking XREADGROUP. Woken by any append the
/// group has not delivered yet.
#[derive(Clone, Debug)]
pub(crate) struct BlockedGroupReader {
    pub token: u64,
    pub conn: ConnectionId,
    pub group: Bytes,
    pub consumer: Bytes,
    pub noack: bool,
    pub count: Option<usize>,
    pub sender: mpsc::Sender<ReadResult>,
    pub cancel: CancellationToken,
    pub since_ms: u64,
}

/// Parked stream readers for one database, keyed by stream key. A
/// logical read over several keys registers one record per key, all
/// sharing a token so fulfillment on any key unparks the rest.
#[derive(Debug, Default)]
pub(crate) struct Blocked {
    next_token: u64,
    pub readers: HashMap<Bytes, Vec<BlockedReader>>,
    pub group_readers: HashMap<Bytes, Vec<BlockedGroupReader>>,
}

impl Blocked {
    /// Park a plain reader on `keys`, each with its own resolved start
    /// id. Returns the token used to unpark it later.
    pub fn park(
        &mut self,
        keys: Vec<(Bytes, StreamId)>,
        conn: &ConnectionId,
        count: Option<usize>,
        sender: &mpsc::Sender<ReadResult>,
        cancel: &CancellationToken,
        since_ms: u64,
    ) -> u64 {
        let token = self.token();
        for (key, from) in keys {
            self.readers.entry(key).or_default().push(BlockedReader {
                token,
                conn: conn.clone(),
                from,
                count,
                sender: sender.clone(),
                cancel: cancel.clone(),
                since_ms,
            });
        }
        token
    }

    /// Park a group reader on `keys`.
    #[expect(clippy::too_many_arguments)]
    pub fn park_group(
        &mut self,
        keys: Vec<Bytes>,
        group: &Bytes,
        consumer: &Bytes,
        noack: bool,
        conn: &ConnectionId,
        count: Option<usize>,
        sender: &mpsc::Sender<ReadResult>,
        cancel: &CancellationToken,
        since_ms: u64,
    ) -> u64 {
        let token = self.token();
        for key in keys {
            self.group_readers
                .entry(key)
                .or_default()
                .push(BlockedGroupReader {
                    token,
                    conn: conn.clone(),
                    group: group.clone(),
                    consumer: consumer.clone(),
                    noack,
                    count,
                    sender: sender.clone(),
                    cancel: cancel.clone(),
                    since_ms,
                });
        }
        token
    }

    /// Remove every record registered under `token`, on all keys.
    pub fn unpark(&mut self, token: u64) {
        self.readers
            .retain(|_, readers| {
                readers.retain(|reader| reader.token != token);
                !readers.is_empty()
            });
        self.group_readers.retain(|_, readers| {
            readers.retain(|reader| reader.token != token);
            !readers.is_empty()
        });
    }

    /// Cancel and remove every record belonging to `conn`. Returns how
    /// many records were dropped.
    pub fn cleanup_connection(&mut self, conn: &ConnectionId) -> usize {
        let mut dropped = 0;
        self.readers.retain(|_, readers| {
            readers.retain(|reader| {
                if reader.conn == *conn {
                    reader.cancel.cancel();
                    dropped += 1;
                    false
                } else {
                    true
                }
            });
            !readers.is_empty()
        });
        self.group_readers.retain(|_, readers| {
            readers.retain(|reader| {
                if reader.conn == *conn {
                    reader.cancel.cancel();
                    dropped += 1;
                    false
                } else {
                    true
                }
            });
            !readers.is_empty()
        });
        dropped
    }

    fn token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }
}
