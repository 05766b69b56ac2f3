use crate::Frame;
use bytes::Bytes;
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::fmt;
use tokio::sync::mpsc;

/// Metadata key set while a connection has any subscription.
pub const PUBSUB_MODE: &str = "pubsub_mode";

/// Metadata key holding the channel names a connection is subscribed to.
pub const SUBSCRIPTIONS: &str = "subscriptions";

/// Metadata key holding the patterns a connection is subscribed to.
pub const PATTERN_SUBS: &str = "pattern_subs";

/// Identifies one client connection for the lifetime of the process.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ConnectionId(pub String);

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        ConnectionId(value.to_owned())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A value in a connection's metadata map.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MetaValue {
    Bool(bool),
    Names(Vec<Bytes>),
}

/// The store's view of a client connection: an id to key registries by,
/// a sink for frames, and a metadata map the owner may inspect. The
/// connection's lifecycle belongs to its owner, which must call
/// `Pubsub::remove_connection` and `Db::cleanup_blocked_clients` when
/// the connection closes.
pub struct ConnectionHandle {
    pub id: ConnectionId,
    writer: mpsc::Sender<Frame>,
    metadata: Mutex<HashMap<&'static str, MetaValue>>,
}

impl ConnectionHandle {
    pub fn new(id: impl Into<String>, writer: mpsc::Sender<Frame>) -> Self {
        ConnectionHandle {
            id: ConnectionId(id.into()),
            writer,
            metadata: Mutex::new(HashMap::new()),
        }
    }

    /// The sink frames are delivered through.
    pub fn writer(&self) -> mpsc::Sender<Frame> {
        self.writer.clone()
    }

    pub fn set_meta(&self, key: &'static str, value: MetaValue) {
        self.metadata.lock().insert(key, value);
    }

    pub fn meta(&self, key: &str) -> Option<MetaValue> {
        self.metadata.lock().get(key).cloned()
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
