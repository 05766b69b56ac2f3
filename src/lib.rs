mod config;
mod connection;
mod db;
mod error;
mod frame;
mod glob;
mod pubsub;
mod store;
mod stream;
mod time;

// Public interface
pub use config::StoreConfig;
pub use connection::{
    ConnectionHandle, ConnectionId, MetaValue, PATTERN_SUBS, PUBSUB_MODE, SUBSCRIPTIONS,
};
pub use db::{BitOp, Db, HScanPage, Hash, Insertion, List, Set, SharedStream, SortedSet, Value};
pub use error::StoreError;
pub use frame::Frame;
pub use pubsub::Pubsub;
pub use store::Store;
pub use stream::{
    Consumer, ConsumerGroup, ConsumerInfo, GroupInfo, PendingDetail, PendingEntry, PendingSummary,
    ReadResult, Stream, StreamEntry, StreamId, StreamInfo, TrimStrategy,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

use time::now_ms;
