use crate::connection::ConnectionId;
use crate::db::Db;
use crate::pubsub::Pubsub;
use crate::StoreConfig;

/// The store holds every numbered database plus the pub/sub hub. It is
/// shared across connections; each command runs against one database
/// under that database's own locks.
pub struct Store {
    dbs: Vec<Db>,
    pubsub: Pubsub,
    config: StoreConfig,
}

impl Default for Store {
    fn default() -> Self {
        Store::new(StoreConfig::default())
    }
}

impl Store {
    pub fn new(config: StoreConfig) -> Self {
        let dbs = (0..config.databases)
            .map(|index| Db::new(index, config))
            .collect();
        Store {
            dbs,
            pubsub: Pubsub::new(config.delivery_deadline),
            config,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The database at `index`, if the slot exists.
    pub fn db(&self, index: usize) -> Option<&Db> {
        self.dbs.get(index)
    }

    pub fn databases(&self) -> usize {
        self.dbs.len()
    }

    pub fn pubsub(&self) -> &Pubsub {
        &self.pubsub
    }

    /// Swap the contents of two numbered databases atomically. Returns
    /// false when either slot is out of range.
    pub fn swap_db(&self, a: usize, b: usize) -> bool {
        if a.max(b) >= self.dbs.len() {
            return false;
        }
        if a == b {
            return true;
        }
        // Lock in slot order so concurrent swaps cannot deadlock.
        let (low, high) = (a.min(b), a.max(b));
        let mut first = self.dbs[low].write();
        let mut second = self.dbs[high].write();
        std::mem::swap(&mut *first, &mut *second);
        true
    }

    /// Sweep expired keys out of every database. Returns the total
    /// number removed.
    pub fn cleanup_expired(&self) -> usize {
        self.dbs.iter().map(Db::cleanup_expired).sum()
    }

    /// Tear down everything a closed connection left behind: its
    /// subscriptions and any blocked stream readers.
    pub fn disconnect(&self, conn: &ConnectionId) {
        self.pubsub.remove_connection(conn);
        for db in &self.dbs {
            db.cleanup_blocked_clients(conn);
        }
        tracing::debug!(client = %conn, "connection state cleaned up");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn b(bytes: &'static [u8]) -> Bytes {
        Bytes::from_static(bytes)
    }

    #[test]
    fn sixteen_databases_by_default() {
        let store = Store::default();
        assert_eq!(store.databases(), 16);
        assert!(store.db(15).is_some());
        assert!(store.db(16).is_none());
    }

    #[test]
    fn databases_are_independent() {
        let store = Store::default();
        store.db(0).unwrap().set(b(b"k"), b(b"zero"), None);
        store.db(1).unwrap().set(b(b"k"), b(b"one"), None);
        assert_eq!(store.db(0).unwrap().get(b"k").unwrap(), Some(b(b"zero")));
        assert_eq!(store.db(1).unwrap().get(b"k").unwrap(), Some(b(b"one")));
    }

    #[test]
    fn swap_db_exchanges_contents() {
        let store = Store::default();
        store.db(0).unwrap().set(b(b"k"), b(b"zero"), None);
        assert!(store.swap_db(0, 1));
        assert_eq!(store.db(0).unwrap().get(b"k").unwrap(), None);
        assert_eq!(store.db(1).unwrap().get(b"k").unwrap(), Some(b(b"zero")));
        assert!(store.swap_db(5, 5));
        assert!(!store.swap_db(0, 99));
    }

    #[test]
    fn cleanup_sweeps_every_database() {
        let store = Store::default();
        let past = crate::now_ms().saturating_sub(1);
        store.db(0).unwrap().set(b(b"a"), b(b"1"), Some(past));
        store.db(3).unwrap().set(b(b"b"), b(b"2"), Some(past));
        store.db(3).unwrap().set(b(b"c"), b(b"3"), None);
        assert_eq!(store.cleanup_expired(), 2);
        assert_eq!(store.db(3).unwrap().dbsize(), 1);
    }

    #[test]
    fn flushdb_empties_one_database() {
        let store = Store::default();
        store.db(0).unwrap().set(b(b"a"), b(b"1"), None);
        store.db(1).unwrap().set(b(b"b"), b(b"2"), None);
        store.db(0).unwrap().flush();
        assert_eq!(store.db(0).unwrap().dbsize(), 0);
        assert_eq!(store.db(1).unwrap().dbsize(), 1);
    }
}
