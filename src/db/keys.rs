use crate::db::Db;
use crate::{glob, now_ms};
use bytes::Bytes;
use std::time::Duration;

impl Db {
    /// How many of `keys` exist and are unexpired. Repeated keys count
    /// each time.
    pub fn exists(&self, keys: &[Bytes]) -> usize {
        let now = now_ms();
        let inner = self.read();
        keys.iter().filter(|key| inner.contains(key, now)).count()
    }

    /// Remove `keys`, returning how many were actually present.
    pub fn del(&self, keys: &[Bytes]) -> usize {
        let now = now_ms();
        let mut inner = self.write();
        keys.iter()
            .filter(|key| inner.remove(key, now).is_some())
            .count()
    }

    /// The kind name of the value at `key`, or `"none"`.
    pub fn key_type(&self, key: &[u8]) -> &'static str {
        self.read()
            .get(key, now_ms())
            .map_or("none", |value| value.kind())
    }

    /// Milliseconds until `key` expires: −2 when missing, −1 when it
    /// has no expiry.
    pub fn ttl(&self, key: &[u8]) -> i64 {
        let now = now_ms();
        let inner = self.read();
        if !inner.contains(key, now) {
            return -2;
        }
        match inner.expires_at(key, now) {
            Some(at) => i64::try_from(at.saturating_sub(now)).unwrap_or(i64::MAX),
            None => -1,
        }
    }

    /// Expire `key` after `ttl` from now. Returns whether the key
    /// exists and the expiry was set.
    pub fn expire(&self, key: &[u8], ttl: Duration) -> bool {
        let now = now_ms();
        let at = now.saturating_add(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX));
        self.write().expire(key, at, now)
    }

    /// Expire `key` at an absolute epoch-millisecond instant.
    pub fn expire_at(&self, key: &[u8], at_ms: u64) -> bool {
        self.write().expire(key, at_ms, now_ms())
    }

    /// Clear the expiry of `key`. Returns whether one was cleared.
    pub fn persist(&self, key: &[u8]) -> bool {
        self.write().persist(key, now_ms())
    }

    /// Live keys matching a glob pattern.
    pub fn keys(&self, pattern: &[u8]) -> Vec<Bytes> {
        let now = now_ms();
        let inner = self.read();
        inner
            .keys(now)
            .filter(|key| glob::matches(key, pattern))
            .cloned()
            .collect()
    }

    /// The number of live keys.
    pub fn dbsize(&self) -> usize {
        self.read().len(now_ms())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{StoreConfig, StoreError};

    fn db() -> Db {
        Db::new(0, StoreConfig::default())
    }

    fn b(bytes: &'static [u8]) -> Bytes {
        Bytes::from_static(bytes)
    }

    #[test]
    fn exists_counts_repeats() {
        let db = db();
        db.set(b(b"a"), b(b"1"), None);
        assert_eq!(db.exists(&[b(b"a"), b(b"a"), b(b"missing")]), 2);
    }

    #[test]
    fn del_returns_removed_count() {
        let db = db();
        db.set(b(b"a"), b(b"1"), None);
        db.set(b(b"b"), b(b"2"), None);
        assert_eq!(db.del(&[b(b"a"), b(b"b"), b(b"c")]), 2);
        assert_eq!(db.dbsize(), 0);
    }

    #[test]
    fn type_names() {
        let db = db();
        db.set(b(b"s"), b(b"1"), None);
        db.lpush(&b(b"l"), vec![b(b"x")]).unwrap();
        db.sadd(&b(b"set"), vec![b(b"x")]).unwrap();
        db.zadd(&b(b"z"), vec![(1.0, b(b"x"))]).unwrap();
        db.hset(&b(b"h"), b(b"f"), b(b"v")).unwrap();
        assert_eq!(db.key_type(b"s"), "string");
        assert_eq!(db.key_type(b"l"), "list");
        assert_eq!(db.key_type(b"set"), "set");
        assert_eq!(db.key_type(b"z"), "zset");
        assert_eq!(db.key_type(b"h"), "hash");
        assert_eq!(db.key_type(b"missing"), "none");
    }

    #[test]
    fn ttl_sentinels() {
        let db = db();
        assert_eq!(db.ttl(b"missing"), -2);
        db.set(b(b"a"), b(b"1"), None);
        assert_eq!(db.ttl(b"a"), -1);
        assert!(db.expire(b"a", Duration::from_secs(10)));
        let remaining = db.ttl(b"a");
        assert!((9_000..=10_000).contains(&remaining));
    }

    #[test]
    fn expire_missing_key_fails() {
        let db = db();
        assert!(!db.expire(b"missing", Duration::from_secs(1)));
        assert!(!db.expire_at(b"missing", now_ms() + 1_000));
    }

    #[test]
    fn persist_clears_expiry() {
        let db = db();
        db.set(b(b"a"), b(b"1"), Some(now_ms() + 10_000));
        assert!(db.persist(b"a"));
        assert!(!db.persist(b"a"));
        assert_eq!(db.ttl(b"a"), -1);
    }

    #[test]
    fn expired_key_is_gone_for_every_reader() {
        let db = db();
        db.set(b(b"a"), b(b"1"), Some(now_ms().saturating_sub(1)));
        assert_eq!(db.ttl(b"a"), -2);
        assert_eq!(db.get(b"a"), Ok(None));
        assert_eq!(db.key_type(b"a"), "none");
        assert_eq!(db.exists(&[b(b"a")]), 0);
    }

    #[test]
    fn keys_filters_by_pattern() {
        let db = db();
        db.set(b(b"user:1"), b(b"a"), None);
        db.set(b(b"user:2"), b(b"b"), None);
        db.set(b(b"order:1"), b(b"c"), None);
        let mut matched = db.keys(b"user:*");
        matched.sort();
        assert_eq!(matched, vec![b(b"user:1"), b(b"user:2")]);
        assert_eq!(db.keys(b"*").len(), 3);
    }

    #[test]
    fn wrong_type_error_text() {
        assert_eq!(
            StoreError::WrongType.to_string(),
            "WRONGTYPE Operation against a key holding the wrong kind of value"
        );
    }
}
