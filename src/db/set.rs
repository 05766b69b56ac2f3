use crate::db::Db;
use crate::{StoreError, now_ms};
use bytes::Bytes;
use rand::seq::IteratorRandom;

impl Db {
    /// Add members, returning how many were not already present.
    pub fn sadd(&self, key: &Bytes, members: Vec<Bytes>) -> Result<usize, StoreError> {
        let mut inner = self.write();
        let set = inner.set_or_default(key, now_ms())?;
        Ok(members
            .into_iter()
            .filter(|member| set.insert(member.clone()))
            .count())
    }

    /// Remove members, returning how many were present. Removing the
    /// last member deletes the key.
    pub fn srem(&self, key: &[u8], members: &[Bytes]) -> Result<usize, StoreError> {
        let now = now_ms();
        let mut inner = self.write();
        let Some(set) = inner.mut_set(key, now)? else {
            return Ok(0);
        };
        let count = members
            .iter()
            .filter(|member| set.remove(&member[..]))
            .count();
        if set.is_empty() {
            inner.remove(key, now);
        }
        Ok(count)
    }

    /// Remove and return up to `count` uniformly random members.
    pub fn spop(&self, key: &[u8], count: usize) -> Result<Vec<Bytes>, StoreError> {
        let now = now_ms();
        let mut inner = self.write();
        let Some(set) = inner.mut_set(key, now)? else {
            return Ok(Vec::new());
        };
        let picked: Vec<Bytes> = set
            .iter()
            .choose_multiple(&mut rand::thread_rng(), count)
            .into_iter()
            .cloned()
            .collect();
        for member in &picked {
            set.remove(&member[..]);
        }
        if set.is_empty() {
            inner.remove(key, now);
        }
        Ok(picked)
    }

    /// Up to `count` distinct uniformly random members, without removal.
    pub fn srandmember(&self, key: &[u8], count: usize) -> Result<Vec<Bytes>, StoreError> {
        let inner = self.read();
        let Some(set) = inner.get_set(key, now_ms())? else {
            return Ok(Vec::new());
        };
        Ok(set
            .iter()
            .choose_multiple(&mut rand::thread_rng(), count)
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn smembers(&self, key: &[u8]) -> Result<Vec<Bytes>, StoreError> {
        Ok(self
            .read()
            .get_set(key, now_ms())?
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    pub fn sismember(&self, key: &[u8], member: &[u8]) -> Result<bool, StoreError> {
        Ok(self
            .read()
            .get_set(key, now_ms())?
            .is_some_and(|set| set.contains(member)))
    }

    pub fn scard(&self, key: &[u8]) -> Result<usize, StoreError> {
        Ok(self.read().get_set(key, now_ms())?.map_or(0, |set| set.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreConfig;

    fn db() -> Db {
        Db::new(0, StoreConfig::default())
    }

    fn b(bytes: &'static [u8]) -> Bytes {
        Bytes::from_static(bytes)
    }

    #[test]
    fn sadd_counts_new_members() {
        let db = db();
        assert_eq!(db.sadd(&b(b"s"), vec![b(b"a"), b(b"b")]).unwrap(), 2);
        assert_eq!(db.sadd(&b(b"s"), vec![b(b"b"), b(b"c")]).unwrap(), 1);
        assert_eq!(db.scard(b"s").unwrap(), 3);
    }

    #[test]
    fn srem_to_empty_removes_key() {
        let db = db();
        db.sadd(&b(b"s"), vec![b(b"a"), b(b"b")]).unwrap();
        assert_eq!(db.srem(b"s", &[b(b"a"), b(b"b"), b(b"z")]).unwrap(), 2);
        assert_eq!(db.exists(&[b(b"s")]), 0);
        assert_eq!(db.srem(b"s", &[b(b"a")]).unwrap(), 0);
    }

    #[test]
    fn spop_removes_subset() {
        let db = db();
        db.sadd(&b(b"s"), vec![b(b"a"), b(b"b"), b(b"c")]).unwrap();
        let popped = db.spop(b"s", 2).unwrap();
        assert_eq!(popped.len(), 2);
        assert_eq!(db.scard(b"s").unwrap(), 1);
        for member in popped {
            assert!(!db.sismember(b"s", &member).unwrap());
        }
    }

    #[test]
    fn spop_everything_removes_key() {
        let db = db();
        db.sadd(&b(b"s"), vec![b(b"a"), b(b"b")]).unwrap();
        assert_eq!(db.spop(b"s", 10).unwrap().len(), 2);
        assert_eq!(db.exists(&[b(b"s")]), 0);
    }

    #[test]
    fn srandmember_leaves_set_alone() {
        let db = db();
        db.sadd(&b(b"s"), vec![b(b"a"), b(b"b"), b(b"c")]).unwrap();
        let members = db.srandmember(b"s", 2).unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(db.scard(b"s").unwrap(), 3);
        assert!(db.srandmember(b"missing", 2).unwrap().is_empty());
    }

    #[test]
    fn smembers_returns_everything() {
        let db = db();
        db.sadd(&b(b"s"), vec![b(b"a"), b(b"b")]).unwrap();
        let mut members = db.smembers(b"s").unwrap();
        members.sort();
        assert_eq!(members, vec![b(b"a"), b(b"b")]);
    }
}
