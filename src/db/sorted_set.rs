use crate::db::list::clamp_range;
use crate::db::{Db, Insertion};
use crate::{StoreError, now_ms};
use bytes::Bytes;
use ordered_float::NotNan;

impl Db {
    /// Insert or update members with scores. Returns only the count of
    /// members that were strictly new.
    pub fn zadd(&self, key: &Bytes, entries: Vec<(f64, Bytes)>) -> Result<usize, StoreError> {
        let mut inner = self.write();
        let set = inner.sorted_set_or_default(key, now_ms())?;
        let mut added = 0;
        for (score, member) in entries {
            let score = NotNan::new(score).map_err(|_| StoreError::NotFloat)?;
            if set.insert(member, score) == Insertion::Added {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Remove members, returning how many were present. Removing the
    /// last member deletes the key.
    pub fn zrem(&self, key: &[u8], members: &[Bytes]) -> Result<usize, StoreError> {
        let now = now_ms();
        let mut inner = self.write();
        let Some(set) = inner.mut_sorted_set(key, now)? else {
            return Ok(0);
        };
        let count = members
            .iter()
            .filter(|member| set.remove(member))
            .count();
        if set.is_empty() {
            inner.remove(key, now);
        }
        Ok(count)
    }

    pub fn zscore(&self, key: &[u8], member: &[u8]) -> Result<Option<f64>, StoreError> {
        Ok(self
            .read()
            .get_sorted_set(key, now_ms())?
            .and_then(|set| set.score(member)))
    }

    pub fn zcard(&self, key: &[u8]) -> Result<usize, StoreError> {
        Ok(self
            .read()
            .get_sorted_set(key, now_ms())?
            .map_or(0, |set| set.len()))
    }

    /// Add `delta` to a member's score, treating a missing member as
    /// zero. Returns the new score.
    pub fn zincrby(&self, key: &Bytes, delta: f64, member: Bytes) -> Result<f64, StoreError> {
        let mut inner = self.write();
        let set = inner.sorted_set_or_default(key, now_ms())?;
        let score = set.score(&member).unwrap_or(0.0) + delta;
        let score = NotNan::new(score).map_err(|_| StoreError::NotFloat)?;
        set.insert(member, score);
        Ok(*score)
    }

    /// Members by ascending rank from `start` to `stop` inclusive, with
    /// scores. Negative indices count from the highest rank.
    pub fn zrange(
        &self,
        key: &[u8],
        start: i64,
        stop: i64,
    ) -> Result<Vec<(Bytes, f64)>, StoreError> {
        self.range_by_rank(key, start, stop, false)
    }

    /// Like [`Db::zrange`] with ranks counted from the highest score.
    pub fn zrevrange(
        &self,
        key: &[u8],
        start: i64,
        stop: i64,
    ) -> Result<Vec<(Bytes, f64)>, StoreError> {
        self.range_by_rank(key, start, stop, true)
    }

    fn range_by_rank(
        &self,
        key: &[u8],
        start: i64,
        stop: i64,
        rev: bool,
    ) -> Result<Vec<(Bytes, f64)>, StoreError> {
        let inner = self.read();
        let Some(set) = inner.get_sorted_set(key, now_ms())? else {
            return Ok(Vec::new());
        };
        let Some((start, stop)) = clamp_range(start, stop, set.len()) else {
            return Ok(Vec::new());
        };
        let take = stop - start + 1;
        Ok(if rev {
            set.iter()
                .rev()
                .skip(start)
                .take(take)
                .map(|(member, score)| (member.clone(), score))
                .collect()
        } else {
            set.iter()
                .skip(start)
                .take(take)
                .map(|(member, score)| (member.clone(), score))
                .collect()
        })
    }

    /// Members with `min <= score <= max`, ascending.
    pub fn zrangebyscore(
        &self,
        key: &[u8],
        min: f64,
        max: f64,
    ) -> Result<Vec<(Bytes, f64)>, StoreError> {
        let inner = self.read();
        let Some(set) = inner.get_sorted_set(key, now_ms())? else {
            return Ok(Vec::new());
        };
        Ok(set
            .range_by_score(min, max)
            .map(|(member, score)| (member.clone(), score))
            .collect())
    }

    /// Members with `min <= score <= max`, descending.
    pub fn zrevrangebyscore(
        &self,
        key: &[u8],
        max: f64,
        min: f64,
    ) -> Result<Vec<(Bytes, f64)>, StoreError> {
        let mut members = self.zrangebyscore(key, min, max)?;
        members.reverse();
        Ok(members)
    }

    pub fn zcount(&self, key: &[u8], min: f64, max: f64) -> Result<usize, StoreError> {
        let inner = self.read();
        let Some(set) = inner.get_sorted_set(key, now_ms())? else {
            return Ok(0);
        };
        Ok(set.range_by_score(min, max).count())
    }

    /// Zero-based ascending rank of `member`.
    pub fn zrank(&self, key: &[u8], member: &[u8]) -> Result<Option<usize>, StoreError> {
        Ok(self
            .read()
            .get_sorted_set(key, now_ms())?
            .and_then(|set| set.rank(member)))
    }

    /// Zero-based descending rank of `member`.
    pub fn zrevrank(&self, key: &[u8], member: &[u8]) -> Result<Option<usize>, StoreError> {
        let inner = self.read();
        let Some(set) = inner.get_sorted_set(key, now_ms())? else {
            return Ok(None);
        };
        Ok(set.rank(member).map(|rank| set.len() - 1 - rank))
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

    fn seed(db: &Db) {
        db.zadd(
            &b(b"z"),
            vec![(1.0, b(b"a")), (2.0, b(b"b")), (3.0, b(b"c"))],
        )
        .unwrap();
    }

    #[test]
    fn zadd_counts_only_new_members() {
        let db = db();
        assert_eq!(
            db.zadd(&b(b"z"), vec![(1.0, b(b"a")), (2.0, b(b"b")), (3.0, b(b"a"))])
                .unwrap(),
            2
        );
        // The later score for a wins.
        assert_eq!(db.zscore(b"z", b"a").unwrap(), Some(3.0));
        assert_eq!(db.zadd(&b(b"z"), vec![(9.0, b(b"a"))]).unwrap(), 0);
    }

    #[test]
    fn zadd_rejects_nan() {
        let db = db();
        assert_eq!(
            db.zadd(&b(b"z"), vec![(f64::NAN, b(b"a"))]).unwrap_err(),
            StoreError::NotFloat
        );
    }

    #[test]
    fn zrange_with_scores() {
        let db = db();
        seed(&db);
        assert_eq!(
            db.zrange(b"z", 0, -1).unwrap(),
            vec![(b(b"a"), 1.0), (b(b"b"), 2.0), (b(b"c"), 3.0)]
        );
        assert_eq!(
            db.zrevrange(b"z", 0, 1).unwrap(),
            vec![(b(b"c"), 3.0), (b(b"b"), 2.0)]
        );
        assert!(db.zrange(b"z", 5, 9).unwrap().is_empty());
    }

    #[test]
    fn zrangebyscore_inclusive() {
        let db = db();
        seed(&db);
        assert_eq!(
            db.zrangebyscore(b"z", 2.0, 3.0).unwrap(),
            vec![(b(b"b"), 2.0), (b(b"c"), 3.0)]
        );
        assert_eq!(
            db.zrevrangebyscore(b"z", 3.0, 2.0).unwrap(),
            vec![(b(b"c"), 3.0), (b(b"b"), 2.0)]
        );
        assert_eq!(db.zcount(b"z", 2.0, 3.0).unwrap(), 2);
    }

    #[test]
    fn ranks_are_complementary() {
        let db = db();
        seed(&db);
        for member in [&b"a"[..], b"b", b"c"] {
            let rank = db.zrank(b"z", member).unwrap().unwrap();
            let revrank = db.zrevrank(b"z", member).unwrap().unwrap();
            assert_eq!(rank + revrank, db.zcard(b"z").unwrap() - 1);
        }
        assert_eq!(db.zrank(b"z", b"missing").unwrap(), None);
    }

    #[test]
    fn zrem_to_empty_removes_key() {
        let db = db();
        seed(&db);
        assert_eq!(db.zrem(b"z", &[b(b"a"), b(b"b"), b(b"c")]).unwrap(), 3);
        assert_eq!(db.exists(&[b(b"z")]), 0);
    }

    #[test]
    fn zincrby_from_missing() {
        let db = db();
        assert_eq!(db.zincrby(&b(b"z"), 2.5, b(b"m")).unwrap(), 2.5);
        assert_eq!(db.zincrby(&b(b"z"), 1.5, b(b"m")).unwrap(), 4.0);
    }
}
