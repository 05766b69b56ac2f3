use crate::db::string::{format_f64, parse_f64, parse_i64};
use crate::db::Db;
use crate::{StoreError, glob, now_ms};
use bytes::Bytes;
use rand::seq::IteratorRandom;

/// One page of an HSCAN traversal. A `cursor` of zero means the
/// traversal is complete.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HScanPage {
    pub cursor: u64,
    pub fields: Vec<(Bytes, Bytes)>,
}

impl Db {
    /// Set one field. Returns `true` iff the field did not exist before.
    pub fn hset(&self, key: &Bytes, field: Bytes, value: Bytes) -> Result<bool, StoreError> {
        let mut inner = self.write();
        let hash = inner.hash_or_default(key, now_ms())?;
        Ok(hash.insert(field, value).is_none())
    }

    /// Set many fields at once. Returns how many were newly created.
    pub fn hset_multi(
        &self,
        key: &Bytes,
        pairs: Vec<(Bytes, Bytes)>,
    ) -> Result<usize, StoreError> {
        let mut inner = self.write();
        let hash = inner.hash_or_default(key, now_ms())?;
        let mut created = 0;
        for (field, value) in pairs {
            if hash.insert(field, value).is_none() {
                created += 1;
            }
        }
        Ok(created)
    }

    /// Merge fields into the hash, overwriting existing ones.
    pub fn hmset(&self, key: &Bytes, pairs: Vec<(Bytes, Bytes)>) -> Result<(), StoreError> {
        let mut inner = self.write();
        let hash = inner.hash_or_default(key, now_ms())?;
        for (field, value) in pairs {
            hash.insert(field, value);
        }
        Ok(())
    }

    pub fn hget(&self, key: &[u8], field: &[u8]) -> Result<Option<Bytes>, StoreError> {
        Ok(self
            .read()
            .get_hash(key, now_ms())?
            .and_then(|hash| hash.get(field).cloned()))
    }

    pub fn hmget(&self, key: &[u8], fields: &[Bytes]) -> Result<Vec<Option<Bytes>>, StoreError> {
        let inner = self.read();
        let hash = inner.get_hash(key, now_ms())?;
        Ok(fields
            .iter()
            .map(|field| hash.and_then(|hash| hash.get(&field[..]).cloned()))
            .collect())
    }

    /// Remove fields, returning how many existed. Deleting the last
    /// field deletes the key.
    pub fn hdel(&self, key: &[u8], fields: &[Bytes]) -> Result<usize, StoreError> {
        let now = now_ms();
        let mut inner = self.write();
        let Some(hash) = inner.mut_hash(key, now)? else {
            return Ok(0);
        };
        let count = fields
            .iter()
            .filter(|field| hash.remove(&field[..]).is_some())
            .count();
        if hash.is_empty() {
            inner.remove(key, now);
        }
        Ok(count)
    }

    pub fn hgetall(&self, key: &[u8]) -> Result<Vec<(Bytes, Bytes)>, StoreError> {
        Ok(self
            .read()
            .get_hash(key, now_ms())?
            .map(|hash| {
                hash.iter()
                    .map(|(field, value)| (field.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    pub fn hkeys(&self, key: &[u8]) -> Result<Vec<Bytes>, StoreError> {
        Ok(self
            .read()
            .get_hash(key, now_ms())?
            .map(|hash| hash.keys().cloned().collect())
            .unwrap_or_default())
    }

    pub fn hvals(&self, key: &[u8]) -> Result<Vec<Bytes>, StoreError> {
        Ok(self
            .read()
            .get_hash(key, now_ms())?
            .map(|hash| hash.values().cloned().collect())
            .unwrap_or_default())
    }

    pub fn hexists(&self, key: &[u8], field: &[u8]) -> Result<bool, StoreError> {
        Ok(self
            .read()
            .get_hash(key, now_ms())?
            .is_some_and(|hash| hash.contains_key(field)))
    }

    pub fn hlen(&self, key: &[u8]) -> Result<usize, StoreError> {
        Ok(self.read().get_hash(key, now_ms())?.map_or(0, |hash| hash.len()))
    }

    /// Add `delta` to the integer stored in `field`, treating a missing
    /// field as zero.
    pub fn hincrby(&self, key: &Bytes, field: Bytes, delta: i64) -> Result<i64, StoreError> {
        let mut inner = self.write();
        let hash = inner.hash_or_default(key, now_ms())?;
        let current = match hash.get(&field[..]) {
            Some(bytes) => parse_i64(bytes)?,
            None => 0,
        };
        let result = current.checked_add(delta).ok_or(StoreError::NotInteger)?;
        hash.insert(field, result.to_string().into_bytes().into());
        Ok(result)
    }

    pub fn hincrbyfloat(&self, key: &Bytes, field: Bytes, delta: f64) -> Result<f64, StoreError> {
        let mut inner = self.write();
        let hash = inner.hash_or_default(key, now_ms())?;
        let current = match hash.get(&field[..]) {
            Some(bytes) => parse_f64(bytes)?,
            None => 0.0,
        };
        let result = current + delta;
        if !result.is_finite() {
            return Err(StoreError::NotFloat);
        }
        hash.insert(field, format_f64(result));
        Ok(result)
    }

    /// A uniformly random field, or `None` for a missing key.
    pub fn hrandfield(&self, key: &[u8]) -> Result<Option<Bytes>, StoreError> {
        let inner = self.read();
        let Some(hash) = inner.get_hash(key, now_ms())? else {
            return Ok(None);
        };
        Ok(hash.keys().choose(&mut rand::thread_rng()).cloned())
    }

    /// Up to `count` distinct uniformly random fields.
    pub fn hrandfield_count(&self, key: &[u8], count: usize) -> Result<Vec<Bytes>, StoreError> {
        let inner = self.read();
        let Some(hash) = inner.get_hash(key, now_ms())? else {
            return Ok(Vec::new());
        };
        Ok(hash
            .keys()
            .choose_multiple(&mut rand::thread_rng(), count)
            .into_iter()
            .cloned()
            .collect())
    }

    /// One page of fields starting at `cursor`. The cursor is an offset
    /// into the hash's iteration order, stable as long as the hash is
    /// not written between pages. `pattern` filters the returned page;
    /// `count` bounds how many fields are scanned for it.
    pub fn hscan(
        &self,
        key: &[u8],
        cursor: u64,
        pattern: Option<&[u8]>,
        count: usize,
    ) -> Result<HScanPage, StoreError> {
        let inner = self.read();
        let Some(hash) = inner.get_hash(key, now_ms())? else {
            return Ok(HScanPage::default());
        };

        let count = count.max(1);
        let skip = usize::try_from(cursor).unwrap_or(usize::MAX);
        let mut scanned = 0;
        let fields: Vec<(Bytes, Bytes)> = hash
            .iter()
            .skip(skip)
            .take(count)
            .inspect(|_| scanned += 1)
            .filter(|(field, _)| pattern.is_none_or(|pattern| glob::matches(field, pattern)))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();

        let next = skip + scanned;
        let cursor = if next >= hash.len() {
            0
        } else {
            u64::try_from(next).unwrap_or(0)
        };
        Ok(HScanPage { cursor, fields })
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
    fn hset_reports_new_fields() {
        let db = db();
        assert!(db.hset(&b(b"h"), b(b"f"), b(b"1")).unwrap());
        assert!(!db.hset(&b(b"h"), b(b"f"), b(b"2")).unwrap());
        assert_eq!(db.hget(b"h", b"f").unwrap(), Some(b(b"2")));
    }

    #[test]
    fn hset_multi_counts_only_new() {
        let db = db();
        assert_eq!(
            db.hset_multi(&b(b"h"), vec![(b(b"a"), b(b"1")), (b(b"b"), b(b"2"))])
                .unwrap(),
            2
        );
        assert_eq!(
            db.hset_multi(&b(b"h"), vec![(b(b"a"), b(b"9")), (b(b"c"), b(b"3"))])
                .unwrap(),
            1
        );
        assert_eq!(db.hlen(b"h").unwrap(), 3);
    }

    #[test]
    fn hdel_removes_key_when_empty() {
        let db = db();
        db.hmset(&b(b"h"), vec![(b(b"a"), b(b"1")), (b(b"b"), b(b"2"))])
            .unwrap();
        assert_eq!(db.hdel(b"h", &[b(b"a"), b(b"b"), b(b"x")]).unwrap(), 2);
        assert_eq!(db.exists(&[b(b"h")]), 0);
    }

    #[test]
    fn hmget_aligns_with_fields() {
        let db = db();
        db.hmset(&b(b"h"), vec![(b(b"a"), b(b"1"))]).unwrap();
        assert_eq!(
            db.hmget(b"h", &[b(b"a"), b(b"missing")]).unwrap(),
            vec![Some(b(b"1")), None]
        );
    }

    #[test]
    fn hincrby_parses_and_replaces() {
        let db = db();
        assert_eq!(db.hincrby(&b(b"h"), b(b"n"), 5).unwrap(), 5);
        assert_eq!(db.hincrby(&b(b"h"), b(b"n"), -2).unwrap(), 3);
        db.hset(&b(b"h"), b(b"s"), b(b"abc")).unwrap();
        assert_eq!(
            db.hincrby(&b(b"h"), b(b"s"), 1).unwrap_err(),
            StoreError::NotInteger
        );
    }

    #[test]
    fn hincrbyfloat_formats_result() {
        let db = db();
        db.hset(&b(b"h"), b(b"n"), b(b"10.5")).unwrap();
        assert_eq!(db.hincrbyfloat(&b(b"h"), b(b"n"), 0.1).unwrap(), 10.6);
        assert_eq!(db.hget(b"h", b"n").unwrap(), Some(b(b"10.6")));
    }

    #[test]
    fn hexists_and_views() {
        let db = db();
        db.hmset(&b(b"h"), vec![(b(b"a"), b(b"1")), (b(b"b"), b(b"2"))])
            .unwrap();
        assert!(db.hexists(b"h", b"a").unwrap());
        assert!(!db.hexists(b"h", b"z").unwrap());

        let mut keys = db.hkeys(b"h").unwrap();
        keys.sort();
        assert_eq!(keys, vec![b(b"a"), b(b"b")]);

        let mut all = db.hgetall(b"h").unwrap();
        all.sort();
        assert_eq!(all, vec![(b(b"a"), b(b"1")), (b(b"b"), b(b"2"))]);
    }

    #[test]
    fn hrandfield_is_a_member() {
        let db = db();
        db.hmset(&b(b"h"), vec![(b(b"a"), b(b"1")), (b(b"b"), b(b"2"))])
            .unwrap();
        let field = db.hrandfield(b"h").unwrap().unwrap();
        assert!(db.hexists(b"h", &field).unwrap());
        assert_eq!(db.hrandfield(b"missing").unwrap(), None);
        assert_eq!(db.hrandfield_count(b"h", 10).unwrap().len(), 2);
    }

    #[test]
    fn hscan_pages_cover_everything() {
        let db = db();
        let pairs: Vec<(Bytes, Bytes)> = (0..25)
            .map(|n| (Bytes::from(format!("field:{n}")), b(b"v")))
            .collect();
        db.hmset(&b(b"h"), pairs).unwrap();

        let mut cursor = 0;
        let mut seen = Vec::new();
        loop {
            let page = db.hscan(b"h", cursor, None, 10).unwrap();
            seen.extend(page.fields);
            cursor = page.cursor;
            if cursor == 0 {
                break;
            }
        }
        assert_eq!(seen.len(), 25);
    }

    #[test]
    fn hscan_match_filters_page() {
        let db = db();
        db.hmset(
            &b(b"h"),
            vec![(b(b"user:1"), b(b"a")), (b(b"user:2"), b(b"b")), (b(b"order:1"), b(b"c"))],
        )
        .unwrap();
        let page = db.hscan(b"h", 0, Some(b"user:*"), 100).unwrap();
        assert_eq!(page.cursor, 0);
        assert_eq!(page.fields.len(), 2);
    }

    #[test]
    fn hscan_missing_key() {
        let db = db();
        assert_eq!(db.hscan(b"h", 0, None, 10).unwrap(), HScanPage::default());
    }
}
