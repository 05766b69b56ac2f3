use crate::db::{Db, Value};
use crate::{StoreError, now_ms};
use bytes::{Bytes, BytesMut};

/// Parse the exact decimal form of a signed 64-bit integer.
pub(crate) fn parse_i64(bytes: &[u8]) -> Result<i64, StoreError> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or(StoreError::NotInteger)
}

pub(crate) fn parse_f64(bytes: &[u8]) -> Result<f64, StoreError> {
    let value: f64 = std::str::from_utf8(bytes)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or(StoreError::NotFloat)?;
    if value.is_nan() {
        Err(StoreError::NotFloat)
    } else {
        Ok(value)
    }
}

/// Shortest round-trip form, so `3.0` prints as `3` and `3.5` as `3.5`.
pub(crate) fn format_f64(value: f64) -> Bytes {
    format!("{value}").into_bytes().into()
}

impl Db {
    /// Set `key` unconditionally, discarding any prior value of any
    /// kind. With no `expires_at` the key also loses any expiry.
    pub fn set(&self, key: Bytes, value: Bytes, expires_at: Option<u64>) {
        self.write().set(key, Value::String(value), expires_at);
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>, StoreError> {
        Ok(self.read().get_string(key, now_ms())?.cloned())
    }

    pub fn mset(&self, pairs: Vec<(Bytes, Bytes)>) {
        let mut inner = self.write();
        for (key, value) in pairs {
            inner.set(key, Value::String(value), None);
        }
    }

    /// Values for `keys`, `None` for keys that are missing or hold a
    /// non-string value.
    pub fn mget(&self, keys: &[Bytes]) -> Vec<Option<Bytes>> {
        let now = now_ms();
        let inner = self.read();
        keys.iter()
            .map(|key| inner.get_string(key, now).ok().flatten().cloned())
            .collect()
    }

    pub fn incr(&self, key: &Bytes) -> Result<i64, StoreError> {
        self.incr_by(key, 1)
    }

    pub fn decr(&self, key: &Bytes) -> Result<i64, StoreError> {
        self.incr_by(key, -1)
    }

    pub fn decr_by(&self, key: &Bytes, delta: i64) -> Result<i64, StoreError> {
        self.incr_by(key, delta.checked_neg().ok_or(StoreError::NotInteger)?)
    }

    /// Add `delta` to the integer stored at `key`, treating a missing
    /// key as zero. The result replaces the value and drops any expiry.
    pub fn incr_by(&self, key: &Bytes, delta: i64) -> Result<i64, StoreError> {
        let now = now_ms();
        let mut inner = self.write();
        let current = match inner.get_string(key, now)? {
            Some(bytes) => parse_i64(bytes)?,
            None => 0,
        };
        let result = current.checked_add(delta).ok_or(StoreError::NotInteger)?;
        inner.set(
            key.clone(),
            Value::String(result.to_string().into_bytes().into()),
            None,
        );
        Ok(result)
    }

    /// Concatenate `value` onto `key`, creating it if missing. Returns
    /// the new length. Any expiry is kept.
    pub fn append(&self, key: &Bytes, value: &[u8]) -> Result<usize, StoreError> {
        let now = now_ms();
        let mut inner = self.write();
        match inner.get_mut(key, now) {
            Some(current) => {
                let string = current.mut_string()?;
                let mut buffer = BytesMut::with_capacity(string.len() + value.len());
                buffer.extend_from_slice(string);
                buffer.extend_from_slice(value);
                *string = buffer.freeze();
                Ok(string.len())
            }
            None => {
                inner.set(key.clone(), Value::String(Bytes::copy_from_slice(value)), None);
                Ok(value.len())
            }
        }
    }

    pub fn strlen(&self, key: &[u8]) -> Result<usize, StoreError> {
        Ok(self.read().get_string(key, now_ms())?.map_or(0, Bytes::len))
    }

    /// The substring from `start` to `end`, both inclusive and both
    /// accepting negative offsets from the end.
    pub fn getrange(&self, key: &[u8], start: i64, end: i64) -> Result<Bytes, StoreError> {
        let inner = self.read();
        let Some(string) = inner.get_string(key, now_ms())? else {
            return Ok(Bytes::new());
        };
        let len = string.len();
        let start = clamp_index(start, len);
        let end = clamp_index(end, len).min(len.saturating_sub(1));
        if len == 0 || start > end {
            return Ok(Bytes::new());
        }
        Ok(string.slice(start..=end))
    }

    /// Overwrite bytes at `offset`, zero-padding any gap. Returns the
    /// new length.
    pub fn setrange(&self, key: &Bytes, offset: usize, value: &[u8]) -> Result<usize, StoreError> {
        let now = now_ms();
        let mut inner = self.write();
        let current = match inner.get_string(key, now)? {
            Some(bytes) => bytes.clone(),
            None => Bytes::new(),
        };
        if value.is_empty() {
            return Ok(current.len());
        }
        let len = current.len().max(offset + value.len());
        let mut buffer = BytesMut::zeroed(len);
        buffer[..current.len()].copy_from_slice(&current);
        buffer[offset..offset + value.len()].copy_from_slice(value);
        let expires_at = inner.expires_at(key, now);
        inner.set(key.clone(), Value::String(buffer.freeze()), expires_at);
        Ok(len)
    }

    /// Get the string at `key` and delete the key.
    pub fn getdel(&self, key: &[u8]) -> Result<Option<Bytes>, StoreError> {
        let now = now_ms();
        let mut inner = self.write();
        let Some(value) = inner.get(key, now) else {
            return Ok(None);
        };
        let string = value.as_string()?.clone();
        inner.remove(key, now);
        Ok(Some(string))
    }
}

/// Resolve a possibly negative index against `len`, clamping to bounds.
pub(crate) fn clamp_index(index: i64, len: usize) -> usize {
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let index = if index < 0 { len + index } else { index };
    usize::try_from(index.clamp(0, len)).unwrap_or(0)
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
    fn set_then_get() {
        let db = db();
        db.set(b(b"k"), b(b"v"), None);
        assert_eq!(db.get(b"k").unwrap(), Some(b(b"v")));
        assert_eq!(db.get(b"missing").unwrap(), None);
    }

    #[test]
    fn set_overwrites_any_kind() {
        let db = db();
        db.lpush(&b(b"k"), vec![b(b"x")]).unwrap();
        db.set(b(b"k"), b(b"v"), None);
        assert_eq!(db.get(b"k").unwrap(), Some(b(b"v")));
    }

    #[test]
    fn get_wrong_type() {
        let db = db();
        db.lpush(&b(b"k"), vec![b(b"x")]).unwrap();
        assert_eq!(db.get(b"k").unwrap_err(), StoreError::WrongType);
    }

    #[test]
    fn mset_mget() {
        let db = db();
        db.mset(vec![(b(b"a"), b(b"1")), (b(b"b"), b(b"2"))]);
        assert_eq!(
            db.mget(&[b(b"a"), b(b"missing"), b(b"b")]),
            vec![Some(b(b"1")), None, Some(b(b"2"))]
        );
    }

    #[test]
    fn incr_from_missing() {
        let db = db();
        assert_eq!(db.incr(&b(b"n")).unwrap(), 1);
        assert_eq!(db.incr_by(&b(b"n"), 9).unwrap(), 10);
        assert_eq!(db.decr(&b(b"n")).unwrap(), 9);
        assert_eq!(db.decr_by(&b(b"n"), 4).unwrap(), 5);
        assert_eq!(db.get(b"n").unwrap(), Some(b(b"5")));
    }

    #[test]
    fn incr_not_an_integer() {
        let db = db();
        db.set(b(b"n"), b(b"ten"), None);
        assert_eq!(db.incr(&b(b"n")).unwrap_err(), StoreError::NotInteger);
        // The failed increment leaves the value alone.
        assert_eq!(db.get(b"n").unwrap(), Some(b(b"ten")));
    }

    #[test]
    fn incr_overflow() {
        let db = db();
        db.set(b(b"n"), Bytes::from(i64::MAX.to_string()), None);
        assert_eq!(db.incr(&b(b"n")).unwrap_err(), StoreError::NotInteger);
    }

    #[test]
    fn incr_clears_expiry() {
        let db = db();
        db.set(b(b"n"), b(b"1"), Some(now_ms() + 60_000));
        db.incr(&b(b"n")).unwrap();
        assert_eq!(db.ttl(b"n"), -1);
    }

    #[test]
    fn append_and_strlen() {
        let db = db();
        assert_eq!(db.append(&b(b"k"), b"Hello ").unwrap(), 6);
        assert_eq!(db.append(&b(b"k"), b"World").unwrap(), 11);
        assert_eq!(db.get(b"k").unwrap(), Some(b(b"Hello World")));
        assert_eq!(db.strlen(b"k").unwrap(), 11);
        assert_eq!(db.strlen(b"missing").unwrap(), 0);
    }

    #[test]
    fn getrange_negative_indices() {
        let db = db();
        db.set(b(b"k"), b(b"This is a string"), None);
        assert_eq!(db.getrange(b"k", 0, 3).unwrap(), b(b"This"));
        assert_eq!(db.getrange(b"k", -3, -1).unwrap(), b(b"ing"));
        assert_eq!(db.getrange(b"k", 0, -1).unwrap(), b(b"This is a string"));
        assert_eq!(db.getrange(b"k", 10, 5).unwrap(), Bytes::new());
    }

    #[test]
    fn setrange_pads_with_zeroes() {
        let db = db();
        assert_eq!(db.setrange(&b(b"k"), 5, b"Redis").unwrap(), 10);
        assert_eq!(
            db.get(b"k").unwrap(),
            Some(Bytes::from_static(b"\0\0\0\0\0Redis"))
        );
    }

    #[test]
    fn getdel_removes() {
        let db = db();
        db.set(b(b"k"), b(b"v"), None);
        assert_eq!(db.getdel(b"k").unwrap(), Some(b(b"v")));
        assert_eq!(db.get(b"k").unwrap(), None);
        assert_eq!(db.getdel(b"k").unwrap(), None);
    }

    #[test]
    fn float_formatting() {
        assert_eq!(format_f64(3.0), Bytes::from_static(b"3"));
        assert_eq!(format_f64(3.5), Bytes::from_static(b"3.5"));
        assert_eq!(format_f64(0.1), Bytes::from_static(b"0.1"));
    }
}
