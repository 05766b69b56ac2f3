use crate::db::Db;
use crate::{StoreError, now_ms};
use bytes::Bytes;

impl Db {
    /// Prepend `values` in argument order, so the last argument ends up
    /// at the head. Returns the new length.
    pub fn lpush(&self, key: &Bytes, values: Vec<Bytes>) -> Result<usize, StoreError> {
        let mut inner = self.write();
        let list = inner.list_or_default(key, now_ms())?;
        for value in values {
            list.push_front(value);
        }
        Ok(list.len())
    }

    /// Append `values` preserving argument order. Returns the new length.
    pub fn rpush(&self, key: &Bytes, values: Vec<Bytes>) -> Result<usize, StoreError> {
        let mut inner = self.write();
        let list = inner.list_or_default(key, now_ms())?;
        for value in values {
            list.push_back(value);
        }
        Ok(list.len())
    }

    pub fn lpop(&self, key: &[u8]) -> Result<Option<Bytes>, StoreError> {
        self.pop(key, true)
    }

    pub fn rpop(&self, key: &[u8]) -> Result<Option<Bytes>, StoreError> {
        self.pop(key, false)
    }

    fn pop(&self, key: &[u8], front: bool) -> Result<Option<Bytes>, StoreError> {
        let now = now_ms();
        let mut inner = self.write();
        let Some(list) = inner.mut_list(key, now)? else {
            return Ok(None);
        };
        let value = if front {
            list.pop_front()
        } else {
            list.pop_back()
        };
        if list.is_empty() {
            inner.remove(key, now);
        }
        Ok(value)
    }

    pub fn llen(&self, key: &[u8]) -> Result<usize, StoreError> {
        Ok(self.read().get_list(key, now_ms())?.map_or(0, |list| list.len()))
    }

    /// The element at `index`, negative values counting from the tail.
    pub fn lindex(&self, key: &[u8], index: i64) -> Result<Option<Bytes>, StoreError> {
        let inner = self.read();
        let Some(list) = inner.get_list(key, now_ms())? else {
            return Ok(None);
        };
        Ok(resolve_index(index, list.len()).and_then(|index| list.get(index).cloned()))
    }

    /// Replace the element at `index`. The key must exist and the index
    /// must be in range.
    pub fn lset(&self, key: &[u8], index: i64, value: Bytes) -> Result<(), StoreError> {
        let mut inner = self.write();
        let Some(list) = inner.mut_list(key, now_ms())? else {
            return Err(StoreError::NoSuchKey);
        };
        let index = resolve_index(index, list.len()).ok_or(StoreError::IndexOutOfRange)?;
        let slot = list.get_mut(index).ok_or(StoreError::IndexOutOfRange)?;
        *slot = value;
        Ok(())
    }

    /// Elements from `start` to `stop`, both inclusive, clamped to the
    /// list. `start` past `stop` yields nothing.
    pub fn lrange(&self, key: &[u8], start: i64, stop: i64) -> Result<Vec<Bytes>, StoreError> {
        let inner = self.read();
        let Some(list) = inner.get_list(key, now_ms())? else {
            return Ok(Vec::new());
        };
        let Some((start, stop)) = clamp_range(start, stop, list.len()) else {
            return Ok(Vec::new());
        };
        Ok(list.iter().skip(start).take(stop - start + 1).cloned().collect())
    }

    /// Keep only the elements from `start` to `stop` inclusive. An
    /// empty result deletes the key.
    pub fn ltrim(&self, key: &[u8], start: i64, stop: i64) -> Result<(), StoreError> {
        let now = now_ms();
        let mut inner = self.write();
        let Some(list) = inner.mut_list(key, now)? else {
            return Ok(());
        };
        match clamp_range(start, stop, list.len()) {
            Some((start, stop)) => {
                list.truncate(stop + 1);
                list.drain(..start);
            }
            None => list.clear(),
        }
        if list.is_empty() {
            inner.remove(key, now);
        }
        Ok(())
    }

    /// Remove occurrences of `value`: `count > 0` from the head,
    /// `count < 0` from the tail, `count == 0` all of them. Returns the
    /// number removed.
    pub fn lrem(&self, key: &[u8], count: i64, value: &[u8]) -> Result<usize, StoreError> {
        let now = now_ms();
        let mut inner = self.write();
        let Some(list) = inner.mut_list(key, now)? else {
            return Ok(0);
        };

        let limit = count.unsigned_abs().try_into().unwrap_or(usize::MAX);
        let limit = if count == 0 { usize::MAX } else { limit };

        let mut removed = 0;
        if count < 0 {
            for index in (0..list.len()).rev() {
                if removed == limit {
                    break;
                }
                if list[index] == value {
                    list.remove(index);
                    removed += 1;
                }
            }
        } else {
            let mut index = 0;
            while index < list.len() && removed < limit {
                if list[index] == value {
                    list.remove(index);
                    removed += 1;
                } else {
                    index += 1;
                }
            }
        }

        if list.is_empty() {
            inner.remove(key, now);
        }
        Ok(removed)
    }
}

/// Resolve a possibly negative index; out of range is `None`.
fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { len + index } else { index };
    if (0..len).contains(&index) {
        usize::try_from(index).ok()
    } else {
        None
    }
}

/// Clamp an inclusive range to `[0, len - 1]`; `None` when it selects
/// nothing (inverted, entirely before the head, or past the tail).
pub(crate) fn clamp_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let len = i64::try_from(len).ok()?;
    let mut start = if start < 0 { len + start } else { start };
    let mut stop = if stop < 0 { len + stop } else { stop };
    start = start.max(0);
    stop = stop.min(len - 1);
    if start > stop || start >= len || stop < 0 {
        return None;
    }
    Some((usize::try_from(start).ok()?, usize::try_from(stop).ok()?))
}
