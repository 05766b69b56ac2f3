use crate::db::list::clamp_range;
use crate::db::{Db, Value};
use crate::{StoreError, now_ms};
use bytes::{Bytes, BytesMut};

/// A bitwise operator for BITOP.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BitOp {
    And,
    Or,
    Xor,
    Not,
}

/// Bit offsets address the most significant bit of byte zero first.
fn locate(offset: u64) -> (usize, u8) {
    let byte = usize::try_from(offset / 8).unwrap_or(usize::MAX);
    #[expect(clippy::cast_possible_truncation)]
    let mask = 0x80u8 >> (offset % 8) as u8;
    (byte, mask)
}

fn check_offset(offset: i64) -> Result<u64, StoreError> {
    u64::try_from(offset).map_err(|_| StoreError::BitOffset)
}

impl Db {
    /// Set the bit at `offset`, growing the string with NUL bytes as
    /// needed. Returns the previous bit.
    pub fn setbit(&self, key: &Bytes, offset: i64, value: i64) -> Result<i64, StoreError> {
        let offset = check_offset(offset)?;
        if value != 0 && value != 1 {
            return Err(StoreError::BitArgument);
        }

        let now = now_ms();
        let mut inner = self.write();
        let current = inner.get_string(key, now)?.cloned().unwrap_or_default();

        let (byte, mask) = locate(offset);
        let len = current.len().max(byte + 1);
        let mut buffer = BytesMut::zeroed(len);
        buffer[..current.len()].copy_from_slice(&current);

        let old = i64::from(buffer[byte] & mask != 0);
        if value == 1 {
            buffer[byte] |= mask;
        } else {
            buffer[byte] &= !mask;
        }

        let expires_at = inner.expires_at(key, now);
        inner.set(key.clone(), Value::String(buffer.freeze()), expires_at);
        Ok(old)
    }

    /// The bit at `offset`; zero past the end or for a missing key.
    pub fn getbit(&self, key: &[u8], offset: i64) -> Result<i64, StoreError> {
        let offset = check_offset(offset)?;
        let inner = self.read();
        let Some(string) = inner.get_string(key, now_ms())? else {
            return Ok(0);
        };
        let (byte, mask) = locate(offset);
        Ok(string
            .get(byte)
            .map_or(0, |byte| i64::from(byte & mask != 0)))
    }

    /// Count set bits, optionally within an inclusive byte range that
    /// accepts negative offsets from the end.
    pub fn bitcount(&self, key: &[u8], range: Option<(i64, i64)>) -> Result<i64, StoreError> {
        let inner = self.read();
        let Some(string) = inner.get_string(key, now_ms())? else {
            return Ok(0);
        };
        let (start, end) = range.unwrap_or((0, -1));
        let Some((start, end)) = clamp_range(start, end, string.len()) else {
            return Ok(0);
        };
        Ok(string[start..=end]
            .iter()
            .map(|byte| i64::from(byte.count_ones()))
            .sum())
    }

    /// The offset of the first bit equal to `bit`, searching an
    /// optional inclusive byte range, or −1 when absent. A missing key
    /// is all zeroes: 0 for `bit == 0`, −1 for `bit == 1`.
    pub fn bitpos(
        &self,
        key: &[u8],
        bit: i64,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<i64, StoreError> {
        if bit != 0 && bit != 1 {
            return Err(StoreError::BitArgument);
        }
        let inner = self.read();
        let Some(string) = inner.get_string(key, now_ms())? else {
            return Ok(if bit == 0 { 0 } else { -1 });
        };

        let bounded_end = end.is_some();
        let (start, end) = (start.unwrap_or(0), end.unwrap_or(-1));
        let Some((start, end)) = clamp_range(start, end, string.len()) else {
            return Ok(-1);
        };

        for (index, &byte) in string[start..=end].iter().enumerate() {
            for offset in 0..8 {
                let set = byte & (0x80 >> offset) != 0;
                if set == (bit == 1) {
                    let position = (start + index) * 8 + offset;
                    return Ok(i64::try_from(position).unwrap_or(i64::MAX));
                }
            }
        }

        // With no explicit end, an all-ones string still has a zero bit
        // just past it.
        if bit == 0 && !bounded_end {
            return Ok(i64::try_from(string.len() * 8).unwrap_or(i64::MAX));
        }
        Ok(-1)
    }

    /// Combine `sources` byte-wise into `dest`, zero-padding shorter
    /// sources on the right. `Not` takes exactly one source. Returns
    /// the length of the result, which replaces `dest` as a string.
    pub fn bitop(&self, op: BitOp, dest: &Bytes, sources: &[Bytes]) -> Result<usize, StoreError> {
        if op == BitOp::Not && sources.len() != 1 {
            return Err(StoreError::BitopNot);
        }
        if sources.is_empty() {
            return Err(StoreError::Syntax);
        }

        let now = now_ms();
        let mut inner = self.write();

        let mut values = Vec::with_capacity(sources.len());
        let mut max_len = 0;
        for source in sources {
            let value = inner.get_string(source, now)?.cloned().unwrap_or_default();
            max_len = max_len.max(value.len());
            values.push(value);
        }

        if max_len == 0 {
            inner.remove(dest, now);
            return Ok(0);
        }

        let mut result = match op {
            BitOp::Not => {
                let mut bytes = BytesMut::from(&values[0][..]);
                for byte in bytes.iter_mut() {
                    *byte = !*byte;
                }
                bytes
            }
            BitOp::And | BitOp::Or | BitOp::Xor => {
                let fold = match op {
                    BitOp::And => |a: u8, b: u8| a & b,
                    BitOp::Or => |a: u8, b: u8| a | b,
                    _ => |a: u8, b: u8| a ^ b,
                };
                let init = if op == BitOp::And { 0xff } else { 0x00 };
                let mut bytes = BytesMut::zeroed(max_len);
                bytes.fill(init);
                for value in &values {
                    for (index, slot) in bytes.iter_mut().enumerate() {
                        *slot = fold(*slot, value.get(index).copied().unwrap_or(0));
                    }
                }
                bytes
            }
        };

        result.resize(max_len, 0);
        let len = result.len();
        inner.set(dest.clone(), Value::String(result.freeze()), None);
        Ok(len)
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
    fn setbit_round_trip() {
        let db = db();
        assert_eq!(db.setbit(&b(b"k"), 7, 1).unwrap(), 0);
        assert_eq!(db.getbit(b"k", 7).unwrap(), 1);
        assert_eq!(db.getbit(b"k", 6).unwrap(), 0);
        assert_eq!(db.setbit(&b(b"k"), 7, 0).unwrap(), 1);
        assert_eq!(db.getbit(b"k", 7).unwrap(), 0);
    }

    #[test]
    fn bit_zero_is_most_significant() {
        let db = db();
        db.setbit(&b(b"k"), 0, 1).unwrap();
        assert_eq!(db.get(b"k").unwrap(), Some(Bytes::from_static(&[0x80])));
    }

    #[test]
    fn setbit_extends_with_nuls() {
        let db = db();
        db.setbit(&b(b"k"), 17, 1).unwrap();
        assert_eq!(db.strlen(b"k").unwrap(), 3);
        assert_eq!(db.get(b"k").unwrap(), Some(Bytes::from_static(&[0, 0, 0x40])));
    }

    #[test]
    fn setbit_rejects_bad_arguments() {
        let db = db();
        assert_eq!(db.setbit(&b(b"k"), -1, 1).unwrap_err(), StoreError::BitOffset);
        assert_eq!(db.setbit(&b(b"k"), 0, 2).unwrap_err(), StoreError::BitArgument);
    }

    #[test]
    fn getbit_past_end_is_zero() {
        let db = db();
        db.set(b(b"k"), b(b"\xff"), None);
        assert_eq!(db.getbit(b"k", 100).unwrap(), 0);
        assert_eq!(db.getbit(b"missing", 0).unwrap(), 0);
    }

    #[test]
    fn bitcount_ranges() {
        let db = db();
        db.set(b(b"k"), b(b"foobar"), None);
        assert_eq!(db.bitcount(b"k", None).unwrap(), 26);
        assert_eq!(db.bitcount(b"k", Some((0, 0))).unwrap(), 4);
        assert_eq!(db.bitcount(b"k", Some((1, 1))).unwrap(), 6);
        assert_eq!(db.bitcount(b"k", Some((-2, -1))).unwrap(), 7);
        assert_eq!(db.bitcount(b"k", Some((5, 1))).unwrap(), 0);
        assert_eq!(db.bitcount(b"missing", None).unwrap(), 0);
    }

    #[test]
    fn bitpos_finds_first_match() {
        let db = db();
        db.set(b(b"k"), Bytes::from_static(&[0x00, 0x10]), None);
        assert_eq!(db.bitpos(b"k", 1, None, None).unwrap(), 11);
        assert_eq!(db.bitpos(b"k", 0, None, None).unwrap(), 0);
        assert_eq!(db.bitpos(b"k", 1, Some(1), None).unwrap(), 11);
    }

    #[test]
    fn bitpos_missing_key() {
        let db = db();
        assert_eq!(db.bitpos(b"k", 0, None, None).unwrap(), 0);
        assert_eq!(db.bitpos(b"k", 1, None, None).unwrap(), -1);
    }

    #[test]
    fn bitpos_all_ones_reports_past_end() {
        let db = db();
        db.set(b(b"k"), Bytes::from_static(&[0xff]), None);
        assert_eq!(db.bitpos(b"k", 0, None, None).unwrap(), 8);
        assert_eq!(db.bitpos(b"k", 0, Some(0), Some(-1)).unwrap(), -1);
    }

    #[test]
    fn bitop_and() {
        let db = db();
        // key1 has bits 0 and 1, key2 has bits 0 and 2.
        db.setbit(&b(b"key1"), 0, 1).unwrap();
        db.setbit(&b(b"key1"), 1, 1).unwrap();
        db.setbit(&b(b"key2"), 0, 1).unwrap();
        db.setbit(&b(b"key2"), 2, 1).unwrap();

        assert_eq!(db.bitop(BitOp::And, &b(b"dest"), &[b(b"key1"), b(b"key2")]).unwrap(), 1);
        assert_eq!(db.getbit(b"dest", 0).unwrap(), 1);
        assert_eq!(db.getbit(b"dest", 1).unwrap(), 0);
        assert_eq!(db.getbit(b"dest", 2).unwrap(), 0);
    }

    #[test]
    fn bitop_pads_shorter_sources() {
        let db = db();
        db.set(b(b"a"), Bytes::from_static(&[0xff, 0xff]), None);
        db.set(b(b"b"), Bytes::from_static(&[0x0f]), None);
        assert_eq!(db.bitop(BitOp::Or, &b(b"dest"), &[b(b"a"), b(b"b")]).unwrap(), 2);
        assert_eq!(db.get(b"dest").unwrap(), Some(Bytes::from_static(&[0xff, 0xff])));
        assert_eq!(db.bitop(BitOp::Xor, &b(b"dest"), &[b(b"a"), b(b"b")]).unwrap(), 2);
        assert_eq!(db.get(b"dest").unwrap(), Some(Bytes::from_static(&[0xf0, 0xff])));
    }

    #[test]
    fn bitop_not_single_source_only() {
        let db = db();
        db.set(b(b"a"), Bytes::from_static(&[0x0f]), None);
        assert_eq!(
            db.bitop(BitOp::Not, &b(b"dest"), &[b(b"a"), b(b"a")]).unwrap_err(),
            StoreError::BitopNot
        );
        assert_eq!(db.bitop(BitOp::Not, &b(b"dest"), &[b(b"a")]).unwrap(), 1);
        assert_eq!(db.get(b"dest").unwrap(), Some(Bytes::from_static(&[0xf0])));
    }

    #[test]
    fn bitop_all_empty_removes_dest() {
        let db = db();
        db.set(b(b"dest"), b(b"old"), None);
        assert_eq!(db.bitop(BitOp::Or, &b(b"dest"), &[b(b"missing")]).unwrap(), 0);
        assert_eq!(db.exists(&[b(b"dest")]), 0);
    }
}
