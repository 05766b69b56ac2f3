use crate::StoreError;
use std::fmt;

/// A stream entry id: a millisecond timestamp paired with a sequence
/// number that distinguishes entries from the same millisecond. Ordering
/// is lexicographic over the pair.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

impl StreamId {
    /// The smallest id, also the `-` range sentinel.
    pub const MIN: StreamId = StreamId { ms: 0, seq: 0 };

    /// The largest id, also the `$`/`>`/`+` sentinel.
    pub const MAX: StreamId = StreamId {
        ms: u64::MAX,
        seq: u64::MAX,
    };

    pub fn new(ms: u64, seq: u64) -> Self {
        StreamId { ms, seq }
    }

    /// Generate the id for a new entry appended at `now_ms`, strictly
    /// after `last`. Clock stalls and rewinds fall back to bumping the
    /// sequence of the current top id.
    pub fn generate(last: StreamId, now_ms: u64) -> StreamId {
        if now_ms > last.ms {
            StreamId::new(now_ms, 0)
        } else {
            StreamId::new(last.ms, last.seq.saturating_add(1))
        }
    }

    /// Parse an id argument. `-` is [`StreamId::MIN`]; `$`, `>` and `+`
    /// are [`StreamId::MAX`]; a bare timestamp gets sequence zero.
    pub fn parse(input: &[u8]) -> Result<StreamId, StoreError> {
        match input {
            b"-" => return Ok(StreamId::MIN),
            b"$" | b">" | b"+" => return Ok(StreamId::MAX),
            _ => {}
        }

        let text = std::str::from_utf8(input).map_err(|_| StoreError::StreamId)?;
        match text.split_once('-') {
            Some((ms, seq)) => {
                let ms = ms.parse().map_err(|_| StoreError::StreamId)?;
                let seq = seq.parse().map_err(|_| StoreError::StreamId)?;
                Ok(StreamId::new(ms, seq))
            }
            None => {
                let ms = text.parse().map_err(|_| StoreError::StreamId)?;
                Ok(StreamId::new(ms, 0))
            }
        }
    }

    /// Parse an XADD id argument, where `*` asks the stream to generate
    /// the id.
    pub fn parse_or_auto(input: &[u8]) -> Result<Option<StreamId>, StoreError> {
        if input == b"*" {
            Ok(None)
        } else {
            StreamId::parse(input).map(Some)
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering() {
        assert!(StreamId::new(1, 0) < StreamId::new(1, 1));
        assert!(StreamId::new(1, 9) < StreamId::new(2, 0));
        assert!(StreamId::MIN < StreamId::MAX);
    }

    #[test]
    fn generate_advances_time() {
        let last = StreamId::new(100, 7);
        assert_eq!(StreamId::generate(last, 200), StreamId::new(200, 0));
    }

    #[test]
    fn generate_bumps_sequence_on_stalled_clock() {
        let last = StreamId::new(100, 7);
        assert_eq!(StreamId::generate(last, 100), StreamId::new(100, 8));
        assert_eq!(StreamId::generate(last, 50), StreamId::new(100, 8));
    }

    #[test]
    fn parse_forms() {
        assert_eq!(StreamId::parse(b"-"), Ok(StreamId::MIN));
        assert_eq!(StreamId::parse(b"$"), Ok(StreamId::MAX));
        assert_eq!(StreamId::parse(b">"), Ok(StreamId::MAX));
        assert_eq!(StreamId::parse(b"+"), Ok(StreamId::MAX));
        assert_eq!(StreamId::parse(b"123"), Ok(StreamId::new(123, 0)));
        assert_eq!(StreamId::parse(b"123-4"), Ok(StreamId::new(123, 4)));
        assert_eq!(StreamId::parse(b"abc"), Err(StoreError::StreamId));
        assert_eq!(StreamId::parse(b"1-2-3"), Err(StoreError::StreamId));
    }

    #[test]
    fn parse_auto() {
        assert_eq!(StreamId::parse_or_auto(b"*"), Ok(None));
        assert_eq!(
            StreamId::parse_or_auto(b"5-0"),
            Ok(Some(StreamId::new(5, 0)))
        );
    }

    #[test]
    fn display() {
        assert_eq!(StreamId::new(123, 4).to_string(), "123-4");
    }
}
