use crate::StoreError;
use bytes::Bytes;

/// A typed reply frame. The wire codec that turns these into RESP bytes
/// lives outside this crate; `Push` carries server-originated messages
/// such as pub/sub deliveries.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Frame {
    Simple(&'static str),
    Error(String),
    Integer(i64),
    Bulk(Bytes),
    Array(Vec<Frame>),
    Null,
    Push(Vec<Frame>),
}

impl From<i64> for Frame {
    fn from(value: i64) -> Self {
        Frame::Integer(value)
    }
}

impl From<usize> for Frame {
    fn from(value: usize) -> Self {
        Frame::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<Bytes> for Frame {
    fn from(value: Bytes) -> Self {
        Frame::Bulk(value)
    }
}

impl From<&Bytes> for Frame {
    fn from(value: &Bytes) -> Self {
        Frame::Bulk(value.clone())
    }
}

impl From<&'static str> for Frame {
    fn from(value: &'static str) -> Self {
        Frame::Simple(value)
    }
}

impl From<Vec<Frame>> for Frame {
    fn from(value: Vec<Frame>) -> Self {
        Frame::Array(value)
    }
}

impl From<StoreError> for Frame {
    fn from(error: StoreError) -> Self {
        Frame::Error(error.to_string())
    }
}

impl<T: Into<Frame>> From<Option<T>> for Frame {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => value.into(),
            None => Frame::Null,
        }
    }
}
