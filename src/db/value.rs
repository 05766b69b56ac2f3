mod sorted_set;

pub use sorted_set::{Insertion, SortedSet};

use crate::StoreError;
use crate::stream::Stream;
use bytes::Bytes;
use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use std::collections::VecDeque;
use triomphe::Arc;

pub type Hash = HashMap<Bytes, Bytes>;
pub type List = VecDeque<Bytes>;
pub type Set = HashSet<Bytes>;

/// A stream value shares ownership between the key map and in-flight
/// readers, and carries the per-stream lock of the two-level locking
/// scheme.
pub type SharedStream = Arc<Mutex<Stream>>;

/// A value in a database, one of six kinds. Type checks live here; the
/// payloads are plain collections.
#[derive(Debug)]
pub enum Value {
    Hash(Box<Hash>),
    List(Box<List>),
    Set(Box<Set>),
    SortedSet(Box<SortedSet>),
    Stream(SharedStream),
    String(Bytes),
}

impl Value {
    pub fn hash() -> Self {
        Value::Hash(Box::default())
    }

    pub fn list() -> Self {
        Value::List(Box::default())
    }

    pub fn set() -> Self {
        Value::Set(Box::default())
    }

    pub fn sorted_set() -> Self {
        Value::SortedSet(Box::default())
    }

    pub fn stream() -> Self {
        Value::Stream(Arc::new(Mutex::new(Stream::default())))
    }

    /// The kind name reported by TYPE.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Hash(_) => "hash",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::SortedSet(_) => "zset",
            Value::Stream(_) => "stream",
            Value::String(_) => "string",
        }
    }

    pub fn as_hash(&self) -> Result<&Hash, StoreError> {
        match self {
            Value::Hash(hash) => Ok(hash),
            _ => Err(StoreError::WrongType),
        }
    }

    pub fn mut_hash(&mut self) -> Result<&mut Hash, StoreError> {
        match self {
            Value::Hash(hash) => Ok(hash),
            _ => Err(StoreError::WrongType),
        }
    }

    pub fn as_list(&self) -> Result<&List, StoreError> {
        match self {
            Value::List(list) => Ok(list),
            _ => Err(StoreError::WrongType),
        }
    }

    pub fn mut_list(&mut self) -> Result<&mut List, StoreError> {
        match self {
            Value::List(list) => Ok(list),
            _ => Err(StoreError::WrongType),
        }
    }

    pub fn as_set(&self) -> Result<&Set, StoreError> {
        match self {
            Value::Set(set) => Ok(set),
            _ => Err(StoreError::WrongType),
        }
    }

    pub fn mut_set(&mut self) -> Result<&mut Set, StoreError> {
        match self {
            Value::Set(set) => Ok(set),
            _ => Err(StoreError::WrongType),
        }
    }

    pub fn as_sorted_set(&self) -> Result<&SortedSet, StoreError> {
        match self {
            Value::SortedSet(set) => Ok(set),
            _ => Err(StoreError::WrongType),
        }
    }

    pub fn mut_sorted_set(&mut self) -> Result<&mut SortedSet, StoreError> {
        match self {
            Value::SortedSet(set) => Ok(set),
            _ => Err(StoreError::WrongType),
        }
    }

    pub fn as_stream(&self) -> Result<&SharedStream, StoreError> {
        match self {
            Value::Stream(stream) => Ok(stream),
            _ => Err(StoreError::WrongType),
        }
    }

    pub fn as_string(&self) -> Result<&Bytes, StoreError> {
        match self {
            Value::String(string) => Ok(string),
            _ => Err(StoreError::WrongType),
        }
    }

    pub fn mut_string(&mut self) -> Result<&mut Bytes, StoreError> {
        match self {
            Value::String(string) => Ok(string),
            _ => Err(StoreError::WrongType),
        }
    }
}

impl From<Bytes> for Value {
    fn from(value: Bytes) -> Self {
        Value::String(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::String(value.into())
    }
}
