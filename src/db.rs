mod bitmap;
mod hash;
mod keys;
mod list;
mod set;
mod sorted_set;
mod stream;
mod string;
mod value;

pub use bitmap::BitOp;
pub use hash::HScanPage;
pub use value::{Hash, Insertion, List, Set, SharedStream, SortedSet, Value};

use crate::stream::Blocked;
use crate::{StoreConfig, StoreError, now_ms};
use bytes::Bytes;
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// One stored object: a value plus its optional expiry instant in epoch
/// milliseconds. The instant is mirrored in the database's expiry map.
#[derive(Debug)]
pub(crate) struct Object {
    pub value: Value,
    pub expires_at: Option<u64>,
}

impl Object {
    fn new(value: Value) -> Self {
        Object {
            value,
            expires_at: None,
        }
    }
}

/// A numbered database: a key map with per-key expiry, shared between
/// connections behind one readers-writer lock. Reads take the lock
/// shared, mutations exclusive; streams add a second, per-value lock.
pub struct Db {
    index: usize,
    pub(crate) config: StoreConfig,
    inner: RwLock<DbInner>,

    /// Parked blocking stream readers. Locked after `inner` and any
    /// per-stream lock, never before.
    pub(crate) blocked: Mutex<Blocked>,
}

pub(crate) struct DbInner {
    objects: HashMap<Bytes, Object>,
    expires: HashMap<Bytes, u64>,
}

impl Db {
    pub(crate) fn new(index: usize, config: StoreConfig) -> Self {
        Db {
            index,
            config,
            inner: RwLock::new(DbInner {
                objects: HashMap::new(),
                expires: HashMap::new(),
            }),
            blocked: Mutex::new(Blocked::default()),
        }
    }

    /// This database's slot number.
    pub fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, DbInner> {
        self.inner.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, DbInner> {
        self.inner.write()
    }

    /// Drop every key in this database.
    pub fn flush(&self) {
        let mut inner = self.write();
        inner.objects.clear();
        inner.expires.clear();
    }

    /// Remove every expired entry. Reads already treat expired keys as
    /// missing; this reclaims their memory and is meant to be driven by
    /// an external timer.
    pub fn cleanup_expired(&self) -> usize {
        let now = now_ms();
        let mut inner = self.write();
        let expired: Vec<Bytes> = inner
            .expires
            .iter()
            .filter(|&(_, &at)| at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            inner.objects.remove(key);
            inner.expires.remove(key);
        }
        if !expired.is_empty() {
            tracing::debug!(db = self.index, removed = expired.len(), "expired keys swept");
        }
        expired.len()
    }
}

impl DbInner {
    fn is_expired(&self, key: &[u8], now: u64) -> bool {
        match self.expires.get(key) {
            Some(&at) => at <= now,
            None => false,
        }
    }

    /// Get the value for `key`, unless it has expired.
    pub fn get(&self, key: &[u8], now: u64) -> Option<&Value> {
        if self.is_expired(key, now) {
            None
        } else {
            self.objects.get(key).map(|object| &object.value)
        }
    }

    /// Get the mutable value for `key`, removing it first if expired.
    pub fn get_mut(&mut self, key: &[u8], now: u64) -> Option<&mut Value> {
        if self.is_expired(key, now) {
            self.remove(key, now);
            return None;
        }
        self.objects.get_mut(key).map(|object| &mut object.value)
    }

    pub fn contains(&self, key: &[u8], now: u64) -> bool {
        !self.is_expired(key, now) && self.objects.contains_key(key)
    }

    /// Insert or overwrite `key`, replacing any expiry with `expires_at`.
    pub fn set(&mut self, key: Bytes, value: Value, expires_at: Option<u64>) {
        match expires_at {
            Some(at) => self.expires.insert(key.clone(), at),
            None => self.expires.remove(&key),
        };
        self.objects.insert(
            key,
            Object {
                value,
                expires_at,
            },
        );
    }

    /// Remove `key`. Returns the live value, or `None` when the key was
    /// missing or already expired.
    pub fn remove(&mut self, key: &[u8], now: u64) -> Option<Value> {
        let expired = self.is_expired(key, now);
        self.expires.remove(key);
        let object = self.objects.remove(key)?;
        if expired {
            None
        } else {
            Some(object.value)
        }
    }

    /// Set the expiry of a present, unexpired key.
    pub fn expire(&mut self, key: &[u8], at: u64, now: u64) -> bool {
        if self.is_expired(key, now) {
            self.remove(key, now);
            return false;
        }
        let Some((key, _)) = self.objects.get_key_value(key) else {
            return false;
        };
        let key = key.clone();
        if let Some(object) = self.objects.get_mut(&key) {
            object.expires_at = Some(at);
        }
        self.expires.insert(key, at);
        true
    }

    /// Clear the expiry of `key`. Returns whether one was cleared.
    pub fn persist(&mut self, key: &[u8], now: u64) -> bool {
        if self.is_expired(key, now) {
            self.remove(key, now);
            return false;
        }
        if let Some(object) = self.objects.get_mut(key) {
            object.expires_at = None;
        }
        self.expires.remove(key).is_some()
    }

    /// The expiry instant of a live key.
    pub fn expires_at(&self, key: &[u8], now: u64) -> Option<u64> {
        if self.is_expired(key, now) {
            None
        } else {
            self.expires.get(key).copied()
        }
    }

    /// Live keys, in no particular order.
    pub fn keys(&self, now: u64) -> impl Iterator<Item = &Bytes> {
        self.objects
            .keys()
            .filter(move |key| !self.is_expired(key, now))
    }

    /// The number of live keys.
    pub fn len(&self, now: u64) -> usize {
        self.keys(now).count()
    }

    /// Fetch-or-create for write paths: removes an expired entry, then
    /// hands back the object for `key`, inserting `default()` if absent.
    fn entry_or_insert_with(
        &mut self,
        key: &Bytes,
        now: u64,
        default: impl FnOnce() -> Value,
    ) -> &mut Object {
        if self.is_expired(key, now) {
            self.remove(key, now);
        }
        self.objects
            .entry(key.clone())
            .or_insert_with(|| Object::new(default()))
    }

    pub fn get_hash(&self, key: &[u8], now: u64) -> Result<Option<&Hash>, StoreError> {
        self.get(key, now).map(Value::as_hash).transpose()
    }

    pub fn mut_hash(&mut self, key: &[u8], now: u64) -> Result<Option<&mut Hash>, StoreError> {
        self.get_mut(key, now).map(Value::mut_hash).transpose()
    }

    pub fn hash_or_default(&mut self, key: &Bytes, now: u64) -> Result<&mut Hash, StoreError> {
        self.entry_or_insert_with(key, now, Value::hash)
            .value
            .mut_hash()
    }

    pub fn get_list(&self, key: &[u8], now: u64) -> Result<Option<&List>, StoreError> {
        self.get(key, now).map(Value::as_list).transpose()
    }

    pub fn mut_list(&mut self, key: &[u8], now: u64) -> Result<Option<&mut List>, StoreError> {
        self.get_mut(key, now).map(Value::mut_list).transpose()
    }

    pub fn list_or_default(&mut self, key: &Bytes, now: u64) -> Result<&mut List, StoreError> {
        self.entry_or_insert_with(key, now, Value::list)
            .value
            .mut_list()
    }

    pub fn get_set(&self, key: &[u8], now: u64) -> Result<Option<&Set>, StoreError> {
        self.get(key, now).map(Value::as_set).transpose()
    }

    pub fn mut_set(&mut self, key: &[u8], now: u64) -> Result<Option<&mut Set>, StoreError> {
        self.get_mut(key, now).map(Value::mut_set).transpose()
    }

    pub fn set_or_default(&mut self, key: &Bytes, now: u64) -> Result<&mut Set, StoreError> {
        self.entry_or_insert_with(key, now, Value::set)
            .value
            .mut_set()
    }

    pub fn get_sorted_set(&self, key: &[u8], now: u64) -> Result<Option<&SortedSet>, StoreError> {
        self.get(key, now).map(Value::as_sorted_set).transpose()
    }

    pub fn mut_sorted_set(
        &mut self,
        key: &[u8],
        now: u64,
    ) -> Result<Option<&mut SortedSet>, StoreError> {
        self.get_mut(key, now).map(Value::mut_sorted_set).transpose()
    }

    pub fn sorted_set_or_default(
        &mut self,
        key: &Bytes,
        now: u64,
    ) -> Result<&mut SortedSet, StoreError> {
        self.entry_or_insert_with(key, now, Value::sorted_set)
            .value
            .mut_sorted_set()
    }

    pub fn get_string(&self, key: &[u8], now: u64) -> Result<Option<&Bytes>, StoreError> {
        self.get(key, now).map(Value::as_string).transpose()
    }

    pub fn get_stream(&self, key: &[u8], now: u64) -> Result<Option<SharedStream>, StoreError> {
        self.get(key, now)
            .map(|value| value.as_stream().cloned())
            .transpose()
    }

    pub fn stream_or_default(&mut self, key: &Bytes, now: u64) -> Result<SharedStream, StoreError> {
        self.entry_or_insert_with(key, now, Value::stream)
            .value
            .as_stream()
            .cloned()
    }
}
