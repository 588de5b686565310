//! Registry of values pinned by host code.
//!
//! Keys are issued from a monotonically increasing counter and are never
//! reused, so a stale key held by host code can only ever miss; it cannot
//! alias a newer entry.

use crate::value::Value;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::fmt;
use std::num::NonZeroU64;
use std::rc::Rc;

/// Opaque key into the [`Registry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistryKey(NonZeroU64);

impl RegistryKey {
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ref#{}", self.0)
    }
}

/// Releases scheduled by owners that are dropped without access to the
/// runtime. The runtime drains the queue before it touches the registry.
#[derive(Debug, Clone, Default)]
pub struct ReleaseQueue(Rc<RefCell<Vec<RegistryKey>>>);

impl ReleaseQueue {
    pub fn schedule(&self, key: RegistryKey) {
        self.0.borrow_mut().push(key);
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    fn take(&self) -> Vec<RegistryKey> {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

#[derive(Debug)]
pub struct Registry {
    entries: FxHashMap<RegistryKey, Value>,
    next: NonZeroU64,
    pending: ReleaseQueue,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
            next: NonZeroU64::MIN,
            pending: ReleaseQueue::default(),
        }
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin a value and return a fresh key for it.
    pub fn insert(&mut self, value: Value) -> RegistryKey {
        self.drain_pending();
        let key = RegistryKey(self.next);
        self.next = self.next.saturating_add(1);
        self.entries.insert(key, value);
        key
    }

    pub fn get(&self, key: RegistryKey) -> Option<&Value> {
        self.entries.get(&key)
    }

    /// Unpin a value. Releasing a key twice returns `None` the second time.
    pub fn release(&mut self, key: RegistryKey) -> Option<Value> {
        self.drain_pending();
        let released = self.entries.remove(&key);
        if released.is_none() {
            log::warn!("registry: {} released twice or never issued", key);
        }
        released
    }

    pub fn release_queue(&self) -> ReleaseQueue {
        self.pending.clone()
    }

    /// Apply releases scheduled through the queue.
    pub fn drain_pending(&mut self) {
        for key in self.pending.take() {
            if self.entries.remove(&key).is_some() {
                log::debug!("registry: released {} from queue", key);
            }
        }
    }

    pub fn contains(&self, key: RegistryKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.values()
    }
}
