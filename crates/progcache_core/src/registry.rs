//! Table of open caches addressed by small integer handles.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use progcache_store::{BinaryStore, FileSystemStore};
use tracing::debug;

use crate::CacheError;

/// Identifies an open cache within one [`CacheRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheHandle(u32);

impl CacheHandle {
    /// Sentinel meaning "no cache". Never handed out by a registry.
    pub const INVALID: CacheHandle = CacheHandle(u32::MAX);

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> u32 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }
}

impl fmt::Display for CacheHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct RegistryInner {
    next: u32,
    caches: BTreeMap<CacheHandle, Arc<dyn BinaryStore>>,
}

/// Maps handles to stores.
///
/// Opening caches is expected to happen at startup, so a plain mutex is
/// enough. The lock is only held to insert or clone out a store; no I/O
/// or compilation happens under it. Handles are never reused, even after
/// [`close`](Self::close).
pub struct CacheRegistry {
    inner: Mutex<RegistryInner>,
}

static GLOBAL: OnceLock<Arc<CacheRegistry>> = OnceLock::new();

impl CacheRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                next: 0,
                caches: BTreeMap::new(),
            }),
        }
    }

    /// Process-wide registry, created on first use.
    pub fn global() -> Arc<CacheRegistry> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(CacheRegistry::new())))
    }

    /// Opens (creating if needed) a filesystem cache rooted at `path` and
    /// registers it. Opening the same path twice gives two handles over
    /// the same entries.
    pub fn create_cache(&self, path: impl AsRef<Path>) -> Result<CacheHandle, CacheError> {
        let store = FileSystemStore::open(path.as_ref())?;
        self.register(Arc::new(store))
    }

    /// Registers an already opened store.
    pub fn register(&self, store: Arc<dyn BinaryStore>) -> Result<CacheHandle, CacheError> {
        let mut inner = self.inner.lock();
        let handle = CacheHandle(inner.next);
        if !handle.is_valid() {
            return Err(CacheError::RegistryFull);
        }

        debug!("Registered cache {} at {}", handle, store.location());
        inner.next += 1;
        inner.caches.insert(handle, store);
        Ok(handle)
    }

    /// Returns the store behind `handle`.
    pub fn resolve(&self, handle: CacheHandle) -> Result<Arc<dyn BinaryStore>, CacheError> {
        self.inner
            .lock()
            .caches
            .get(&handle)
            .cloned()
            .ok_or(CacheError::InvalidHandle(handle))
    }

    /// Forgets `handle`. Stored entries are left untouched.
    pub fn close(&self, handle: CacheHandle) -> bool {
        self.inner.lock().caches.remove(&handle).is_some()
    }

    /// Currently open handles, ascending.
    pub fn handles(&self) -> Vec<CacheHandle> {
        self.inner.lock().caches.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().caches.is_empty()
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("handles", &self.handles())
            .finish()
    }
}
