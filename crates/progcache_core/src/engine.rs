//! Compile-on-miss program cache.

use std::sync::Arc;

use progcache_store::{BinaryStore, CacheEntry, DeviceBinary};
use tracing::{debug, info, warn};

use crate::stats::Counters;
use crate::{
    CacheError, CacheHandle, CacheKey, CacheRegistry, CacheStats, CompileAdapter, DeviceSignature,
    KeyDeriver,
};

/// Looks programs up in registered caches and compiles them on a miss.
///
/// The engine holds no lock of its own. Concurrent misses for the same key
/// each compile and each write; the last completed write is what stays on
/// disk, and every caller gets a usable program.
pub struct CacheEngine<A: CompileAdapter> {
    registry: Arc<CacheRegistry>,
    adapter: A,
    counters: Counters,
}

impl<A: CompileAdapter> CacheEngine<A> {
    /// Creates an engine resolving handles through `registry`.
    pub fn new(registry: Arc<CacheRegistry>, adapter: A) -> Self {
        Self {
            registry,
            adapter,
            counters: Counters::default(),
        }
    }

    pub fn registry(&self) -> &Arc<CacheRegistry> {
        &self.registry
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Counters accumulated since the engine was created.
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    /// Returns the program built from `source` with no options.
    pub fn get(
        &self,
        handle: CacheHandle,
        source: &str,
        devices: &[A::Device],
        context: &A::Context,
    ) -> Result<A::Program, CacheError> {
        self.get_with_options(handle, source, devices, context, None)
    }

    /// Returns the program built from `source` with `options`.
    ///
    /// A stored entry that cannot be used is logged and rebuilt. A compile
    /// failure is returned as is and nothing is written. Failing to store
    /// the fresh binaries only costs a warning.
    pub fn get_with_options(
        &self,
        handle: CacheHandle,
        source: &str,
        devices: &[A::Device],
        context: &A::Context,
        options: Option<&str>,
    ) -> Result<A::Program, CacheError> {
        let (store, signature) = self.prepare(handle, devices)?;
        let key = KeyDeriver::derive(source, options, &signature);

        match self.load(store.as_ref(), &key, &signature, devices, context) {
            Ok(Some(program)) => {
                self.counters.hit();
                debug!("Cache hit for {}", key);
                return Ok(program);
            }
            Ok(None) => {
                self.counters.miss();
                debug!("Cache miss for {}", key);
            }
            Err(e) => {
                self.counters.miss();
                self.record_failure(&e);
                warn!("Discarding cache entry {}: {}", key, e);
            }
        }

        let program = self
            .adapter
            .compile(context, devices, source, options.unwrap_or_default())
            .map_err(|e| {
                self.counters.compile_failed();
                CacheError::compile(e)
            })?;
        self.counters.compiled();

        if let Err(e) = self.persist(store.as_ref(), &key, &signature, &program) {
            self.record_failure(&e);
            warn!("Failed to cache {}: {}", key, e);
        }

        Ok(program)
    }

    /// Loads the program stored under `tag`. Never compiles.
    ///
    /// Unlike the derived-key lookups, unreadable or corrupted entries are
    /// reported to the caller.
    pub fn get_with_tag(
        &self,
        handle: CacheHandle,
        tag: &str,
        devices: &[A::Device],
        context: &A::Context,
    ) -> Result<A::Program, CacheError> {
        let (store, signature) = self.prepare(handle, devices)?;
        let key = KeyDeriver::tag(tag, &signature);

        match self.load(store.as_ref(), &key, &signature, devices, context) {
            Ok(Some(program)) => {
                self.counters.hit();
                debug!("Cache hit for tag '{}'", tag);
                Ok(program)
            }
            Ok(None) => {
                self.counters.miss();
                Err(CacheError::TagNotFound(tag.to_string()))
            }
            Err(e) => {
                self.counters.miss();
                self.record_failure(&e);
                Err(e)
            }
        }
    }

    /// Stores the binaries of `program` under `tag`, replacing any previous
    /// entry for the same tag and devices.
    pub fn put_with_tag<'p>(
        &self,
        handle: CacheHandle,
        tag: &str,
        devices: &[A::Device],
        program: &'p A::Program,
    ) -> Result<&'p A::Program, CacheError> {
        let (store, signature) = self.prepare(handle, devices)?;
        let key = KeyDeriver::tag(tag, &signature);

        self.persist(store.as_ref(), &key, &signature, program)
            .inspect_err(|e| self.record_failure(e))?;

        info!("Stored program under tag '{}'", tag);
        Ok(program)
    }

    /// Validates the request and resolves everything a lookup needs.
    /// Nothing touches the store or the compiler before this succeeds.
    fn prepare(
        &self,
        handle: CacheHandle,
        devices: &[A::Device],
    ) -> Result<(Arc<dyn BinaryStore>, DeviceSignature), CacheError> {
        if devices.is_empty() {
            return Err(CacheError::invalid_argument(
                "at least one device is required",
            ));
        }

        let store = self.registry.resolve(handle)?;

        let identities = devices
            .iter()
            .map(|device| {
                self.adapter
                    .device_identity(device)
                    .map_err(CacheError::runtime)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let signature = DeviceSignature::from_identities(&identities)?;

        Ok((store, signature))
    }

    fn load(
        &self,
        store: &dyn BinaryStore,
        key: &CacheKey,
        signature: &DeviceSignature,
        devices: &[A::Device],
        context: &A::Context,
    ) -> Result<Option<A::Program>, CacheError> {
        let Some(bytes) = store.read(&key.entry_id())? else {
            return Ok(None);
        };

        let entry = CacheEntry::decode(&bytes).map_err(|e| CacheError::corrupt_entry(key, e))?;

        if !entry.is_valid(signature.as_str(), &self.adapter.runtime_fingerprint()) {
            return Err(CacheError::corrupt_entry(
                key,
                "entry was built for other devices or another runtime",
            ));
        }
        if entry.binaries.len() != devices.len() {
            return Err(CacheError::corrupt_entry(
                key,
                format!(
                    "entry holds {} binaries for {} devices",
                    entry.binaries.len(),
                    devices.len()
                ),
            ));
        }

        let program = self
            .adapter
            .from_binaries(context, devices, &entry.blobs())
            .map_err(|e| CacheError::corrupt_entry(key, e))?;

        Ok(Some(program))
    }

    fn persist(
        &self,
        store: &dyn BinaryStore,
        key: &CacheKey,
        signature: &DeviceSignature,
        program: &A::Program,
    ) -> Result<(), CacheError> {
        let blobs = self
            .adapter
            .binaries(program)
            .map_err(CacheError::runtime)?;

        if blobs.len() != signature.device_count() {
            return Err(CacheError::invalid_argument(format!(
                "program has {} binaries for {} devices",
                blobs.len(),
                signature.device_count()
            )));
        }

        let mut binaries = Vec::with_capacity(blobs.len());
        for (device, bytes) in signature.devices().iter().zip(blobs) {
            if bytes.is_empty() {
                return Err(CacheError::MissingBinary(device.clone()));
            }
            binaries.push(DeviceBinary::new(device.as_str(), bytes));
        }

        let entry = CacheEntry::new(
            signature.as_str(),
            self.adapter.runtime_fingerprint(),
            binaries,
        );
        store.write(&key.entry_id(), &entry.encode()?)?;

        debug!("Stored {} ({} bytes)", key, entry.binary_size());
        Ok(())
    }

    fn record_failure(&self, error: &CacheError) {
        match error {
            CacheError::CorruptEntry { .. } => self.counters.corrupt(),
            CacheError::Store(_) => self.counters.store_failed(),
            _ => {}
        }
    }
}

impl<A: CompileAdapter + std::fmt::Debug> std::fmt::Debug for CacheEngine<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEngine")
            .field("registry", &self.registry)
            .field("adapter", &self.adapter)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeviceIdentity;
    use progcache_store::{EntryId, MemoryStore};
    use std::io;

    /// Adapter that fails the test if the engine ever builds or loads.
    struct NeverBuilds;

    impl CompileAdapter for NeverBuilds {
        type Device = &'static str;
        type Context = ();
        type Program = Vec<Vec<u8>>;
        type Error = io::Error;

        fn device_identity(&self, device: &&'static str) -> Result<DeviceIdentity, io::Error> {
            if device.is_empty() {
                return Err(io::Error::other("device lost"));
            }
            Ok(DeviceIdentity::new("test", *device, "", ""))
        }

        fn compile(
            &self,
            _: &(),
            _: &[&'static str],
            _: &str,
            _: &str,
        ) -> io::Result<Self::Program> {
            panic!("compile must not be called");
        }

        fn binaries(&self, program: &Self::Program) -> io::Result<Vec<Vec<u8>>> {
            Ok(program.clone())
        }

        fn from_binaries(
            &self,
            _: &(),
            _: &[&'static str],
            _: &[&[u8]],
        ) -> io::Result<Self::Program> {
            panic!("from_binaries must not be called");
        }
    }

    fn engine() -> (CacheEngine<NeverBuilds>, CacheHandle, Arc<MemoryStore>) {
        let registry = Arc::new(CacheRegistry::new());
        let store = Arc::new(MemoryStore::new());
        let handle = registry.register(store.clone()).unwrap();
        (CacheEngine::new(registry, NeverBuilds), handle, store)
    }

    #[test]
    fn test_invalid_handle_never_compiles() {
        let (engine, _, _) = engine();

        let err = engine
            .get(CacheHandle::INVALID, "K1", &["D0"], &())
            .unwrap_err();
        assert!(matches!(err, CacheError::InvalidHandle(_)));
    }

    #[test]
    fn test_empty_device_list_never_compiles() {
        let (engine, handle, store) = engine();

        let err = engine.get(handle, "K1", &[], &()).unwrap_err();
        assert!(matches!(err, CacheError::InvalidArgument(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_device_identity_failure_is_runtime_error() {
        let (engine, handle, _) = engine();

        let err = engine.get(handle, "K1", &[""], &()).unwrap_err();
        assert!(matches!(err, CacheError::Runtime(_)));
    }

    #[test]
    fn test_missing_tag_is_reported() {
        let (engine, handle, _) = engine();

        let err = engine.get_with_tag(handle, "tag_test", &["D0"], &()).unwrap_err();
        assert!(matches!(err, CacheError::TagNotFound(ref t) if t == "tag_test"));
        assert_eq!(engine.stats().misses, 1);
    }

    #[test]
    fn test_put_with_tag_writes_tagged_entry() {
        let (engine, handle, store) = engine();
        let program = vec![b"bin".to_vec()];

        let returned = engine.put_with_tag(handle, "v1", &["D0"], &program).unwrap();

        assert!(std::ptr::eq(returned, &program));
        let keys = store.keys().unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].name().starts_with("v1@"));
    }

    #[test]
    fn test_put_with_tag_rejects_unbuilt_program() {
        let (engine, handle, store) = engine();
        let program = vec![b"bin".to_vec(), Vec::new()];

        let err = engine
            .put_with_tag(handle, "v1", &["D0", "D1"], &program)
            .unwrap_err();

        assert!(matches!(err, CacheError::MissingBinary(ref d) if d.contains("D1")));
        assert!(store.is_empty());
    }

    #[test]
    fn test_put_with_tag_rejects_binary_count_mismatch() {
        let (engine, handle, store) = engine();
        let program = vec![b"bin".to_vec()];

        let err = engine
            .put_with_tag(handle, "v1", &["D0", "D1"], &program)
            .unwrap_err();

        assert!(matches!(err, CacheError::InvalidArgument(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_corrupt_tag_entry_is_surfaced() {
        let (engine, handle, store) = engine();
        let program = vec![b"bin".to_vec()];
        engine.put_with_tag(handle, "v1", &["D0"], &program).unwrap();

        let id: EntryId = store.keys().unwrap().remove(0);
        store.write(&id, b"garbage").unwrap();

        let err = engine.get_with_tag(handle, "v1", &["D0"], &()).unwrap_err();
        assert!(matches!(err, CacheError::CorruptEntry { .. }));
        assert_eq!(engine.stats().corrupt_entries, 1);
    }
}
