//! Shared test runtime.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use progcache_core::{CacheEngine, CacheHandle, CacheRegistry, CompileAdapter, DeviceIdentity};
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeDevice(pub String);

pub fn device(name: &str) -> FakeDevice {
    FakeDevice(name.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeProgram {
    pub binaries: Vec<Vec<u8>>,
    pub from_cache: bool,
}

impl FakeProgram {
    /// A program that exists but was never built for any of its devices.
    pub fn unbuilt(devices: usize) -> Self {
        Self {
            binaries: vec![Vec::new(); devices],
            from_cache: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct FakeError(pub String);

/// Runtime that "compiles" by formatting its inputs into the binary, and
/// counts every compile and materialization.
#[derive(Debug, Default)]
pub struct FakeRuntime {
    compiles: AtomicUsize,
    materializations: AtomicUsize,
    reject_binaries: AtomicBool,
    fingerprint: String,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fingerprint(fingerprint: &str) -> Self {
        Self {
            fingerprint: fingerprint.to_string(),
            ..Self::default()
        }
    }

    pub fn compiles(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }

    pub fn materializations(&self) -> usize {
        self.materializations.load(Ordering::SeqCst)
    }

    /// Makes every following `from_binaries` call fail.
    pub fn reject_binaries(&self, reject: bool) {
        self.reject_binaries.store(reject, Ordering::SeqCst);
    }

    pub fn binary_for(device: &FakeDevice, options: &str, source: &str) -> Vec<u8> {
        format!("BIN[{}|{}|{}]", device.0, options, source).into_bytes()
    }
}

impl CompileAdapter for FakeRuntime {
    type Device = FakeDevice;
    type Context = ();
    type Program = FakeProgram;
    type Error = FakeError;

    fn device_identity(&self, device: &FakeDevice) -> Result<DeviceIdentity, FakeError> {
        Ok(DeviceIdentity::new("fake", &device.0, "fake-platform", "1.0"))
    }

    fn runtime_fingerprint(&self) -> String {
        self.fingerprint.clone()
    }

    fn compile(
        &self,
        _context: &(),
        devices: &[FakeDevice],
        source: &str,
        options: &str,
    ) -> Result<FakeProgram, FakeError> {
        if source.contains("syntax error") {
            return Err(FakeError("1:1: error: syntax error".to_string()));
        }

        self.compiles.fetch_add(1, Ordering::SeqCst);
        Ok(FakeProgram {
            binaries: devices
                .iter()
                .map(|d| Self::binary_for(d, options, source))
                .collect(),
            from_cache: false,
        })
    }

    fn binaries(&self, program: &FakeProgram) -> Result<Vec<Vec<u8>>, FakeError> {
        Ok(program.binaries.clone())
    }

    fn from_binaries(
        &self,
        _context: &(),
        devices: &[FakeDevice],
        binaries: &[&[u8]],
    ) -> Result<FakeProgram, FakeError> {
        if self.reject_binaries.load(Ordering::SeqCst) {
            return Err(FakeError("CL_INVALID_BINARY".to_string()));
        }
        if binaries.len() != devices.len() {
            return Err(FakeError("binary count mismatch".to_string()));
        }

        self.materializations.fetch_add(1, Ordering::SeqCst);
        Ok(FakeProgram {
            binaries: binaries.iter().map(|b| b.to_vec()).collect(),
            from_cache: true,
        })
    }
}

/// Engine over a fresh filesystem cache in a temporary directory.
pub struct Harness {
    pub dir: TempDir,
    pub handle: CacheHandle,
    pub engine: CacheEngine<FakeRuntime>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_runtime(FakeRuntime::new())
    }

    pub fn with_runtime(runtime: FakeRuntime) -> Self {
        let dir = TempDir::new().unwrap();
        let registry = Arc::new(CacheRegistry::new());
        let handle = registry.create_cache(dir.path()).unwrap();
        Self {
            dir,
            handle,
            engine: CacheEngine::new(registry, runtime),
        }
    }

    pub fn runtime(&self) -> &FakeRuntime {
        self.engine.adapter()
    }

    /// Files currently stored in `namespace`, by file name.
    pub fn files_in(&self, namespace: &str) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.dir.path().join(namespace))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}
