//! # progcache_core
//!
//! Compile-on-miss cache for GPU program binaries.
//!
//! This crate provides:
//! - [`KeyDeriver`]: content-hash and tag keys scoped by a [`DeviceSignature`]
//! - [`CacheRegistry`]: small integer [`CacheHandle`]s for opened cache roots
//! - [`CompileAdapter`]: the seam to the native compute runtime
//! - [`CacheEngine`]: get / get-with-options / get-with-tag / put-with-tag
//! - [`ProgramCache`]: the same operations behind a sentinel-value surface
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use progcache_core::{CacheEngine, CacheRegistry};
//!
//! let registry = Arc::new(CacheRegistry::new());
//! let handle = registry.create_cache("/tmp/kernels")?;
//! let engine = CacheEngine::new(registry, runtime);
//!
//! // Compiles on the first call, loads the stored binaries afterwards.
//! let program = engine.get(handle, KERNEL_SOURCE, &devices, &context)?;
//! ```

mod adapter;
mod boundary;
mod device;
mod engine;
mod error;
mod key;
mod registry;
mod stats;

pub use adapter::CompileAdapter;
pub use boundary::{INVALID_HANDLE, ProgramCache};
pub use device::{DeviceIdentity, DeviceSignature};
pub use engine::CacheEngine;
pub use error::{BoxError, CacheError};
pub use key::{CacheKey, KeyDeriver};
pub use registry::{CacheHandle, CacheRegistry};
pub use stats::CacheStats;

pub use progcache_store::{
    BinaryStore, CacheEntry, EntryId, FileSystemStore, MemoryStore, Namespace, StoreError,
    StoreStats,
};
