//! # progcache_store
//!
//! Storage layer for the progcache program binary cache.
//!
//! This crate knows nothing about GPUs or compilers. It persists opaque
//! byte blobs under an [`EntryId`] and defines the on-disk [`CacheEntry`]
//! record that the engine writes into those blobs.
//!
//! ## Storage
//!
//! - [`FileSystemStore`]: one file per entry under `<root>/derived/` or
//!   `<root>/tagged/`. Writes go to a temporary file in the destination
//!   directory and are renamed into place, so readers never see a partial
//!   entry.
//! - [`MemoryStore`]: a volatile map, useful for tests and per-process
//!   memoization.
//!
//! Entries are encoded with `rkyv` behind a small magic/version header.

mod disk;
mod entry;
mod error;
mod memory;
mod store;

pub use disk::FileSystemStore;
pub use entry::{CacheEntry, DeviceBinary, ENTRY_MAGIC, FORMAT_VERSION};
pub use error::StoreError;
pub use memory::MemoryStore;
pub use store::{BinaryStore, EntryId, Namespace, StoreStats};
