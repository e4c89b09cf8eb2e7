//! Cache engine error types.

use progcache_store::StoreError;
use thiserror::Error;

use crate::CacheHandle;

/// Boxed runtime error carried by [`CacheError::Compile`] and
/// [`CacheError::Runtime`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Handle does not name an open cache.
    #[error("Invalid cache handle: {0}")]
    InvalidHandle(CacheHandle),

    /// Request rejected before any I/O or compilation.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Storage failure.
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Stored entry exists but cannot be turned into a program.
    #[error("Corrupted cache entry {key}: {reason}")]
    CorruptEntry { key: String, reason: String },

    /// Tag lookup found nothing to load.
    #[error("No cached program for tag '{0}'")]
    TagNotFound(String),

    /// Program has no binary for a device, e.g. it was never built.
    #[error("Program has no binary for device {0}")]
    MissingBinary(String),

    /// The runtime rejected the source.
    #[error("Compilation failed: {0}")]
    Compile(#[source] BoxError),

    /// The runtime failed outside compilation.
    #[error("Runtime error: {0}")]
    Runtime(#[source] BoxError),

    /// No handle values are left in the registry.
    #[error("Cache registry is full")]
    RegistryFull,
}

impl CacheError {
    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Creates a corrupted entry error.
    pub fn corrupt_entry(key: impl ToString, reason: impl ToString) -> Self {
        Self::CorruptEntry {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Wraps a runtime compile failure.
    pub fn compile(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Compile(Box::new(error))
    }

    /// Wraps any other runtime failure.
    pub fn runtime(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Runtime(Box::new(error))
    }

    /// Returns true for filesystem failures.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Store(StoreError::Io(_)))
    }
}
