//! Handle-and-null calling surface.
//!
//! [`ProgramCache`] exposes the engine the way foreign callers expect it:
//! raw `u32` handles with a sentinel, and `None` where they expect a null
//! program. Every error is logged before it is dropped.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::{CacheEngine, CacheError, CacheHandle, CacheRegistry, CompileAdapter};

/// Handle value returned when a cache could not be opened.
pub const INVALID_HANDLE: u32 = u32::MAX;

pub struct ProgramCache<A: CompileAdapter> {
    engine: CacheEngine<A>,
}

impl<A: CompileAdapter> ProgramCache<A> {
    /// Uses the process-wide registry.
    pub fn new(adapter: A) -> Self {
        Self::with_registry(CacheRegistry::global(), adapter)
    }

    pub fn with_registry(registry: Arc<CacheRegistry>, adapter: A) -> Self {
        Self {
            engine: CacheEngine::new(registry, adapter),
        }
    }

    pub fn engine(&self) -> &CacheEngine<A> {
        &self.engine
    }

    /// Opens the cache rooted at `path`, creating it if needed.
    /// Returns [`INVALID_HANDLE`] on failure.
    pub fn create_cache_from_filesystem(&self, path: impl AsRef<Path>) -> u32 {
        let path = path.as_ref();
        match self.engine.registry().create_cache(path) {
            Ok(handle) => handle.as_raw(),
            Err(e) => {
                warn!("Failed to open cache at {}: {}", path.display(), e);
                INVALID_HANDLE
            }
        }
    }

    pub fn get(
        &self,
        handle: u32,
        source: &str,
        devices: &[A::Device],
        context: &A::Context,
    ) -> Option<A::Program> {
        report(
            self.engine
                .get(CacheHandle::from_raw(handle), source, devices, context),
        )
    }

    pub fn get_with_options(
        &self,
        handle: u32,
        source: &str,
        devices: &[A::Device],
        context: &A::Context,
        options: Option<&str>,
    ) -> Option<A::Program> {
        report(self.engine.get_with_options(
            CacheHandle::from_raw(handle),
            source,
            devices,
            context,
            options,
        ))
    }

    pub fn get_with_tag(
        &self,
        handle: u32,
        tag: &str,
        devices: &[A::Device],
        context: &A::Context,
    ) -> Option<A::Program> {
        report(
            self.engine
                .get_with_tag(CacheHandle::from_raw(handle), tag, devices, context),
        )
    }

    pub fn put_with_tag<'p>(
        &self,
        handle: u32,
        tag: &str,
        devices: &[A::Device],
        program: &'p A::Program,
    ) -> Option<&'p A::Program> {
        report(
            self.engine
                .put_with_tag(CacheHandle::from_raw(handle), tag, devices, program),
        )
    }
}

fn report<T>(result: Result<T, CacheError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        // Probing for a tag that was never stored is routine.
        Err(e @ CacheError::TagNotFound(_)) => {
            debug!("{}", e);
            None
        }
        Err(e) => {
            warn!("{}", e);
            None
        }
    }
}
