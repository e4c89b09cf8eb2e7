//! The blob store abstraction.

use std::fmt;
use std::path::{Component, Path};
use std::time::Duration;

use crate::StoreError;

/// Key namespace. Derived and tagged entries never share a directory,
/// so equal names in different namespaces are different entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    /// Entries addressed by a content hash.
    Derived,
    /// Entries addressed by a caller-supplied tag.
    Tagged,
}

impl Namespace {
    /// All namespaces, in listing order.
    pub const ALL: [Namespace; 2] = [Namespace::Derived, Namespace::Tagged];

    /// Directory name used for this namespace under a store root.
    pub fn dir_name(self) -> &'static str {
        match self {
            Namespace::Derived => "derived",
            Namespace::Tagged => "tagged",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Opaque identifier of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId {
    namespace: Namespace,
    name: String,
}

impl EntryId {
    /// Creates an id in the given namespace.
    pub fn new(namespace: Namespace, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: name.into(),
        }
    }

    /// Shorthand for a derived-namespace id.
    pub fn derived(name: impl Into<String>) -> Self {
        Self::new(Namespace::Derived, name)
    }

    /// Shorthand for a tagged-namespace id.
    pub fn tagged(name: impl Into<String>) -> Self {
        Self::new(Namespace::Tagged, name)
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Checks that the name is a single normal path component that does
    /// not collide with the temporary-file naming scheme.
    pub fn validate(&self) -> Result<(), StoreError> {
        let path = Path::new(&self.name);
        let mut components = path.components();
        let single = match (components.next(), components.next()) {
            (Some(Component::Normal(c)), None) => c == self.name.as_str(),
            _ => false,
        };

        if !single || self.name.starts_with('.') {
            return Err(StoreError::invalid_id(self.to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Aggregate figures about a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of stored entries.
    pub entry_count: usize,
    /// Sum of the stored blob sizes.
    pub total_size_bytes: u64,
    /// Age of the oldest entry, if any entry exists.
    pub oldest_entry_age: Option<Duration>,
}

/// Raw byte-blob persistence keyed by [`EntryId`].
///
/// Implementations must make `write` atomic with respect to `read`: a
/// concurrent reader sees either the previous blob, the new blob, or no
/// blob, never a partial one. A store is shared between threads, so all
/// methods take `&self`.
pub trait BinaryStore: Send + Sync + fmt::Debug {
    /// Returns true if a blob is stored under `id`.
    fn exists(&self, id: &EntryId) -> bool;

    /// Reads the blob stored under `id`, or `None` if there is none.
    fn read(&self, id: &EntryId) -> Result<Option<Vec<u8>>, StoreError>;

    /// Stores `bytes` under `id`, replacing any previous blob.
    fn write(&self, id: &EntryId, bytes: &[u8]) -> Result<(), StoreError>;

    /// Removes the blob under `id`. Returns whether something was removed.
    fn delete(&self, id: &EntryId) -> Result<bool, StoreError>;

    /// Lists every stored id, sorted.
    fn keys(&self) -> Result<Vec<EntryId>, StoreError>;

    /// Computes aggregate figures.
    fn stats(&self) -> Result<StoreStats, StoreError>;

    /// Removes every stored blob. Returns the number removed.
    fn clear(&self) -> Result<usize, StoreError>;

    /// Removes temporary files abandoned by interrupted writers that are
    /// older than `grace`. Returns the number removed.
    fn sweep_partials(&self, _grace: Duration) -> Result<usize, StoreError> {
        Ok(0)
    }

    /// Human readable location, used in logs.
    fn location(&self) -> String;
}
