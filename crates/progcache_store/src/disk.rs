//! Filesystem-backed blob store.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, info};

use crate::{BinaryStore, EntryId, Namespace, StoreError, StoreStats};

/// Extension of committed entry files.
const ENTRY_EXTENSION: &str = "clbin";

/// Suffix of in-flight temporary files.
const TEMP_SUFFIX: &str = ".tmp";

/// Stores each entry as `<root>/<namespace>/<name>.clbin`.
///
/// A write creates `.<name>.<random>.tmp` next to the destination, syncs it
/// and renames it over the destination. Rename within one directory is
/// atomic on POSIX filesystems, so concurrent readers and writers from any
/// number of processes only ever observe complete entries; the last rename
/// wins.
#[derive(Debug, Clone)]
pub struct FileSystemStore {
    root: PathBuf,
}

impl FileSystemStore {
    /// Opens a store rooted at `root`, creating the directory layout if
    /// it does not exist yet.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        for namespace in Namespace::ALL {
            fs::create_dir_all(root.join(namespace.dir_name()))?;
        }

        info!("Opened program cache at {}", root.display());
        Ok(Self { root })
    }

    /// Root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the committed file for `id`.
    pub fn entry_path(&self, id: &EntryId) -> Result<PathBuf, StoreError> {
        id.validate()?;
        Ok(self
            .namespace_dir(id.namespace())
            .join(format!("{}.{ENTRY_EXTENSION}", id.name())))
    }

    fn namespace_dir(&self, namespace: Namespace) -> PathBuf {
        self.root.join(namespace.dir_name())
    }

    /// Iterates committed entry files of one namespace as `(id, path)`.
    fn entries_in(&self, namespace: Namespace) -> Result<Vec<(EntryId, PathBuf)>, StoreError> {
        let dir = self.namespace_dir(namespace);
        let read_dir = match fs::read_dir(&dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for dir_entry in read_dir {
            let path = dir_entry?.path();
            if !path.extension().is_some_and(|e| e == ENTRY_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem.starts_with('.') {
                continue;
            }
            entries.push((EntryId::new(namespace, stem), path));
        }
        Ok(entries)
    }

    fn is_temp_file(path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.') && n.ends_with(TEMP_SUFFIX))
    }
}

impl BinaryStore for FileSystemStore {
    fn exists(&self, id: &EntryId) -> bool {
        self.entry_path(id).is_ok_and(|path| path.is_file())
    }

    fn read(&self, id: &EntryId) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.entry_path(id)?;
        match fs::read(&path) {
            Ok(bytes) => {
                debug!("Read {} ({} bytes)", id, bytes.len());
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, id: &EntryId, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.entry_path(id)?;
        let dir = self.namespace_dir(id.namespace());
        // The layout may have been removed from under us since `open`.
        fs::create_dir_all(&dir)?;

        let mut temp = tempfile::Builder::new()
            .prefix(&format!(".{}.", id.name()))
            .suffix(TEMP_SUFFIX)
            .tempfile_in(&dir)?;
        temp.write_all(bytes)?;
        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|e| StoreError::Io(e.error))?;

        debug!("Wrote {} ({} bytes)", id, bytes.len());
        Ok(())
    }

    fn delete(&self, id: &EntryId) -> Result<bool, StoreError> {
        let path = self.entry_path(id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<EntryId>, StoreError> {
        let mut keys = Vec::new();
        for namespace in Namespace::ALL {
            keys.extend(self.entries_in(namespace)?.into_iter().map(|(id, _)| id));
        }
        keys.sort();
        Ok(keys)
    }

    fn stats(&self) -> Result<StoreStats, StoreError> {
        let mut stats = StoreStats::default();
        let mut oldest: Option<SystemTime> = None;

        for namespace in Namespace::ALL {
            for (_, path) in self.entries_in(namespace)? {
                // Entries may disappear between listing and stat.
                let Ok(meta) = fs::metadata(&path) else {
                    continue;
                };
                stats.entry_count += 1;
                stats.total_size_bytes += meta.len();
                if let Ok(modified) = meta.modified() {
                    oldest = Some(match oldest {
                        Some(prev) if prev < modified => prev,
                        _ => modified,
                    });
                }
            }
        }

        stats.oldest_entry_age = oldest.and_then(|t| SystemTime::now().duration_since(t).ok());
        Ok(stats)
    }

    fn clear(&self) -> Result<usize, StoreError> {
        let mut removed = 0;
        for namespace in Namespace::ALL {
            for (_, path) in self.entries_in(namespace)? {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        debug!("Cleared {} entries from {}", removed, self.root.display());
        Ok(removed)
    }

    fn sweep_partials(&self, grace: Duration) -> Result<usize, StoreError> {
        let now = SystemTime::now();
        let mut removed = 0;

        for namespace in Namespace::ALL {
            let read_dir = match fs::read_dir(self.namespace_dir(namespace)) {
                Ok(read_dir) => read_dir,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            for dir_entry in read_dir {
                let path = dir_entry?.path();
                if !Self::is_temp_file(&path) {
                    continue;
                }
                let age = fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|t| now.duration_since(t).ok())
                    .unwrap_or_default();
                if age < grace {
                    continue;
                }
                if fs::remove_file(&path).is_ok() {
                    debug!("Removed abandoned temporary file {}", path.display());
                    removed += 1;
                }
            }
        }

        Ok(removed)
    }

    fn location(&self) -> String {
        self.root.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    fn temp_store() -> (tempfile::TempDir, FileSystemStore) {
        let dir = tempdir().unwrap();
        let store = FileSystemStore::open(dir.path().join("cache")).unwrap();
        (dir, store)
    }

    #[test]
    fn should_create_layout_on_open() {
        let (_dir, store) = temp_store();

        assert!(store.root().join("derived").is_dir());
        assert!(store.root().join("tagged").is_dir());
    }

    #[test]
    fn should_return_none_when_entry_is_missing() {
        let (_dir, store) = temp_store();
        let id = EntryId::derived("missing");

        assert!(!store.exists(&id));
        assert!(store.read(&id).unwrap().is_none());
    }

    #[test]
    fn should_write_and_read_back() {
        let (_dir, store) = temp_store();
        let id = EntryId::derived("abc");

        store.write(&id, b"binary").unwrap();

        assert!(store.exists(&id));
        assert_eq!(store.read(&id).unwrap().unwrap(), b"binary");
        assert!(store.root().join("derived").join("abc.clbin").is_file());
    }

    #[test]
    fn should_overwrite_existing_entry() {
        let (_dir, store) = temp_store();
        let id = EntryId::tagged("kernel@0011");

        store.write(&id, b"first").unwrap();
        store.write(&id, b"second").unwrap();

        assert_eq!(store.read(&id).unwrap().unwrap(), b"second");
        assert_eq!(store.keys().unwrap().len(), 1);
    }

    #[test]
    fn should_keep_namespaces_apart() {
        let (_dir, store) = temp_store();

        store.write(&EntryId::derived("same"), b"derived").unwrap();
        store.write(&EntryId::tagged("same"), b"tagged").unwrap();

        assert_eq!(store.read(&EntryId::derived("same")).unwrap().unwrap(), b"derived");
        assert_eq!(store.read(&EntryId::tagged("same")).unwrap().unwrap(), b"tagged");
    }

    #[test]
    fn should_leave_no_temporary_files_after_write() {
        let (_dir, store) = temp_store();
        store.write(&EntryId::derived("abc"), b"payload").unwrap();

        let names: Vec<_> = fs::read_dir(store.root().join("derived"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();

        assert_eq!(names, vec!["abc.clbin".to_string()]);
    }

    #[test]
    fn should_delete_entry() {
        let (_dir, store) = temp_store();
        let id = EntryId::derived("abc");
        store.write(&id, b"x").unwrap();

        assert!(store.delete(&id).unwrap());
        assert!(!store.delete(&id).unwrap());
        assert!(!store.exists(&id));
    }

    #[test]
    fn should_reject_path_traversal() {
        let (_dir, store) = temp_store();
        let id = EntryId::tagged("../../escape");

        assert!(matches!(
            store.write(&id, b"evil"),
            Err(StoreError::InvalidId(_))
        ));
        assert!(!store.exists(&id));
    }

    #[test]
    fn should_list_keys_sorted_across_namespaces() {
        let (_dir, store) = temp_store();
        store.write(&EntryId::tagged("t@1"), b"1").unwrap();
        store.write(&EntryId::derived("bbb"), b"2").unwrap();
        store.write(&EntryId::derived("aaa"), b"3").unwrap();

        assert_eq!(
            store.keys().unwrap(),
            vec![
                EntryId::derived("aaa"),
                EntryId::derived("bbb"),
                EntryId::tagged("t@1"),
            ]
        );
    }

    #[test]
    fn should_ignore_foreign_files_in_listing() {
        let (_dir, store) = temp_store();
        fs::write(store.root().join("derived").join("notes.txt"), "hi").unwrap();
        fs::write(store.root().join("derived").join(".abc.123.tmp"), "partial").unwrap();

        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn should_report_stats() {
        let (_dir, store) = temp_store();
        store.write(&EntryId::derived("a"), &[0; 10]).unwrap();
        store.write(&EntryId::tagged("b@1"), &[0; 5]).unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.total_size_bytes, 15);
        assert!(stats.oldest_entry_age.is_some());
    }

    #[test]
    fn should_report_empty_stats() {
        let (_dir, store) = temp_store();

        assert_eq!(store.stats().unwrap(), StoreStats::default());
    }

    #[test]
    fn should_clear_all_entries() {
        let (_dir, store) = temp_store();
        store.write(&EntryId::derived("a"), b"1").unwrap();
        store.write(&EntryId::tagged("b@1"), b"2").unwrap();

        assert_eq!(store.clear().unwrap(), 2);
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn should_sweep_abandoned_temporary_files() {
        let (_dir, store) = temp_store();
        let partial = store.root().join("tagged").join(".abc.XYZ.tmp");
        fs::write(&partial, "partial").unwrap();
        store.write(&EntryId::tagged("abc"), b"kept").unwrap();

        assert_eq!(store.sweep_partials(Duration::ZERO).unwrap(), 1);
        assert!(!partial.exists());
        assert!(store.exists(&EntryId::tagged("abc")));
    }

    #[test]
    fn should_not_sweep_recent_temporary_files() {
        let (_dir, store) = temp_store();
        let partial = store.root().join("derived").join(".abc.XYZ.tmp");
        fs::write(&partial, "in flight").unwrap();

        assert_eq!(store.sweep_partials(Duration::from_secs(3600)).unwrap(), 0);
        assert!(partial.exists());
    }

    #[test]
    fn should_recreate_namespace_dir_on_write() {
        let (_dir, store) = temp_store();
        fs::remove_dir_all(store.root().join("derived")).unwrap();

        store.write(&EntryId::derived("abc"), b"x").unwrap();
        assert!(store.exists(&EntryId::derived("abc")));
    }

    #[test]
    fn should_share_entries_between_instances_on_same_root() {
        let (_dir, store) = temp_store();
        let other = FileSystemStore::open(store.root()).unwrap();

        store.write(&EntryId::derived("shared"), b"x").unwrap();
        assert!(other.exists(&EntryId::derived("shared")));
    }
}
