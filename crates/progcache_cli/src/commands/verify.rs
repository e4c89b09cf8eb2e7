//! Verify command implementation

use std::path::Path;
use std::time::Duration;

use miette::{IntoDiagnostic, Result};
use progcache_core::{BinaryStore, CacheEntry, FileSystemStore};
use tracing::{info, warn};

/// Temporary files younger than this may belong to a running writer.
const PARTIAL_GRACE: Duration = Duration::from_secs(60 * 60);

/// Decodes every entry. Returns true if corrupted entries remain.
pub fn run_verify(cache_dir: &Path, prune: bool) -> Result<bool> {
    let store = FileSystemStore::open(cache_dir).into_diagnostic()?;
    let keys = store.keys().into_diagnostic()?;

    let mut corrupt = 0;
    for id in &keys {
        let Some(bytes) = store.read(id).into_diagnostic()? else {
            // Removed since listing.
            continue;
        };
        if let Err(e) = CacheEntry::decode(&bytes) {
            corrupt += 1;
            println!("corrupt {}: {}", id, e);
            if prune {
                store.delete(id).into_diagnostic()?;
            }
        }
    }

    if prune {
        let swept = store.sweep_partials(PARTIAL_GRACE).into_diagnostic()?;
        if swept > 0 {
            info!("Removed {} stale temporary files", swept);
        }
    }

    if corrupt == 0 {
        info!("{} entries verified", keys.len());
        Ok(false)
    } else if prune {
        info!("Pruned {} of {} entries", corrupt, keys.len());
        Ok(false)
    } else {
        warn!(
            "{} of {} entries are corrupted; run with --prune to remove them",
            corrupt,
            keys.len()
        );
        Ok(true)
    }
}
