//! Stats, list and clear command implementations

use std::path::Path;

use miette::{IntoDiagnostic, Result};
use progcache_core::{BinaryStore, FileSystemStore, Namespace};
use tracing::info;

pub fn run_stats(cache_dir: &Path) -> Result<()> {
    let store = FileSystemStore::open(cache_dir).into_diagnostic()?;
    let stats = store.stats().into_diagnostic()?;
    let keys = store.keys().into_diagnostic()?;

    println!("Cache:   {}", store.location());
    println!("Entries: {}", stats.entry_count);
    for namespace in Namespace::ALL {
        let count = keys.iter().filter(|k| k.namespace() == namespace).count();
        println!("  {:<7} {}", namespace.dir_name(), count);
    }
    println!("Size:    {}", format_size(stats.total_size_bytes));
    if let Some(age) = stats.oldest_entry_age {
        println!("Oldest:  {}s", age.as_secs());
    }
    Ok(())
}

pub fn run_list(cache_dir: &Path) -> Result<()> {
    let store = FileSystemStore::open(cache_dir).into_diagnostic()?;
    for id in store.keys().into_diagnostic()? {
        println!("{}", id);
    }
    Ok(())
}

pub fn run_clear(cache_dir: &Path) -> Result<()> {
    let store = FileSystemStore::open(cache_dir).into_diagnostic()?;
    let removed = store.clear().into_diagnostic()?;
    info!("Removed {} entries from {}", removed, cache_dir.display());
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
