//! Warmup command implementation

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use miette::{IntoDiagnostic, Result, miette};
use progcache_core::{CacheEngine, CacheRegistry};
use rayon::prelude::*;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::compiler::ProcessCompiler;
use crate::config::{CONFIG_FILE, Config};

pub fn run_warmup(
    config: &Config,
    cache_dir: &Path,
    dir: &Path,
    recursive: bool,
    extension: Option<&str>,
    options: Option<&str>,
) -> Result<bool> {
    let compiler = config.compiler.as_ref().ok_or_else(|| {
        miette!(
            "No compiler configured. Add a \"compiler\" section to {}.",
            CONFIG_FILE
        )
    })?;
    if !dir.is_dir() {
        return Err(miette!("{} is not a directory", dir.display()));
    }

    let extension = extension.unwrap_or(&config.extension);
    let options = options.or(config.options.as_deref());
    let kernels = find_kernels(dir, recursive, extension)?;
    if kernels.is_empty() {
        warn!("No .{} files found in {}", extension, dir.display());
        return Ok(false);
    }

    let registry = Arc::new(CacheRegistry::new());
    let handle = registry.create_cache(cache_dir).into_diagnostic()?;
    let engine = CacheEngine::new(registry, ProcessCompiler::new(compiler));
    let devices = &compiler.devices;

    info!("Warming up {} kernels into {}", kernels.len(), cache_dir.display());

    let results: Vec<(&PathBuf, Result<(), String>)> = kernels
        .par_iter()
        .map(|path| {
            let outcome = fs::read_to_string(path)
                .map_err(|e| e.to_string())
                .and_then(|source| {
                    engine
                        .get_with_options(handle, &source, devices, &(), options)
                        .map(|_| ())
                        .map_err(|e| e.to_string())
                });
            (path, outcome)
        })
        .collect();

    let mut failed = 0;
    for (path, outcome) in &results {
        match outcome {
            Ok(()) => println!("ok     {}", path.display()),
            Err(e) => {
                failed += 1;
                println!("failed {}", path.display());
                warn!("{}: {}", path.display(), e);
            }
        }
    }

    info!("{}", engine.stats());
    info!(
        "{} of {} kernels cached",
        results.len() - failed,
        results.len()
    );
    Ok(failed > 0)
}

/// Kernel sources under `dir` with the given extension, sorted by path.
fn find_kernels(dir: &Path, recursive: bool, extension: &str) -> Result<Vec<PathBuf>> {
    let max_depth = if recursive { usize::MAX } else { 1 };

    let mut kernels = Vec::new();
    for entry in WalkDir::new(dir).max_depth(max_depth).sort_by_file_name() {
        let entry = entry.into_diagnostic()?;
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|e| e == extension)
        {
            kernels.push(entry.into_path());
        }
    }
    Ok(kernels)
}
