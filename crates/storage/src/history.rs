// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retention for per-tick artifacts under `history/ticks/`.
//!
//! Entries are evicted oldest-first (by directory mtime) until both the
//! entry-count and total-byte caps hold.

use relais_core::HistoryConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("cannot enforce history retention in {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Enforce the retention caps over `ticks_dir`. Returns the evicted paths.
///
/// A missing directory is fine (nothing retained yet). An unreadable one
/// is an error that the caller maps to a blocked verdict.
pub fn enforce_retention(
    ticks_dir: &Path,
    config: &HistoryConfig,
) -> Result<Vec<PathBuf>, HistoryError> {
    if !ticks_dir.exists() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(ticks_dir).map_err(|source| HistoryError::Unreadable {
        path: ticks_dir.to_path_buf(),
        source,
    })?;

    // (mtime, path, bytes), oldest first after sort.
    let mut tick_dirs: Vec<(SystemTime, PathBuf, u64)> = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let mtime = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        tick_dirs.push((mtime, path.clone(), dir_size(&path)));
    }
    tick_dirs.sort_by_key(|(mtime, _, _)| *mtime);

    let mut total_bytes: u64 = tick_dirs.iter().map(|(_, _, b)| b).sum();
    let mut count = tick_dirs.len();
    let mut evicted = Vec::new();

    for (_, path, bytes) in tick_dirs {
        if count <= config.max_entries && total_bytes <= config.max_total_bytes {
            break;
        }
        match fs::remove_dir_all(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "evicted history entry");
                count -= 1;
                total_bytes = total_bytes.saturating_sub(bytes);
                evicted.push(path);
            }
            Err(source) => {
                warn!(path = %path.display(), error = %source, "failed to evict history entry");
                return Err(HistoryError::Unreadable { path, source });
            }
        }
    }

    Ok(evicted)
}

fn dir_size(path: &Path) -> u64 {
    let mut total = 0;
    let Ok(entries) = fs::read_dir(path) else {
        return 0;
    };
    for entry in entries.flatten() {
        let p = entry.path();
        if p.is_dir() {
            total += dir_size(&p);
        } else if let Ok(meta) = entry.metadata() {
            total += meta.len();
        }
    }
    total
}

#[cfg(test)]
#[path = "history_tests.rs"]
mod tests;
