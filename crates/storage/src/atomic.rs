// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Atomic file persistence: write to `.tmp`, fsync, rename.
//!
//! Every runner-owned artifact goes through these helpers so a crash at any
//! point leaves either the previous file or the new one, never a torn write.
//! There is no multi-file transaction; write order is chosen by callers so
//! the last-written file witnesses consistency.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Errors from atomic file operations, carrying the offending path.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Serialize `value` as stable-indented JSON with a trailing newline and
/// write it atomically to `path`.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), FsError> {
    let mut rendered =
        serde_json::to_string_pretty(value).map_err(|source| FsError::Serialize {
            path: path.to_path_buf(),
            source,
        })?;
    rendered.push('\n');
    write_bytes(path, rendered.as_bytes())
}

/// Write text (e.g. a rendered markdown report) atomically to `path`.
pub fn write_text(path: &Path, text: &str) -> Result<(), FsError> {
    write_bytes(path, text.as_bytes())
}

fn write_bytes(path: &Path, bytes: &[u8]) -> Result<(), FsError> {
    let wrap = |source: std::io::Error| FsError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(wrap)?;
    }

    let tmp_path = tmp_sibling(path);
    let result = (|| {
        let mut file = File::create(&tmp_path).map_err(wrap)?;
        file.write_all(bytes).map_err(wrap)?;
        file.sync_all().map_err(wrap)?;
        drop(file);
        fs::rename(&tmp_path, path).map_err(wrap)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Read and parse a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, FsError> {
    let text = fs::read_to_string(path).map_err(|source| FsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| FsError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Delete direct entries of `dir` whose names end with `suffix`.
///
/// Individual failures are logged and collected; the scan continues past
/// them. Returns the paths that could not be removed.
pub fn cleanup_temp(dir: &Path, suffix: &str) -> Vec<PathBuf> {
    let mut failed = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "cannot scan for temp files");
            return failed;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let is_match = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(suffix));
        if !is_match || !path.is_file() {
            continue;
        }
        if let Err(e) = fs::remove_file(&path) {
            warn!(path = %path.display(), error = %e, "failed to remove temp file");
            failed.push(path);
        }
    }
    failed
}

/// Safety classification of a cleanup glob pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobSafety {
    Safe,
    /// Unsafe, with the reason it was rejected.
    Unsafe(String),
}

impl GlobSafety {
    pub fn is_safe(&self) -> bool {
        matches!(self, GlobSafety::Safe)
    }
}

/// Classify a delete glob. Patterns that could reach outside the workspace
/// are rejected; deletion is fail-closed on an unsafe pattern.
pub fn glob_safe(pattern: &str) -> GlobSafety {
    let trimmed = pattern.trim();
    if trimmed.is_empty() {
        return GlobSafety::Unsafe("pattern is empty".to_string());
    }
    if pattern.contains("..") {
        return GlobSafety::Unsafe("pattern contains '..'".to_string());
    }
    if pattern.starts_with('/') {
        return GlobSafety::Unsafe("pattern is an absolute path".to_string());
    }
    if pattern.starts_with("\\\\") || pattern.starts_with("//") {
        return GlobSafety::Unsafe("pattern is a UNC path".to_string());
    }
    let bytes = pattern.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        return GlobSafety::Unsafe("pattern starts with a drive letter".to_string());
    }
    GlobSafety::Safe
}

#[cfg(test)]
#[path = "atomic_tests.rs"]
mod tests;
