// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exclusive workspace lock.
//!
//! The kernel advisory lock (fs2) is the liveness oracle: it is released
//! automatically when the owner dies, so a successful `try_lock_exclusive`
//! proves no live owner exists. The JSON body {pid, boot id, acquired at}
//! is diagnostic: it names the holder when acquisition fails and lets a
//! stale takeover (dead owner, or a previous boot) be logged.

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Contents of the lock file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    #[serde(default)]
    pub boot_id: String,
    pub acquired_at: DateTime<Utc>,
}

/// Lock acquisition failures.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock held by pid {pid}")]
    Held { pid: u32 },
    #[error("lock file {0} is held but unreadable")]
    Corrupt(PathBuf),
    #[error("lock io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An acquired workspace lock. Released (and the file removed) on
/// [`WorkspaceLock::release`] or drop.
#[derive(Debug)]
pub struct WorkspaceLock {
    path: PathBuf,
    file: Option<File>,
    info: LockInfo,
}

impl WorkspaceLock {
    /// Acquire the lock at `path`.
    ///
    /// Fails `Held` when a live process holds it, `Corrupt` when it is held
    /// but the body is unreadable, `Io` otherwise.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        let io = |source: std::io::Error| LockError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io)?;
        }

        // Open without truncating so a failed try_lock does not wipe the
        // running owner's body.
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(io)?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.kind() == std::io::ErrorKind::WouldBlock {
                let mut body = String::new();
                let _ = file.seek(SeekFrom::Start(0));
                let _ = file.read_to_string(&mut body);
                return match serde_json::from_str::<LockInfo>(&body) {
                    Ok(owner) => Err(LockError::Held { pid: owner.pid }),
                    Err(_) => Err(LockError::Corrupt(path.to_path_buf())),
                };
            }
            return Err(io(e));
        }

        // We hold the lock. A leftover body means the previous owner died
        // (or the machine rebooted) without releasing.
        let mut previous = String::new();
        let _ = file.seek(SeekFrom::Start(0));
        let _ = file.read_to_string(&mut previous);
        if !previous.trim().is_empty() {
            match serde_json::from_str::<LockInfo>(&previous) {
                Ok(stale) => warn!(
                    stale_pid = stale.pid,
                    stale_boot_id = %stale.boot_id,
                    "taking over stale lock"
                ),
                Err(_) => warn!(path = %path.display(), "taking over corrupt lock file"),
            }
        }

        let info = LockInfo {
            pid: std::process::id(),
            boot_id: current_boot_id(),
            acquired_at: Utc::now(),
        };
        let body = serde_json::to_string_pretty(&info).unwrap_or_default();
        file.set_len(0).map_err(io)?;
        file.seek(SeekFrom::Start(0)).map_err(io)?;
        file.write_all(body.as_bytes()).map_err(io)?;
        file.write_all(b"\n").map_err(io)?;
        file.sync_all().map_err(io)?;

        debug!(path = %path.display(), pid = info.pid, "lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            info,
        })
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock and remove the file. Best-effort; errors are logged.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = fs2::FileExt::unlock(&file) {
                warn!(path = %self.path.display(), error = %e, "failed to unlock lock file");
            }
            drop(file);
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), error = %e, "failed to remove lock file");
                }
            }
            debug!(path = %self.path.display(), "lock released");
        }
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        self.release_inner();
    }
}

/// Boot id of the current kernel; distinguishes stale locks across reboots.
fn current_boot_id() -> String {
    std::fs::read_to_string("/proc/sys/kernel/random/boot_id")
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
