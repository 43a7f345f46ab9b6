// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! BLOCKED.json lifecycle: written when a tick blocks, cleared at the
//! start of the next successful tick.

use crate::atomic::{read_json, write_json, FsError};
use crate::paths::WorkspacePaths;
use relais_core::BlockedRecord;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct BlockedStore {
    paths: WorkspacePaths,
}

impl BlockedStore {
    pub fn new(paths: WorkspacePaths) -> Self {
        Self { paths }
    }

    pub fn write(&self, record: &BlockedRecord) -> Result<(), FsError> {
        write_json(&self.paths.blocked(), record)
    }

    /// Load the current blocked record, if one exists and parses.
    pub fn load(&self) -> Option<BlockedRecord> {
        let path = self.paths.blocked();
        if !path.exists() {
            return None;
        }
        match read_json(&path) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "unreadable BLOCKED.json");
                None
            }
        }
    }

    /// Remove a stale BLOCKED.json. Missing file is fine.
    pub fn clear(&self) {
        let path = self.paths.blocked();
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "failed to remove BLOCKED.json");
            }
        }
    }
}

#[cfg(test)]
#[path = "blocked_tests.rs"]
mod tests;
