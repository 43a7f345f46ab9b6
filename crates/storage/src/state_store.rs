// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! STATE.json persistence and milestone archival.

use crate::atomic::{read_json, write_json, FsError};
use crate::paths::WorkspacePaths;
use relais_core::{MilestoneId, WorkspaceState};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error(transparent)]
    Fs(#[from] FsError),
}

/// Reads and atomically rewrites the workspace ledger.
#[derive(Debug, Clone)]
pub struct StateStore {
    paths: WorkspacePaths,
}

impl StateStore {
    pub fn new(paths: WorkspacePaths) -> Self {
        Self { paths }
    }

    /// Load STATE.json, or the default ledger when the file is absent.
    ///
    /// A present-but-corrupt file is an error; preflight's crash recovery
    /// surfaces it rather than silently starting over.
    pub fn load(&self) -> Result<WorkspaceState, StateStoreError> {
        let path = self.paths.state();
        if !path.exists() {
            return Ok(WorkspaceState::default());
        }
        Ok(read_json(&path)?)
    }

    /// Atomically rewrite STATE.json.
    pub fn save(&self, state: &WorkspaceState) -> Result<(), StateStoreError> {
        write_json(&self.paths.state(), state)?;
        Ok(())
    }

    /// Archive the departing milestone's ledger and reset the counters for
    /// `next`. Used by the autonomous loop on milestone change.
    pub fn archive_and_reset(
        &self,
        state: &mut WorkspaceState,
        next: &MilestoneId,
    ) -> Result<(), StateStoreError> {
        if let Some(departing) = state.milestone_id.clone() {
            let archive = self
                .paths
                .milestone_archive_dir()
                .join(format!("{}.json", departing));
            write_json(&archive, state)?;
            info!(milestone = %departing, archive = %archive.display(), "archived milestone ledger");
        }
        state.ensure_milestone(next);
        self.save(state)
    }
}

#[cfg(test)]
#[path = "state_store_tests.rs"]
mod tests;
