// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace artifact layout.
//!
//! Everything the runner owns lives under the workspace directory:
//!
//! ```text
//! STATE.json          workspace state, atomic rewrite each tick
//! REPORT.json         canonical last-tick report
//! REPORT.md           human-rendered report (optional)
//! BLOCKED.json        present iff last verdict = blocked
//! FACTS.md            user-authored context, read-only to the runner
//! lock.json           advisory lock file
//! prompts/*.txt       prompt templates
//! schemas/*.json      JSON schemas for tasks/results
//! history/**          per-tick artifacts, size-capped
//! ```

use std::path::{Path, PathBuf};

/// Resolved paths of the runner-owned workspace artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePaths {
    root: PathBuf,
    lockfile: String,
}

impl WorkspacePaths {
    pub fn new(workspace_root: impl Into<PathBuf>, lockfile: impl Into<String>) -> Self {
        Self {
            root: workspace_root.into(),
            lockfile: lockfile.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state(&self) -> PathBuf {
        self.root.join("STATE.json")
    }

    pub fn report(&self) -> PathBuf {
        self.root.join("REPORT.json")
    }

    pub fn report_md(&self) -> PathBuf {
        self.root.join("REPORT.md")
    }

    pub fn blocked(&self) -> PathBuf {
        self.root.join("BLOCKED.json")
    }

    pub fn facts(&self) -> PathBuf {
        self.root.join("FACTS.md")
    }

    pub fn lock(&self) -> PathBuf {
        self.root.join(&self.lockfile)
    }

    pub fn prompts_dir(&self) -> PathBuf {
        self.root.join("prompts")
    }

    pub fn prompt(&self, name: &str) -> PathBuf {
        self.prompts_dir().join(name)
    }

    pub fn schemas_dir(&self) -> PathBuf {
        self.root.join("schemas")
    }

    pub fn schema(&self, name: &str) -> PathBuf {
        self.schemas_dir().join(name)
    }

    pub fn history_dir(&self) -> PathBuf {
        self.root.join("history")
    }

    pub fn milestone_archive_dir(&self) -> PathBuf {
        self.history_dir().join("milestones")
    }

    /// Per-tick artifact directory under history/.
    pub fn tick_dir(&self, run_id: &str) -> PathBuf {
        self.history_dir().join("ticks").join(run_id)
    }

    /// Scratch exchange files for external builder agents.
    pub fn exchange_dir(&self) -> PathBuf {
        self.root.join("exchange")
    }

    /// Runner-owned JSON files validated during crash recovery.
    pub fn runner_json_files(&self) -> Vec<PathBuf> {
        vec![self.state(), self.report(), self.blocked()]
    }
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
