// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator-produced task model.
//!
//! One task is planned per tick. The shape is validated twice: against the
//! JSON schema at the adapter boundary, and structurally here via
//! [`Task::validate`], which enforces the kind invariants the schema cannot
//! express.

use crate::{MilestoneId, TaskId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// What kind of work this tick performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Run the builder and judge the resulting diff.
    Execute,
    /// Run verification only; the worktree must not change.
    VerifyOnly,
    /// Surface a question to the human; no work is performed.
    Question,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Execute => write!(f, "execute"),
            TaskKind::VerifyOnly => write!(f, "verify_only"),
            TaskKind::Question => write!(f, "question"),
        }
    }
}

/// Path scope the builder's diff must stay inside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskScope {
    #[serde(default)]
    pub allowed_globs: Vec<String>,
    #[serde(default)]
    pub forbidden_globs: Vec<String>,
    #[serde(default)]
    pub allow_new_files: bool,
    #[serde(default)]
    pub allow_lockfile_changes: bool,
}

/// Per-task diff caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDiffLimits {
    pub max_files: u32,
    pub max_lines: u32,
}

/// Ordered verification plan for the tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TaskVerification {
    /// Template ids run first, in order.
    #[serde(default)]
    pub fast: Vec<String>,
    /// Template ids run only when every fast template passes.
    #[serde(default)]
    pub slow: Vec<String>,
    /// Values substituted into template `{{name}}` placeholders.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

/// How the builder is driven for an execute task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuilderMode {
    ClaudeCode,
    Patch,
    CursorAgent,
    External,
}

impl fmt::Display for BuilderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuilderMode::ClaudeCode => write!(f, "claude_code"),
            BuilderMode::Patch => write!(f, "patch"),
            BuilderMode::CursorAgent => write!(f, "cursor_agent"),
            BuilderMode::External => write!(f, "external"),
        }
    }
}

/// Builder directive carried by an execute task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskBuilder {
    pub mode: BuilderMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,
    pub instructions: String,
    /// Literal patch text for `patch` mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
}

/// Orchestrator control directive (alternative to a builder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskControl {
    pub action: ControlAction,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    Continue,
    Stop,
}

/// Question payload for a question-kind task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskQuestion {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
}

/// The plan for a single tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub milestone_id: MilestoneId,
    pub kind: TaskKind,
    pub intent: String,
    pub scope: TaskScope,
    pub diff_limits: TaskDiffLimits,
    #[serde(default)]
    pub verification: TaskVerification,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builder: Option<TaskBuilder>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control: Option<TaskControl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<TaskQuestion>,
    /// Free-form planning metadata, passed through to the report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planning: Option<serde_json::Value>,
}

/// Structural invariant violations in a parsed task.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskShapeError {
    #[error("execute task requires a builder")]
    ExecuteWithoutBuilder,
    #[error("task carries both a builder and a control directive")]
    BuilderAndControl,
    #[error("verify_only task must not carry a builder")]
    VerifyOnlyWithBuilder,
    #[error("question task requires a question payload")]
    QuestionWithoutQuestion,
    #[error("question task must not carry a builder")]
    QuestionWithBuilder,
    #[error("patch-mode builder requires patch text")]
    PatchWithoutPatchText,
    #[error("non-patch builder must not carry patch text")]
    PatchTextWithoutPatchMode,
}

impl Task {
    /// Enforce the kind invariants.
    ///
    /// execute ⇒ exactly one of builder or control; verify_only ⇒ no
    /// builder; question ⇒ question payload present, no builder.
    pub fn validate(&self) -> Result<(), TaskShapeError> {
        if self.builder.is_some() && self.control.is_some() {
            return Err(TaskShapeError::BuilderAndControl);
        }
        match self.kind {
            TaskKind::Execute => {
                if self.builder.is_none() && self.control.is_none() {
                    return Err(TaskShapeError::ExecuteWithoutBuilder);
                }
            }
            TaskKind::VerifyOnly => {
                if self.builder.is_some() {
                    return Err(TaskShapeError::VerifyOnlyWithBuilder);
                }
            }
            TaskKind::Question => {
                if self.question.is_none() {
                    return Err(TaskShapeError::QuestionWithoutQuestion);
                }
                if self.builder.is_some() {
                    return Err(TaskShapeError::QuestionWithBuilder);
                }
            }
        }
        if let Some(builder) = &self.builder {
            match builder.mode {
                BuilderMode::Patch => {
                    if builder.patch.is_none() {
                        return Err(TaskShapeError::PatchWithoutPatchText);
                    }
                }
                _ => {
                    if builder.patch.is_some() {
                        return Err(TaskShapeError::PatchTextWithoutPatchMode);
                    }
                }
            }
        }
        Ok(())
    }

    /// Canonical form used for fingerprinting: stable-serialized JSON with
    /// planning metadata stripped.
    pub fn canonical_json(&self) -> String {
        let mut clone = self.clone();
        clone.planning = None;
        serde_json::to_string(&clone).unwrap_or_default()
    }
}

/// Result record written by the builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BuilderResult {
    pub summary: String,
    #[serde(default)]
    pub files_intended: Vec<String>,
    #[serde(default)]
    pub commands_ran: Vec<String>,
    #[serde(default)]
    pub notes: Vec<String>,
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
