// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runner configuration: loaded once per run, immutable afterwards.
//!
//! The canonical file is `relais.json` at the repository root. The legacy
//! name `claude-relais.json` is accepted and migrated in place on first
//! load: workspace path tokens are rewritten and the canonical file is
//! written next to the legacy one.

use crate::BudgetCaps;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Canonical config file name.
pub const CONFIG_FILE: &str = "relais.json";
/// Legacy config file name, auto-migrated on first load.
pub const LEGACY_CONFIG_FILE: &str = "claude-relais.json";
/// Legacy workspace-path token rewritten during migration.
const LEGACY_WORKSPACE_TOKEN: &str = ".claude-relais";
/// Canonical workspace directory name.
pub const DEFAULT_WORKSPACE_DIR: &str = ".relais";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config not found: neither {CONFIG_FILE} nor {LEGACY_CONFIG_FILE} in {0}")]
    NotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
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
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Crash-cleanup knobs for preflight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashCleanupConfig {
    /// Glob (relative to the workspace dir) of temp files deleted at preflight.
    pub delete_tmp_glob: String,
    /// Parse every runner-owned JSON file during crash recovery.
    #[serde(default)]
    pub validate_runner_json: bool,
}

impl Default for CrashCleanupConfig {
    fn default() -> Self {
        Self {
            delete_tmp_glob: "*.tmp".to_string(),
            validate_runner_json: true,
        }
    }
}

/// Core runner knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Lock file name, relative to the workspace dir.
    #[serde(default = "default_lockfile")]
    pub lockfile: String,
    /// Wall-clock ceiling for a whole tick, in seconds.
    #[serde(default = "default_max_tick_seconds")]
    pub max_tick_seconds: u64,
    /// Globs (relative to the repo root) the runner owns exclusively.
    #[serde(default = "default_runner_owned_globs")]
    pub runner_owned_globs: Vec<String>,
    #[serde(default)]
    pub crash_cleanup: CrashCleanupConfig,
    /// Render REPORT.md alongside REPORT.json.
    #[serde(default = "default_true")]
    pub render_report: bool,
    /// Byte cap for the rendered markdown report.
    #[serde(default = "default_report_byte_cap")]
    pub report_byte_cap: usize,
    /// Require running inside a git repository (preflight check).
    #[serde(default = "default_true")]
    pub require_git: bool,
}

fn default_lockfile() -> String {
    "lock.json".to_string()
}
fn default_max_tick_seconds() -> u64 {
    1800
}
fn default_runner_owned_globs() -> Vec<String> {
    vec![format!("{DEFAULT_WORKSPACE_DIR}/**")]
}
fn default_true() -> bool {
    true
}
fn default_report_byte_cap() -> usize {
    64 * 1024
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            lockfile: default_lockfile(),
            max_tick_seconds: default_max_tick_seconds(),
            runner_owned_globs: default_runner_owned_globs(),
            crash_cleanup: CrashCleanupConfig::default(),
            render_report: true,
            report_byte_cap: default_report_byte_cap(),
            require_git: true,
        }
    }
}

/// External command invoked for a role (planner, reviewer, agent builder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvokerCommand {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Orchestrator (planner) knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub invoker: InvokerCommand,
    /// System prompt template, relative to the workspace prompts dir.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// User prompt template, relative to the workspace prompts dir.
    #[serde(default = "default_user_prompt")]
    pub user_prompt: String,
    /// Task schema file under the workspace schemas dir; embedded default
    /// schema is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_file: Option<String>,
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    #[serde(default = "default_permission_mode")]
    pub permission_mode: String,
    /// Parse/schema-failure retries per planner invocation.
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,
    /// Identical-task redispatch cap before `STOP_REDISPATCH_IDENTICAL_TASK`.
    #[serde(default = "default_redispatch_cap")]
    pub redispatch_cap: u32,
    /// Wall-clock timeout for one planner invocation, in seconds.
    #[serde(default = "default_orchestrator_timeout")]
    pub timeout_seconds: u64,
}

fn default_system_prompt() -> String {
    "orchestrator-system.txt".to_string()
}
fn default_user_prompt() -> String {
    "orchestrator-user.txt".to_string()
}
fn default_max_turns() -> u32 {
    16
}
fn default_permission_mode() -> String {
    "plan".to_string()
}
fn default_retry_budget() -> u32 {
    1
}
fn default_redispatch_cap() -> u32 {
    2
}
fn default_orchestrator_timeout() -> u64 {
    600
}

/// Per-mode builder configuration. A mode missing here blocks tasks that
/// request it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuilderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claude_code: Option<AgentModeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_agent: Option<AgentModeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<AgentModeConfig>,
    /// Wall-clock timeout for one builder invocation, in seconds.
    #[serde(default = "default_builder_timeout")]
    pub timeout_seconds: u64,
}

fn default_builder_timeout() -> u64 {
    1200
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            claude_code: None,
            cursor_agent: None,
            external: None,
            timeout_seconds: default_builder_timeout(),
        }
    }
}

/// Configuration for an external agent builder mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentModeConfig {
    pub invoker: InvokerCommand,
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
}

/// Default task scope applied when the orchestrator omits fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeDefaults {
    #[serde(default)]
    pub allowed_globs: Vec<String>,
    #[serde(default = "default_forbidden_globs")]
    pub forbidden_globs: Vec<String>,
    #[serde(default)]
    pub allow_new_files: bool,
    /// Bare names match by suffix; patterns are glob-matched.
    #[serde(default = "default_lockfiles")]
    pub lockfiles: Vec<String>,
}

fn default_forbidden_globs() -> Vec<String> {
    vec![".git/**".to_string()]
}
fn default_lockfiles() -> Vec<String> {
    vec![
        "Cargo.lock".to_string(),
        "package-lock.json".to_string(),
        "yarn.lock".to_string(),
        "pnpm-lock.yaml".to_string(),
        "poetry.lock".to_string(),
    ]
}

impl Default for ScopeDefaults {
    fn default() -> Self {
        Self {
            allowed_globs: Vec::new(),
            forbidden_globs: default_forbidden_globs(),
            allow_new_files: false,
            lockfiles: default_lockfiles(),
        }
    }
}

/// Hard caps on a builder diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLimits {
    #[serde(default = "default_max_files")]
    pub max_files: u32,
    #[serde(default = "default_max_lines")]
    pub max_lines: u32,
}

fn default_max_files() -> u32 {
    20
}
fn default_max_lines() -> u32 {
    600
}

impl Default for DiffLimits {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            max_lines: default_max_lines(),
        }
    }
}

/// Parameter typing for verification templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    String,
    Path,
    Identifier,
}

/// One named verification command template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    pub cmd: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Declared parameters substitutable into `{{name}}` placeholders.
    #[serde(default)]
    pub params: BTreeMap<String, ParamKind>,
}

/// Verification runner configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// The only supported mode; present in the file for forward compatibility.
    #[serde(default = "default_exec_mode")]
    pub exec_mode: String,
    #[serde(default = "default_max_param_len")]
    pub max_param_len: usize,
    #[serde(default = "default_true")]
    pub reject_whitespace: bool,
    #[serde(default = "default_true")]
    pub reject_dotdot: bool,
    /// Parameter values matching this regex are tainted.
    #[serde(default = "default_metachar_regex")]
    pub metachar_regex: String,
    #[serde(default = "default_fast_timeout")]
    pub fast_timeout_seconds: u64,
    #[serde(default = "default_slow_timeout")]
    pub slow_timeout_seconds: u64,
    #[serde(default)]
    pub templates: BTreeMap<String, CommandTemplate>,
}

fn default_exec_mode() -> String {
    "argv_no_shell".to_string()
}
fn default_max_param_len() -> usize {
    256
}
fn default_metachar_regex() -> String {
    r"[;&|`$<>\\]".to_string()
}
fn default_fast_timeout() -> u64 {
    120
}
fn default_slow_timeout() -> u64 {
    900
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            exec_mode: default_exec_mode(),
            max_param_len: default_max_param_len(),
            reject_whitespace: true,
            reject_dotdot: true,
            metachar_regex: default_metachar_regex(),
            fast_timeout_seconds: default_fast_timeout(),
            slow_timeout_seconds: default_slow_timeout(),
            templates: BTreeMap::new(),
        }
    }
}

/// Reviewer trigger thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Paths (or allowed-glob overlaps) that count as high risk.
    #[serde(default)]
    pub high_risk_globs: Vec<String>,
    /// files/limit or lines/limit ratio at which `diff_near_cap` fires.
    #[serde(default = "default_near_cap_ratio")]
    pub diff_near_cap_ratio: f64,
    /// Tick window for counting repeated stops.
    #[serde(default = "default_stop_window")]
    pub repeated_stop_window: u32,
    /// Stops within the window at which `repeated_stop` fires.
    #[serde(default = "default_stop_max")]
    pub repeated_stop_max: u32,
}

fn default_near_cap_ratio() -> f64 {
    0.8
}
fn default_stop_window() -> u32 {
    5
}
fn default_stop_max() -> u32 {
    3
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            high_risk_globs: Vec::new(),
            diff_near_cap_ratio: default_near_cap_ratio(),
            repeated_stop_window: default_stop_window(),
            repeated_stop_max: default_stop_max(),
        }
    }
}

/// Reviewer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoker: Option<InvokerCommand>,
    #[serde(default = "default_reviewer_prompt")]
    pub prompt: String,
    #[serde(default)]
    pub triggers: TriggerConfig,
    /// Wall-clock timeout for one reviewer invocation, in seconds.
    #[serde(default = "default_reviewer_timeout")]
    pub timeout_seconds: u64,
}

fn default_reviewer_prompt() -> String {
    "reviewer.txt".to_string()
}
fn default_reviewer_timeout() -> u64 {
    300
}

impl Default for ReviewerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            invoker: None,
            prompt: default_reviewer_prompt(),
            triggers: TriggerConfig::default(),
            timeout_seconds: default_reviewer_timeout(),
        }
    }
}

/// How much latitude the runner gives external agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyProfile {
    /// Patch-mode builders only.
    Strict,
    /// claude_code and patch builders.
    #[default]
    Balanced,
    /// Every configured builder mode.
    Fast,
}

impl fmt::Display for AutonomyProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutonomyProfile::Strict => write!(f, "strict"),
            AutonomyProfile::Balanced => write!(f, "balanced"),
            AutonomyProfile::Fast => write!(f, "fast"),
        }
    }
}

/// Autonomy profile plus command-prefix allow/deny lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AutonomyConfig {
    #[serde(default)]
    pub profile: AutonomyProfile,
    #[serde(default)]
    pub allow_command_prefixes: Vec<String>,
    #[serde(default)]
    pub deny_command_prefixes: Vec<String>,
}

impl AutonomyConfig {
    /// Whether the profile permits the given builder mode.
    pub fn allows_mode(&self, mode: crate::BuilderMode) -> bool {
        use crate::BuilderMode::*;
        match self.profile {
            AutonomyProfile::Strict => matches!(mode, Patch),
            AutonomyProfile::Balanced => matches!(mode, Patch | ClaudeCode),
            AutonomyProfile::Fast => true,
        }
    }

    /// Whether a command line is vetoed by the deny prefixes.
    pub fn denies_command(&self, cmd: &str) -> bool {
        self.deny_command_prefixes
            .iter()
            .any(|p| !p.is_empty() && cmd.starts_with(p.as_str()))
    }
}

/// History retention caps for `history/**`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_entries")]
    pub max_entries: usize,
    #[serde(default = "default_history_bytes")]
    pub max_total_bytes: u64,
}

fn default_history_entries() -> usize {
    200
}
fn default_history_bytes() -> u64 {
    64 * 1024 * 1024
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_entries: default_history_entries(),
            max_total_bytes: default_history_bytes(),
        }
    }
}

/// Branch handling per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BranchMode {
    #[default]
    Off,
    PerTick,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchingConfig {
    #[serde(default)]
    pub mode: BranchMode,
    /// Branch name template; `{{task_id}}` is substituted.
    #[serde(default = "default_branch_template")]
    pub name_template: String,
}

fn default_branch_template() -> String {
    "relais/{{task_id}}".to_string()
}

impl Default for BranchingConfig {
    fn default() -> Self {
        Self {
            mode: BranchMode::Off,
            name_template: default_branch_template(),
        }
    }
}

/// The complete runner configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Project goal interpolated into orchestrator prompts.
    #[serde(default)]
    pub project_goal: String,
    /// Workspace directory, relative to the repository root.
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: String,
    #[serde(default)]
    pub runner: RunnerConfig,
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub builder: BuilderConfig,
    #[serde(default)]
    pub scope: ScopeDefaults,
    #[serde(default)]
    pub diff_limits: DiffLimits,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub budgets: BudgetCaps,
    #[serde(default)]
    pub reviewer: ReviewerConfig,
    #[serde(default)]
    pub autonomy: AutonomyConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub branching: BranchingConfig,
}

fn default_workspace_dir() -> String {
    DEFAULT_WORKSPACE_DIR.to_string()
}

impl Config {
    /// Load the config from `root`, migrating the legacy file if present.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let canonical = root.join(CONFIG_FILE);
        if canonical.exists() {
            return Self::read(&canonical);
        }

        let legacy = root.join(LEGACY_CONFIG_FILE);
        if legacy.exists() {
            return Self::migrate_legacy(&legacy, &canonical);
        }

        Err(ConfigError::NotFound(root.to_path_buf()))
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Read the legacy file, rewrite workspace path tokens, write the
    /// canonical file, and load it.
    fn migrate_legacy(legacy: &Path, canonical: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(legacy).map_err(|source| ConfigError::Io {
            path: legacy.to_path_buf(),
            source,
        })?;
        let mut value: serde_json::Value =
            serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                path: legacy.to_path_buf(),
                source,
            })?;
        rewrite_workspace_tokens(&mut value);

        let rendered = serde_json::to_string_pretty(&value).map_err(|source| {
            ConfigError::Parse {
                path: canonical.to_path_buf(),
                source,
            }
        })?;
        // Plain tmp+rename; this is a one-time pre-lock migration.
        let tmp = canonical.with_extension("json.tmp");
        std::fs::write(&tmp, format!("{rendered}\n")).map_err(|source| ConfigError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, canonical).map_err(|source| ConfigError::Io {
            path: canonical.to_path_buf(),
            source,
        })?;
        info!(
            from = %legacy.display(),
            to = %canonical.display(),
            "migrated legacy config"
        );
        Self::read(canonical)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.verification.exec_mode != "argv_no_shell" {
            return Err(ConfigError::Invalid(format!(
                "verification.exec_mode must be \"argv_no_shell\", got {:?}",
                self.verification.exec_mode
            )));
        }
        if !(0.0..=1.0).contains(&self.budgets.warn_at) {
            return Err(ConfigError::Invalid(format!(
                "budgets.warn_at must be within [0, 1], got {}",
                self.budgets.warn_at
            )));
        }
        for (id, template) in &self.verification.templates {
            if template.cmd.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "verification template {id:?} has an empty command"
                )));
            }
            if self.autonomy.denies_command(&template.cmd) {
                return Err(ConfigError::Invalid(format!(
                    "verification template {id:?} command {:?} is denied by the autonomy profile",
                    template.cmd
                )));
            }
        }
        Ok(())
    }

    /// Absolute workspace directory under `root`.
    pub fn workspace_path(&self, root: &Path) -> PathBuf {
        root.join(&self.workspace_dir)
    }
}

/// Rewrite legacy workspace path tokens in every string leaf.
fn rewrite_workspace_tokens(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::String(s) => {
            if s.contains(LEGACY_WORKSPACE_TOKEN) {
                *s = s.replace(LEGACY_WORKSPACE_TOKEN, DEFAULT_WORKSPACE_DIR);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                rewrite_workspace_tokens(item);
            }
        }
        serde_json::Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                rewrite_workspace_tokens(item);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
