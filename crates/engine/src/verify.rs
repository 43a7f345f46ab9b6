// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Verification runner.
//!
//! Every parameter is sanitized before any template executes. Templates
//! run sequentially, fast list first; the first non-PASS ends the run and
//! no slow template ever follows a fast non-PASS. Execution is argv-only.

use relais_adapters::{Invoker, InvokerRequest};
use relais_core::{
    CommandTemplate, TaskVerification, VerificationConfig, VerifyPhase, VerifyRunRecord,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Exit code conventionally produced by `timeout(1)`-style wrappers.
const TIMEOUT_EXIT_CODE: i32 = 124;

/// Overall classification of a verification run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResultType {
    Pass,
    Fail { phase: VerifyPhase },
    Timeout,
    /// A parameter failed sanitization; nothing was executed.
    Tainted { param: String, reason: String },
    /// A template id has no configured command.
    UnknownTemplate { template_id: String },
}

/// Outcome of one verification pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOutcome {
    pub result: VerifyResultType,
    pub runs: Vec<VerifyRunRecord>,
    pub log_path: Option<PathBuf>,
}

impl VerifyOutcome {
    pub fn passed(&self) -> bool {
        self.result == VerifyResultType::Pass
    }

    /// Whether this outcome counts toward the failure streak.
    pub fn counts_as_failure(&self) -> bool {
        matches!(
            self.result,
            VerifyResultType::Fail { .. } | VerifyResultType::Timeout
        )
    }
}

/// Sanitize one parameter value against the configured rules.
fn sanitize_param(
    name: &str,
    value: &str,
    config: &VerificationConfig,
) -> Result<(), (String, String)> {
    let taint = |reason: String| Err((name.to_string(), reason));

    if value.len() > config.max_param_len {
        return taint(format!(
            "length {} exceeds max {}",
            value.len(),
            config.max_param_len
        ));
    }
    if config.reject_whitespace && value.chars().any(char::is_whitespace) {
        return taint("contains whitespace".to_string());
    }
    if config.reject_dotdot && value.contains("..") {
        return taint("contains '..'".to_string());
    }
    if !config.metachar_regex.is_empty() {
        match regex::Regex::new(&config.metachar_regex) {
            Ok(re) => {
                if re.is_match(value) {
                    return taint(format!(
                        "matches metacharacter pattern {:?}",
                        config.metachar_regex
                    ));
                }
            }
            Err(e) => {
                // An unusable rule fails closed.
                return taint(format!("metacharacter pattern is invalid: {e}"));
            }
        }
    }
    Ok(())
}

fn substitute_args(template: &CommandTemplate, params: &BTreeMap<String, String>) -> Vec<String> {
    template
        .args
        .iter()
        .map(|arg| {
            let mut rendered = arg.clone();
            for (name, value) in params {
                rendered = rendered.replace(&format!("{{{{{name}}}}}"), value);
            }
            rendered
        })
        .collect()
}

/// Run the task's verification plan.
///
/// `log_path`, when given, receives an aggregate log of every executed
/// template; its path is carried into the report.
pub async fn run_verification<I: Invoker>(
    invoker: &I,
    config: &VerificationConfig,
    plan: &TaskVerification,
    cwd: &Path,
    log_path: Option<PathBuf>,
) -> VerifyOutcome {
    // Sanitize ALL parameters before running ANY template.
    for (name, value) in &plan.params {
        if let Err((param, reason)) = sanitize_param(name, value, config) {
            warn!(param = %param, reason = %reason, "tainted verification parameter");
            return VerifyOutcome {
                result: VerifyResultType::Tainted { param, reason },
                runs: Vec::new(),
                log_path: None,
            };
        }
    }

    // Resolve every template id up front so a bad plan never half-runs.
    for id in plan.fast.iter().chain(plan.slow.iter()) {
        if !config.templates.contains_key(id) {
            return VerifyOutcome {
                result: VerifyResultType::UnknownTemplate {
                    template_id: id.clone(),
                },
                runs: Vec::new(),
                log_path: None,
            };
        }
    }

    let mut runs = Vec::new();
    let mut log = String::new();

    for (phase, ids, timeout) in [
        (
            VerifyPhase::Fast,
            &plan.fast,
            Duration::from_secs(config.fast_timeout_seconds),
        ),
        (
            VerifyPhase::Slow,
            &plan.slow,
            Duration::from_secs(config.slow_timeout_seconds),
        ),
    ] {
        for id in ids {
            let Some(template) = config.templates.get(id) else {
                continue; // Resolved above; unreachable in practice.
            };
            let args = substitute_args(template, &plan.params);
            let request = InvokerRequest::new(&template.cmd, args.clone(), timeout)
                .with_cwd(cwd);

            let output = match invoker.invoke(request).await {
                Ok(output) => output,
                Err(e) => relais_adapters::InvokerOutput {
                    exit_code: None,
                    stdout: String::new(),
                    stderr: e.to_string(),
                    duration_ms: 0,
                    timed_out: false,
                },
            };

            let timed_out = output.timed_out || output.exit_code == Some(TIMEOUT_EXIT_CODE);
            let record = VerifyRunRecord {
                template_id: id.clone(),
                phase,
                cmd: template.cmd.clone(),
                args_template: template.args.clone(),
                exit_code: output.exit_code,
                duration_ms: output.duration_ms,
                timed_out,
            };
            info!(
                template = %id,
                phase = %phase,
                exit = ?output.exit_code,
                timed_out,
                duration_ms = output.duration_ms,
                "verification template finished"
            );
            append_log(&mut log, &record, &output);
            let passed = record.passed();
            runs.push(record);

            if !passed {
                let written = write_log(log_path.as_deref(), &log);
                let result = if timed_out {
                    VerifyResultType::Timeout
                } else {
                    VerifyResultType::Fail { phase }
                };
                // First non-PASS stops everything: remaining templates in
                // this phase and the entire slow list.
                return VerifyOutcome {
                    result,
                    runs,
                    log_path: written,
                };
            }
        }
    }

    let written = write_log(log_path.as_deref(), &log);
    VerifyOutcome {
        result: VerifyResultType::Pass,
        runs,
        log_path: written,
    }
}

fn append_log(log: &mut String, record: &VerifyRunRecord, output: &relais_adapters::InvokerOutput) {
    log.push_str(&format!(
        "=== {} [{}] {} (exit {:?}, {} ms, timed_out={})\n",
        record.template_id,
        record.phase,
        record.cmd,
        record.exit_code,
        record.duration_ms,
        record.timed_out
    ));
    if !output.stdout.is_empty() {
        log.push_str(&output.stdout);
        if !output.stdout.ends_with('\n') {
            log.push('\n');
        }
    }
    if !output.stderr.is_empty() {
        log.push_str(&output.stderr);
        if !output.stderr.ends_with('\n') {
            log.push('\n');
        }
    }
}

fn write_log(path: Option<&Path>, log: &str) -> Option<PathBuf> {
    let path = path?;
    if log.is_empty() {
        return None;
    }
    match relais_storage::write_text(path, log) {
        Ok(()) => Some(path.to_path_buf()),
        Err(e) => {
            warn!(error = %e, "failed to write verification log");
            None
        }
    }
}

#[cfg(test)]
#[path = "verify_tests.rs"]
mod tests;
