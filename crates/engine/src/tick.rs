// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The tick state machine.
//!
//! One invocation = one tick = one report. Phases run in a fixed order:
//! LOCK → PREFLIGHT → ORCHESTRATE → (risk/review) → (branch) → BUILD →
//! JUDGE → VERIFY → REPORT → END. The lock is held for the whole tick and
//! released on every terminal path, including panic and cancellation. Any
//! violation after the builder has run rolls the worktree back to the base
//! commit.

use crate::cancel::CancelToken;
use crate::preflight::run_preflight;
use crate::render::render_markdown;
use crate::risk::{
    compute_risk_flags, should_escalate, should_trigger_reviewer, task_fingerprint,
    GuardrailState, RiskContext,
};
use crate::scope::{check_diff_limits, check_head_moved, check_scope, matches_glob};
use crate::verify::{run_verification, VerifyResultType};
use relais_adapters::{
    BuilderAdapter, BuilderFailure, BuilderWorkspace, DiffAnalysis, GitAdapter,
    Invoker, OrchestratorAdapter, OrchestratorContext, OrchestratorFailure, ParseFailureKind,
    PatchError, ReviewerAdapter, ReviewerDecision,
};
use relais_core::{
    BlastRadius, BlockedRecord, BudgetCounts, BudgetSnapshot, Clock, Config, ControlAction,
    Diagnostics, DiffSummary, MilestoneId, Report, ReportCode, RunId, ScopeOutcome,
    ScopeViolationKind, Task, TaskKind, Verdict, VerifySummary,
};
use relais_storage::{
    enforce_retention, write_json, write_text, BlockedStore, LockError, StateStore,
    WorkspaceLock, WorkspacePaths,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use parking_lot::Mutex;
use tracing::{error, info, warn};

/// Result of one tick, for the loop driver.
#[derive(Debug)]
pub struct TickOutcome {
    pub report: Report,
    /// False only when the lock could not be acquired.
    pub report_written: bool,
    /// The orchestrator signaled completion via control.action = stop.
    pub orchestrator_stop: bool,
    /// Milestone the planned task belongs to, when a task was produced.
    pub task_milestone: Option<MilestoneId>,
    /// Updated cross-tick guardrail state.
    pub guard: GuardrailState,
}

/// Drives one tick end to end.
#[derive(Clone)]
pub struct TickRunner<I> {
    config: Arc<Config>,
    repo_root: PathBuf,
    paths: WorkspacePaths,
    invoker: I,
    clock: Arc<dyn Clock>,
    cancel: CancelToken,
}

/// State shared with the spawned phase task so the failsafe path can roll
/// back even when the phases panicked or timed out.
#[derive(Default)]
struct FailsafeState {
    base_commit: Option<String>,
}

/// Terminal result of the phase pipeline, before persistence.
struct PhaseEnd {
    code: ReportCode,
    reason: Option<String>,
    diagnostics: Option<Diagnostics>,
    task: Option<Task>,
    analysis: Option<DiffAnalysis>,
    scope: ScopeOutcome,
    verification: VerifySummary,
    reviewer_error: Option<String>,
    orchestrator_stop: bool,
    head_commit: Option<String>,
}

impl PhaseEnd {
    fn bare(code: ReportCode) -> Self {
        Self {
            code,
            reason: None,
            diagnostics: None,
            task: None,
            analysis: None,
            scope: ScopeOutcome::default(),
            verification: VerifySummary::default(),
            reviewer_error: None,
            orchestrator_stop: false,
            head_commit: None,
        }
    }

    fn with_reason(code: ReportCode, reason: impl Into<String>) -> Self {
        let mut end = Self::bare(code);
        end.reason = Some(reason.into());
        end
    }
}

impl<I: Invoker + Clone + Send + Sync + 'static> TickRunner<I> {
    pub fn new(
        config: Config,
        repo_root: impl Into<PathBuf>,
        invoker: I,
        clock: Arc<dyn Clock>,
        cancel: CancelToken,
    ) -> Self {
        let repo_root = repo_root.into();
        let workspace = config.workspace_path(&repo_root);
        let paths = WorkspacePaths::new(workspace, config.runner.lockfile.clone());
        Self {
            config: Arc::new(config),
            repo_root,
            paths,
            invoker,
            clock,
            cancel,
        }
    }

    pub fn paths(&self) -> &WorkspacePaths {
        &self.paths
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn invoker(&self) -> &I {
        &self.invoker
    }

    pub fn repo_root(&self) -> &std::path::Path {
        &self.repo_root
    }

    fn git(&self) -> GitAdapter<I> {
        GitAdapter::new(self.invoker.clone(), &self.repo_root)
    }

    /// Run one tick. Always returns a report; REPORT.json is written iff
    /// the lock was acquired.
    pub async fn run_tick(&self, guard: GuardrailState) -> TickOutcome {
        let run_id = RunId::generate(self.clock.as_ref());
        let started_at = self.clock.now();
        info!(run_id = %run_id, "tick started");

        // LOCK
        let lock = match WorkspaceLock::acquire(&self.paths.lock()) {
            Ok(lock) => lock,
            Err(e) => {
                let reason = match &e {
                    LockError::Held { pid } => format!("workspace lock held by pid {pid}"),
                    LockError::Corrupt(path) => {
                        format!("lock file {} is held but unreadable", path.display())
                    }
                    LockError::Io { path, source } => {
                        format!("lock io error at {}: {source}", path.display())
                    }
                };
                warn!(reason = %reason, "tick could not acquire lock");
                let report = self.compose_report(
                    &run_id,
                    started_at,
                    PhaseEnd::with_reason(ReportCode::BlockedLockHeld, reason),
                    None,
                    BudgetCounts::default(),
                );
                // No report is written when the lock was never ours.
                return TickOutcome {
                    report,
                    report_written: false,
                    orchestrator_stop: false,
                    task_milestone: None,
                    guard,
                };
            }
        };

        let failsafe = Arc::new(Mutex::new(FailsafeState::default()));
        let guard_backup = guard.clone();
        let runner = self.clone();
        let phase_run_id = run_id.clone();
        let phase_failsafe = Arc::clone(&failsafe);
        let handle = tokio::spawn(async move {
            runner
                .run_phases(phase_run_id, guard, phase_failsafe)
                .await
        });
        let abort = handle.abort_handle();

        let tick_budget = Duration::from_secs(self.config.runner.max_tick_seconds.max(1));
        let outcome = match tokio::time::timeout(tick_budget, handle).await {
            Ok(Ok((end, delta, guard))) => {
                let base = failsafe.lock().base_commit.clone();
                let outcome = self.persist(&run_id, started_at, end, delta, guard, base);
                lock.release();
                return outcome;
            }
            Ok(Err(join_error)) => {
                // A panic inside an adapter is contained here and turned
                // into a blocked report with diagnostics.
                let detail = if join_error.is_panic() {
                    format!("internal panic: {join_error}")
                } else {
                    format!("phase task aborted: {join_error}")
                };
                error!(detail = %detail, "tick phases died");
                self.failsafe_finish(
                    &run_id,
                    started_at,
                    &failsafe,
                    ReportCode::BlockedCrashRecoveryRequired,
                    detail,
                    guard_backup,
                )
                .await
            }
            Err(_elapsed) => {
                // Stop the detached phase task before rolling back under it.
                abort.abort();
                warn!(
                    max_tick_seconds = self.config.runner.max_tick_seconds,
                    "tick exceeded its wall-clock budget"
                );
                self.failsafe_finish(
                    &run_id,
                    started_at,
                    &failsafe,
                    ReportCode::StopInterrupted,
                    format!(
                        "tick exceeded max_tick_seconds ({})",
                        self.config.runner.max_tick_seconds
                    ),
                    guard_backup,
                )
                .await
            }
        };

        lock.release();
        outcome
    }

    /// Failsafe: best-effort rollback to the captured base, then a minimal
    /// report so the next invocation sees a consistent workspace.
    async fn failsafe_finish(
        &self,
        run_id: &RunId,
        started_at: chrono::DateTime<chrono::Utc>,
        failsafe: &Arc<Mutex<FailsafeState>>,
        mut code: ReportCode,
        reason: String,
        guard: GuardrailState,
    ) -> TickOutcome {
        let base = failsafe.lock().base_commit.clone();
        if let Some(base) = &base {
            if self.rollback(base).await.is_err() {
                code = ReportCode::BlockedRollbackFailed;
            }
        }
        let mut end = PhaseEnd::with_reason(code, reason.clone());
        end.diagnostics = Some(Diagnostics {
            stdout_excerpt: Some(reason),
            ..Diagnostics::default()
        });
        self.persist(
            run_id,
            started_at,
            end,
            BudgetCounts {
                ticks: 1,
                ..BudgetCounts::default()
            },
            guard,
            base,
        )
    }

    /// PREFLIGHT through VERIFY. Returns the terminal phase result, the
    /// budget delta of calls actually made, and the updated guard state.
    async fn run_phases(
        &self,
        run_id: RunId,
        mut guard: GuardrailState,
        failsafe: Arc<Mutex<FailsafeState>>,
    ) -> (PhaseEnd, BudgetCounts, GuardrailState) {
        let mut delta = BudgetCounts {
            ticks: 1,
            ..BudgetCounts::default()
        };
        let git = self.git();

        macro_rules! bail {
            ($end:expr) => {
                return ($end, delta, guard)
            };
        }
        macro_rules! check_cancel {
            () => {
                if self.cancel.is_cancelled() || relais_core::is_stop_requested() {
                    bail!(PhaseEnd::with_reason(
                        ReportCode::StopInterrupted,
                        "interrupted by signal",
                    ));
                }
            };
        }

        // PREFLIGHT (lock already held)
        let preflight = run_preflight(&self.config, &git, &self.paths, true).await;
        if !preflight.ok {
            let code = preflight
                .blocked_code
                .unwrap_or(ReportCode::BlockedMissingConfig);
            let mut end = PhaseEnd::bare(code);
            end.reason = preflight.blocked_reason;
            bail!(end);
        }
        let base = match preflight.base_commit {
            Some(base) => base,
            None => bail!(PhaseEnd::with_reason(
                ReportCode::BlockedMissingConfig,
                "preflight produced no base commit",
            )),
        };
        failsafe.lock().base_commit = Some(base.clone());

        check_cancel!();

        // ORCHESTRATE
        let orchestrate = OrchestratorAdapter::new(&self.invoker, &self.config.orchestrator);
        let ctx = self.orchestrator_context();
        let planned = orchestrate.run(&ctx).await;
        let (task, attempts) = match planned {
            Ok(success) => {
                delta.orchestrator_calls += success.attempts;
                (success.task, success.attempts)
            }
            Err(OrchestratorFailure::MissingPrompt { message }) => {
                bail!(PhaseEnd::with_reason(
                    ReportCode::BlockedMissingConfig,
                    message
                ));
            }
            Err(OrchestratorFailure::Timeout { attempts }) => {
                delta.orchestrator_calls += attempts;
                bail!(PhaseEnd::with_reason(
                    ReportCode::StopOrchestratorTimeout,
                    "orchestrator invocation timed out",
                ));
            }
            Err(OrchestratorFailure::OutputInvalid {
                attempts,
                diagnostics,
                raw_stderr,
            }) => {
                delta.orchestrator_calls += attempts;
                guard.retry_count = attempts.saturating_sub(1);
                guard.last_error_kind = Some("orchestrator_output_invalid".to_string());
                let mut end = PhaseEnd::with_reason(
                    ReportCode::BlockedOrchestratorOutputInvalid,
                    format!(
                        "orchestrator output invalid after {attempts} attempts: {}",
                        raw_stderr.trim()
                    ),
                );
                end.diagnostics = Some(diagnostics);
                bail!(end);
            }
            Err(OrchestratorFailure::Transport {
                subtype,
                diagnostics,
            }) => {
                delta.orchestrator_calls += 1;
                let mut end = PhaseEnd::with_reason(
                    ReportCode::BlockedTransportStalled,
                    format!("orchestrator transport stalled ({subtype})"),
                );
                end.diagnostics = Some(diagnostics);
                bail!(end);
            }
        };
        guard.retry_count = attempts.saturating_sub(1);
        guard.last_run_id = Some(run_id.to_string());
        info!(task_id = %task.task_id, kind = %task.kind, "task planned");

        // Redispatch detection.
        let fingerprint = task_fingerprint(&task);
        if guard.last_failed_fingerprint.as_deref() == Some(fingerprint.as_str()) {
            guard.redispatch_count = guard.redispatch_count.saturating_add(1);
            if guard.redispatch_count >= self.config.orchestrator.redispatch_cap {
                let mut end = PhaseEnd::with_reason(
                    ReportCode::StopRedispatchIdenticalTask,
                    format!(
                        "task fingerprint {} re-dispatched {} times after failure",
                        &fingerprint[..12],
                        guard.redispatch_count
                    ),
                );
                end.task = Some(task);
                bail!(end);
            }
        } else {
            guard.redispatch_count = 0;
        }

        // Orchestrator-signaled completion.
        let control_stop = task
            .control
            .as_ref()
            .filter(|control| control.action == ControlAction::Stop)
            .map(|control| control.reason.clone());
        if let Some(stop_reason) = control_stop {
            let mut end = PhaseEnd::with_reason(
                ReportCode::Success,
                format!("orchestrator stop: {stop_reason}"),
            );
            end.orchestrator_stop = true;
            end.task = Some(task);
            bail!(end);
        }

        // Question tasks surface to the human; a diff alongside one is a
        // violation.
        if task.kind == TaskKind::Question {
            let end = self
                .judge_question(&git, &base, &task)
                .await;
            bail!(end);
        }

        // Force-patch constraint from an earlier reviewer decision.
        if guard.force_patch {
            let is_patch = task
                .builder
                .as_ref()
                .map(|b| b.mode == relais_core::BuilderMode::Patch)
                .unwrap_or(false);
            if !is_patch && task.kind == TaskKind::Execute {
                let mut end = PhaseEnd::with_reason(
                    ReportCode::StopReviewerForcedPatch,
                    "force-patch constraint active until a verification PASS",
                );
                end.task = Some(task);
                bail!(end);
            }
        }

        check_cancel!();

        // PRE-BUILD RISK + conditional reviewer (execute tasks only).
        let mut reviewer_error = None;
        if task.kind == TaskKind::Execute {
            let verify_failed_last = guard
                .verify_history
                .last()
                .map(|entry| !entry.passed)
                .unwrap_or(false);
            let state_snapshot = self.load_state();
            let flags = compute_risk_flags(&RiskContext {
                task: &task,
                analysis: None,
                triggers: &self.config.reviewer.triggers,
                state: &guard,
                current_tick: state_snapshot.budgets.ticks,
                verify_failed_last_tick: verify_failed_last,
                budget_warning: state_snapshot.budget_warning,
            });
            guard.last_flags = flags.clone();

            if should_trigger_reviewer(&self.config.reviewer, &flags) {
                let reviewer = ReviewerAdapter::new(&self.invoker, &self.config.reviewer);
                let values: BTreeMap<String, String> = [
                    (
                        "flags".to_string(),
                        flags
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join(", "),
                    ),
                    ("intent".to_string(), task.intent.clone()),
                    ("task_id".to_string(), task.task_id.to_string()),
                ]
                .into();
                let outcome = reviewer
                    .run(
                        &self.paths.prompt(&self.config.reviewer.prompt),
                        &values,
                        &self.repo_root,
                    )
                    .await;
                reviewer_error = outcome.error.clone();
                match outcome.decision {
                    ReviewerDecision::Proceed => {}
                    ReviewerDecision::ForcePatch => {
                        guard.force_patch = true;
                        let mut end = PhaseEnd::with_reason(
                            ReportCode::StopReviewerForcedPatch,
                            "reviewer forced patch mode",
                        );
                        end.task = Some(task);
                        end.reviewer_error = reviewer_error;
                        bail!(end);
                    }
                    ReviewerDecision::AskQuestion { prompt, choices } => {
                        let mut reason = format!("reviewer question: {prompt}");
                        if let Some(choices) = choices {
                            reason.push_str(&format!(" (choices: {})", choices.join(" | ")));
                        }
                        let mut end =
                            PhaseEnd::with_reason(ReportCode::StopReviewerAskQuestion, reason);
                        end.task = Some(task);
                        end.reviewer_error = reviewer_error;
                        bail!(end);
                    }
                }
            }
        }

        // OPTIONAL BRANCHING
        if self.config.branching.mode == relais_core::BranchMode::PerTick {
            let name = self
                .config
                .branching
                .name_template
                .replace("{{task_id}}", task.task_id.as_str());
            if let Err(e) = git.create_or_switch_branch(&name).await {
                let mut end = PhaseEnd::with_reason(
                    ReportCode::BlockedBranchFailed,
                    format!("cannot create branch {name:?}: {e}"),
                );
                end.task = Some(task);
                bail!(end);
            }
        }

        check_cancel!();

        // BUILD
        if task.kind == TaskKind::Execute {
            delta.builder_calls += 1;
            let builder = BuilderAdapter::new(&self.invoker, &self.config.builder, &self.config.autonomy);
            let forbidden_globs = task.scope.forbidden_globs.clone();
            let forbidden = move |path: &str| matches_glob(path, &forbidden_globs);
            let built = builder
                .run(
                    &task,
                    &git,
                    &BuilderWorkspace {
                        exchange_dir: &self.paths.exchange_dir(),
                        schema_override: None,
                        forbidden: &forbidden,
                    },
                )
                .await;
            if let Err(failure) = built {
                let (code, reason) = classify_builder_failure(&failure);
                // The agent may have half-written the worktree.
                let rollback_code = self.rollback_for_stop(&git, &base, code).await;
                guard.record_stop(self.load_state().budgets.ticks, rollback_code);
                let mut end = PhaseEnd::with_reason(rollback_code, reason);
                end.task = Some(task);
                end.reviewer_error = reviewer_error;
                bail!(end);
            }
        }

        check_cancel!();

        // JUDGE
        let analysis = match git.analyze(&base).await {
            Ok(analysis) => analysis,
            Err(e) => {
                let code = self
                    .rollback_for_stop(&git, &base, ReportCode::BlockedCrashRecoveryRequired)
                    .await;
                let mut end =
                    PhaseEnd::with_reason(code, format!("diff analysis failed: {e}"));
                end.task = Some(task);
                bail!(end);
            }
        };
        let (user_analysis, runner_owned_tracked) = self.split_runner_owned(&analysis);

        let head_now = git.head().await.unwrap_or_else(|_| base.clone());
        let mut verdict_end: Option<PhaseEnd> = None;

        if !runner_owned_tracked.is_empty() {
            verdict_end = Some(PhaseEnd::with_reason(
                ReportCode::StopRunnerOwnedMutation,
                format!(
                    "builder mutated runner-owned paths: {}",
                    runner_owned_tracked.join(", ")
                ),
            ));
        } else if check_head_moved(&base, &head_now) {
            verdict_end = Some(PhaseEnd::with_reason(
                ReportCode::StopHeadMoved,
                format!("HEAD moved from {base} to {head_now}"),
            ));
        } else if task.kind == TaskKind::VerifyOnly && !user_analysis.is_empty() {
            verdict_end = Some(PhaseEnd::with_reason(
                ReportCode::StopVerifyOnlySideEffects,
                format!(
                    "verify_only task produced a diff: {}",
                    user_analysis.files.join(", ")
                ),
            ));
        }

        let scope_outcome = check_scope(
            &user_analysis.files,
            &user_analysis.untracked,
            &task.scope,
            &self.config.scope.lockfiles,
        );
        if verdict_end.is_none() && !scope_outcome.ok {
            let first = scope_outcome.violations[0].clone();
            let code = match first.kind {
                ScopeViolationKind::Forbidden => ReportCode::StopScopeViolationForbidden,
                ScopeViolationKind::OutsideAllowed => {
                    ReportCode::StopScopeViolationOutsideAllowed
                }
                ScopeViolationKind::NewFileForbidden => ReportCode::StopScopeViolationNewFile,
                ScopeViolationKind::LockfileChangeForbidden => {
                    ReportCode::StopScopeViolationLockfileChange
                }
            };
            verdict_end = Some(PhaseEnd::with_reason(
                code,
                format!("scope violation on {}: {}", first.path, first.kind),
            ));
        }

        if verdict_end.is_none() {
            if let Err(message) = check_diff_limits(&user_analysis, &task.diff_limits) {
                verdict_end = Some(PhaseEnd::with_reason(
                    ReportCode::StopDiffTooLarge,
                    message,
                ));
            }
        }

        if let Some(mut end) = verdict_end {
            end.code = self.rollback_for_stop(&git, &base, end.code).await;
            end.task = Some(task);
            end.analysis = Some(user_analysis);
            end.scope = scope_outcome;
            end.reviewer_error = reviewer_error;
            guard.record_stop(self.load_state().budgets.ticks, end.code);
            bail!(end);
        }

        check_cancel!();

        // VERIFY
        let log_path = self.paths.tick_dir(run_id.as_str()).join("verify.log");
        let verify = run_verification(
            &self.invoker,
            &self.config.verification,
            &task.verification,
            &self.repo_root,
            Some(log_path),
        )
        .await;
        delta.verify_runs += verify.runs.len() as u32;
        let tick_number = self.load_state().budgets.ticks;

        let verification = VerifySummary {
            exec_mode: self.config.verification.exec_mode.clone(),
            runs: verify.runs.clone(),
            log_path: verify
                .log_path
                .as_ref()
                .map(|p| p.display().to_string()),
        };

        let end_code = match &verify.result {
            VerifyResultType::Pass => {
                guard.record_pass(tick_number);
                None
            }
            VerifyResultType::Fail { phase } => {
                guard.record_failure(tick_number, false, Some(fingerprint.clone()));
                Some(match phase {
                    relais_core::VerifyPhase::Fast => ReportCode::StopVerifyFailedFast,
                    relais_core::VerifyPhase::Slow => ReportCode::StopVerifyFailedSlow,
                })
            }
            VerifyResultType::Timeout => {
                guard.record_failure(tick_number, true, Some(fingerprint.clone()));
                Some(ReportCode::StopVerifyFlakyOrTimeout)
            }
            VerifyResultType::Tainted { .. } => Some(ReportCode::StopVerifyTainted),
            VerifyResultType::UnknownTemplate { .. } => Some(ReportCode::BlockedMissingConfig),
        };
        guard.escalation = should_escalate(&guard, self.config.reviewer.enabled);

        if let Some(code) = end_code {
            let reason = match &verify.result {
                VerifyResultType::Tainted { param, reason } => {
                    format!("tainted verification parameter {param:?}: {reason}")
                }
                VerifyResultType::UnknownTemplate { template_id } => {
                    format!("verification template {template_id:?} is not configured")
                }
                VerifyResultType::Timeout => "verification timed out".to_string(),
                VerifyResultType::Fail { phase } => {
                    format!("verification failed in the {phase} phase")
                }
                VerifyResultType::Pass => String::new(),
            };
            // A failed verification discards the diff: the tick must be
            // reversible.
            let code = if task.kind == TaskKind::Execute {
                self.rollback_for_stop(&git, &base, code).await
            } else {
                code
            };
            guard.record_stop(tick_number, code);
            let mut end = PhaseEnd::with_reason(code, reason);
            end.task = Some(task);
            end.analysis = Some(user_analysis);
            end.scope = scope_outcome;
            end.verification = verification;
            end.reviewer_error = reviewer_error;
            bail!(end);
        }

        // Success.
        let mut end = PhaseEnd::bare(ReportCode::Success);
        end.task = Some(task);
        end.analysis = Some(user_analysis);
        end.scope = scope_outcome;
        end.verification = verification;
        end.reviewer_error = reviewer_error;
        (end, delta, guard)
    }

    /// Judge a question task: any diff alongside a question is a violation.
    async fn judge_question(
        &self,
        git: &GitAdapter<I>,
        base: &str,
        task: &Task,
    ) -> PhaseEnd {
        let analysis = git.analyze(base).await.unwrap_or_default();
        let (user_analysis, _) = self.split_runner_owned(&analysis);
        if !user_analysis.is_empty() {
            let code = self
                .rollback_for_stop(git, base, ReportCode::StopQuestionSideEffects)
                .await;
            let mut end = PhaseEnd::with_reason(
                code,
                format!(
                    "question task produced a diff: {}",
                    user_analysis.files.join(", ")
                ),
            );
            end.task = Some(task.clone());
            return end;
        }

        let question = task.question.as_ref();
        let mut reason = question
            .map(|q| q.prompt.clone())
            .unwrap_or_else(|| "orchestrator asked a question".to_string());
        if let Some(choices) = question.and_then(|q| q.choices.as_ref()) {
            reason.push_str(&format!(" (choices: {})", choices.join(" | ")));
        }
        let mut end = PhaseEnd::with_reason(ReportCode::StopOrchestratorAskQuestion, reason);
        end.task = Some(task.clone());
        end
    }

    /// Split a diff analysis into user paths and runner-owned tracked
    /// mutations. Untracked runner-owned files (lock, reports) are normal
    /// operation and are dropped entirely.
    fn split_runner_owned(&self, analysis: &DiffAnalysis) -> (DiffAnalysis, Vec<String>) {
        let owned = &self.config.runner.runner_owned_globs;
        let mut user = DiffAnalysis {
            files: Vec::new(),
            untracked: Vec::new(),
            lines_added: analysis.lines_added,
            lines_deleted: analysis.lines_deleted,
        };
        let mut owned_tracked = Vec::new();
        for file in &analysis.files {
            let is_untracked = analysis.untracked.contains(file);
            if matches_glob(file, owned) {
                if !is_untracked {
                    owned_tracked.push(file.clone());
                }
                continue;
            }
            user.files.push(file.clone());
            if is_untracked {
                user.untracked.push(file.clone());
            }
        }
        (user, owned_tracked)
    }

    /// Roll back to base after a violation. Escalates the stop code to a
    /// blocked code when the workspace cannot be restored.
    async fn rollback_for_stop(
        &self,
        git: &GitAdapter<I>,
        base: &str,
        code: ReportCode,
    ) -> ReportCode {
        match self.rollback(base).await {
            Ok(()) => code,
            Err(rollback_code) => rollback_code,
        }
    }

    async fn rollback(&self, base: &str) -> Result<(), ReportCode> {
        let git = self.git();
        if let Err(e) = git.reset_hard(base).await {
            error!(error = %e, "rollback reset failed");
            return Err(ReportCode::BlockedRollbackFailed);
        }
        let untracked = match git.touched_untracked().await {
            Ok(untracked) => untracked,
            Err(e) => {
                error!(error = %e, "rollback could not enumerate untracked files");
                return Err(ReportCode::BlockedRollbackFailed);
            }
        };
        let owned = &self.config.runner.runner_owned_globs;
        let to_remove: Vec<String> = untracked
            .into_iter()
            .filter(|path| !matches_glob(path, owned))
            .collect();
        if git.remove_untracked(&to_remove).is_err() {
            return Err(ReportCode::BlockedRollbackFailed);
        }
        match git
            .is_clean(|path| matches_glob(path, owned))
            .await
        {
            Ok((true, _)) => Ok(()),
            Ok((false, dirty)) => {
                error!(dirty = ?dirty, "worktree dirty after rollback");
                Err(ReportCode::BlockedRollbackDirty)
            }
            Err(e) => {
                error!(error = %e, "cannot verify rollback");
                Err(ReportCode::BlockedRollbackFailed)
            }
        }
    }

    /// REPORT + END bookkeeping: compose, persist, update the ledger.
    fn persist(
        &self,
        run_id: &RunId,
        started_at: chrono::DateTime<chrono::Utc>,
        mut end: PhaseEnd,
        delta: BudgetCounts,
        guard: GuardrailState,
        base_commit: Option<String>,
    ) -> TickOutcome {
        // History retention runs before the report is composed so a
        // retention failure can still change the verdict.
        if let Err(e) = enforce_retention(
            &self.paths.history_dir().join("ticks"),
            &self.config.history,
        ) {
            warn!(error = %e, "history retention failed");
            end = PhaseEnd::with_reason(
                ReportCode::BlockedHistoryCapCleanupRequired,
                format!("history retention failed: {e}"),
            );
        }

        let orchestrator_stop = end.orchestrator_stop;
        let task_milestone = end.task.as_ref().map(|t| t.milestone_id.clone());
        let diagnostics = end.diagnostics.clone();
        let report = self.compose_report(run_id, started_at, end, base_commit, delta);

        // REPORT.json is the canonical artifact; it is written first so it
        // witnesses the tick even if later writes fail.
        if let Err(e) = write_json(&self.paths.report(), &report) {
            error!(error = %e, "failed to write REPORT.json");
        }
        if self.config.runner.render_report {
            let md = render_markdown(&report, self.config.runner.report_byte_cap);
            if let Err(e) = write_text(&self.paths.report_md(), &md) {
                warn!(error = %e, "failed to write REPORT.md");
            }
        }

        let blocked_store = BlockedStore::new(self.paths.clone());
        if report.verdict == Verdict::Blocked {
            let mut record = BlockedRecord::new(
                report.ended_at,
                report.code,
                report.reason.clone().unwrap_or_default(),
            );
            if let Some(diagnostics) = diagnostics {
                record = record.with_diagnostics(diagnostics);
            }
            if let Err(e) = blocked_store.write(&record) {
                error!(error = %e, "failed to write BLOCKED.json");
            }
        } else if report.verdict == Verdict::Success {
            blocked_store.clear();
        }

        // Per-tick history artifact.
        let tick_dir = self.paths.tick_dir(run_id.as_str());
        if let Err(e) = write_json(&tick_dir.join("REPORT.json"), &report) {
            warn!(error = %e, "failed to write history report");
        }

        // Workspace-state update is the final write before lock release.
        self.update_state(&report, delta, task_milestone.as_ref());

        TickOutcome {
            report,
            report_written: true,
            orchestrator_stop,
            task_milestone,
            guard,
        }
    }

    fn update_state(
        &self,
        report: &Report,
        delta: BudgetCounts,
        milestone: Option<&MilestoneId>,
    ) {
        let store = StateStore::new(self.paths.clone());
        let mut state = match store.load() {
            Ok(state) => state,
            Err(e) => {
                error!(error = %e, "cannot load workspace state at report time");
                return;
            }
        };
        // Budgets are per-milestone: a task on a new milestone archives the
        // departing ledger and starts the counters at zero. The current
        // tick's calls belong to the new milestone.
        if let Some(milestone) = milestone {
            let changed = state
                .milestone_id
                .as_ref()
                .map_or(false, |current| current != milestone);
            if changed {
                if let Err(e) = store.archive_and_reset(&mut state, milestone) {
                    error!(error = %e, "milestone archive failed");
                    state.ensure_milestone(milestone);
                }
            } else if state.milestone_id.is_none() {
                state.ensure_milestone(milestone);
            }
        }
        state.budgets.apply(delta);
        state.budget_warning = self.config.budgets.warning(&state.budgets);
        state.last_run_id = Some(report.run_id.clone());
        state.last_verdict = Some(report.verdict);
        if let Err(e) = store.save(&state) {
            error!(error = %e, "cannot save workspace state");
        }
    }

    fn compose_report(
        &self,
        run_id: &RunId,
        started_at: chrono::DateTime<chrono::Utc>,
        end: PhaseEnd,
        base_commit: Option<String>,
        delta: BudgetCounts,
    ) -> Report {
        let ended_at = self.clock.now();
        let duration_ms = (ended_at - started_at).num_milliseconds().max(0) as u64;
        let head_commit = end.head_commit.clone().or_else(|| base_commit.clone());

        let analysis = end.analysis.unwrap_or_default();
        let blast_radius = BlastRadius {
            files_touched: analysis.files_touched(),
            lines_added: analysis.lines_added,
            lines_deleted: analysis.lines_deleted,
            new_files: analysis.new_files(),
        };

        let state = self.load_state();
        let mut counts = state.budgets;
        counts.apply(delta);
        let budgets = BudgetSnapshot {
            counts,
            caps: self.config.budgets,
            warning: self.config.budgets.warning(&counts),
        };

        Report {
            run_id: run_id.clone(),
            started_at,
            ended_at,
            duration_ms,
            base_commit,
            head_commit,
            task_summary: end.task.as_ref().map(|t| t.intent.clone()),
            verdict: end.code.verdict(),
            code: end.code,
            reason: end.reason,
            blast_radius,
            scope: end.scope,
            diff: DiffSummary {
                files_changed: analysis.files.clone(),
                lines_changed: analysis.lines_changed(),
                patch_path: None,
            },
            verification: end.verification,
            budgets,
            reviewer_error: end.reviewer_error,
        }
    }

    fn load_state(&self) -> relais_core::WorkspaceState {
        StateStore::new(self.paths.clone())
            .load()
            .unwrap_or_default()
    }

    fn orchestrator_context(&self) -> OrchestratorContext {
        let state = self.load_state();
        let milestone = state
            .milestone_id
            .clone()
            .unwrap_or_else(|| MilestoneId::new("m-001"));
        let budget_summary = format!(
            "ticks {}/{}, orchestrator {}/{}, builder {}/{}, verify {}/{}",
            state.budgets.ticks,
            self.config.budgets.max_ticks,
            state.budgets.orchestrator_calls,
            self.config.budgets.max_orchestrator_calls,
            state.budgets.builder_calls,
            self.config.budgets.max_builder_calls,
            state.budgets.verify_runs,
            self.config.budgets.max_verify_runs,
        );
        let verify_templates = self
            .config
            .verification
            .templates
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        let facts = std::fs::read_to_string(self.paths.facts()).unwrap_or_default();
        let last_report = std::fs::read_to_string(self.paths.report()).unwrap_or_default();
        let blocked = std::fs::read_to_string(self.paths.blocked()).unwrap_or_default();

        OrchestratorContext {
            system_prompt_path: self.paths.prompt(&self.config.orchestrator.system_prompt),
            user_prompt_path: self.paths.prompt(&self.config.orchestrator.user_prompt),
            schema_override: self
                .config
                .orchestrator
                .schema_file
                .as_ref()
                .map(|name| self.paths.schema(name)),
            values: [
                ("project_goal".to_string(), self.config.project_goal.clone()),
                ("milestone_id".to_string(), milestone.to_string()),
                ("budget_summary".to_string(), budget_summary),
                ("verify_templates".to_string(), verify_templates),
                ("facts".to_string(), facts),
                ("last_report".to_string(), last_report),
                ("blocked".to_string(), blocked),
            ]
            .into(),
            cwd: self.repo_root.clone(),
        }
    }
}

/// Preflight check (1): config reachable and parseable. It runs before a
/// [`TickRunner`] can exist, so this standalone path produces the one
/// report per invocation that every blocked verdict owes — artifacts land
/// in the default workspace directory under the default lock name.
pub fn report_config_failure(repo_root: &Path, clock: &dyn Clock, reason: &str) -> Report {
    let runner_defaults = relais_core::RunnerConfig::default();
    let paths = WorkspacePaths::new(
        repo_root.join(relais_core::DEFAULT_WORKSPACE_DIR),
        runner_defaults.lockfile.clone(),
    );
    let now = clock.now();
    let report = Report {
        run_id: RunId::generate(clock),
        started_at: now,
        ended_at: now,
        duration_ms: 0,
        base_commit: None,
        head_commit: None,
        task_summary: None,
        verdict: Verdict::Blocked,
        code: ReportCode::BlockedMissingConfig,
        reason: Some(reason.to_string()),
        blast_radius: BlastRadius::default(),
        scope: ScopeOutcome::default(),
        diff: DiffSummary::default(),
        verification: VerifySummary::default(),
        budgets: BudgetSnapshot::default(),
        reviewer_error: None,
    };

    let lock = WorkspaceLock::acquire(&paths.lock());
    if let Err(e) = write_json(&paths.report(), &report) {
        error!(error = %e, "failed to write REPORT.json");
    }
    if runner_defaults.render_report {
        let md = render_markdown(&report, runner_defaults.report_byte_cap);
        if let Err(e) = write_text(&paths.report_md(), &md) {
            warn!(error = %e, "failed to write REPORT.md");
        }
    }
    let record = BlockedRecord::new(now, ReportCode::BlockedMissingConfig, reason);
    if let Err(e) = BlockedStore::new(paths).write(&record) {
        error!(error = %e, "failed to write BLOCKED.json");
    }
    match lock {
        Ok(lock) => lock.release(),
        Err(e) => warn!(error = %e, "config-failure report written without the lock"),
    }
    report
}

/// Map a builder failure to its report code and reason.
fn classify_builder_failure(failure: &BuilderFailure) -> (ReportCode, String) {
    match failure {
        BuilderFailure::MissingConfig { mode } => (
            ReportCode::BlockedMissingConfig,
            format!("no configuration for builder mode {mode}"),
        ),
        BuilderFailure::ModeNotAllowed { mode } => (
            ReportCode::BlockedBuilderModeNotAllowed,
            format!("autonomy profile denies builder mode {mode}"),
        ),
        BuilderFailure::CommandNotFound { command } => (
            ReportCode::BlockedBuilderCommandNotFound,
            format!("builder command not found: {command}"),
        ),
        BuilderFailure::Timeout => (
            ReportCode::StopBuilderTimeout,
            "builder invocation timed out".to_string(),
        ),
        BuilderFailure::CliError {
            exit,
            stderr_excerpt,
        } => (
            ReportCode::StopBuilderCliError,
            format!("builder exited {exit:?}: {stderr_excerpt}"),
        ),
        BuilderFailure::Parse(parse) => {
            let code = match parse.kind {
                ParseFailureKind::JsonParse => ReportCode::StopBuilderJsonParse,
                ParseFailureKind::Schema => ReportCode::StopBuilderSchemaInvalid,
                ParseFailureKind::Shape => ReportCode::StopBuilderShapeInvalid,
            };
            (code, parse.message.clone())
        }
        BuilderFailure::Patch(patch) => {
            let code = match patch {
                PatchError::InvalidPath { .. } => ReportCode::StopPatchInvalidPath,
                PatchError::Symlink(_) => ReportCode::StopPatchSymlink,
                PatchError::Scope(_) => ReportCode::StopPatchScopeViolation,
                PatchError::Apply(_) | PatchError::Empty => ReportCode::StopPatchApplyFailed,
            };
            (code, patch.to_string())
        }
        BuilderFailure::NoBuilder => (
            ReportCode::StopBuilderShapeInvalid,
            "execute task reached the builder without a directive".to_string(),
        ),
    }
}

#[cfg(test)]
#[path = "tick_tests.rs"]
mod tests;
