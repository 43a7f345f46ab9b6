// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! relais execution engine: policy, preflight, the tick state machine,
//! and the loop driver.

mod cancel;
mod preflight;
mod render;
mod risk;
mod runloop;
mod scope;
mod tick;
mod verify;

pub use cancel::CancelToken;
pub use preflight::{run_preflight, PreflightOutcome};
pub use risk::{
    compute_risk_flags, merge_eligible, should_escalate, should_trigger_reviewer,
    task_fingerprint, Escalation, EscalationMode, GuardrailState, RiskContext, RiskFlag,
    StopEvent, VerifyHistoryEntry,
};
pub use render::render_markdown;
pub use runloop::{run_loop, LoopMode, LoopOutcome, LoopStopReason};
pub use scope::{
    check_diff_limits, check_head_moved, check_scope, is_lockfile, matches_glob,
};
pub use tick::{report_config_failure, TickOutcome, TickRunner};
pub use verify::{run_verification, VerifyOutcome, VerifyResultType};
