// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide cooperative stop flag.
//!
//! Signal handlers set the flag; the loop driver polls it between ticks.
//! Tests reset it between scenarios.

use std::sync::atomic::{AtomicBool, Ordering};

static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Request a cooperative stop (idempotent).
pub fn request_stop() {
    STOP_REQUESTED.store(true, Ordering::SeqCst);
}

/// Whether a stop has been requested.
pub fn is_stop_requested() -> bool {
    STOP_REQUESTED.load(Ordering::SeqCst)
}

/// Clear the flag. Used at loop start and between test scenarios.
pub fn reset_stop_flag() {
    STOP_REQUESTED.store(false, Ordering::SeqCst);
}

#[cfg(test)]
#[path = "stop_tests.rs"]
mod tests;
