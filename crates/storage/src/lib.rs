// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Storage layer for relais: atomic files, locking, and the workspace ledger

mod atomic;
mod blocked;
mod history;
mod lock;
mod paths;
mod state_store;

pub use atomic::{
    cleanup_temp, glob_safe, read_json, write_json, write_text, FsError, GlobSafety,
};
pub use blocked::BlockedStore;
pub use history::{enforce_retention, HistoryError};
pub use lock::{LockError, LockInfo, WorkspaceLock};
pub use paths::WorkspacePaths;
pub use state_store::{StateStore, StateStoreError};
