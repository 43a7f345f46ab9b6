// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess invocation seam.
//!
//! Every external process (git, planner, builder, reviewer, verification
//! commands) is reached through [`Invoker`], so tests can substitute a
//! deterministic fake. Execution is argv-style; nothing is ever passed
//! through a shell.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;

/// One subprocess invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokerRequest {
    pub command: String,
    pub args: Vec<String>,
    /// Extra environment variables layered over the inherited environment.
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    /// Wall-clock ceiling; the child is killed on expiry.
    pub timeout: Duration,
}

impl InvokerRequest {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            env: Vec::new(),
            cwd: None,
            timeout,
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }
}

/// Result of a subprocess invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InvokerOutput {
    /// None when the process was killed (timeout or signal).
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub timed_out: bool,
}

impl InvokerOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Invocation failures that prevented the child from producing an outcome.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("command not found: {0}")]
    NotFound(String),
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Maps a request to a raw process outcome.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(&self, request: InvokerRequest) -> Result<InvokerOutput, InvokeError>;
}

/// Production invoker backed by `tokio::process`.
///
/// The child is spawned with `kill_on_drop` so a timeout reliably
/// terminates it; on expiry the captured output is discarded and the
/// result is marked `timed_out`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubprocessInvoker;

#[async_trait]
impl Invoker for SubprocessInvoker {
    async fn invoke(&self, request: InvokerRequest) -> Result<InvokerOutput, InvokeError> {
        let mut cmd = Command::new(&request.command);
        cmd.args(&request.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &request.env {
            cmd.env(key, value);
        }
        if let Some(cwd) = &request.cwd {
            cmd.current_dir(cwd);
        }

        let start = Instant::now();
        let output = match tokio::time::timeout(request.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return if source.kind() == std::io::ErrorKind::NotFound {
                    Err(InvokeError::NotFound(request.command))
                } else {
                    Err(InvokeError::Spawn {
                        command: request.command,
                        source,
                    })
                };
            }
            Err(_elapsed) => {
                return Ok(InvokerOutput {
                    exit_code: None,
                    stdout: String::new(),
                    stderr: String::new(),
                    duration_ms: start.elapsed().as_millis() as u64,
                    timed_out: true,
                });
            }
        };

        Ok(InvokerOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            duration_ms: start.elapsed().as_millis() as u64,
            timed_out: false,
        })
    }
}

#[cfg(test)]
#[path = "invoker_tests.rs"]
mod tests;
