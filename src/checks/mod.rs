//! Check execution.
//!
//! A [`CheckRunner`] executes one named verification through an injected
//! [`CheckCommand`] and converts the raw output into a [`CheckResult`].
//! Timeouts are enforced here: an invocation exceeding its limit is cancelled
//! and recorded as a timeout failure, never retried.

use crate::traits::{CheckCommand, CheckOutput};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Result of one check invocation. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub duration: Duration,
}

impl CheckResult {
    /// Whether this result records a forced timeout termination.
    pub fn timed_out(&self) -> bool {
        self.errors.iter().any(|e| e.starts_with("timed out"))
    }
}

/// Executes named checks with a timeout.
pub struct CheckRunner {
    command: Arc<dyn CheckCommand>,
}

impl CheckRunner {
    pub fn new(command: Arc<dyn CheckCommand>) -> Self {
        Self { command }
    }

    /// Run one named check under the given timeout.
    ///
    /// Never returns an error: command failures, non-zero exits, and timeouts
    /// all become a failed `CheckResult`.
    pub async fn run_check(&self, name: &str, limit: Duration) -> CheckResult {
        let start = Instant::now();
        debug!(check = name, timeout_secs = limit.as_secs(), "running check");

        match timeout(limit, self.command.run(name, limit)).await {
            Ok(Ok(output)) => Self::from_output(name, output, start.elapsed()),
            Ok(Err(e)) => CheckResult {
                name: name.to_string(),
                passed: false,
                errors: vec![format!("check invocation failed: {e:#}")],
                warnings: Vec::new(),
                duration: start.elapsed(),
            },
            Err(_) => CheckResult {
                name: name.to_string(),
                passed: false,
                errors: vec![format!("timed out after {}s", limit.as_secs())],
                warnings: Vec::new(),
                duration: start.elapsed(),
            },
        }
    }

    fn from_output(name: &str, output: CheckOutput, duration: Duration) -> CheckResult {
        let passed = output.exit_code == 0;
        let stderr_lines: Vec<String> = output
            .stderr
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();

        let (mut errors, warnings) = if passed {
            // A passing check may still emit diagnostics on stderr.
            (Vec::new(), stderr_lines)
        } else {
            (stderr_lines, Vec::new())
        };
        if !passed {
            errors.push(format!("exited with code {}", output.exit_code));
        }

        CheckResult {
            name: name.to_string(),
            passed,
            errors,
            warnings,
            duration,
        }
    }
}

/// Production [`CheckCommand`] that maps check names to shell command lines
/// and spawns them through `sh -c`.
///
/// The child is spawned with `kill_on_drop` so that cancellation by the
/// runner's timeout forcibly terminates the process.
pub struct ShellCheckCommand {
    commands: HashMap<String, String>,
    working_dir: PathBuf,
}

impl ShellCheckCommand {
    pub fn new(working_dir: impl AsRef<Path>) -> Self {
        Self {
            commands: HashMap::new(),
            working_dir: working_dir.as_ref().to_path_buf(),
        }
    }

    /// Register the command line executed for a check name.
    pub fn with_command(mut self, name: &str, command_line: &str) -> Self {
        self.commands.insert(name.to_string(), command_line.to_string());
        self
    }
}

#[async_trait]
impl CheckCommand for ShellCheckCommand {
    async fn run(&self, name: &str, _timeout: Duration) -> anyhow::Result<CheckOutput> {
        let command_line = self
            .commands
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("no command registered for check '{name}'"))?;

        let output = Command::new("sh")
            .arg("-c")
            .arg(command_line)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(CheckOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
