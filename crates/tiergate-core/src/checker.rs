//! Command-backed checker execution.
//!
//! Built-in dimensions and executable plugins share one execution path: a
//! child process run in the project root with piped stdio and a bounded
//! timeout. Exit code 0 means pass. A checker may print a JSON object as
//! the last line of stdout to contribute structured details and a fix
//! suggestion to its result.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::debug;

use crate::domain::{BuiltinDimension, CheckOutcome, DimensionConfig, TiergateError};
use crate::registry::{CheckContext, Checker};

/// Maximum stderr bytes carried into a result's details.
const STDERR_DETAIL_LIMIT: usize = 4096;

/// Checker that runs an external command and judges it by exit code.
///
/// `timeout_secs` is the fallback; a dimension's `timeout_secs` param
/// takes precedence at check time, so plugin checkers built before any
/// dimension is known still honour per-dimension overrides.
#[derive(Debug, Clone)]
pub struct CommandChecker {
    program: String,
    args: Vec<String>,
    timeout_secs: u64,
}

impl CommandChecker {
    /// Create a checker from a non-empty command vector.
    pub fn new(command: Vec<String>, timeout_secs: u64) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout_secs,
        })
    }

    /// Resolve the command for a dimension: its `command` param wins,
    /// otherwise the built-in default for that dimension name.
    pub fn for_dimension(dim: &DimensionConfig, default_timeout_secs: u64) -> Option<Self> {
        let timeout = dim.timeout_param().unwrap_or(default_timeout_secs);
        if let Some(command) = dim.command_param() {
            return Self::new(command, timeout);
        }
        let builtin = BuiltinDimension::by_name(&dim.name)?;
        Self::new(builtin.command(), timeout)
    }

    /// The executable this checker runs.
    pub fn program(&self) -> &str {
        &self.program
    }
}

/// Parse a trailing JSON object from checker stdout, if present.
fn parse_stdout_tail(stdout: &str) -> Option<Value> {
    let line = stdout.lines().rev().find(|l| !l.trim().is_empty())?;
    let value: Value = serde_json::from_str(line.trim()).ok()?;
    value.is_object().then_some(value)
}

#[async_trait]
impl Checker for CommandChecker {
    async fn check(
        &self,
        dimension: &DimensionConfig,
        ctx: &CheckContext,
    ) -> anyhow::Result<CheckOutcome> {
        let start = Instant::now();
        let timeout_secs = dimension.timeout_param().unwrap_or(self.timeout_secs);

        let child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&ctx.project_root)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = if timeout_secs > 0 {
            tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output())
                .await
                .map_err(|_| TiergateError::CheckerTimeout {
                    dimension: dimension.name.clone(),
                    timeout_secs,
                })??
        } else {
            child.wait_with_output().await?
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let passed = output.status.success();

        debug!(
            dimension = %dimension.name,
            program = %self.program,
            exit_code,
            duration_ms = start.elapsed().as_millis() as u64,
            "command checker finished"
        );

        let mut details = json!({ "exit_code": exit_code });
        let mut fix_suggestion = None;

        if let Some(tail) = parse_stdout_tail(&stdout) {
            fix_suggestion = tail
                .get("fix_suggestion")
                .and_then(Value::as_str)
                .map(str::to_string);
            details["output"] = tail;
        }
        if !passed {
            let mut tail = stderr;
            if tail.len() > STDERR_DETAIL_LIMIT {
                let mut cut = tail.len() - STDERR_DETAIL_LIMIT;
                while !tail.is_char_boundary(cut) {
                    cut += 1;
                }
                tail = tail[cut..].to_string();
            }
            details["stderr"] = Value::String(tail);

            if fix_suggestion.is_none() {
                fix_suggestion = BuiltinDimension::by_name(&dimension.name)
                    .and_then(|b| b.fix_command())
                    .map(|cmd| format!("run `{}`", cmd.join(" ")));
            }
        }

        let message = if passed {
            format!("{} passed", dimension.name)
        } else {
            format!("{} exited with code {}", dimension.name, exit_code)
        };

        Ok(CheckOutcome {
            passed,
            message,
            details,
            fix_suggestion,
        })
    }
}
