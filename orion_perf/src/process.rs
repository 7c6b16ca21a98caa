//! Asynchronous execution of external commands.
//!
//! Every invocation builds its own environment by layering the requested
//! overrides on top of the inherited environment of this process. The
//! environment of the running process is never modified, so any number of
//! invocations can be in flight concurrently.
//!
//! Failing to start a command is not an error: it is reported through the same
//! [`ProcessResult`] shape as a command that ran and failed, so callers only
//! ever inspect the exit code.

use std::{collections::HashMap, process::Stdio, time::Duration};

use itertools::Itertools;
use log::{debug, trace, warn};
use tokio::process::Command;

/// Exit code reported when a command could not be started.
pub const LAUNCH_FAILURE_EXIT_CODE: i32 = 1;

/// Exit code reported when a command exceeded its time budget and was killed.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported for a child that was terminated by a signal.
pub const SIGNALED_EXIT_CODE: i32 = -1;

/// Captured outcome of a single external invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    arguments: Vec<String>,
    exit_code: i32,
    stdout: String,
    stderr: String,
}

/// Classification of an orion exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The analysis ran and found no changepoint.
    NoChange,
    /// The analysis ran and found at least one changepoint.
    ChangeDetected,
    /// The analysis could not run to completion.
    ExecutionError,
}

impl Outcome {
    pub fn from_exit_code(exit_code: i32, changepoint_exit_code: i32) -> Outcome {
        match exit_code {
            0 => Outcome::NoChange,
            code if code == changepoint_exit_code => Outcome::ChangeDetected,
            _ => Outcome::ExecutionError,
        }
    }
}

impl ProcessResult {
    pub fn new(
        arguments: Vec<String>,
        exit_code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> ProcessResult {
        ProcessResult {
            arguments,
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    fn launch_failure(arguments: &[String], diagnostic: String) -> ProcessResult {
        ProcessResult::new(
            arguments.to_vec(),
            LAUNCH_FAILURE_EXIT_CODE,
            String::new(),
            diagnostic,
        )
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    pub fn outcome(&self, changepoint_exit_code: i32) -> Outcome {
        Outcome::from_exit_code(self.exit_code, changepoint_exit_code)
    }

    /// Human readable explanation of a failed invocation built from stderr.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("exited with code {} without diagnostics", self.exit_code)
        } else {
            format!("exited with code {}: {}", self.exit_code, stderr)
        }
    }
}

fn build_command(command: &[String], shell: bool) -> Result<Command, String> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| "Cannot execute an empty command".to_string())?;

    if shell {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command.iter().join(" "));
        Ok(cmd)
    } else {
        if program.is_empty() {
            return Err("Cannot execute a command with an empty program name".to_string());
        }
        let mut cmd = Command::new(program);
        cmd.args(args);
        Ok(cmd)
    }
}

/// Run `command` and wait for it without blocking the executor.
///
/// `env_overrides` win over inherited variables of the same name. When
/// `timeout` elapses the child is killed and an execution failure with
/// [`TIMEOUT_EXIT_CODE`] is returned.
pub async fn run_command(
    command: &[String],
    env_overrides: &HashMap<String, String>,
    shell: bool,
    timeout: Option<Duration>,
) -> ProcessResult {
    debug!("execute: {}", command.iter().join(" "));

    let mut cmd = match build_command(command, shell) {
        Ok(cmd) => cmd,
        Err(diagnostic) => {
            warn!("{diagnostic}");
            return ProcessResult::launch_failure(command, diagnostic);
        }
    };

    cmd.envs(env_overrides)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            let diagnostic = format!("Failed to start '{}': {}", command[0], e);
            warn!("{diagnostic}");
            return ProcessResult::launch_failure(command, diagnostic);
        }
    };

    let output = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(output) => output,
            Err(_) => {
                warn!("'{}' timed out after {}s", command[0], limit.as_secs());
                return ProcessResult::new(
                    command.to_vec(),
                    TIMEOUT_EXIT_CODE,
                    String::new(),
                    format!("timed out after {}s", limit.as_secs()),
                );
            }
        },
        None => child.wait_with_output().await,
    };

    let output = match output {
        Ok(output) => output,
        Err(e) => {
            let diagnostic = format!("Failed to collect output of '{}': {}", command[0], e);
            warn!("{diagnostic}");
            return ProcessResult::launch_failure(command, diagnostic);
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    trace!("stdout: {stdout}");

    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    trace!("stderr: {stderr}");

    let exit_code = output.status.code().unwrap_or(SIGNALED_EXIT_CODE);
    debug!("'{}' exited with {exit_code}", command[0]);

    ProcessResult::new(command.to_vec(), exit_code, stdout, stderr)
}

#[cfg(test)]
mod test {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn outcome_classification() {
        assert_eq!(Outcome::from_exit_code(0, 3), Outcome::NoChange);
        assert_eq!(Outcome::from_exit_code(3, 3), Outcome::ChangeDetected);
        assert_eq!(Outcome::from_exit_code(1, 3), Outcome::ExecutionError);
        assert_eq!(Outcome::from_exit_code(2, 3), Outcome::ExecutionError);
        assert_eq!(Outcome::from_exit_code(2, 2), Outcome::ChangeDetected);
        assert_eq!(
            Outcome::from_exit_code(SIGNALED_EXIT_CODE, 3),
            Outcome::ExecutionError
        );
    }

    #[test]
    fn diagnostic_mentions_stderr() {
        let result = ProcessResult::new(args(&["orion"]), 1, "", "boom\n");
        assert_eq!(result.diagnostic(), "exited with code 1: boom");

        let silent = ProcessResult::new(args(&["orion"]), 2, "", "  ");
        assert_eq!(
            silent.diagnostic(),
            "exited with code 2 without diagnostics"
        );
    }

    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let result = run_command(
            &args(&["sh", "-c", "echo out; echo err >&2; exit 3"]),
            &HashMap::new(),
            false,
            None,
        )
        .await;
        assert_eq!(result.exit_code(), 3);
        assert_eq!(result.stdout(), "out\n");
        assert_eq!(result.stderr(), "err\n");
        assert_eq!(result.arguments()[0], "sh");
    }

    #[tokio::test]
    async fn overrides_reach_child_only() {
        let mut env = HashMap::new();
        env.insert(
            "ORION_PERF_PROCESS_TEST".to_string(),
            "isolated".to_string(),
        );
        let result = run_command(
            &args(&["printf", "%s", "$ORION_PERF_PROCESS_TEST"]),
            &env,
            true,
            None,
        )
        .await;
        assert_eq!(result.exit_code(), 0);
        assert_eq!(result.stdout(), "isolated");
        assert!(std::env::var("ORION_PERF_PROCESS_TEST").is_err());
    }

    #[tokio::test]
    async fn overrides_win_over_inherited_variables() {
        let mut env = HashMap::new();
        env.insert("HOME".to_string(), "/overridden".to_string());
        let result = run_command(&args(&["sh", "-c", "printf %s \"$HOME\""]), &env, false, None).await;
        assert_eq!(result.stdout(), "/overridden");
    }

    #[tokio::test]
    async fn launch_failure_is_a_result() {
        let result = run_command(
            &args(&["/nonexistent/orion-perf-missing-binary"]),
            &HashMap::new(),
            false,
            None,
        )
        .await;
        assert_eq!(result.exit_code(), LAUNCH_FAILURE_EXIT_CODE);
        assert!(result.stdout().is_empty());
        assert!(result.stderr().contains("Failed to start"));
    }

    #[tokio::test]
    async fn empty_command_is_a_launch_failure() {
        let result = run_command(&[], &HashMap::new(), false, None).await;
        assert_eq!(result.exit_code(), LAUNCH_FAILURE_EXIT_CODE);
        assert!(result.stderr().contains("empty command"));
    }

    #[tokio::test]
    async fn timeout_kills_child() {
        let result = run_command(
            &args(&["sleep", "5"]),
            &HashMap::new(),
            false,
            Some(Duration::from_millis(100)),
        )
        .await;
        assert_eq!(result.exit_code(), TIMEOUT_EXIT_CODE);
        assert!(result.stderr().starts_with("timed out after"));
        assert_eq!(
            result.outcome(3),
            Outcome::ExecutionError
        );
    }
}
