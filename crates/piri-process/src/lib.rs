//! Process execution for Piri.
//!
//! Provides cross-platform command execution with timeout support, and the
//! `Executor` seam the Service-Manager (`piri-service`) and the installer
//! (`piri-installer`) thread every subprocess invocation through, so both
//! are testable without a real `systemctl`/`sudo` on the test host (spec §9
//! Design Notes: "Shelling out to a supervisor CLI").
//!
//! # Example
//!
//! ```
//! use piri_process::{run_command, SystemExecutor, Executor};
//!
//! let result = run_command("true", &[]).expect("run");
//! assert!(result.success);
//!
//! let executor = SystemExecutor;
//! let out = executor.output(&["echo", "hi"]).expect("output");
//! assert!(String::from_utf8_lossy(&out).contains("hi"));
//! ```

use std::io::Read;
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Result of a command execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl CommandResult {
    pub fn ok(&self) -> Result<&Self> {
        if self.success {
            Ok(self)
        } else {
            Err(anyhow::anyhow!(
                "command failed with exit code {:?}: {}",
                self.exit_code,
                self.stderr
            ))
        }
    }

    pub fn from_output(output: &Output, duration: Duration) -> Self {
        Self {
            success: output.status.success(),
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: duration.as_millis() as u64,
        }
    }
}

/// Result of a command execution with timeout bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration: Duration,
}

/// Run a command and capture its output.
pub fn run_command(program: &str, args: &[&str]) -> Result<CommandResult> {
    let start = Instant::now();
    let output = Command::new(program)
        .args(args)
        .output()
        .with_context(|| format!("failed to run command: {} {:?}", program, args))?;
    Ok(CommandResult::from_output(&output, start.elapsed()))
}

/// Run a command in a specific directory.
pub fn run_command_in_dir(program: &str, args: &[&str], dir: &std::path::Path) -> Result<CommandResult> {
    let start = Instant::now();
    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("failed to run command: {} {:?} in {}", program, args, dir.display()))?;
    Ok(CommandResult::from_output(&output, start.elapsed()))
}

/// Run a command with an optional timeout, capturing output even when killed.
pub fn run_command_with_timeout(
    program: &str,
    args: &[&str],
    timeout: Option<Duration>,
) -> Result<CommandOutput> {
    let start = Instant::now();

    let Some(timeout_dur) = timeout else {
        let result = run_command(program, args)?;
        return Ok(CommandOutput {
            exit_code: result.exit_code.unwrap_or(-1),
            stdout: result.stdout,
            stderr: result.stderr,
            timed_out: false,
            duration: Duration::from_millis(result.duration_ms),
        });
    };

    let mut command = Command::new(program);
    command.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());

    let mut child = command
        .spawn()
        .with_context(|| format!("failed to spawn command: {}", program))?;

    let deadline = Instant::now() + timeout_dur;
    loop {
        match child
            .try_wait()
            .with_context(|| format!("failed to poll command: {}", program))?
        {
            Some(status) => {
                return Ok(CommandOutput {
                    exit_code: status.code().unwrap_or(-1),
                    stdout: read_pipe(child.stdout.take()),
                    stderr: read_pipe(child.stderr.take()),
                    timed_out: false,
                    duration: start.elapsed(),
                });
            }
            None => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    let mut stderr = read_pipe(child.stderr.take());
                    stderr.push_str(&format!(
                        "\n{} timed out after {}",
                        program,
                        humantime::format_duration(timeout_dur)
                    ));
                    return Ok(CommandOutput {
                        exit_code: -1,
                        stdout: read_pipe(child.stdout.take()),
                        stderr,
                        timed_out: true,
                        duration: start.elapsed(),
                    });
                }
                std::thread::sleep(Duration::from_millis(100));
            }
        }
    }
}

fn read_pipe<R: Read>(stream: Option<R>) -> String {
    let mut buffer = Vec::new();
    if let Some(mut s) = stream {
        let _ = s.read_to_end(&mut buffer);
    }
    String::from_utf8_lossy(&buffer).to_string()
}

/// Check if a command exists in `PATH`.
pub fn command_exists(program: &str) -> bool {
    which::which(program).is_ok()
}

/// A narrow, test-doubleable command-execution seam. Service-Manager and the
/// installer never call `std::process::Command` directly; they go through
/// this trait so tests can supply canned output keyed by argv instead of
/// mounting a real supervisor.
pub trait Executor: Send + Sync {
    /// Run a command, discarding output, returning an error on non-zero exit.
    fn run(&self, argv: &[&str]) -> Result<()>;

    /// Run a command and return its captured stdout bytes.
    fn output(&self, argv: &[&str]) -> Result<Vec<u8>>;

    /// Run a command and return `(stdout, succeeded)` without treating a
    /// non-zero exit as an error — for commands like `systemctl is-active`
    /// that encode state in both the exit code and stdout, where discarding
    /// stdout on failure (as [`Executor::output`] does) would lose the
    /// information the caller needs.
    fn output_status(&self, argv: &[&str]) -> Result<(Vec<u8>, bool)>;
}

/// Production executor: shells out to the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    fn run(&self, argv: &[&str]) -> Result<()> {
        let (program, args) = split_argv(argv)?;
        run_command(program, args)?.ok()?;
        Ok(())
    }

    fn output(&self, argv: &[&str]) -> Result<Vec<u8>> {
        let (program, args) = split_argv(argv)?;
        let result = run_command(program, args)?;
        result.ok()?;
        Ok(result.stdout.into_bytes())
    }

    fn output_status(&self, argv: &[&str]) -> Result<(Vec<u8>, bool)> {
        let (program, args) = split_argv(argv)?;
        let result = run_command(program, args)?;
        Ok((result.stdout.into_bytes(), result.success))
    }
}

fn split_argv<'a>(argv: &'a [&'a str]) -> Result<(&'a str, &'a [&'a str])> {
    argv.split_first()
        .map(|(program, rest)| (*program, rest))
        .ok_or_else(|| anyhow::anyhow!("empty argv"))
}

/// Test executor: returns canned output keyed by the exact argv it was
/// constructed to expect, recording every call it received for assertions.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    responses: std::sync::Mutex<std::collections::HashMap<Vec<String>, Result<Vec<u8>, String>>>,
    calls: std::sync::Mutex<Vec<Vec<String>>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the canned response for an exact argv.
    pub fn on(&self, argv: &[&str], response: Result<Vec<u8>, String>) {
        let key = argv.iter().map(|s| s.to_string()).collect();
        self.responses.lock().unwrap().insert(key, response);
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    fn lookup(&self, argv: &[&str]) -> Result<Vec<u8>> {
        let key: Vec<String> = argv.iter().map(|s| s.to_string()).collect();
        self.calls.lock().unwrap().push(key.clone());
        match self.responses.lock().unwrap().get(&key) {
            Some(Ok(bytes)) => Ok(bytes.clone()),
            Some(Err(msg)) => Err(anyhow::anyhow!(msg.clone())),
            None => Err(anyhow::anyhow!("no canned response for argv {:?}", argv)),
        }
    }
}

impl Executor for RecordingExecutor {
    fn run(&self, argv: &[&str]) -> Result<()> {
        self.lookup(argv).map(|_| ())
    }

    fn output(&self, argv: &[&str]) -> Result<Vec<u8>> {
        self.lookup(argv)
    }

    fn output_status(&self, argv: &[&str]) -> Result<(Vec<u8>, bool)> {
        let key: Vec<String> = argv.iter().map(|s| s.to_string()).collect();
        self.calls.lock().unwrap().push(key.clone());
        match self.responses.lock().unwrap().get(&key) {
            Some(Ok(bytes)) => Ok((bytes.clone(), true)),
            Some(Err(msg)) => Ok((msg.clone().into_bytes(), false)),
            None => Err(anyhow::anyhow!("no canned response for argv {:?}", argv)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_command_succeeds_on_true() {
        let result = run_command("true", &[]).expect("run");
        assert!(result.success);
    }

    #[test]
    fn run_command_captures_failure() {
        let result = run_command("false", &[]).expect("run");
        assert!(!result.success);
        assert!(result.ok().is_err());
    }

    #[test]
    fn command_exists_true_binary() {
        assert!(command_exists("true"));
        assert!(!command_exists("this-command-does-not-exist-xyz123"));
    }

    #[test]
    fn recording_executor_returns_canned_output() {
        let exec = RecordingExecutor::new();
        exec.on(&["systemctl", "is-active", "piri"], Ok(b"active\n".to_vec()));
        let out = exec.output(&["systemctl", "is-active", "piri"]).unwrap();
        assert_eq!(out, b"active\n");
        assert_eq!(exec.calls().len(), 1);
    }

    #[test]
    fn recording_executor_errors_on_unregistered_argv() {
        let exec = RecordingExecutor::new();
        assert!(exec.run(&["systemctl", "start", "piri"]).is_err());
    }

    #[test]
    fn recording_executor_replays_registered_error() {
        let exec = RecordingExecutor::new();
        exec.on(&["systemctl", "start", "piri"], Err("unit not found".to_string()));
        let err = exec.run(&["systemctl", "start", "piri"]).unwrap_err();
        assert!(err.to_string().contains("unit not found"));
    }

    #[test]
    fn recording_executor_output_status_reports_failure_without_erroring() {
        let exec = RecordingExecutor::new();
        exec.on(&["systemctl", "is-active", "piri"], Err("failed".to_string()));
        let (stdout, success) = exec.output_status(&["systemctl", "is-active", "piri"]).unwrap();
        assert!(!success);
        assert_eq!(stdout, b"failed");
    }

    #[test]
    fn system_executor_output_status_never_errors_on_nonzero_exit() {
        let exec = SystemExecutor;
        let (_, success) = exec.output_status(&["false"]).unwrap();
        assert!(!success);
    }

    #[test]
    fn system_executor_runs_real_process() {
        let exec = SystemExecutor;
        exec.run(&["true"]).expect("run");
        assert!(exec.run(&["false"]).is_err());
    }
}
