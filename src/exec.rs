//! External command execution with a testable seam.
//!
//! Capture, recognition and publishing all drive external tools
//! (`ffmpeg`, `rpicam-still`, `tesseract`, `mosquitto_pub`). The
//! `CommandExecutor` trait lets each of them be exercised without those
//! tools installed.

use crate::error::{MeterError, Result};
use std::collections::VecDeque;
use std::ffi::OsStr;
use std::process::Command;
use std::sync::Mutex;

/// Trait for executing system commands.
///
/// Object-safe, Send + Sync so executors can be shared behind `Arc`.
pub trait CommandExecutor: Send + Sync {
    /// Execute a command with arguments.
    ///
    /// Returns the raw stdout of the command on success.
    /// Returns an error if the command fails or is not found.
    fn execute(&self, command: &str, args: &[&str]) -> Result<Vec<u8>> {
        self.execute_with_env(command, args, &[])
    }

    /// Execute a command with extra environment variables set for the child.
    fn execute_with_env(
        &self,
        command: &str,
        args: &[&str],
        env: &[(&str, &OsStr)],
    ) -> Result<Vec<u8>>;
}

/// Production command executor using std::process::Command.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandExecutor;

impl SystemCommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for SystemCommandExecutor {
    fn execute_with_env(
        &self,
        command: &str,
        args: &[&str],
        env: &[(&str, &OsStr)],
    ) -> Result<Vec<u8>> {
        log::trace!("exec: {} {}", command, args.join(" "));
        let mut cmd = Command::new(command);
        cmd.args(args);
        for (key, value) in env {
            cmd.env(key, value);
        }
        let output = cmd.output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                MeterError::ToolNotFound {
                    tool: command.to_string(),
                }
            } else {
                MeterError::CommandFailed {
                    message: format!("Failed to execute {}: {}", command, e),
                }
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MeterError::CommandFailed {
                message: format!(
                    "{} failed with status {:?}: {}",
                    command,
                    output.status.code(),
                    stderr.trim()
                ),
            });
        }

        Ok(output.stdout)
    }
}

/// Mock command executor for testing.
///
/// Records all command executions and returns configured responses.
#[derive(Debug, Default)]
pub struct MockCommandExecutor {
    calls: Mutex<Vec<(String, Vec<String>)>>,
    envs: Mutex<Vec<Vec<(String, String)>>>,
    responses: Mutex<VecDeque<Result<Vec<u8>>>>,
}

impl MockCommandExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a successful response to the queue.
    pub fn with_response(self, response: impl Into<Vec<u8>>) -> Self {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(Ok(response.into()));
        }
        self
    }

    /// Add an error response to the queue.
    pub fn with_error(self, error: MeterError) -> Self {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(Err(error));
        }
        self
    }

    /// Get all recorded calls.
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Get the number of recorded calls.
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Get a specific call by index.
    pub fn call(&self, index: usize) -> Option<(String, Vec<String>)> {
        self.calls.lock().ok()?.get(index).cloned()
    }

    /// Get the extra environment passed to a specific call.
    pub fn env(&self, index: usize) -> Option<Vec<(String, String)>> {
        self.envs.lock().ok()?.get(index).cloned()
    }
}

impl CommandExecutor for MockCommandExecutor {
    fn execute_with_env(
        &self,
        command: &str,
        args: &[&str],
        env: &[(&str, &OsStr)],
    ) -> Result<Vec<u8>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((
                command.to_string(),
                args.iter().map(|s| s.to_string()).collect(),
            ));
        }
        if let Ok(mut envs) = self.envs.lock() {
            envs.push(
                env.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string_lossy().into_owned()))
                    .collect(),
            );
        }

        // Return the next configured response or a default success
        self.responses
            .lock()
            .ok()
            .and_then(|mut r| r.pop_front())
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

impl<E: CommandExecutor + ?Sized> CommandExecutor for std::sync::Arc<E> {
    fn execute(&self, command: &str, args: &[&str]) -> Result<Vec<u8>> {
        (**self).execute(command, args)
    }

    fn execute_with_env(
        &self,
        command: &str,
        args: &[&str],
        env: &[(&str, &OsStr)],
    ) -> Result<Vec<u8>> {
        (**self).execute_with_env(command, args, env)
    }
}
