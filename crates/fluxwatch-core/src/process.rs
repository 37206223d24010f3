use crate::SidecarError;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tokio::process::{ChildStderr, ChildStdout};

/// Unique identifier for a process
pub type ProcessId = u32;

/// Lifecycle state of the supervised watcher process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherStatus {
    /// No watcher has been launched yet
    NotStarted,
    /// Watcher is currently running
    Running { pid: ProcessId },
    /// Watcher exited on its own with the given exit code
    Stopped { exit_code: i32 },
    /// Watcher was terminated by a signal (Unix) or forcibly killed
    Killed { signal: Option<i32> },
}

impl WatcherStatus {
    /// Map an OS exit status onto the watcher lifecycle. A status without
    /// an exit code means the process died to a signal.
    pub fn from_exit_status(status: std::process::ExitStatus) -> Self {
        match status.code() {
            Some(code) => WatcherStatus::Stopped { exit_code: code },
            None => {
                #[cfg(unix)]
                {
                    use std::os::unix::process::ExitStatusExt;
                    WatcherStatus::Killed {
                        signal: status.signal(),
                    }
                }
                #[cfg(not(unix))]
                WatcherStatus::Killed { signal: None }
            }
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, WatcherStatus::Running { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WatcherStatus::Stopped { .. } | WatcherStatus::Killed { .. }
        )
    }
}

impl fmt::Display for WatcherStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatcherStatus::NotStarted => write!(f, "not started"),
            WatcherStatus::Running { pid } => write!(f, "running (pid {pid})"),
            WatcherStatus::Stopped { exit_code } => write!(f, "stopped (exit code {exit_code})"),
            WatcherStatus::Killed { signal: Some(sig) } => write!(f, "killed (signal {sig})"),
            WatcherStatus::Killed { signal: None } => write!(f, "killed"),
        }
    }
}

/// Result of a cooperative termination request
#[derive(Debug, Clone, PartialEq)]
pub enum TerminationResult {
    /// Signal was delivered
    Success,
    /// Process was not found (already exited)
    ProcessNotFound,
    /// Insufficient privileges to signal the process
    AccessDenied,
    /// Operation failed with specific error message
    Failed(String),
}

/// The watcher's captured output pipes, taken once after spawn and handed
/// to the stream readers.
pub struct WatcherOutput {
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// Handle to one spawned watcher process
#[async_trait]
pub trait WatcherHandle: Send + Sync {
    /// Get the process ID (None if the process has exited)
    fn pid(&self) -> Option<ProcessId>;

    /// Get the command that started this process
    fn command(&self) -> &str;

    /// Get the arguments passed to this process
    fn args(&self) -> &[String];

    /// Take ownership of the captured output pipes. Available exactly
    /// once; subsequent calls return None.
    fn take_output(&mut self) -> Option<WatcherOutput>;

    /// Try to get the exit status without blocking
    async fn try_wait(&mut self) -> Result<Option<WatcherStatus>>;

    /// Wait for the process to exit
    async fn wait(&mut self) -> Result<WatcherStatus>;

    /// Request cooperative shutdown (SIGTERM on Unix)
    async fn terminate(&mut self) -> TerminationResult;

    /// Forceful termination; idempotent if the process already exited
    async fn kill(&mut self) -> Result<()>;

    /// Complete termination strategy: cooperative signal, bounded wait,
    /// then unconditional force kill. A termination timeout is resolved
    /// here by escalation and never surfaced to the caller.
    async fn terminate_with_grace(&mut self, grace: Duration) -> Result<WatcherStatus> {
        match self.terminate().await {
            TerminationResult::Success | TerminationResult::ProcessNotFound => {}
            TerminationResult::AccessDenied | TerminationResult::Failed(_) => {
                // Signal delivery failed; the kill below still applies.
            }
        }

        match tokio::time::timeout(grace, self.wait()).await {
            Ok(status) => status,
            Err(_) => {
                self.kill().await?;
                self.wait().await
            }
        }
    }
}

/// Platform seam for launching watcher processes with captured output
#[async_trait]
pub trait WatcherProcessManager: Send + Sync {
    /// Spawn the watcher with both output streams piped. Failure to spawn
    /// (missing executable, permissions, resource limits) yields
    /// [`SidecarError::LaunchFailed`].
    async fn spawn_watcher(
        &self,
        command: &str,
        args: &[String],
        working_dir: Option<&Path>,
        env: &HashMap<String, String>,
    ) -> Result<Box<dyn WatcherHandle>, SidecarError>;
}
