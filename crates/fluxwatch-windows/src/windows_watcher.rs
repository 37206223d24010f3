use anyhow::Result;
use async_trait::async_trait;
use fluxwatch_core::{
    ProcessId, SidecarError, TerminationResult, WatcherHandle, WatcherOutput,
    WatcherProcessManager, WatcherStatus,
};
use std::collections::HashMap;
use std::path::Path;

#[cfg(windows)]
mod windows_impl {
    use super::*;
    use std::process::Stdio;
    use tokio::process::{Child, Command};
    use tracing::{info, warn};

    /// Windows-specific watcher handle implementation
    pub struct WindowsWatcherHandle {
        child: Child,
        command: String,
        args: Vec<String>,
        output: Option<WatcherOutput>,
    }

    impl WindowsWatcherHandle {
        pub fn new(mut child: Child, command: String, args: Vec<String>) -> Self {
            let output = match (child.stdout.take(), child.stderr.take()) {
                (Some(stdout), Some(stderr)) => Some(WatcherOutput { stdout, stderr }),
                _ => None,
            };
            Self {
                child,
                command,
                args,
                output,
            }
        }

        /// Ask taskkill to end the process without /F. This is the closest
        /// Windows analogue to SIGTERM; console-less children that ignore
        /// it are caught by the forced kill.
        async fn taskkill(&self, pid: ProcessId) -> Result<bool> {
            let output = Command::new("taskkill")
                .args(["/PID", &pid.to_string()])
                .output()
                .await?;
            Ok(output.status.success())
        }
    }

    #[async_trait]
    impl WatcherHandle for WindowsWatcherHandle {
        fn pid(&self) -> Option<ProcessId> {
            self.child.id()
        }

        fn command(&self) -> &str {
            &self.command
        }

        fn args(&self) -> &[String] {
            &self.args
        }

        fn take_output(&mut self) -> Option<WatcherOutput> {
            self.output.take()
        }

        async fn try_wait(&mut self) -> Result<Option<WatcherStatus>> {
            match self.child.try_wait()? {
                Some(status) => Ok(Some(WatcherStatus::from_exit_status(status))),
                None => Ok(None),
            }
        }

        async fn wait(&mut self) -> Result<WatcherStatus> {
            let status = self.child.wait().await?;
            Ok(WatcherStatus::from_exit_status(status))
        }

        async fn terminate(&mut self) -> TerminationResult {
            let Some(pid) = self.pid() else {
                return TerminationResult::ProcessNotFound;
            };

            match self.taskkill(pid).await {
                Ok(true) => {
                    info!(pid, "Requested watcher termination");
                    TerminationResult::Success
                }
                Ok(false) => {
                    info!(pid, "Watcher not found for termination");
                    TerminationResult::ProcessNotFound
                }
                Err(e) => {
                    warn!(pid, error = %e, "Failed to request watcher termination");
                    TerminationResult::Failed(format!("taskkill failed: {e}"))
                }
            }
        }

        async fn kill(&mut self) -> Result<()> {
            // Already reaped; nothing left to kill.
            if self.child.try_wait()?.is_some() {
                return Ok(());
            }
            self.child
                .kill()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to kill watcher: {}", e))
        }
    }

    /// Windows-specific watcher process manager
    pub struct WindowsWatcherManager;

    impl WindowsWatcherManager {
        pub fn new() -> Self {
            Self
        }
    }

    impl Default for WindowsWatcherManager {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl WatcherProcessManager for WindowsWatcherManager {
        async fn spawn_watcher(
            &self,
            command: &str,
            args: &[String],
            working_dir: Option<&Path>,
            env: &HashMap<String, String>,
        ) -> Result<Box<dyn WatcherHandle>, SidecarError> {
            let mut cmd = Command::new(command);
            cmd.args(args);

            if let Some(dir) = working_dir {
                cmd.current_dir(dir);
            }

            for (key, value) in env {
                cmd.env(key, value);
            }

            cmd.stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .stdin(Stdio::null())
                .kill_on_drop(true);

            // CREATE_NO_WINDOW (0x08000000) - no console popup for the
            // background watcher
            cmd.creation_flags(0x08000000);

            let child = cmd
                .spawn()
                .map_err(|e| SidecarError::LaunchFailed(format!("{command}: {e}")))?;

            if let Some(pid) = child.id() {
                info!(pid, command, ?args, "Spawned watcher process");
            }

            Ok(Box::new(WindowsWatcherHandle::new(
                child,
                command.to_string(),
                args.to_vec(),
            )))
        }
    }
}

// Re-export the Windows implementation when on Windows systems
#[cfg(windows)]
pub use windows_impl::{WindowsWatcherHandle, WindowsWatcherManager};

// Provide stub implementations for non-Windows systems
#[cfg(not(windows))]
pub struct WindowsWatcherHandle;

#[cfg(not(windows))]
pub struct WindowsWatcherManager;

#[cfg(not(windows))]
impl WindowsWatcherManager {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(not(windows))]
impl Default for WindowsWatcherManager {
    fn default() -> Self {
        Self::new()
    }
}
