use anyhow::Result;
use async_trait::async_trait;
use fluxwatch_core::{
    ProcessId, SidecarError, TerminationResult, WatcherHandle, WatcherOutput,
    WatcherProcessManager, WatcherStatus,
};
use std::collections::HashMap;
use std::path::Path;

#[cfg(unix)]
mod unix_impl {
    use super::*;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid as NixPid;
    use std::process::Stdio;
    use tokio::process::{Child, Command};
    use tracing::{info, warn};

    /// Unix-specific watcher handle implementation
    pub struct UnixWatcherHandle {
        child: Child,
        command: String,
        args: Vec<String>,
        output: Option<WatcherOutput>,
    }

    impl UnixWatcherHandle {
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
    }

    #[async_trait]
    impl WatcherHandle for UnixWatcherHandle {
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
            let nix_pid = NixPid::from_raw(pid as i32);

            match signal::kill(nix_pid, Signal::SIGTERM) {
                Ok(()) => {
                    info!(pid, "Sent SIGTERM to watcher");
                    TerminationResult::Success
                }
                Err(nix::errno::Errno::ESRCH) => {
                    info!(pid, "Watcher not found (already terminated)");
                    TerminationResult::ProcessNotFound
                }
                Err(nix::errno::Errno::EPERM) => {
                    warn!(pid, "Permission denied to terminate watcher");
                    TerminationResult::AccessDenied
                }
                Err(e) => {
                    warn!(pid, error = %e, "Failed to send SIGTERM to watcher");
                    TerminationResult::Failed(format!("SIGTERM failed: {e}"))
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

    /// Unix-specific watcher process manager
    pub struct UnixWatcherManager;

    impl UnixWatcherManager {
        pub fn new() -> Self {
            Self
        }
    }

    impl Default for UnixWatcherManager {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl WatcherProcessManager for UnixWatcherManager {
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

            // The watcher's output is captured distinct from our own; its
            // stdin stays closed so only the parent's control stream
            // reaches this service.
            cmd.stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .stdin(Stdio::null())
                .kill_on_drop(true);

            // New process group so stray terminal signals do not reach it
            cmd.process_group(0);

            let child = cmd
                .spawn()
                .map_err(|e| SidecarError::LaunchFailed(format!("{command}: {e}")))?;

            if let Some(pid) = child.id() {
                info!(pid, command, ?args, "Spawned watcher process");
            }

            Ok(Box::new(UnixWatcherHandle::new(
                child,
                command.to_string(),
                args.to_vec(),
            )))
        }
    }
}

// Re-export the Unix implementation when on Unix systems
#[cfg(unix)]
pub use unix_impl::{UnixWatcherHandle, UnixWatcherManager};

// Provide stub implementations for non-Unix systems
#[cfg(not(unix))]
pub struct UnixWatcherHandle;

#[cfg(not(unix))]
pub struct UnixWatcherManager;

#[cfg(not(unix))]
impl UnixWatcherManager {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(not(unix))]
impl Default for UnixWatcherManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn manager() -> UnixWatcherManager {
        UnixWatcherManager::new()
    }

    #[tokio::test]
    async fn test_spawn_and_wait() {
        let mut handle = manager()
            .spawn_watcher("true", &[], None, &HashMap::new())
            .await
            .unwrap();

        let status = handle.wait().await.unwrap();
        assert_eq!(status, WatcherStatus::Stopped { exit_code: 0 });
    }

    #[tokio::test]
    async fn test_spawn_missing_binary() {
        let result = manager()
            .spawn_watcher(
                "/nonexistent/fluxwatch-test-binary",
                &[],
                None,
                &HashMap::new(),
            )
            .await;

        assert!(matches!(result, Err(SidecarError::LaunchFailed(_))));
    }

    #[tokio::test]
    async fn test_terminate_running_watcher() {
        let mut handle = manager()
            .spawn_watcher("sleep", &["30".to_string()], None, &HashMap::new())
            .await
            .unwrap();

        let status = handle
            .terminate_with_grace(Duration::from_secs(5))
            .await
            .unwrap();
        // sleep exits straight away on SIGTERM
        assert_eq!(status, WatcherStatus::Killed { signal: Some(15) });
    }

    #[tokio::test]
    async fn test_terminate_escalates_to_kill() {
        // A child that ignores SIGTERM must be force killed slightly after
        // the grace period, never hang.
        let mut handle = manager()
            .spawn_watcher(
                "sh",
                &["-c".to_string(), "trap '' TERM; sleep 30".to_string()],
                None,
                &HashMap::new(),
            )
            .await
            .unwrap();

        // Give the shell a moment to install the trap
        tokio::time::sleep(Duration::from_millis(200)).await;

        let grace = Duration::from_millis(500);
        let started = Instant::now();
        let status = handle.terminate_with_grace(grace).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(status, WatcherStatus::Killed { signal: Some(9) });
        assert!(elapsed >= grace);
        assert!(elapsed < grace + Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_kill_is_idempotent_after_exit() {
        let mut handle = manager()
            .spawn_watcher("true", &[], None, &HashMap::new())
            .await
            .unwrap();

        handle.wait().await.unwrap();
        assert!(handle.kill().await.is_ok());
        assert!(handle.kill().await.is_ok());
    }

    #[tokio::test]
    async fn test_output_taken_once() {
        let mut handle = manager()
            .spawn_watcher("true", &[], None, &HashMap::new())
            .await
            .unwrap();

        assert!(handle.take_output().is_some());
        assert!(handle.take_output().is_none());
        handle.wait().await.unwrap();
    }
}
