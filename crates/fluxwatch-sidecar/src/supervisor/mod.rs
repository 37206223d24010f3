//! Watcher process supervision: the single active-child slot, its stream
//! readers and the terminate/kill escalation policy.

mod platform_factory;
mod stream_reader;


pub use platform_factory::PlatformWatcherFactory;
pub use stream_reader::spawn_line_reader;

use crate::broadcast::LogBroadcaster;
use fluxwatch_core::{
    LogEntry, LogSource, SidecarConfig, SidecarError, WatcherHandle, WatcherProcessManager,
    WatcherStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Bound on waiting for the stream readers to observe end-of-stream after
/// the child is gone.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

struct ActiveWatcher {
    handle: Box<dyn WatcherHandle>,
    readers: Vec<JoinHandle<()>>,
}

struct WatcherSlot {
    active: Option<ActiveWatcher>,
    last_status: WatcherStatus,
}

/// Orchestrates the watcher child process and wires its output into the
/// log broadcaster. Exactly one watcher may be active at a time; the slot
/// mutex serializes every lifecycle transition, so concurrent start and
/// restart requests never race into two running children.
pub struct WatcherSupervisor {
    config: SidecarConfig,
    manager: Arc<dyn WatcherProcessManager>,
    broadcaster: Arc<LogBroadcaster>,
    slot: Mutex<WatcherSlot>,
}

impl WatcherSupervisor {
    pub fn new(config: SidecarConfig, broadcaster: Arc<LogBroadcaster>) -> Self {
        info!(
            platform = PlatformWatcherFactory::platform_name(),
            "Created watcher supervisor"
        );
        Self::with_manager(config, broadcaster, PlatformWatcherFactory::create_manager())
    }

    pub fn with_manager(
        config: SidecarConfig,
        broadcaster: Arc<LogBroadcaster>,
        manager: Arc<dyn WatcherProcessManager>,
    ) -> Self {
        Self {
            config,
            manager,
            broadcaster,
            slot: Mutex::new(WatcherSlot {
                active: None,
                last_status: WatcherStatus::NotStarted,
            }),
        }
    }

    /// Launch the watcher if none is active. Calling this while a watcher
    /// is already running is a no-op that reports the existing state.
    pub async fn start(&self) -> Result<WatcherStatus, SidecarError> {
        let mut slot = self.slot.lock().await;

        if let Some(active) = slot.active.as_mut() {
            match active.handle.try_wait().await {
                Ok(None) => {
                    info!(status = %slot.last_status, "Start requested while watcher active, no-op");
                    return Ok(slot.last_status);
                }
                Ok(Some(status)) => {
                    // Exited on its own since the last poll; the slot is
                    // free again.
                    slot.last_status = status;
                    slot.active = None;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to poll watcher before start");
                    return Ok(slot.last_status);
                }
            }
        }

        self.launch(&mut slot).await
    }

    /// Current watcher state: `NotStarted` if none was ever launched,
    /// otherwise a fresh non-blocking poll of the child.
    pub async fn status(&self) -> WatcherStatus {
        let mut slot = self.slot.lock().await;

        if let Some(active) = slot.active.as_mut() {
            match active.handle.try_wait().await {
                Ok(None) => {}
                Ok(Some(status)) => {
                    slot.last_status = status;
                    // Readers finish on their own once the pipes close.
                    slot.active = None;
                    self.broadcaster
                        .append(LogEntry::new(LogSource::Sidecar, format!("watcher {status}")));
                }
                Err(e) => {
                    warn!(error = %e, "Failed to poll watcher status");
                }
            }
        }

        slot.last_status
    }

    /// Unconditionally tear down any existing watcher, then launch a fresh
    /// one. The only path that replaces an active child.
    pub async fn restart(&self) -> Result<WatcherStatus, SidecarError> {
        let mut slot = self.slot.lock().await;
        self.teardown(&mut slot).await;
        let status = self.launch(&mut slot).await?;
        info!(status = %status, "Watcher restarted");
        Ok(status)
    }

    /// Stop the watcher as part of orderly service teardown. Stops only
    /// the child, not the host.
    pub async fn shutdown(&self) {
        let mut slot = self.slot.lock().await;
        self.teardown(&mut slot).await;
    }

    async fn launch(&self, slot: &mut WatcherSlot) -> Result<WatcherStatus, SidecarError> {
        let config = &self.config;
        let mut handle = self
            .manager
            .spawn_watcher(
                &config.watcher_command,
                &config.watcher_args,
                config.working_directory.as_deref(),
                &config.env,
            )
            .await?;

        let pid = handle.pid().unwrap_or_default();
        let mut readers = Vec::new();
        if let Some(output) = handle.take_output() {
            readers.push(spawn_line_reader(
                output.stdout,
                LogSource::Stdout,
                self.broadcaster.clone(),
            ));
            readers.push(spawn_line_reader(
                output.stderr,
                LogSource::Stderr,
                self.broadcaster.clone(),
            ));
        }

        self.broadcaster.append(LogEntry::new(
            LogSource::Sidecar,
            format!("started watcher (pid {pid})"),
        ));

        let status = WatcherStatus::Running { pid };
        slot.last_status = status;
        slot.active = Some(ActiveWatcher { handle, readers });
        Ok(status)
    }

    /// Terminate the active watcher (cooperative signal, grace wait, kill
    /// escalation) and wait for its stream readers to observe
    /// end-of-stream, leaving nothing reading a dangling pipe.
    async fn teardown(&self, slot: &mut WatcherSlot) {
        let Some(mut active) = slot.active.take() else {
            return;
        };

        let status = match active
            .handle
            .terminate_with_grace(self.config.grace_period())
            .await
        {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "Watcher teardown failed, treating as killed");
                WatcherStatus::Killed { signal: None }
            }
        };
        slot.last_status = status;

        for mut reader in active.readers {
            if tokio::time::timeout(READER_DRAIN_TIMEOUT, &mut reader)
                .await
                .is_err()
            {
                warn!("Stream reader did not drain in time, aborting it");
                reader.abort();
            }
        }

        self.broadcaster
            .append(LogEntry::new(LogSource::Sidecar, format!("watcher {status}")));
        info!(status = %status, "Watcher torn down");
    }
}

// Emergency cleanup on drop - the async teardown path is unavailable
// here, so signal the child directly; kill_on_drop reaps whatever is left.
impl Drop for WatcherSupervisor {
    fn drop(&mut self) {
        let Ok(mut slot) = self.slot.try_lock() else {
            return;
        };
        let Some(active) = slot.active.take() else {
            return;
        };
        if let Some(pid) = active.handle.pid() {
            warn!(pid, "Supervisor dropped with an active watcher, sending terminate signal");

            #[cfg(unix)]
            {
                use nix::sys::signal::{self, Signal};
                use nix::unistd::Pid as NixPid;

                let _ = signal::kill(NixPid::from_raw(pid as i32), Signal::SIGTERM);
            }

            #[cfg(windows)]
            {
                use std::process::Command;

                let _ = Command::new("taskkill")
                    .args(["/F", "/PID", &pid.to_string()])
                    .output();
            }
        }
    }
}
