use fluxwatch_core::WatcherProcessManager;
use std::sync::Arc;
use tracing::info;

/// Platform-agnostic factory that selects the appropriate watcher process
/// manager at compile time
pub struct PlatformWatcherFactory;

impl PlatformWatcherFactory {
    pub fn create_manager() -> Arc<dyn WatcherProcessManager> {
        #[cfg(unix)]
        {
            info!("Creating Unix watcher process manager");
            Arc::new(fluxwatch_unix::UnixWatcherFactory::create_manager())
        }

        #[cfg(windows)]
        {
            info!("Creating Windows watcher process manager");
            Arc::new(fluxwatch_windows::WindowsWatcherFactory::create_manager())
        }

        #[cfg(not(any(unix, windows)))]
        {
            compile_error!("Unsupported platform: only Unix and Windows are currently supported");
        }
    }

    pub fn platform_name() -> &'static str {
        #[cfg(unix)]
        {
            fluxwatch_unix::UnixWatcherFactory::platform_name()
        }

        #[cfg(windows)]
        {
            fluxwatch_windows::WindowsWatcherFactory::platform_name()
        }
    }
}
