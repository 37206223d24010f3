mod unix_watcher;

pub use unix_watcher::{UnixWatcherHandle, UnixWatcherManager};

pub struct UnixWatcherFactory;

impl UnixWatcherFactory {
    pub fn create_manager() -> UnixWatcherManager {
        UnixWatcherManager::new()
    }

    pub fn platform_name() -> &'static str {
        "Unix"
    }
}
