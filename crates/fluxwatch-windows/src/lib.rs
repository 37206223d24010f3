mod windows_watcher;

pub use windows_watcher::{WindowsWatcherHandle, WindowsWatcherManager};

pub struct WindowsWatcherFactory;

impl WindowsWatcherFactory {
    pub fn create_manager() -> WindowsWatcherManager {
        WindowsWatcherManager::new()
    }

    pub fn platform_name() -> &'static str {
        "Windows"
    }
}
