use thiserror::Error;

/// Core error types for sidecar operations
#[derive(Error, Debug)]
pub enum SidecarError {
    #[error("Failed to launch watcher process: {0}")]
    LaunchFailed(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl SidecarError {
    /// Check if this error leaves the service able to keep running.
    /// A failed launch is reported through the status surface instead of
    /// taking the host down.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SidecarError::ConfigurationError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = SidecarError::LaunchFailed("no such file".to_string());
        let display = format!("{error}");
        assert!(display.contains("Failed to launch watcher process"));

        let error = SidecarError::ConfigurationError("bad port".to_string());
        let display = format!("{error}");
        assert!(display.contains("Configuration error"));
    }

    #[test]
    fn test_error_categorization() {
        assert!(SidecarError::LaunchFailed("test".to_string()).is_recoverable());
        assert!(!SidecarError::ConfigurationError("test".to_string()).is_recoverable());
    }

    #[test]
    fn test_error_debug_format() {
        let error = SidecarError::LaunchFailed("missing binary".to_string());
        let debug_str = format!("{error:?}");
        assert!(debug_str.contains("LaunchFailed"));
        assert!(debug_str.contains("missing binary"));
    }
}
