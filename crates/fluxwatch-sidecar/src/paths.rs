use fluxwatch_core::{SidecarConfig, SidecarError};
use std::path::PathBuf;
use tracing::debug;

/// Resolve and create the directory where the watcher drops its tabular
/// output files. Explicit configuration wins; development builds fall
/// back to `./static` in the working directory, packaged builds to the
/// per-user data directory.
pub fn ensure_data_dir(config: &SidecarConfig) -> Result<PathBuf, SidecarError> {
    let dir = match &config.data_dir {
        Some(dir) => dir.clone(),
        None if cfg!(debug_assertions) => PathBuf::from("static"),
        None => dirs::data_local_dir()
            .map(|base| base.join("fluxwatch").join("static"))
            .unwrap_or_else(|| PathBuf::from("static")),
    };
    std::fs::create_dir_all(&dir)?;
    debug!(dir = %dir.display(), "Data directory ready");
    Ok(dir)
}
