//! CLI subcommands and the helpers they share.

pub mod config;
pub mod extract;
pub mod models;
pub mod records;

use std::path::{Path, PathBuf};

use dexr_core::{DexrConfig, JsonFileStore};
use tracing::debug;

/// Default location of the configuration file.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dexr")
        .join("config.json")
}

/// Path selected with `--config`, or the default one.
pub fn config_path(explicit: Option<&str>) -> PathBuf {
    explicit.map(PathBuf::from).unwrap_or_else(default_config_path)
}

/// Load the configuration.
///
/// An explicit path must exist; the default path falls back to built-in
/// defaults when absent.
pub fn load_config(explicit: Option<&str>) -> anyhow::Result<DexrConfig> {
    if let Some(path) = explicit {
        return Ok(DexrConfig::from_file(Path::new(path))?);
    }

    let path = default_config_path();
    if path.exists() {
        debug!("Loading config from {}", path.display());
        Ok(DexrConfig::from_file(&path)?)
    } else {
        Ok(DexrConfig::default())
    }
}

/// Directory holding saved records.
pub fn store_dir(config: &DexrConfig) -> PathBuf {
    config.store.dir.clone().unwrap_or_else(|| {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dexr")
            .join("records")
    })
}

/// Open the on-disk record store.
pub async fn open_store(config: &DexrConfig) -> anyhow::Result<JsonFileStore> {
    let dir = store_dir(config);
    JsonFileStore::open(&dir)
        .await
        .map_err(|e| anyhow::anyhow!("Cannot open record store at {}: {}", dir.display(), e))
}
