use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

fn default_listen() -> String {
    "127.0.0.1:19800".to_string()
}

fn default_sweep_interval() -> u64 {
    600
}

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// TCP address the ingestion server listens on.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Root directory for stored backup files.
    pub storage_dir: PathBuf,
    /// Root directory of the persisted job metadata store.
    pub metadata_dir: PathBuf,
    /// Seconds between expiry sweeps; 0 disables the sweep loop.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Config> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        toml::from_str(&data).with_context(|| format!("cannot parse config {}", path.display()))
    }
}
