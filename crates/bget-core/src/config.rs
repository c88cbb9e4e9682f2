//! Global configuration loaded from `~/.config/bget/config.toml`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Engine knobs, all with working defaults. A missing config file is
/// created on first run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BgetConfig {
    /// Per-task receive window in KiB.
    pub buffer_kib: usize,
    /// Upper bound on one readiness wait, in seconds.
    pub read_timeout_secs: u64,
    /// Consecutive empty waits tolerated before the batch aborts.
    pub timeout_retries: u32,
    /// Send the genuine client identity instead of the browser string.
    #[serde(default)]
    pub genuine_agent: bool,
}

impl Default for BgetConfig {
    fn default() -> Self {
        Self {
            buffer_kib: crate::buffer::DEFAULT_CAPACITY / 1024,
            read_timeout_secs: 30,
            timeout_retries: 5,
            genuine_agent: false,
        }
    }
}

impl BgetConfig {
    pub fn buffer_capacity(&self) -> usize {
        self.buffer_kib * 1024
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("bget")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<BgetConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = BgetConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: BgetConfig = toml::from_str(&data)?;
    Ok(cfg)
}
