use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Default chunk size used when none (or zero) is configured: 10 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// Process-level settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Raises the default log filter to `debug` and logs per-update progress.
    #[serde(default)]
    pub debug: bool,
    /// Root for recovery directories; the OS temp dir when unset.
    #[serde(default)]
    pub download_tmp_path: Option<PathBuf>,
}

impl ServerConfig {
    /// Recovery root actually used by downloads.
    pub fn temp_root(&self) -> PathBuf {
        self.download_tmp_path
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Write logs to a file under the XDG state dir (stderr otherwise).
    pub enable: bool,
    /// Log file name inside `<state>/pan/logs/`.
    pub file_name: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enable: true,
            file_name: "pan.log".to_string(),
        }
    }
}

/// Transfer engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Maximum chunk requests in flight across all jobs (admission capacity).
    pub max_parallel_transfers: usize,
    /// Bytes per range.
    pub chunk_size: u64,
    /// Workers per job.
    pub concurrency: usize,
    /// Failures a single range may accumulate before the job aborts.
    pub max_retries: u32,
    /// Base delay before requeueing a failed range (0 = immediate).
    #[serde(default)]
    pub retry_base_delay_ms: u64,
    /// Upper bound on the requeue delay.
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// Minimum interval between periodic progress log lines.
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

fn default_retry_max_delay_ms() -> u64 {
    30_000
}

fn default_progress_interval_ms() -> u64 {
    1_000
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_parallel_transfers: 16,
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: 4,
            max_retries: 3,
            retry_base_delay_ms: 0,
            retry_max_delay_ms: default_retry_max_delay_ms(),
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

impl TransferConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

/// Global configuration loaded from `~/.config/pan/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PanConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
}

impl PanConfig {
    /// Render as the TOML written to the config file.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("pan")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<PanConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = PanConfig::default();
        let toml = default_cfg.to_toml()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml).with_context(|| format!("write {}", path.display()))?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PanConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}
