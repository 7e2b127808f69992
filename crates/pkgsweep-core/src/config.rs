use config::{Config, ConfigError, File as ConfigFile};
use serde::Deserialize;

use crate::error::{Error, Result};

const DEFAULT_PRESERVE_DAYS: i64 = 90;
const DEFAULT_LRU_MAX_PACKAGES: usize = 1000;
const DEFAULT_LRU_MAX_SIZE_BYTES: u64 = 10_000_000_000; // 10 GB
const DEFAULT_CONCURRENCY: usize = 4;

/// File-level configuration, loaded from an optional `Config.toml` by the
/// CLI. Everything here can be overridden by command-line flags.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data_dir: Option<String>,
    pub store_root: Option<String>,
    pub quarantine_root: Option<String>,
    pub preserve_days: Option<i64>,
    pub enable_ml: Option<bool>,
    pub enable_symlinking: Option<bool>,
    pub lru_max_packages: Option<usize>,
    pub lru_max_size_bytes: Option<u64>,
    pub concurrency: Option<usize>,
}

pub fn load_configuration() -> std::result::Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

/// Validated configuration consumed by the optimization engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub preserve_days: i64,
    pub enable_ml: bool,
    pub enable_symlinking: bool,
    pub lru_max_packages: usize,
    pub lru_max_size_bytes: u64,
    pub concurrency: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            preserve_days: DEFAULT_PRESERVE_DAYS,
            enable_ml: true,
            enable_symlinking: false,
            lru_max_packages: DEFAULT_LRU_MAX_PACKAGES,
            lru_max_size_bytes: DEFAULT_LRU_MAX_SIZE_BYTES,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl EngineConfig {
    /// Capacity bounds are configuration errors, surfaced before any work
    /// starts rather than silently tolerated.
    pub fn validate(&self) -> Result<()> {
        if self.lru_max_packages < 1 {
            return Err(Error::Config(
                "lru_max_packages must be at least 1".into(),
            ));
        }
        if self.lru_max_size_bytes < 1 {
            return Err(Error::Config(
                "lru_max_size_bytes must be at least 1".into(),
            ));
        }
        if self.preserve_days < 0 {
            return Err(Error::Config("preserve_days must not be negative".into()));
        }
        if self.concurrency < 1 {
            return Err(Error::Config("concurrency must be at least 1".into()));
        }
        Ok(())
    }
}

impl AppConfig {
    /// Merge file values over engine defaults.
    pub fn engine_config(&self) -> EngineConfig {
        let defaults = EngineConfig::default();
        EngineConfig {
            preserve_days: self.preserve_days.unwrap_or(defaults.preserve_days),
            enable_ml: self.enable_ml.unwrap_or(defaults.enable_ml),
            enable_symlinking: self
                .enable_symlinking
                .unwrap_or(defaults.enable_symlinking),
            lru_max_packages: self.lru_max_packages.unwrap_or(defaults.lru_max_packages),
            lru_max_size_bytes: self
                .lru_max_size_bytes
                .unwrap_or(defaults.lru_max_size_bytes),
            concurrency: self.concurrency.unwrap_or(defaults.concurrency),
        }
    }
}
