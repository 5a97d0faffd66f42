use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::storage;
use crate::tracking::RecordMode;

pub const DEFAULT_CONFIG_FILE: &str = "csfloat_config.json";
pub const DEFAULT_BASE_URL: &str = "https://csfloat.com";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub tracking: TrackingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_alert_interval")]
    pub alert_interval_secs: u64,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default)]
    pub record_mode: RecordMode,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            alert_interval_secs: default_alert_interval(),
            log_dir: default_log_dir(),
            record_mode: RecordMode::default(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_timeout() -> u64 {
    10
}
fn default_log_file() -> PathBuf {
    PathBuf::from("csfloat.log")
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_interval() -> u64 {
    60
}
fn default_alert_interval() -> u64 {
    300
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("tracked_logs")
}

impl Config {
    /// Layer the JSON config file (optional) under `CSFLOAT_*` environment
    /// variables. Nested keys use a double underscore, e.g.
    /// `CSFLOAT_TRACKING__INTERVAL_SECS=30`.
    pub fn load(path: &Path) -> Result<Self> {
        dotenv::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Json)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix("CSFLOAT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

        let config: Config = settings
            .try_deserialize()
            .context("Invalid configuration values")?;
        Ok(config)
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn tracked_items_path(&self) -> PathBuf {
        self.data_dir.join("tracked_items.json")
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join("search_history.json")
    }

    pub fn item_db_path(&self) -> PathBuf {
        self.data_dir.join("cs2_items.json")
    }
}

/// Persist a new API key into the config file, keeping any other keys in it.
pub fn store_api_key(path: &Path, key: &str) -> Result<()> {
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("API key must not be empty");
    }
    let mut doc: Map<String, Value> = storage::load_json_or_default(path)?;
    doc.insert("api_key".to_string(), Value::String(key.to_string()));
    storage::save_json(path, &doc)?;
    tracing::info!("API key updated in {}", path.display());
    Ok(())
}

/// Remove the stored API key. Returns false when none was stored.
pub fn delete_api_key(path: &Path) -> Result<bool> {
    let mut doc: Map<String, Value> = storage::load_json_or_default(path)?;
    if doc.remove("api_key").is_none() {
        return Ok(false);
    }
    storage::save_json(path, &doc)?;
    tracing::info!("API key deleted from {}", path.display());
    Ok(true)
}

/// Mask all but the last four characters for display.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}
