use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::LedgerScope;
use crate::report::DEFAULT_REPORT_RECIPIENT;

const APP_DIR: &str = "veriscope-ledger";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Base URL of the history API. Without it, reconciliation never goes
    /// remote.
    pub api_base_url: Option<String>,

    #[serde(default = "default_remote_timeout")]
    pub remote_timeout_secs: u64,

    #[serde(default)]
    pub ledger_scope: LedgerScope,

    #[serde(default = "default_report_recipient")]
    pub report_recipient: String,

    #[serde(default = "default_image_dir")]
    pub image_dir: String,
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn default_db_path() -> String {
    let data_dir = data_dir();
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("ledger.db").to_string_lossy().to_string()
}

fn default_remote_timeout() -> u64 {
    30
}

fn default_report_recipient() -> String {
    DEFAULT_REPORT_RECIPIENT.to_string()
}

fn default_image_dir() -> String {
    data_dir().join("images").to_string_lossy().to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            api_base_url: None,
            remote_timeout_secs: default_remote_timeout(),
            ledger_scope: LedgerScope::default(),
            report_recipient: default_report_recipient(),
            image_dir: default_image_dir(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_toml(&content)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.remote_timeout_secs == 0 {
            return Err(AppError::Config(
                "remote_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    pub fn remote_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_timeout_secs)
    }
}
