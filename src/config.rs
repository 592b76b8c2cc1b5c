//! Console configuration management.
//!
//! Configuration is stored at `~/.config/matchdesk/config.json`. It holds
//! the gateway base URL override and the remember-me email prefill for the
//! login view; the credential itself never lives here.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
const APP_NAME: &str = "matchdesk";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Gateway used when neither the environment nor the config file names one
const DEFAULT_GATEWAY_URL: &str = "https://api.matchdesk.app/api/admin";

/// Environment variable overriding the gateway base URL
const GATEWAY_URL_ENV: &str = "MATCHDESK_GATEWAY_URL";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub gateway_url: Option<String>,
    pub remembered_email: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Resolve the gateway base URL: environment, then config, then default.
    pub fn gateway_url(&self) -> String {
        std::env::var(GATEWAY_URL_ENV)
            .ok()
            .filter(|value| !value.is_empty())
            .or_else(|| self.gateway_url.clone())
            .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string())
    }

    /// Directory holding the persisted session record.
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }
}
