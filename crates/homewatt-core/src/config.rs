//! Application configuration management.
//!
//! This module handles loading and saving the client configuration, which
//! includes the API base URL, the last email used to log in, where the
//! session token is kept and how often the session is swept.
//!
//! Configuration is stored at `~/.config/homewatt/config.json`.
//! `HOMEWATT_API_URL` (from the environment or a `.env` file) takes
//! precedence over the configured base URL.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::api::client::DEFAULT_API_BASE_URL;
use crate::auth::DEFAULT_SWEEP_INTERVAL;
use crate::storage::{FileStore, KeyValueStore, KeyringStore};

/// Application name used for config/data directory paths
const APP_NAME: &str = "homewatt";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the API base URL
pub const API_URL_ENV: &str = "HOMEWATT_API_URL";

/// Where the session token is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenBackend {
    #[default]
    File,
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub last_email: Option<String>,
    #[serde(default)]
    pub token_backend: TokenBackend,
    pub sweep_interval_secs: Option<u64>,
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

    /// Directory for the key/value store and logs
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Environment override, then config, then the default
    pub fn api_base_url(&self) -> String {
        Self::resolve_base_url(std::env::var(API_URL_ENV).ok(), self.api_base_url.as_deref())
    }

    fn resolve_base_url(env: Option<String>, configured: Option<&str>) -> String {
        env.filter(|url| !url.trim().is_empty())
            .or_else(|| configured.map(str::to_string))
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
    }

    pub fn sweep_interval(&self) -> Duration {
        match self.sweep_interval_secs {
            Some(secs) if secs > 0 => Duration::from_secs(secs),
            _ => DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// General-purpose store (chat history and, by default, the token)
    pub fn data_store(&self) -> Result<Arc<dyn KeyValueStore>> {
        Ok(Arc::new(FileStore::in_dir(&self.data_dir()?)))
    }

    /// Store the session token should live in
    pub fn token_store_backend(&self) -> Result<Arc<dyn KeyValueStore>> {
        match self.token_backend {
            TokenBackend::File => self.data_store(),
            TokenBackend::Keyring => Ok(Arc::new(KeyringStore::default())),
        }
    }
}
