//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the API base URL, the token renewal buffer, where the
//! session is stored, and the last used username.
//!
//! Configuration is stored at `~/.config/zvikoro/config.json`. Any field can
//! be overridden from the environment (see [`Config::apply_env`]).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::endpoints::DEFAULT_BASE_URL;
use crate::auth::{ExpiryPolicy, DEFAULT_REFRESH_BUFFER_MS};
use crate::storage::{FileStore, KeyValueStore, KeyringStore, MemoryStore};

/// Application name used for config/data directory paths
const APP_NAME: &str = "zvikoro";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub const ENV_BASE_URL: &str = "ZVIKORO_BASE_URL";
pub const ENV_REFRESH_BUFFER_MS: &str = "ZVIKORO_REFRESH_BUFFER_MS";
pub const ENV_STORAGE: &str = "ZVIKORO_STORAGE";

/// Where the session is persisted between runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// JSON files in the data directory
    #[default]
    File,
    /// OS keychain
    Keyring,
    /// Nothing persisted; every run starts logged out
    Memory,
}

impl StorageBackend {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "file" => Some(Self::File),
            "keyring" | "keychain" => Some(Self::Keyring),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub base_url: Option<String>,
    /// How long before expiry to renew the access token, in milliseconds
    pub refresh_buffer_ms: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub storage: StorageBackend,
    /// Overrides the data directory for file storage
    pub session_dir: Option<PathBuf>,
    pub last_username: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
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

    /// Apply `ZVIKORO_*` overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any variable source. Unparsable values are
    /// ignored with a warning.
    pub fn apply_env_from<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = var(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.base_url = Some(url);
        }
        if let Some(raw) = var(ENV_REFRESH_BUFFER_MS) {
            match raw.trim().parse() {
                Ok(ms) => self.refresh_buffer_ms = Some(ms),
                Err(_) => warn!(value = %raw, "Ignoring invalid {}", ENV_REFRESH_BUFFER_MS),
            }
        }
        if let Some(raw) = var(ENV_STORAGE) {
            match StorageBackend::parse(&raw) {
                Some(backend) => self.storage = backend,
                None => warn!(value = %raw, "Ignoring invalid {}", ENV_STORAGE),
            }
        }
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn expiry_policy(&self) -> ExpiryPolicy {
        ExpiryPolicy::from_millis(self.refresh_buffer_ms.unwrap_or(DEFAULT_REFRESH_BUFFER_MS))
    }

    pub fn request_timeout_secs(&self) -> u64 {
        self.request_timeout_secs
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
    }

    pub fn session_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.session_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Open the configured session storage
    pub fn open_storage(&self) -> Result<Arc<dyn KeyValueStore>> {
        Ok(match self.storage {
            StorageBackend::File => Arc::new(FileStore::new(self.session_dir()?)),
            StorageBackend::Keyring => Arc::new(KeyringStore::new()),
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
        assert_eq!(config.expiry_policy().buffer(), Duration::from_millis(60_000));
        assert_eq!(config.request_timeout_secs(), 30);
        assert_eq!(config.storage, StorageBackend::File);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_BASE_URL, "http://localhost:8000/schools/"),
            (ENV_REFRESH_BUFFER_MS, "5000"),
            (ENV_STORAGE, "Keyring"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env_from(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.base_url(), "http://localhost:8000/schools/");
        assert_eq!(config.expiry_policy().buffer(), Duration::from_millis(5000));
        assert_eq!(config.storage, StorageBackend::Keyring);
    }

    #[test]
    fn test_invalid_env_values_ignored() {
        let mut config = Config {
            refresh_buffer_ms: Some(10),
            ..Default::default()
        };
        config.apply_env_from(|key| match key {
            ENV_REFRESH_BUFFER_MS => Some("soon".to_string()),
            ENV_STORAGE => Some("floppy".to_string()),
            ENV_BASE_URL => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.refresh_buffer_ms, Some(10));
        assert_eq!(config.storage, StorageBackend::File);
        assert_eq!(config.base_url(), DEFAULT_BASE_URL);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zvikoro").join(CONFIG_FILE);

        let config = Config {
            base_url: Some("http://example.test/".to_string()),
            storage: StorageBackend::Memory,
            last_username: Some("alice".to_string()),
            ..Default::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.base_url(), "http://example.test/");
        assert_eq!(loaded.storage, StorageBackend::Memory);
        assert_eq!(loaded.last_username.as_deref(), Some("alice"));
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert!(loaded.base_url.is_none());
    }

    #[test]
    fn test_session_dir_override() {
        let config = Config {
            session_dir: Some(PathBuf::from("/tmp/zvikoro-test")),
            ..Default::default()
        };
        assert_eq!(config.session_dir().unwrap(), PathBuf::from("/tmp/zvikoro-test"));
    }
}
