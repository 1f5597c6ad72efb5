//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the API base URL, timeouts, the session storage backend
//! and the last used username.
//!
//! Configuration is stored at `~/.config/waypass/config.json`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::{
    encrypted, ConfiguredStore, EncryptedFileSessionStore, KeychainSessionStore,
    MemorySessionStore,
};

/// Application name used for config/data directory paths
pub const APP_NAME: &str = "waypass";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default API base URL when neither config nor environment sets one
const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Where sessions are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionBackend {
    Memory,
    #[default]
    Keychain,
    EncryptedFile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    /// Upper bound for one token refresh call. Unset means wait indefinitely.
    pub refresh_timeout_secs: Option<u64>,
    pub session_backend: SessionBackend,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            refresh_timeout_secs: None,
            session_backend: SessionBackend::default(),
            last_username: None,
        }
    }
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

    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn refresh_timeout(&self) -> Option<Duration> {
        self.refresh_timeout_secs.map(Duration::from_secs)
    }

    /// Open the configured session store.
    ///
    /// `passphrase` is required for the encrypted file backend.
    pub fn open_session_store(&self, passphrase: Option<&str>) -> Result<ConfiguredStore> {
        let store = match self.session_backend {
            SessionBackend::Memory => ConfiguredStore::Memory(MemorySessionStore::new()),
            SessionBackend::Keychain => ConfiguredStore::Keychain(
                KeychainSessionStore::new().context("Failed to open keychain entry")?,
            ),
            SessionBackend::EncryptedFile => {
                let passphrase = passphrase.ok_or_else(|| {
                    anyhow::anyhow!("encrypted_file session backend needs a passphrase")
                })?;
                let path = self.data_dir()?.join(encrypted::SESSION_FILE);
                ConfiguredStore::EncryptedFile(EncryptedFileSessionStore::new(path, passphrase))
            }
        };
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join(CONFIG_FILE)).unwrap();

        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.refresh_timeout(), None);
        assert_eq!(config.session_backend, SessionBackend::Keychain);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let config = Config {
            refresh_timeout_secs: Some(15),
            session_backend: SessionBackend::EncryptedFile,
            last_username: Some("alice".to_string()),
            ..Config::default()
        };
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.refresh_timeout(), Some(Duration::from_secs(15)));
        assert_eq!(loaded.session_backend, SessionBackend::EncryptedFile);
        assert_eq!(loaded.last_username.as_deref(), Some("alice"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, r#"{"session_backend": "memory"}"#).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.session_backend, SessionBackend::Memory);
        assert_eq!(loaded.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    }

    #[test]
    fn test_memory_backend_opens() {
        let config = Config {
            session_backend: SessionBackend::Memory,
            ..Config::default()
        };
        assert!(matches!(
            config.open_session_store(None),
            Ok(ConfiguredStore::Memory(_))
        ));
    }

    #[test]
    fn test_encrypted_backend_needs_passphrase() {
        let config = Config {
            session_backend: SessionBackend::EncryptedFile,
            ..Config::default()
        };
        assert!(config.open_session_store(None).is_err());
    }
}
