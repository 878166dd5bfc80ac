//! Application settings and API key lookup.
//!
//! Settings live in `<config_dir>/scentmix/config.toml`; every field has a
//! default, so a missing file is the same as an empty one. API keys never go
//! in the file: they come from `SCENTMIX_API_KEY` or the OS keychain.

use std::path::{Path, PathBuf};

use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ConfigError;

pub const API_KEY_ENV: &str = "SCENTMIX_API_KEY";
const KEYCHAIN_USER: &str = "scentmix";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// One of claude, openai, kimi, openrouter
    pub provider: String,
    pub model: String,
    /// Recipe service URL. When set, it is used instead of calling a model directly.
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
    /// Offer the direct recipe in both slots when generation fails
    pub fallback_to_direct: bool,
    /// Who or what the blend is for, passed to the generator
    pub context_name: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: "claude".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            endpoint: None,
            timeout_secs: 60,
            fallback_to_direct: true,
            context_name: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub generation: GenerationConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Read settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: AppConfig = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Read settings from the default location.
    pub fn load_default() -> Result<Self, ConfigError> {
        match config_path() {
            Some(path) => Self::load(&path),
            None => {
                warn!("No config directory on this platform, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Where the feedback history database lives.
    pub fn db_path(&self) -> PathBuf {
        self.storage.db_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("scentmix")
                .join("feedback.db")
        })
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("scentmix").join("config.toml"))
}

/// Keychain service name for a provider's API key.
pub fn keychain_service(provider: &str) -> String {
    format!("scentmix-{}-api", provider)
}

/// API key for `provider`: the environment variable first, then the keychain.
pub fn resolve_api_key(provider: &str) -> Result<String, ConfigError> {
    resolve_with(std::env::var(API_KEY_ENV).ok(), provider, keychain_lookup)
}

/// Like `resolve_api_key`, but a missing key is not an error.
pub fn optional_api_key(provider: &str) -> Result<Option<String>, ConfigError> {
    match resolve_api_key(provider) {
        Ok(key) => Ok(Some(key)),
        Err(ConfigError::MissingApiKey(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn resolve_with(
    env_value: Option<String>,
    provider: &str,
    keychain: impl Fn(&str) -> Result<Option<String>, ConfigError>,
) -> Result<String, ConfigError> {
    if let Some(key) = env_value.filter(|k| !k.trim().is_empty()) {
        debug!("Using API key from {}", API_KEY_ENV);
        return Ok(key.trim().to_string());
    }
    keychain(&keychain_service(provider))?.ok_or_else(|| ConfigError::MissingApiKey(provider.to_string()))
}

fn keychain_lookup(service: &str) -> Result<Option<String>, ConfigError> {
    let entry = Entry::new(service, KEYCHAIN_USER).map_err(|e| {
        warn!("Failed to create keyring entry for {}: {}", service, e);
        ConfigError::Keychain(e.to_string())
    })?;
    match entry.get_password() {
        Ok(password) => Ok(Some(password)),
        Err(keyring::Error::NoEntry) => {
            info!("No API key found for service: {}", service);
            Ok(None)
        }
        Err(e) => {
            warn!("Failed to get password for {}: {}", service, e);
            Err(ConfigError::Keychain(e.to_string()))
        }
    }
}

/// Store a provider's API key in the OS keychain.
pub fn store_api_key(provider: &str, key: &str) -> Result<(), ConfigError> {
    let service = keychain_service(provider);
    info!("Setting API key for service: {}", service);
    let entry = Entry::new(&service, KEYCHAIN_USER).map_err(|e| {
        warn!("Failed to create keyring entry for {}: {}", service, e);
        ConfigError::Keychain(e.to_string())
    })?;
    entry.set_password(key).map_err(|e| {
        warn!("Failed to set password for {}: {}", service, e);
        ConfigError::Keychain(e.to_string())
    })
}
