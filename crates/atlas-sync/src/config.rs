//! # Sync Configuration
//!
//! Configuration for pairing and dataset sync.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     ATLAS_BACKEND_URL=https://api.example.com                          │
//! │     ATLAS_CLIENT_ID=atlas-terminal                                     │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/atlas-pos/sync.toml (Linux)                              │
//! │     ~/Library/Application Support/com.atlas.pos/sync.toml (macOS)      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [backend]
//! url = "https://api.example.com"
//! client_id = "atlas-terminal"
//! request_timeout_secs = 30
//!
//! [storage]
//! database_path = "/var/lib/atlas/terminal.db"
//!
//! [sync]
//! interval_secs = 300
//! identity_refresh_secs = 3600
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Backend Settings
// =============================================================================

/// Where the backend lives and how to identify to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Base URL of the backend API (no trailing slash).
    #[serde(default = "default_backend_url")]
    pub url: String,

    /// OAuth client id presented during device authorization.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Per-request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_backend_url() -> String {
    "https://api.atlas-pos.local".to_string()
}

fn default_client_id() -> String {
    "atlas-terminal".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for BackendSettings {
    fn default() -> Self {
        BackendSettings {
            url: default_backend_url(),
            client_id: default_client_id(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

/// Local store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("com", "atlas", "pos")
        .map(|dirs| dirs.data_dir().join("terminal.db"))
        .unwrap_or_else(|| PathBuf::from("atlas-terminal.db"))
}

impl Default for StorageSettings {
    fn default() -> Self {
        StorageSettings {
            database_path: default_database_path(),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Sync cadence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Interval between reference-dataset sync cycles (seconds).
    #[serde(default = "default_sync_interval")]
    pub interval_secs: u64,

    /// Age at which the cached identity is considered stale and a
    /// background refresh is kicked off (seconds).
    #[serde(default = "default_identity_refresh")]
    pub identity_refresh_secs: u64,
}

fn default_sync_interval() -> u64 {
    300
}

fn default_identity_refresh() -> u64 {
    3600
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            interval_secs: default_sync_interval(),
            identity_refresh_secs: default_identity_refresh(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete sync-layer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AtlasConfig {
    /// Backend API settings.
    #[serde(default)]
    pub backend: BackendSettings,

    /// Local storage settings.
    #[serde(default)]
    pub storage: StorageSettings,

    /// Sync cadence settings.
    #[serde(default)]
    pub sync: SyncSettings,
}

impl AtlasConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns defaults if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if !self.backend.url.starts_with("http://") && !self.backend.url.starts_with("https://") {
            return Err(SyncError::InvalidConfig(format!(
                "Backend URL must start with http:// or https://, got: {}",
                self.backend.url
            )));
        }

        if self.backend.client_id.is_empty() {
            return Err(SyncError::InvalidConfig("client_id must not be empty".into()));
        }

        if self.backend.request_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("ATLAS_BACKEND_URL") {
            debug!(url = %url, "Overriding backend URL from environment");
            self.backend.url = url;
        }

        if let Ok(id) = std::env::var("ATLAS_CLIENT_ID") {
            self.backend.client_id = id;
        }

        if let Ok(path) = std::env::var("ATLAS_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.storage.database_path = PathBuf::from(path);
        }

        if let Ok(secs) = std::env::var("ATLAS_SYNC_INTERVAL_SECS") {
            if let Ok(s) = secs.parse::<u64>() {
                self.sync.interval_secs = s;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "atlas", "pos")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Backend base URL, without a trailing slash.
    pub fn backend_url(&self) -> &str {
        self.backend.url.trim_end_matches('/')
    }

    /// OAuth client id.
    pub fn client_id(&self) -> &str {
        &self.backend.client_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AtlasConfig::default();
        assert!(!config.backend.client_id.is_empty());
        assert_eq!(config.sync.interval_secs, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AtlasConfig::default();

        config.backend.url = "ftp://nope".to_string();
        assert!(config.validate().is_err());

        config.backend.url = "https://api.example.com".to_string();
        assert!(config.validate().is_ok());

        config.backend.client_id = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backend_url_trailing_slash() {
        let mut config = AtlasConfig::default();
        config.backend.url = "https://api.example.com/".to_string();
        assert_eq!(config.backend_url(), "https://api.example.com");
    }

    #[test]
    fn test_toml_round_trip() {
        let config = AtlasConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[backend]"));
        assert!(toml_str.contains("[sync]"));

        let parsed: AtlasConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.backend.client_id, config.backend.client_id);
    }
}
