use anyhow::{Result, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::fs;
use tracing::{info, debug};

/// Environment variable overriding the store connection string
pub const MONGODB_URI_ENV: &str = "ENAMAD_MONGODB_URI";

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct CrawlerConfig {
    pub fetcher: FetcherSettings,
    pub storage: StorageSettings,
    pub server: ServerSettings,
}

/// Fetcher timeout and retry settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FetcherSettings {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,  // Fixed delay between attempts
    pub user_agent: String,
}

/// Record store settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StorageSettings {
    pub storage_type: String, // "mongodb", "memory"
    pub connection_string: String,
    pub database_name: String,
    pub collection_name: String,
}

/// HTTP server settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ServerSettings {
    pub bind_address: String,
}

impl Default for FetcherSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_retries: 2,
            retry_backoff_ms: 500,
            user_agent: format!("enamad-crawler/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            storage_type: "mongodb".to_string(),
            connection_string: "mongodb://localhost:27017".to_string(),
            database_name: "enamad".to_string(),
            collection_name: "websites".to_string(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
        }
    }
}

impl CrawlerConfig {
    /// Get the path to the config directory
    fn config_dir() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "enamad-crawler", "enamad-crawler") {
            proj_dirs.config_dir().to_path_buf()
        } else {
            PathBuf::from("./config")
        }
    }

    /// Path of the default configuration file
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("default.yaml")
    }

    /// Load the default configuration, writing one out on first use
    pub fn load_default() -> Result<Self> {
        let config_path = Self::default_path();

        let config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            info!("Default configuration not found. Creating...");
            let config = Self::default();
            config.save_to_file(&config_path)?;
            config
        };

        Ok(config.with_env_overrides())
    }

    /// Load an explicit configuration file
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Ok(Self::load_from_file(path)?.with_env_overrides()),
            None => Self::load_default(),
        }
    }

    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());
        let contents = fs::read_to_string(path)
            .context(format!("Failed to read configuration file: {}", path.display()))?;

        let config: Self = serde_yaml::from_str(&contents)
            .context(format!("Failed to parse configuration file: {}", path.display()))?;

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        debug!("Saving configuration to: {}", path.display());

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let contents = serde_yaml::to_string(self)
            .context("Failed to serialize configuration")?;

        fs::write(path, contents)
            .context(format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(uri) = std::env::var(MONGODB_URI_ENV) {
            if !uri.trim().is_empty() {
                debug!("Using store connection string from {}", MONGODB_URI_ENV);
                self.storage.connection_string = uri;
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CrawlerConfig::default();
        assert_eq!(config.fetcher.timeout_ms, 10_000);
        assert_eq!(config.fetcher.max_retries, 2);
        assert_eq!(config.storage.storage_type, "mongodb");
        assert_eq!(config.storage.collection_name, "websites");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let mut config = CrawlerConfig::default();
        config.storage.storage_type = "memory".to_string();
        config.fetcher.max_retries = 5;
        config.save_to_file(&path).unwrap();

        let loaded = CrawlerConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        fs::write(&path, "fetcher: [not, a, map]").unwrap();

        assert!(CrawlerConfig::load_from_file(&path).is_err());
    }
}
