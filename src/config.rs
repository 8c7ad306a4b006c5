//! Configuration types for the cache, network, storage and proxy server.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the cache store used when none is configured.
pub const DEFAULT_CACHE_NAME: &str = "precache-v1";

/// Default port for the proxy server.
pub const DEFAULT_PORT: u16 = 8787;

/// Store name and the resources pre-cached on install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Name of the cache store. Changing it yields a distinct, empty store.
    pub cache_name: String,
    /// Origin-relative paths fetched and stored on install, in order.
    pub precache: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            precache: vec!["/".to_string(), "/styles.css".to_string()],
        }
    }
}

impl CacheConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cache store name.
    #[must_use]
    pub fn with_cache_name(mut self, name: impl Into<String>) -> Self {
        self.cache_name = name.into();
        self
    }

    /// Sets the list of resources to pre-cache.
    #[must_use]
    pub fn with_precache<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.precache = resources.into_iter().map(Into::into).collect();
        self
    }
}

/// Where network requests are sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Base URL that origin-relative paths are resolved against.
    pub origin: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            origin: "http://127.0.0.1:8000".to_string(),
        }
    }
}

/// Where the on-disk store keeps its entries.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory. `None` means the platform data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Returns the configured directory or `$XDG_DATA_HOME/precache`.
    #[must_use]
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("precache")
        })
    }
}

/// Proxy server bind address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Complete application configuration, as read from `config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Cache store settings.
    pub cache: CacheConfig,
    /// Network settings.
    pub network: NetworkConfig,
    /// On-disk store settings.
    pub storage: StorageConfig,
    /// Proxy server settings.
    pub server: ServerConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the default config file path, `$XDG_CONFIG_HOME/precache/config.toml`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("precache")
            .join("config.toml")
    }

    /// Parses a config from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for this schema.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Loads the config at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Loads the config at `path`, writing a default template there first if
    /// the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the template cannot be written or the file cannot
    /// be parsed.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            log::info!("Wrote default config to {}", path.display());
            return Ok(config);
        }
        Self::load(path)
    }

    /// Saves the config to `path` atomically (write tmp + rename).
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string(self).map_err(|e| Error::Config(e.to_string()))?;
        let tmp_path = path.with_extension("toml.tmp");
        std::fs::write(&tmp_path, toml_str)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}
