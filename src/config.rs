//! Configuration types for the cache lifecycle and its host.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::url::normalize_origin;

/// Configuration for one worker version's cache lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Origin the worker serves, e.g. `https://app.example.com`.
    pub origin: String,
    /// Name of the durable content store.
    pub content_cache: String,
    /// Name of the install staging store.
    pub temp_cache: String,
    /// Name of the store holding the last activated manifest.
    pub manifest_cache: String,
    /// Number of concurrent fetches during bulk fills.
    pub offline_concurrency: usize,
    /// Number of install attempts the host makes before giving up.
    pub install_attempts: usize,
    /// Delay between install attempts, in milliseconds.
    pub install_retry_delay_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:8080".to_string(),
            content_cache: "app-cache".to_string(),
            temp_cache: "app-temp-cache".to_string(),
            manifest_cache: "app-manifest".to_string(),
            offline_concurrency: 4,
            install_attempts: 3,
            install_retry_delay_ms: 1000,
        }
    }
}

impl WorkerConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the origin.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Sets the three store names.
    #[must_use]
    pub fn with_cache_names(
        mut self,
        content: impl Into<String>,
        temp: impl Into<String>,
        manifest: impl Into<String>,
    ) -> Self {
        self.content_cache = content.into();
        self.temp_cache = temp.into();
        self.manifest_cache = manifest.into();
        self
    }

    /// Sets the number of concurrent fetches during bulk fills.
    #[must_use]
    pub const fn with_offline_concurrency(mut self, concurrency: usize) -> Self {
        self.offline_concurrency = concurrency;
        self
    }

    /// Sets the number of install attempts.
    #[must_use]
    pub const fn with_install_attempts(mut self, attempts: usize) -> Self {
        self.install_attempts = attempts;
        self
    }

    /// Sets the delay between install attempts.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_install_retry_delay(mut self, delay: Duration) -> Self {
        self.install_retry_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Returns the delay between install attempts.
    #[must_use]
    pub const fn install_retry_delay(&self) -> Duration {
        Duration::from_millis(self.install_retry_delay_ms)
    }

    /// Returns the store names in `[content, temp, manifest]` order.
    #[must_use]
    pub fn cache_names(&self) -> [&str; 3] {
        [&self.content_cache, &self.temp_cache, &self.manifest_cache]
    }

    /// Validates the origin and returns a copy with it normalized.
    ///
    /// # Errors
    ///
    /// Returns an error if the origin is not `scheme://host[:port]`.
    pub fn normalized(&self) -> Result<Self> {
        Ok(Self {
            origin: normalize_origin(&self.origin)?,
            ..self.clone()
        })
    }
}

/// Path configuration for stores and config files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Directory holding the durable stores.
    pub store_dir: PathBuf,
    /// Directory where configuration files are read from.
    pub config_dir: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));

        Self {
            store_dir: data_dir.join("shellcache").join("caches"),
            config_dir: config_dir.join("shellcache"),
        }
    }
}

impl PathConfig {
    /// Returns the default config file location.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }
}

/// HTTP front configuration.
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
            port: 8080,
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Cache lifecycle configuration.
    pub worker: WorkerConfig,
    /// Path configuration.
    pub paths: PathConfig,
    /// HTTP front configuration.
    pub server: ServerConfig,
    /// Asset manifest file produced by the web build.
    pub manifest: Option<PathBuf>,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Loads `path` if given, otherwise the default config file if it exists,
    /// otherwise defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let default_path = PathConfig::default().config_file();
        if default_path.exists() {
            Self::load(&default_path)
        } else {
            Ok(Self::default())
        }
    }
}
