//! Server configuration, loaded from TOML.
//!
//! Every section is optional; a missing file yields a working local setup
//! with in-memory storage and an ephemeral master key.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use segvault::ServiceConfig;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "SEGVAULT_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "segvault.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: HttpSettings,
    pub storage: StorageSettings,
    pub kms: KmsSettings,
    pub service: ServiceConfig,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub bind_address: String,
    pub port: u16,
    /// Interval between expired-session sweeps.
    pub sweep_interval_secs: u64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".into(),
            port: 8080,
            sweep_interval_secs: 60,
        }
    }
}

/// Where the catalog and segment blobs live. Unset paths mean in-memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub database: Option<PathBuf>,
    pub blob_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KmsSettings {
    pub key_id: String,
    /// Master key as 64 hex chars. Prefer `master_key_env`.
    pub master_key_hex: Option<String>,
    /// Environment variable holding the hex master key.
    pub master_key_env: Option<String>,
}

impl Default for KmsSettings {
    fn default() -> Self {
        Self {
            key_id: "local".into(),
            master_key_hex: None,
            master_key_env: None,
        }
    }
}

impl KmsSettings {
    /// The configured hex key, if any.
    pub fn master_key(&self) -> Result<Option<String>> {
        if let Some(var) = &self.master_key_env {
            let value = std::env::var(var)
                .with_context(|| format!("master key env var {var} is not set"))?;
            return Ok(Some(value));
        }
        Ok(self.master_key_hex.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
    /// `text` or `json`.
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ServerConfig {
    /// Load from a TOML file. A missing file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents)
                .with_context(|| format!("invalid config in {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow!("cannot read config {}: {e}", path.display())),
        }
    }

    /// Path from `SEGVAULT_CONFIG`, or the default.
    pub fn path_from_env() -> PathBuf {
        std::env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }
}
