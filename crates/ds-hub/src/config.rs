//! # Hub Configuration
//!
//! Read from a TOML file; every section and key has a default so a missing
//! file yields a runnable (if engine-less) config.
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:8080"
//!
//! [engine]
//! hosts = ["fe1:8030", "fe2"]
//! user = "root"
//! database = "dataseap"
//!
//! [search]
//! fan_out = 4
//!
//! [transactions]
//! sweep_interval_secs = 30
//!
//! [logging]
//! format = "json"
//!
//! [ingestion]
//! database = "dataseap"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use ds_core::{Error, Result};
use ds_link::EngineConfig;

pub const PASSWORD_ENV: &str = "DS_ENGINE_PASSWORD";

#[derive(Debug, Deserialize, Default, Clone)]
pub struct HubConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub transactions: TransactionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// Rows fetched per table before merging.
    #[serde(default = "default_per_table_limit")]
    pub per_table_limit: usize,
    /// Tables queried concurrently. 1 = one after another.
    #[serde(default = "default_fan_out")]
    pub fan_out: usize,
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
    /// Column used by time-range filters that do not name one.
    #[serde(default = "default_time_field")]
    pub default_time_field: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            per_table_limit: default_per_table_limit(),
            fan_out: default_fan_out(),
            snippet_chars: default_snippet_chars(),
            default_time_field: default_time_field(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TransactionConfig {
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Added to the engine timeout before a lease counts as orphaned.
    #[serde(default = "default_lease_grace")]
    pub lease_grace_secs: u64,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            lease_grace_secs: default_lease_grace(),
        }
    }
}

impl TransactionConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn lease_grace(&self) -> Duration {
        Duration::from_secs(self.lease_grace_secs)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestionConfig {
    /// Database receiving ingested events; one table per `data_type`.
    #[serde(default = "default_ingest_database")]
    pub database: String,
    #[serde(default = "default_ingest_timeout")]
    pub load_timeout_secs: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            database: default_ingest_database(),
            load_timeout_secs: default_ingest_timeout(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".into()
}
fn default_per_table_limit() -> usize {
    1000
}
fn default_fan_out() -> usize {
    1
}
fn default_snippet_chars() -> usize {
    100
}
fn default_time_field() -> String {
    "timestamp".into()
}
fn default_sweep_interval() -> u64 {
    30
}
fn default_lease_grace() -> u64 {
    10
}
fn default_ingest_database() -> String {
    "dataseap".into()
}
fn default_ingest_timeout() -> u64 {
    300
}

impl HubConfig {
    /// Missing file → defaults. Unreadable or malformed file → [`Error::Config`].
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
            Self::parse(&content)?
        } else {
            Self::default()
        };

        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            config.engine.password = password;
        }
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("invalid config: {}", e)))
    }
}
