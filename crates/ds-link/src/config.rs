//! Engine connection settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Frontend addresses, `host` or `host:port`.
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Separate frontends for stream loads. Falls back to `hosts` when empty.
    #[serde(default)]
    pub load_hosts: Vec<String>,
    /// Port applied to hosts that do not name one.
    #[serde(default = "default_query_port")]
    pub query_port: u16,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Sent as the `Database` header on queries.
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
    #[serde(default = "default_pool_max_idle")]
    pub pool_max_idle_per_host: usize,
    #[serde(default = "default_pool_idle_timeout")]
    pub pool_idle_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            load_hosts: Vec::new(),
            query_port: default_query_port(),
            user: default_user(),
            password: String::new(),
            database: None,
            connect_timeout_secs: default_connect_timeout(),
            query_timeout_secs: default_query_timeout(),
            pool_max_idle_per_host: default_pool_max_idle(),
            pool_idle_timeout_secs: default_pool_idle_timeout(),
        }
    }
}

impl EngineConfig {
    pub fn with_hosts<S: Into<String>>(hosts: impl IntoIterator<Item = S>) -> Self {
        Self {
            hosts: hosts.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout_secs)
    }
}

fn default_query_port() -> u16 {
    8030
}
fn default_user() -> String {
    "root".into()
}
fn default_connect_timeout() -> u64 {
    5
}
fn default_query_timeout() -> u64 {
    30
}
fn default_pool_max_idle() -> usize {
    20
}
fn default_pool_idle_timeout() -> u64 {
    90
}
