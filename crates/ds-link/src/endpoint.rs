//! # Endpoint Selector
//!
//! Hands out one frontend address per call. Query and load traffic rotate on
//! independent cursors so reads and writes balance separately. The load
//! cursor starts at a random offset so that several processes sharing one
//! host list do not all hit the first frontend.
//!
//! No health checking: an unreachable frontend is only noticed when the call
//! routed to it fails.

use std::fmt;
use std::sync::Mutex;

use rand::Rng;

use ds_core::{Error, Result};

use crate::config::EngineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointRole {
    Query,
    Load,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub role: EndpointRole,
}

impl Endpoint {
    /// Parse `host` or `host:port`; a missing port becomes `default_port`.
    ///
    /// An `http://` prefix is accepted. Any other scheme is a
    /// [`Error::Config`]: frontends are only spoken to over plain HTTP.
    pub fn parse(raw: &str, default_port: u16, role: EndpointRole) -> Result<Self> {
        let raw = raw.trim();
        let raw = match raw.split_once("://") {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("http") => rest,
            Some((scheme, _)) => {
                return Err(Error::Config(format!(
                    "unsupported scheme {:?} in frontend host: {}",
                    scheme, raw
                )))
            }
            None => raw,
        };
        let raw = raw.trim_end_matches('/');
        if raw.is_empty() {
            return Err(Error::Config("empty frontend host".into()));
        }

        let (host, port) = match raw.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| Error::Config(format!("invalid port in frontend host: {}", raw)))?;
                (host, port)
            }
            None => (raw, default_port),
        };

        Ok(Self {
            host: host.to_string(),
            port,
            role,
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

struct Cursors {
    query: usize,
    load: usize,
}

pub struct EndpointSelector {
    query: Vec<Endpoint>,
    load: Vec<Endpoint>,
    cursors: Mutex<Cursors>,
}

impl EndpointSelector {
    pub fn new(query: Vec<Endpoint>, load: Vec<Endpoint>) -> Result<Self> {
        if query.is_empty() {
            return Err(Error::Config("no engine frontend hosts configured".into()));
        }
        let load = if load.is_empty() {
            query
                .iter()
                .map(|e| Endpoint {
                    role: EndpointRole::Load,
                    ..e.clone()
                })
                .collect()
        } else {
            load
        };
        let load_start = rand::thread_rng().gen_range(0..load.len());

        Ok(Self {
            query,
            load,
            cursors: Mutex::new(Cursors {
                query: 0,
                load: load_start,
            }),
        })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let query = config
            .hosts
            .iter()
            .map(|h| Endpoint::parse(h, config.query_port, EndpointRole::Query))
            .collect::<Result<Vec<_>>>()?;
        let load = config
            .load_hosts
            .iter()
            .map(|h| Endpoint::parse(h, config.query_port, EndpointRole::Load))
            .collect::<Result<Vec<_>>>()?;
        Self::new(query, load)
    }

    /// Next query frontend.
    pub fn next(&self) -> &Endpoint {
        self.next_for(EndpointRole::Query)
    }

    pub fn next_load(&self) -> &Endpoint {
        self.next_for(EndpointRole::Load)
    }

    pub fn next_for(&self, role: EndpointRole) -> &Endpoint {
        let mut cursors = self.cursors.lock().unwrap_or_else(|e| e.into_inner());
        let (list, cursor) = match role {
            EndpointRole::Query => (&self.query, &mut cursors.query),
            EndpointRole::Load => (&self.load, &mut cursors.load),
        };
        let idx = *cursor % list.len();
        *cursor = (idx + 1) % list.len();
        &list[idx]
    }

    pub fn query_endpoints(&self) -> &[Endpoint] {
        &self.query
    }

    pub fn load_endpoints(&self) -> &[Endpoint] {
        &self.load
    }
}
