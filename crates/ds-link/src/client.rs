//! # Engine Client
//!
//! One pooled `reqwest::Client` shared by every query, load and transaction
//! call. Cloning an [`EngineClient`] is cheap; all clones share the pool and
//! the endpoint cursors.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, LOCATION};
use reqwest::redirect::Policy;
use reqwest::{RequestBuilder, Response, StatusCode, Url};

use ds_core::{Error, Result};

use crate::config::EngineConfig;
use crate::endpoint::EndpointSelector;

/// Redirect hops followed by a single `PUT` before giving up.
pub const MAX_REDIRECTS: usize = 3;

/// Largest caller-supplied engine timeout accepted (30 days).
pub const MAX_ENGINE_TIMEOUT_SECS: u64 = 30 * 24 * 60 * 60;

struct Inner {
    http: reqwest::Client,
    config: EngineConfig,
    selector: EndpointSelector,
}

#[derive(Clone)]
pub struct EngineClient {
    inner: Arc<Inner>,
    /// Per-call deadline set through [`EngineClient::with_timeout`].
    timeout_override: Option<Duration>,
}

impl EngineClient {
    /// Fails with [`Error::Config`] when no frontend is configured.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let selector = EndpointSelector::from_config(&config)?;

        // Stream loads are redirected to backend nodes; the load path follows
        // those hops itself so the body and credentials go along.
        let http = reqwest::Client::builder()
            .redirect(Policy::none())
            .connect_timeout(config.connect_timeout())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(config.pool_idle_timeout())
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        tracing::info!(
            "Engine client ready: {} query frontend(s), {} load frontend(s)",
            selector.query_endpoints().len(),
            selector.load_endpoints().len()
        );

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                config,
                selector,
            }),
            timeout_override: None,
        })
    }

    /// A clone whose requests all carry `timeout`, overriding configured ones.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            inner: self.inner.clone(),
            timeout_override: Some(timeout),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn selector(&self) -> &EndpointSelector {
        &self.inner.selector
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    pub(crate) fn timeout_or(&self, default: Duration) -> Duration {
        self.timeout_override.unwrap_or(default)
    }

    pub(crate) fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let config = &self.inner.config;
        request.basic_auth(&config.user, Some(&config.password))
    }

    /// `PUT` that follows up to [`MAX_REDIRECTS`] `307`/`308` hops itself,
    /// re-sending body, headers and basic auth on every hop. Returns the
    /// status and body of the first non-redirect response.
    pub(crate) async fn put_following_redirects(
        &self,
        mut url: Url,
        headers: &HeaderMap,
        body: Vec<u8>,
        timeout: Duration,
        what: &str,
    ) -> Result<(u16, String)> {
        for hop in 0..=MAX_REDIRECTS {
            let response = self
                .authorize(self.http().put(url.clone()))
                .headers(headers.clone())
                .timeout(timeout)
                .body(body.clone())
                .send()
                .await
                .map_err(|e| {
                    tracing::error!(url = %url, "{} request failed: {}", what, e);
                    network_error(&format!("{} request failed", what), e)
                })?;

            let status = response.status();
            if status == StatusCode::TEMPORARY_REDIRECT || status == StatusCode::PERMANENT_REDIRECT
            {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        Error::database(format!("{} redirect from {} without Location", what, url))
                    })?;
                let next = url.join(location).map_err(|e| {
                    Error::database(format!("invalid {} redirect {}: {}", what, location, e))
                })?;
                tracing::debug!(hop = hop + 1, from = %url, to = %next, "Following {} redirect", what);
                url = next;
                continue;
            }

            return read_body(response, &format!("failed to read {} response", what)).await;
        }

        Err(Error::Network(format!(
            "{} exceeded {} redirects, last hop {}",
            what, MAX_REDIRECTS, url
        )))
    }
}

/// Caller-supplied engine timeout, rejected above [`MAX_ENGINE_TIMEOUT_SECS`].
pub(crate) fn engine_timeout(timeout_secs: u64) -> Result<Duration> {
    if timeout_secs > MAX_ENGINE_TIMEOUT_SECS {
        return Err(Error::invalid(format!(
            "timeout {}s exceeds the maximum of {}s",
            timeout_secs, MAX_ENGINE_TIMEOUT_SECS
        )));
    }
    Ok(Duration::from_secs(timeout_secs))
}

pub(crate) fn network_error(context: &str, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Network(format!("{}: timed out: {}", context, err))
    } else {
        Error::Network(format!("{}: {}", context, err))
    }
}

/// Status plus full body text. Body read failures are transport failures.
pub(crate) async fn read_body(response: Response, context: &str) -> Result<(u16, String)> {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| network_error(context, e))?;
    Ok((status, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_rejected() {
        let err = EngineClient::new(EngineConfig::default()).err().unwrap();
        assert_eq!(err.kind(), ds_core::ErrorKind::Config);
    }

    #[test]
    fn test_with_timeout_overrides_default() {
        let client = EngineClient::new(EngineConfig::with_hosts(["fe1"])).unwrap();
        let default = Duration::from_secs(30);
        assert_eq!(client.timeout_or(default), default);
        let short = client.with_timeout(Duration::from_millis(250));
        assert_eq!(short.timeout_or(default), Duration::from_millis(250));
        assert_eq!(short.selector().next().to_string(), "fe1:8030");
    }

    #[test]
    fn test_engine_timeout_is_capped() {
        assert_eq!(engine_timeout(300).unwrap(), Duration::from_secs(300));
        assert!(engine_timeout(MAX_ENGINE_TIMEOUT_SECS).is_ok());
        let err = engine_timeout(u64::MAX).unwrap_err();
        assert_eq!(err.kind(), ds_core::ErrorKind::InvalidArgument);
    }
}
