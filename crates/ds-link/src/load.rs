//! # Bulk Load Client
//!
//! `PUT /api/{db}/{table}/_stream_load` with the payload as body and the
//! load options as headers. The engine answers with a flat JSON verdict.
//!
//! Frontends usually redirect the load to a backend node with `307`. The
//! client follows at most [`MAX_REDIRECTS`](crate::client::MAX_REDIRECTS) hops itself, re-sending the body
//! and the basic-auth header. No retry happens on failure; callers inspect
//! the counters and `ErrorURL` of the returned [`LoadResponse`].

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, EXPECT};
use reqwest::Url;

use ds_core::{Error, LoadOptions, LoadResponse, LoadStatus, Result};

use crate::client::{engine_timeout, EngineClient};

/// Added on top of the engine-side load timeout so the engine gives up first.
const LOAD_TIMEOUT_SLACK: Duration = Duration::from_secs(30);

/// Bulk-load seam used by the ingestion service.
#[async_trait::async_trait]
pub trait StreamLoader: Send + Sync {
    async fn stream_load(
        &self,
        database: &str,
        table: &str,
        payload: Vec<u8>,
        options: &LoadOptions,
    ) -> Result<LoadResponse>;
}

impl EngineClient {
    /// Load `payload` into `database.table`.
    ///
    /// `Success` and `Publish Timeout` return `Ok`; the latter means the data
    /// probably landed and should be verified. Any other status fails with
    /// [`Error::Database`] carrying the full response.
    pub async fn stream_load(
        &self,
        database: &str,
        table: &str,
        payload: impl Into<Vec<u8>>,
        options: &LoadOptions,
    ) -> Result<LoadResponse> {
        let payload: Vec<u8> = payload.into();
        let engine_limit = engine_timeout(options.timeout_secs)?;
        let headers = load_headers(options)?;
        let endpoint = self.selector().next_load();
        let url = Url::parse(&format!(
            "{}/api/{}/{}/_stream_load",
            endpoint.base_url(),
            database,
            table
        ))
        .map_err(|e| Error::invalid(format!("invalid stream load target: {}", e)))?;
        let timeout = self.timeout_or(engine_limit.saturating_add(LOAD_TIMEOUT_SLACK));

        tracing::info!(
            database,
            table,
            url = %url,
            format = %options.format,
            two_phase = options.is_two_phase(),
            bytes = payload.len(),
            "Executing stream load"
        );

        let (status, body) = self
            .put_following_redirects(url, &headers, payload, timeout, "stream load")
            .await?;
        finish_load(database, table, status, &body)
    }
}

#[async_trait::async_trait]
impl StreamLoader for EngineClient {
    async fn stream_load(
        &self,
        database: &str,
        table: &str,
        payload: Vec<u8>,
        options: &LoadOptions,
    ) -> Result<LoadResponse> {
        EngineClient::stream_load(self, database, table, payload, options).await
    }
}

fn load_headers(options: &LoadOptions) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(EXPECT, HeaderValue::from_static("100-continue"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));

    for (name, value) in options.wire_headers() {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::invalid(format!("invalid load header name: {}", name)))?;
        let value = HeaderValue::from_str(&value)
            .map_err(|_| Error::invalid(format!("invalid value for load header {}", name)))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

fn finish_load(database: &str, table: &str, status: u16, body: &str) -> Result<LoadResponse> {
    let response: LoadResponse = serde_json::from_str(body).map_err(|e| {
        tracing::error!(status, "Malformed stream load response: {}", body);
        if status != 200 {
            Error::Deserialization(format!(
                "stream load failed with HTTP {} and unparsable body: {}: {}",
                status, e, body
            ))
        } else {
            Error::Deserialization(format!("failed to decode stream load response: {}: {}", e, body))
        }
    })?;

    if !response.is_success_equivalent() {
        tracing::error!(
            database,
            table,
            status = %response.status,
            error_url = response.error_url.as_deref().unwrap_or(""),
            "Stream load failed: {}",
            response.message
        );
        let message = format!(
            "stream load failed: status {}, message: {}, error url: {}",
            response.status,
            response.message,
            response.error_url.as_deref().unwrap_or("-")
        );
        return Err(Error::load_failed(message, response));
    }

    if response.status == LoadStatus::PublishTimeout {
        tracing::warn!(
            database,
            table,
            txn_id = response.txn_id,
            label = %response.label,
            "Stream load publish timed out; data probably landed, verify before relying on it"
        );
    } else if !response.rows_balanced() {
        tracing::warn!(
            database,
            table,
            total = response.number_total_rows,
            loaded = response.number_loaded_rows,
            filtered = response.number_filtered_rows,
            unselected = response.number_unselected_rows,
            "Stream load row counters do not add up"
        );
    }

    tracing::info!(
        database,
        table,
        status = %response.status,
        loaded = response.number_loaded_rows,
        total = response.number_total_rows,
        "Stream load completed"
    );
    Ok(response)
}
