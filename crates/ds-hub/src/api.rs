//! # API Handlers
//!
//! Axum handlers over the engine client and the hub services. Every response
//! uses one envelope:
//!
//! ```json
//! {"success": true,  "data": { ... }}
//! {"success": false, "error": {"code": "DatabaseError", "message": "..."}}
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use ds_core::{
    BeginOutcome, Error, ErrorKind, LoadFormat, LoadOptions, LoadResponse, QueryStats,
    SearchRequest, SearchResult, TableSchema, TxnId, TxnLease, TxnState,
    DEFAULT_LOAD_TIMEOUT_SECS,
};
use ds_link::MetadataLookup;

use crate::ingest::{IngestReport, RawEvent};
use crate::search::builder::check_ident;
use crate::AppState;

// =============================================================================
// Envelope
// =============================================================================

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse {
        success: true,
        data,
    }))
}

/// An [`Error`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::Network => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::Database | ErrorKind::Deserialization => StatusCode::BAD_GATEWAY,
            ErrorKind::Config | ErrorKind::Serialization => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut error = json!({
            "code": self.0.kind(),
            "message": self.0.to_string(),
        });
        if let Some(load) = self.0.load_response() {
            error["load"] = serde_json::to_value(load).unwrap_or(Value::Null);
        }
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "Request failed: {}", self.0);
        } else {
            tracing::debug!(status = status.as_u16(), "Request rejected: {}", self.0);
        }
        (status, Json(json!({ "success": false, "error": error }))).into_response()
    }
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    pub query_endpoints: usize,
    pub load_endpoints: usize,
    pub open_transactions: usize,
}

pub async fn health(State(state): State<Arc<AppState>>) -> ApiResult<Health> {
    let selector = state.engine.selector();
    let open_transactions = state
        .txns
        .leases_snapshot()
        .iter()
        .filter(|l| l.state == TxnState::Begun)
        .count();
    ok(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        query_endpoints: selector.query_endpoints().len(),
        load_endpoints: selector.load_endpoints().len(),
        open_transactions,
    })
}

// =============================================================================
// Query
// =============================================================================

#[derive(Deserialize)]
pub struct SqlRequest {
    pub sql: String,
    #[serde(default)]
    pub database: Option<String>,
}

#[derive(Serialize)]
pub struct SqlResponse {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// Rows keyed by column name.
    pub records: Vec<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<QueryStats>,
}

pub async fn query_sql(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SqlRequest>,
) -> ApiResult<SqlResponse> {
    let database = req
        .database
        .as_deref()
        .or(state.engine.config().database.as_deref());
    let result = state.engine.execute_in(database, &req.sql).await?;
    ok(SqlResponse {
        records: result.row_maps(),
        columns: result.columns,
        rows: result.rows,
        stats: result.stats,
    })
}

pub async fn search_fulltext(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SearchRequest>,
) -> ApiResult<SearchResult> {
    ok(state.search.search(&req).await?)
}

// =============================================================================
// Ingestion and loads
// =============================================================================

#[derive(Deserialize)]
pub struct IngestRequest {
    pub events: Vec<RawEvent>,
}

pub async fn ingest_events(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IngestRequest>,
) -> ApiResult<IngestReport> {
    ok(state.ingestion.ingest_events(req.events).await?)
}

/// Query parameters of a raw stream load.
#[derive(Debug, Default, Deserialize)]
pub struct LoadParams {
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub strip_outer_array: Option<bool>,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub column_separator: Option<String>,
    #[serde(default)]
    pub row_delimiter: Option<String>,
    #[serde(default)]
    pub max_filter_ratio: Option<f64>,
    #[serde(default)]
    pub columns: Option<String>,
    #[serde(default)]
    pub merge_condition: Option<String>,
    #[serde(default)]
    pub txn_id: Option<TxnId>,
}

impl LoadParams {
    pub fn into_options(self) -> Result<LoadOptions, Error> {
        let format = match self.format.as_deref() {
            Some(f) => f.parse::<LoadFormat>()?,
            None => LoadFormat::Json,
        };
        let mut options = LoadOptions {
            format,
            strip_outer_array: self.strip_outer_array.unwrap_or(false),
            timeout_secs: self.timeout.unwrap_or(DEFAULT_LOAD_TIMEOUT_SECS),
            max_filter_ratio: self.max_filter_ratio.unwrap_or(0.0),
            label: self.label,
            column_separator: self.column_separator,
            row_delimiter: self.row_delimiter,
            merge_condition: self.merge_condition,
            txn_id: self.txn_id,
            ..LoadOptions::default()
        };
        if !(0.0..=1.0).contains(&options.max_filter_ratio) {
            return Err(Error::invalid("max_filter_ratio must be between 0 and 1"));
        }
        if let Some(columns) = self.columns {
            options = options.with_header("columns", columns);
        }
        Ok(options)
    }
}

pub async fn stream_load(
    State(state): State<Arc<AppState>>,
    Path((database, table)): Path<(String, String)>,
    Query(params): Query<LoadParams>,
    body: Bytes,
) -> ApiResult<LoadResponse> {
    check_ident(&database, "database")?;
    check_ident(&table, "table")?;
    if body.is_empty() {
        return Err(Error::invalid("load body is empty").into());
    }
    let options = params.into_options()?;
    ok(state
        .engine
        .stream_load(&database, &table, body.to_vec(), &options)
        .await?)
}

// =============================================================================
// Transactions
// =============================================================================

#[derive(Deserialize)]
pub struct BeginRequest {
    pub database: String,
    pub table: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

pub async fn txn_begin(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BeginRequest>,
) -> ApiResult<BeginOutcome> {
    check_ident(&req.database, "database")?;
    check_ident(&req.table, "table")?;
    let label = req
        .label
        .filter(|l| !l.trim().is_empty())
        .unwrap_or_else(|| format!("ds_txn_{}", uuid::Uuid::new_v4().simple()));
    let timeout = req.timeout_secs.unwrap_or(DEFAULT_LOAD_TIMEOUT_SECS);
    ok(state
        .txns
        .begin(&req.database, &req.table, &label, timeout)
        .await?)
}

#[derive(Serialize)]
pub struct TxnAck {
    pub txn_id: TxnId,
    pub state: TxnState,
}

pub async fn txn_commit(
    State(state): State<Arc<AppState>>,
    Path((database, txn_id)): Path<(String, TxnId)>,
) -> ApiResult<TxnAck> {
    check_ident(&database, "database")?;
    state.txns.commit(&database, txn_id).await?;
    ok(TxnAck {
        txn_id,
        state: TxnState::Committed,
    })
}

pub async fn txn_abort(
    State(state): State<Arc<AppState>>,
    Path((database, txn_id)): Path<(String, TxnId)>,
) -> ApiResult<TxnAck> {
    check_ident(&database, "database")?;
    state.txns.abort(&database, txn_id).await?;
    ok(TxnAck {
        txn_id,
        state: TxnState::Aborted,
    })
}

pub async fn txn_list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Vec<TxnLease>> {
    let open_only = params.get("state").map(String::as_str) == Some("begun");
    let leases = state
        .txns
        .leases_snapshot()
        .into_iter()
        .filter(|l| !open_only || l.state == TxnState::Begun)
        .collect();
    ok(leases)
}

// =============================================================================
// Metadata
// =============================================================================

pub async fn table_schema(
    State(state): State<Arc<AppState>>,
    Path((database, table)): Path<(String, String)>,
) -> ApiResult<TableSchema> {
    ok(state.metadata.table_schema(&database, &table).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ds_core::LoadStatus;

    fn status_of(err: Error) -> StatusCode {
        ApiError(err).into_response().status()
    }

    #[test]
    fn test_error_kinds_map_to_status() {
        assert_eq!(status_of(Error::invalid("x")), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(Error::Network("x".into())), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_of(Error::database("x")), StatusCode::BAD_GATEWAY);
        assert_eq!(status_of(Error::Deserialization("x".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(status_of(Error::Config("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_load_params_build_options() {
        let params = LoadParams {
            format: Some("csv".into()),
            column_separator: Some(",".into()),
            label: Some("batch_7".into()),
            columns: Some("id,msg".into()),
            timeout: Some(60),
            ..Default::default()
        };
        let options = params.into_options().unwrap();
        assert_eq!(options.format, LoadFormat::Csv);
        assert_eq!(options.column_separator.as_deref(), Some(","));
        assert_eq!(options.timeout_secs, 60);
        assert_eq!(options.headers.get("columns").map(String::as_str), Some("id,msg"));
        assert_eq!(options.label.as_deref(), Some("batch_7"));
    }

    #[test]
    fn test_load_params_reject_bad_values() {
        let bad_format = LoadParams {
            format: Some("parquet".into()),
            ..Default::default()
        };
        assert_eq!(bad_format.into_options().unwrap_err().kind(), ErrorKind::InvalidArgument);

        let bad_ratio = LoadParams {
            max_filter_ratio: Some(1.5),
            ..Default::default()
        };
        assert!(bad_ratio.into_options().is_err());
    }

    #[tokio::test]
    async fn test_error_body_carries_kind_and_load() {
        let err = Error::load_failed(
            "stream load failed",
            LoadResponse {
                status: LoadStatus::Fail,
                error_url: Some("http://be/err".into()),
                ..Default::default()
            },
        );
        let response = ApiError(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "DatabaseError");
        assert_eq!(body["error"]["load"]["ErrorURL"], "http://be/err");
    }
}
