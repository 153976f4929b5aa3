//! # Query Executor
//!
//! `POST /api/v1/query` with `{"sql": ...}`. The engine wraps results in
//! `{code, msg, data: {meta, result, property}}`; `code == 0` is success.
//!
//! There is no server-side parameterization. Callers build safe SQL.

use serde::Deserialize;
use serde_json::{Map, Value};

use ds_core::{Error, QueryResult, QueryStats, Result};

use crate::client::{network_error, read_body, EngineClient};

/// Anything that can run one SQL statement. The search orchestrator and the
/// metadata lookup depend on this seam rather than on [`EngineClient`].
#[async_trait::async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<QueryResult>;
}

#[derive(Deserialize)]
struct QueryEnvelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Option<QueryData>,
}

#[derive(Deserialize, Default)]
struct QueryData {
    #[serde(default)]
    meta: Vec<ColumnMeta>,
    #[serde(default)]
    result: Vec<Vec<Value>>,
    #[serde(default)]
    property: Map<String, Value>,
}

#[derive(Deserialize)]
struct ColumnMeta {
    name: String,
}

impl EngineClient {
    /// Run `sql` against the configured default database.
    pub async fn execute(&self, sql: &str) -> Result<QueryResult> {
        let database = self.config().database.clone();
        self.execute_in(database.as_deref(), sql).await
    }

    /// Positional arguments are not supported by the engine's HTTP API. They
    /// are logged and ignored; `sql` runs unchanged.
    pub async fn execute_with_args(&self, sql: &str, args: &[Value]) -> Result<QueryResult> {
        if !args.is_empty() {
            tracing::warn!(
                args = args.len(),
                "Positional query arguments ignored: the engine HTTP API has no parameterization"
            );
        }
        self.execute(sql).await
    }

    /// Run `sql` with an explicit `Database` header (none when `database` is `None`).
    pub async fn execute_in(&self, database: Option<&str>, sql: &str) -> Result<QueryResult> {
        if sql.trim().is_empty() {
            return Err(Error::invalid("empty SQL statement"));
        }

        let endpoint = self.selector().next();
        let url = format!("{}/api/v1/query", endpoint.base_url());
        tracing::debug!(endpoint = %endpoint, "Executing query: {}", preview(sql));

        let mut request = self
            .authorize(self.http().post(&url))
            .header("Content-Type", "application/json;charset=UTF-8")
            .timeout(self.timeout_or(self.config().query_timeout()))
            .json(&serde_json::json!({ "sql": sql }));
        if let Some(db) = database.filter(|d| !d.is_empty()) {
            request = request.header("Database", db);
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(url = %url, "Query request failed: {}", e);
            network_error("query request failed", e)
        })?;
        let (status, body) = read_body(response, "failed to read query response").await?;

        parse_query_response(status, &body)
    }
}

#[async_trait::async_trait]
impl SqlExecutor for EngineClient {
    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        EngineClient::execute(self, sql).await
    }
}

fn parse_query_response(status: u16, body: &str) -> Result<QueryResult> {
    if status != 200 {
        tracing::error!(status, "Query failed: {}", body);
        return Err(Error::database(format!(
            "query failed: HTTP {}, response: {}",
            status, body
        )));
    }

    let envelope: QueryEnvelope = serde_json::from_str(body).map_err(|e| {
        tracing::error!("Malformed query response: {}", body);
        Error::Deserialization(format!("failed to decode query response: {}: {}", e, body))
    })?;

    if envelope.code != 0 {
        tracing::error!(code = envelope.code, "Query returned error: {}", envelope.msg);
        return Err(Error::database(format!(
            "query error: code {}, msg: {}, response: {}",
            envelope.code, envelope.msg, body
        )));
    }

    let data = envelope.data.unwrap_or_default();
    Ok(QueryResult {
        columns: data.meta.into_iter().map(|m| m.name).collect(),
        rows: data.result,
        stats: QueryStats::from_property(&data.property),
    })
}

fn preview(sql: &str) -> String {
    const MAX: usize = 200;
    match sql.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &sql[..cut]),
        None => sql.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::mock_fe::{MockFe, Reply};
    use ds_core::ErrorKind;
    use serde_json::json;

    fn client_for(mock: &MockFe) -> EngineClient {
        let mut config = EngineConfig::with_hosts([mock.host()]);
        config.user = "admin".into();
        config.password = "secret".into();
        config.database = Some("logs".into());
        EngineClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_select_one() {
        let mock = MockFe::start(|_| {
            Reply::json(json!({
                "code": 0, "msg": "success",
                "data": {"meta": [{"name": "x", "type": "int"}], "result": [[1]],
                         "property": {"Time": "3ms"}}
            }))
        })
        .await;

        let result = client_for(&mock).execute("SELECT 1").await.unwrap();
        assert_eq!(result.columns, vec!["x".to_string()]);
        assert_eq!(result.rows, vec![vec![json!(1)]]);
        assert_eq!(result.stats.unwrap().duration_ms, Some(3));

        let req = mock.last_request();
        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/api/v1/query");
        assert_eq!(req.header("database"), Some("logs"));
        assert!(req.header("authorization").unwrap().starts_with("Basic "));
        let body: Value = serde_json::from_slice(&req.body).unwrap();
        assert_eq!(body, json!({"sql": "SELECT 1"}));
    }

    #[tokio::test]
    async fn test_nonzero_code_is_database_error() {
        let mock =
            MockFe::start(|_| Reply::json(json!({"code": 1, "msg": "Unknown table 'nope'"}))).await;
        let err = client_for(&mock).execute("SELECT * FROM nope").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Database);
        assert!(err.to_string().contains("Unknown table"));
    }

    #[tokio::test]
    async fn test_http_error_keeps_body() {
        let mock = MockFe::start(|_| Reply::text(500, "internal boom")).await;
        let err = client_for(&mock).execute("SELECT 1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Database);
        assert!(err.to_string().contains("internal boom"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_deserialization_error() {
        let mock = MockFe::start(|_| Reply::text(200, "<html>proxy</html>")).await;
        let err = client_for(&mock).execute("SELECT 1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Deserialization);
        assert!(err.to_string().contains("<html>proxy</html>"));
    }

    #[tokio::test]
    async fn test_unreachable_is_network_error() {
        let config = EngineConfig::with_hosts(["127.0.0.1:1"]);
        let err = EngineClient::new(config)
            .unwrap()
            .execute("SELECT 1")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
    }

    #[tokio::test]
    async fn test_with_timeout_cuts_off_slow_engine() {
        let mock = MockFe::start(|_| {
            Reply::json(json!({"code": 0, "data": {"meta": [], "result": []}}))
                .delayed(std::time::Duration::from_secs(5))
        })
        .await;
        let err = client_for(&mock)
            .with_timeout(std::time::Duration::from_millis(100))
            .execute("SELECT 1")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_args_are_ignored() {
        let mock = MockFe::start(|_| {
            Reply::json(json!({"code": 0, "data": {"meta": [], "result": []}}))
        })
        .await;
        let result = client_for(&mock)
            .execute_with_args("SELECT ?", &[json!(1)])
            .await
            .unwrap();
        assert!(result.is_empty());
        let body: Value = serde_json::from_slice(&mock.last_request().body).unwrap();
        assert_eq!(body["sql"], "SELECT ?");
    }

    #[test]
    fn test_null_data_yields_empty_result() {
        let result = parse_query_response(200, r#"{"code":0,"msg":"ok","data":null}"#).unwrap();
        assert!(result.columns.is_empty());
        assert!(result.stats.is_none());
    }

    #[tokio::test]
    async fn test_empty_sql_is_rejected_locally() {
        let client = EngineClient::new(EngineConfig::with_hosts(["127.0.0.1:1"])).unwrap();
        let err = client.execute("  ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
