use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ds_link::{DescribeMetadata, EngineClient, TxnCoordinator};

mod api;
mod config;
mod ingest;
mod search;

use config::{HubConfig, LogFormat};
use ingest::IngestionService;
use search::SearchOrchestrator;

const DEFAULT_LOG_FILTER: &str = "ds_hub=info,ds_link=info,tower_http=info";

// =============================================================================
// CLI
// =============================================================================

#[derive(Parser)]
#[command(
    name = "ds-hub",
    version,
    about = "DataSeap hub: full-text search, SQL and ingestion over the analytical engine"
)]
struct Args {
    /// Path to config file
    #[arg(long, default_value = "ds-hub.toml")]
    config: PathBuf,

    /// Server bind address (overrides `server.bind`)
    #[arg(long)]
    bind: Option<String>,
}

// =============================================================================
// Application State
// =============================================================================

pub struct AppState {
    engine: EngineClient,
    search: SearchOrchestrator,
    ingestion: IngestionService,
    txns: TxnCoordinator,
    metadata: DescribeMetadata,
}

impl AppState {
    /// Fails with [`ds_core::Error::Config`] when no frontend is configured.
    pub fn new(config: &HubConfig) -> ds_core::Result<Self> {
        let engine = EngineClient::new(config.engine.clone())?;
        Ok(Self {
            search: SearchOrchestrator::new(Arc::new(engine.clone()), config.search.clone()),
            ingestion: IngestionService::new(Arc::new(engine.clone()), config.ingestion.clone()),
            metadata: DescribeMetadata::new(Arc::new(engine.clone())),
            txns: TxnCoordinator::new(engine.clone(), config.transactions.lease_grace()),
            engine,
        })
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
    );
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/api/v1/query/sql", post(api::query_sql))
        .route("/api/v1/query/search/fulltext", post(api::search_fulltext))
        .route("/api/v1/ingest/events", post(api::ingest_events))
        .route("/api/v1/load/:database/:table", put(api::stream_load))
        .route("/api/v1/txn", get(api::txn_list))
        .route("/api/v1/txn/begin", post(api::txn_begin))
        .route("/api/v1/txn/:database/:txn_id/commit", post(api::txn_commit))
        .route("/api/v1/txn/:database/:txn_id/abort", post(api::txn_abort))
        .route(
            "/api/v1/tables/:database/:table/schema",
            get(api::table_schema),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Logging format comes from the config, so it is read first.
    let config = match HubConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load {}: {}", args.config.display(), e);
            std::process::exit(1);
        }
    };
    init_tracing(config.logging.format);

    if !args.config.exists() {
        tracing::warn!("Config file {} not found, using defaults", args.config.display());
    }

    let state = match AppState::new(&config) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            tracing::error!("Cannot start without an engine: {}. Exiting.", e);
            std::process::exit(1);
        }
    };
    let _sweeper = state.txns.spawn_sweeper(config.transactions.sweep_interval());

    let bind = args.bind.unwrap_or(config.server.bind);
    let addr: SocketAddr = match bind.parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!("Invalid bind address {:?}: {}", bind, e);
            std::process::exit(1);
        }
    };

    tracing::info!("DataSeap hub v{} listening on http://{}", env!("CARGO_PKG_VERSION"), addr);
    tracing::info!(
        "Search fan-out {}, per-table limit {}, ingestion database {}",
        config.search.fan_out,
        config.search.per_table_limit,
        config.ingestion.database
    );

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, router(state)).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    /// Router over a frontend nobody listens on.
    fn app() -> Router {
        let mut config = HubConfig::default();
        config.engine.hosts = vec!["127.0.0.1:1".into()];
        router(Arc::new(AppState::new(&config).unwrap()))
    }

    async fn call(method: &str, uri: &str, body: Body) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn json_body(value: Value) -> Body {
        Body::from(value.to_string())
    }

    #[test]
    fn test_state_requires_frontend() {
        assert!(AppState::new(&HubConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_health_envelope() {
        let (status, body) = call("GET", "/health", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["status"], "ok");
        assert_eq!(body["data"]["query_endpoints"], 1);
    }

    #[tokio::test]
    async fn test_search_without_tables_is_bad_request() {
        let (status, body) = call(
            "POST",
            "/api/v1/query/search/fulltext",
            json_body(json!({"keywords": "timeout", "targetFields": ["message"]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "InvalidArgument");
    }

    #[tokio::test]
    async fn test_search_absorbs_unreachable_engine() {
        let (status, body) = call(
            "POST",
            "/api/v1/query/search/fulltext",
            json_body(json!({
                "keywords": "timeout",
                "targetTables": ["app_logs"],
                "targetFields": ["message"]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["total_hits"], 0);
        assert_eq!(body["data"]["tables_failed"][0]["table"], "app_logs");
    }

    #[tokio::test]
    async fn test_load_rejects_oversized_timeout() {
        let (status, body) = call(
            "PUT",
            "/api/v1/load/logs/app?timeout=18446744073709551615",
            Body::from("{}"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "InvalidArgument");
    }

    #[tokio::test]
    async fn test_load_rejects_bad_table_name() {
        let (status, body) = call("PUT", "/api/v1/load/logs/app%3Bdrop", Body::from("{}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_commit_on_unreachable_engine_is_unavailable() {
        let (status, body) = call("POST", "/api/v1/txn/logs/7/commit", Body::empty()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "NetworkError");
    }
}
