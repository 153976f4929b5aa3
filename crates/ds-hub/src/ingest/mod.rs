//! # Event Ingestion
//!
//! Raw events from data sources are validated, grouped by `data_type` and
//! written with one JSON-array stream load per group. `data_type` names the
//! target table inside the configured ingestion database.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use ds_core::{Error, LoadOptions, LoadStatus, Result};
use ds_link::StreamLoader;

use crate::config::IngestionConfig;
use crate::search::builder::check_ident;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    /// Source-assigned id. Generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(alias = "dataSourceId")]
    pub data_source_id: String,
    #[serde(alias = "dataType")]
    pub data_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    /// Original payload text, kept when `data` cannot represent the event.
    #[serde(default, alias = "rawPayload", skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl RawEvent {
    pub fn validate(&self) -> Result<()> {
        if self.data_source_id.trim().is_empty() {
            return Err(Error::invalid("data_source_id cannot be empty"));
        }
        if self.data_type.trim().is_empty() {
            return Err(Error::invalid("data_type cannot be empty"));
        }
        check_ident(&self.data_type, "data_type")?;
        if self.timestamp.timestamp() == 0 {
            return Err(Error::invalid("timestamp cannot be zero"));
        }
        let has_raw = self.raw_payload.as_deref().is_some_and(|p| !p.is_empty());
        if self.data.is_none() && !has_raw {
            return Err(Error::invalid("either data or raw_payload must be provided"));
        }
        Ok(())
    }

    /// The row written to the engine: `data` plus the envelope columns.
    fn into_row(self) -> Value {
        let mut row = self.data.unwrap_or_default();
        if let Some(raw) = self.raw_payload {
            row.entry("raw_payload").or_insert(Value::String(raw));
        }
        row.insert(
            "event_id".into(),
            Value::String(self.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string())),
        );
        row.insert("data_source_id".into(), Value::String(self.data_source_id));
        row.insert(
            "event_time".into(),
            Value::String(self.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()),
        );
        row.insert(
            "tags".into(),
            Value::Object(
                self.tags
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect(),
            ),
        );
        Value::Object(row)
    }
}

/// Outcome of one group load.
#[derive(Debug, Clone, Serialize)]
pub struct GroupLoad {
    pub table: String,
    pub events: usize,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<LoadStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub ingested: usize,
    pub persist_failed: usize,
    pub validation_failed: usize,
    pub loads: Vec<GroupLoad>,
}

pub struct IngestionService {
    loader: Arc<dyn StreamLoader>,
    config: IngestionConfig,
}

impl IngestionService {
    pub fn new(loader: Arc<dyn StreamLoader>, config: IngestionConfig) -> Self {
        Self { loader, config }
    }

    /// Invalid events are counted and skipped. A failed group load counts
    /// its events as `persist_failed`; the remaining groups still load.
    pub async fn ingest_events(&self, events: Vec<RawEvent>) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        if events.is_empty() {
            return Ok(report);
        }
        let total = events.len();

        let mut groups: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        for event in events {
            if let Err(e) = event.validate() {
                tracing::warn!(
                    event_id = event.id.as_deref().unwrap_or(""),
                    data_source_id = %event.data_source_id,
                    "Event validation failed: {}",
                    e
                );
                report.validation_failed += 1;
                continue;
            }
            groups
                .entry(event.data_type.clone())
                .or_default()
                .push(event.into_row());
        }

        for (table, rows) in groups {
            let count = rows.len();
            let label = format!("ds_{}_{}", table, uuid::Uuid::new_v4().simple());
            let options = LoadOptions::json_array()
                .with_label(label.clone())
                .with_timeout(self.config.load_timeout_secs);
            let payload = serde_json::to_vec(&Value::Array(rows))?;

            let outcome = self
                .loader
                .stream_load(&self.config.database, &table, payload, &options)
                .await;

            let load = match outcome {
                Ok(resp) => {
                    report.ingested += count;
                    GroupLoad {
                        table,
                        events: count,
                        label,
                        status: Some(resp.status),
                        error: None,
                        error_url: resp.error_url,
                    }
                }
                Err(e) => {
                    tracing::error!(table = %table, events = count, "Event load failed: {}", e);
                    report.persist_failed += count;
                    GroupLoad {
                        status: e.load_response().map(|r| r.status.clone()),
                        error_url: e.load_response().and_then(|r| r.error_url.clone()),
                        error: Some(e.to_string()),
                        table,
                        events: count,
                        label,
                    }
                }
            };
            report.loads.push(load);
        }

        if report.validation_failed > 0 || report.persist_failed > 0 {
            tracing::warn!(
                total,
                ingested = report.ingested,
                validation_failed = report.validation_failed,
                persist_failed = report.persist_failed,
                "Some events were not ingested"
            );
        } else {
            tracing::info!(total, groups = report.loads.len(), "Events ingested");
        }
        Ok(report)
    }
}
