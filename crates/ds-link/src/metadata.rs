//! # Metadata Lookup
//!
//! Table schema via `DESCRIBE db.table`. The engine answers with the columns
//! `Field, Type, Null, Key, Default, Extra`.

use std::sync::Arc;

use serde_json::Value;

use ds_core::{Error, FieldSchema, Result, TableSchema};

use crate::query::SqlExecutor;

const DESCRIBE_COLUMNS: usize = 6;

#[async_trait::async_trait]
pub trait MetadataLookup: Send + Sync {
    async fn table_schema(&self, database: &str, table: &str) -> Result<TableSchema>;
}

/// [`MetadataLookup`] backed by any [`SqlExecutor`].
pub struct DescribeMetadata {
    executor: Arc<dyn SqlExecutor>,
}

impl DescribeMetadata {
    pub fn new(executor: Arc<dyn SqlExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait::async_trait]
impl MetadataLookup for DescribeMetadata {
    async fn table_schema(&self, database: &str, table: &str) -> Result<TableSchema> {
        for name in [database, table] {
            if !is_identifier(name) {
                return Err(Error::invalid(format!("invalid identifier: {:?}", name)));
            }
        }

        let result = self
            .executor
            .execute(&format!("DESCRIBE {}.{}", database, table))
            .await?;

        if result.columns.len() < DESCRIBE_COLUMNS {
            return Err(Error::database(format!(
                "unexpected DESCRIBE result: expected at least {} columns, got {}",
                DESCRIBE_COLUMNS,
                result.columns.len()
            )));
        }

        if result.is_empty() {
            return Err(Error::database(format!(
                "DESCRIBE {}.{} returned no fields",
                database, table
            )));
        }

        let mut fields = Vec::with_capacity(result.len());
        for row in &result.rows {
            if row.len() < DESCRIBE_COLUMNS {
                tracing::warn!(database, table, "Skipping malformed DESCRIBE row: {:?}", row);
                continue;
            }
            fields.push(FieldSchema {
                name: text(&row[0]),
                data_type: text(&row[1]),
                nullable: text(&row[2]).eq_ignore_ascii_case("yes"),
                comment: row.get(6).map(text).unwrap_or_default(),
            });
        }

        Ok(TableSchema {
            database: database.to_string(),
            table: table.to_string(),
            fields,
        })
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
