//! # Cross-Table Search Model
//!
//! A [`SearchRequest`] names its target tables and fields explicitly; the
//! orchestrator in `ds-hub` turns it into one match query per table and
//! folds the rows back into [`SearchHit`]s with [`SearchHit::from_row`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::page::{PageEcho, PageRequest};

/// Relevance is not computed; every hit carries this score.
pub const PLACEHOLDER_SCORE: f32 = 1.0;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub keywords: String,
    /// Left empty when absent; planning rejects an empty list.
    #[serde(default, alias = "targetTables")]
    pub target_tables: Vec<String>,
    /// Fields searched in every table without an entry in `table_fields`.
    #[serde(default, alias = "targetFields")]
    pub target_fields: Vec<String>,
    #[serde(default, alias = "tableFields")]
    pub table_fields: BTreeMap<String, Vec<String>>,
    /// Passed through for callers; the engine's index decides tokenization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer: Option<String>,
    /// `true`: match any keyword. `false`: match all keywords.
    #[serde(default = "default_true", alias = "recallPriority")]
    pub recall_priority: bool,
    #[serde(default, alias = "timeRangeFilter", skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRangeFilter>,
    /// Equality filters, AND-ed onto every table's predicate.
    #[serde(default)]
    pub filters: BTreeMap<String, Value>,
    #[serde(default)]
    pub pagination: PageRequest,
}

impl SearchRequest {
    pub fn new(keywords: impl Into<String>, tables: &[&str], fields: &[&str]) -> Self {
        Self {
            keywords: keywords.into(),
            target_tables: tables.iter().map(|t| t.to_string()).collect(),
            target_fields: fields.iter().map(|f| f.to_string()).collect(),
            table_fields: BTreeMap::new(),
            tokenizer: None,
            recall_priority: true,
            time_range: None,
            filters: BTreeMap::new(),
            pagination: PageRequest::default(),
        }
    }

    /// Fields to search in `table`: its own list if given, else the shared one.
    pub fn fields_for(&self, table: &str) -> &[String] {
        self.table_fields
            .get(table)
            .map(Vec::as_slice)
            .unwrap_or(&self.target_fields)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRangeFilter {
    /// Column to filter on. The hub's configured default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

impl TimeRangeFilter {
    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub source_table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub score: f32,
    pub document: Map<String, Value>,
    /// Field name → substring snippet of the matching value.
    pub hit_fields: BTreeMap<String, String>,
}

impl SearchHit {
    /// Build a hit from one positional row.
    ///
    /// The id is the first `id` / `*_id` column holding a string or integer.
    /// A target field gets a snippet when its string value contains
    /// `keywords` case-insensitively; snippets longer than `snippet_chars`
    /// are cut and suffixed with `...`.
    pub fn from_row(
        table: &str,
        columns: &[String],
        row: &[Value],
        target_fields: &[String],
        keywords: &str,
        snippet_chars: usize,
    ) -> Self {
        let needle = keywords.to_lowercase();
        let mut document = Map::new();
        let mut id = None;
        let mut hit_fields = BTreeMap::new();

        for (column, value) in columns.iter().zip(row.iter()) {
            if id.is_none() && is_id_column(column) {
                id = match value {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
                    _ => None,
                };
            }

            if target_fields.iter().any(|f| f == column) {
                if let Value::String(text) = value {
                    if !needle.is_empty() && text.to_lowercase().contains(&needle) {
                        hit_fields.insert(column.clone(), snippet(text, snippet_chars));
                    }
                }
            }

            document.insert(column.clone(), value.clone());
        }

        Self {
            source_table: table.to_string(),
            id,
            score: PLACEHOLDER_SCORE,
            document,
            hit_fields,
        }
    }
}

fn is_id_column(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower == "id" || lower.ends_with("_id")
}

fn snippet(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// A table whose query failed and was left out of the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableFailure {
    pub table: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Table order of the request, then row order. Not ranked.
    pub hits: Vec<SearchHit>,
    /// Hits collected before paging; each table contributes at most its fetch cap.
    pub total_hits: usize,
    pub pagination: PageEcho,
    pub tables_searched: Vec<String>,
    #[serde(default)]
    pub tables_failed: Vec<TableFailure>,
    pub took_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_hit_extracts_id_and_snippet() {
        let columns = cols(&["event_id", "message", "level"]);
        let row = vec![json!("ev-1"), json!("Disk FULL on node-3"), json!("error")];
        let hit = SearchHit::from_row("logs", &columns, &row, &cols(&["message"]), "full", 100);

        assert_eq!(hit.source_table, "logs");
        assert_eq!(hit.id.as_deref(), Some("ev-1"));
        assert_eq!(hit.score, PLACEHOLDER_SCORE);
        assert_eq!(hit.document.len(), 3);
        assert_eq!(hit.hit_fields.get("message").unwrap(), "Disk FULL on node-3");
        assert!(!hit.hit_fields.contains_key("level"));
    }

    #[test]
    fn test_integer_id_and_first_id_wins() {
        let columns = cols(&["id", "user_id"]);
        let row = vec![json!(7), json!("u-9")];
        let hit = SearchHit::from_row("t", &columns, &row, &[], "x", 100);
        assert_eq!(hit.id.as_deref(), Some("7"));
    }

    #[test]
    fn test_non_scalar_id_is_skipped() {
        let columns = cols(&["id", "trace_id"]);
        let row = vec![json!(null), json!("tr-1")];
        let hit = SearchHit::from_row("t", &columns, &row, &[], "x", 100);
        assert_eq!(hit.id.as_deref(), Some("tr-1"));
    }

    #[test]
    fn test_snippet_truncates_on_char_boundary() {
        let long = "é".repeat(150);
        let columns = cols(&["body"]);
        let hit = SearchHit::from_row("t", &columns, &[json!(long)], &cols(&["body"]), "é", 100);
        let s = hit.hit_fields.get("body").unwrap();
        assert!(s.ends_with("..."));
        assert_eq!(s.chars().count(), 103);
    }

    #[test]
    fn test_fields_for_prefers_table_entry() {
        let mut req = SearchRequest::new("err", &["a", "b"], &["message"]);
        req.table_fields.insert("b".into(), vec!["body".into()]);
        assert_eq!(req.fields_for("a"), &["message".to_string()]);
        assert_eq!(req.fields_for("b"), &["body".to_string()]);
    }

    #[test]
    fn test_request_defaults_from_json() {
        let req: SearchRequest = serde_json::from_value(json!({
            "keywords": "timeout",
            "targetTables": ["logs"],
            "targetFields": ["message"]
        }))
        .unwrap();
        assert!(req.recall_priority);
        assert_eq!(req.pagination, PageRequest::default());
        assert!(req.time_range.is_none());
    }

    #[test]
    fn test_missing_target_tables_decodes_empty() {
        let req: SearchRequest = serde_json::from_value(json!({"keywords": "timeout"})).unwrap();
        assert!(req.target_tables.is_empty());
        assert!(req.target_fields.is_empty());
    }
}
