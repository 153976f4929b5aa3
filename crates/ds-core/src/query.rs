//! # Query Results
//!
//! The engine answers a SQL statement with a column list and positional rows.
//! Execution statistics ride along in a free-form `property` map and are
//! picked up opportunistically.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Columns + rows of one executed statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names in engine order (`data.meta[].name`).
    pub columns: Vec<String>,
    /// Positional rows; `rows[i][j]` belongs to `columns[j]`.
    pub rows: Vec<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<QueryStats>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows keyed by column name. Short rows simply omit the missing columns.
    pub fn row_maps(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row.iter())
                    .map(|(c, v)| (c.clone(), v.clone()))
                    .collect()
            })
            .collect()
    }
}

/// Execution statistics. Every field is optional: the engine does not
/// guarantee any of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_rows: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_bytes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_memory_bytes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_rows: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl QueryStats {
    /// Extract whatever statistics the `data.property` map carries.
    /// Returns `None` when no known key is present.
    pub fn from_property(property: &Map<String, Value>) -> Option<Self> {
        let stats = Self {
            scan_rows: lookup_i64(property, &["ScanRows", "scanRows", "scan_rows"]),
            scan_bytes: lookup_i64(property, &["ScanBytes", "scanBytes", "scan_bytes"]),
            duration_ms: ["Time", "time", "Duration"]
                .iter()
                .find_map(|k| property.get(*k))
                .and_then(duration_ms),
            peak_memory_bytes: lookup_i64(
                property,
                &["PeakMemoryBytes", "peakMemoryBytes", "MemCostBytes"],
            ),
            affected_rows: lookup_i64(property, &["Affected Rows", "AffectedRows"]),
            message: property
                .get("Time")
                .and_then(Value::as_str)
                .map(|t| format!("Time: {}", t)),
        };

        if stats == Self::default() {
            None
        } else {
            Some(stats)
        }
    }
}

fn lookup_i64(property: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
    keys.iter()
        .find_map(|k| property.get(*k))
        .and_then(|v| match v {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        })
}

/// `"23ms"`, `"1.5s"`, `"800us"` or a bare number of milliseconds.
fn duration_ms(value: &Value) -> Option<u64> {
    let raw = match value {
        Value::Number(n) => return n.as_f64().map(|f| f.max(0.0) as u64),
        Value::String(s) => s.trim(),
        _ => return None,
    };

    let (number, scale) = if let Some(n) = raw.strip_suffix("ms") {
        (n, 1.0)
    } else if let Some(n) = raw.strip_suffix("us").or_else(|| raw.strip_suffix("µs")) {
        (n, 0.001)
    } else if let Some(n) = raw.strip_suffix('s') {
        (n, 1000.0)
    } else {
        (raw, 1.0)
    };

    let amount: f64 = number.trim().parse().ok()?;
    Some((amount * scale).max(0.0).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn property(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_stats_from_property() {
        let stats = QueryStats::from_property(&property(json!({
            "ScanRows": 1200,
            "ScanBytes": "4096",
            "Time": "23ms",
            "PeakMemoryBytes": 65536
        })))
        .unwrap();

        assert_eq!(stats.scan_rows, Some(1200));
        assert_eq!(stats.scan_bytes, Some(4096));
        assert_eq!(stats.duration_ms, Some(23));
        assert_eq!(stats.peak_memory_bytes, Some(65536));
        assert_eq!(stats.message.as_deref(), Some("Time: 23ms"));
    }

    #[test]
    fn test_stats_absent_when_property_unknown() {
        assert!(QueryStats::from_property(&property(json!({"foo": 1}))).is_none());
        assert!(QueryStats::from_property(&Map::new()).is_none());
    }

    #[test]
    fn test_duration_units() {
        assert_eq!(duration_ms(&json!("1.5s")), Some(1500));
        assert_eq!(duration_ms(&json!("800us")), Some(1));
        assert_eq!(duration_ms(&json!(42)), Some(42));
        assert_eq!(duration_ms(&json!("soon")), None);
    }

    #[test]
    fn test_row_maps_tolerate_short_rows() {
        let result = QueryResult {
            columns: vec!["id".into(), "msg".into()],
            rows: vec![vec![json!(1), json!("a")], vec![json!(2)]],
            stats: None,
        };
        let maps = result.row_maps();
        assert_eq!(maps[0].get("msg"), Some(&json!("a")));
        assert_eq!(maps[1].len(), 1);
        assert_eq!(result.len(), 2);
    }
}
