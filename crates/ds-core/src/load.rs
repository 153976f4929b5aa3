//! # Stream Load Model
//!
//! Request knobs for a synchronous bulk load and the engine's flat JSON
//! verdict. [`LoadOptions::wire_headers`] is the single place that decides
//! which HTTP headers a load carries.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Engine-side load timeout used when the caller does not set one.
pub const DEFAULT_LOAD_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadFormat {
    #[default]
    Json,
    Csv,
}

impl fmt::Display for LoadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Csv => write!(f, "csv"),
        }
    }
}

impl FromStr for LoadFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(Error::invalid(format!("unsupported load format: {}", other))),
        }
    }
}

/// Options of one stream load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    pub format: LoadFormat,
    /// CSV only. Engine default (`\t`) when unset.
    pub column_separator: Option<String>,
    /// CSV only. Engine default (`\n`) when unset.
    pub row_delimiter: Option<String>,
    /// JSON only: the payload is one array whose elements are rows.
    pub strip_outer_array: bool,
    pub timeout_secs: u64,
    /// Sent only when greater than zero.
    pub max_filter_ratio: f64,
    /// Caller-chosen label. The engine generates one when absent.
    pub label: Option<String>,
    /// Extra headers passed through verbatim (`columns`, `jsonpaths`, ...).
    pub headers: BTreeMap<String, String>,
    /// Condition column for partial updates.
    pub merge_condition: Option<String>,
    /// Stage the load under an already begun 2PC transaction.
    pub txn_id: Option<i64>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            format: LoadFormat::Json,
            column_separator: None,
            row_delimiter: None,
            strip_outer_array: false,
            timeout_secs: DEFAULT_LOAD_TIMEOUT_SECS,
            max_filter_ratio: 0.0,
            label: None,
            headers: BTreeMap::new(),
            merge_condition: None,
            txn_id: None,
        }
    }
}

impl LoadOptions {
    /// JSON rows packed in one outer array.
    pub fn json_array() -> Self {
        Self {
            strip_outer_array: true,
            ..Self::default()
        }
    }

    pub fn csv(column_separator: impl Into<String>) -> Self {
        Self {
            format: LoadFormat::Csv,
            column_separator: Some(column_separator.into()),
            ..Self::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn in_transaction(mut self, txn_id: i64) -> Self {
        self.txn_id = Some(txn_id);
        self
    }

    pub fn is_two_phase(&self) -> bool {
        self.txn_id.is_some()
    }

    /// The load-control headers, in a stable order.
    ///
    /// `Expect`, `Content-Type` and `Authorization` belong to the transport
    /// and are added by the client.
    pub fn wire_headers(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = Vec::new();
        let mut push = |k: &str, v: String| out.push((k.to_string(), v));

        push("format", self.format.to_string());
        match self.format {
            LoadFormat::Csv => {
                if let Some(sep) = &self.column_separator {
                    push("column_separator", sep.clone());
                }
                if let Some(delim) = &self.row_delimiter {
                    push("row_delimiter", delim.clone());
                }
            }
            LoadFormat::Json => {
                if self.strip_outer_array {
                    push("strip_outer_array", "true".into());
                }
            }
        }
        if self.max_filter_ratio > 0.0 {
            push("max_filter_ratio", self.max_filter_ratio.to_string());
        }
        push("timeout", self.timeout_secs.to_string());
        if let Some(label) = &self.label {
            push("label", label.clone());
        }
        for (name, value) in &self.headers {
            push(name, value.clone());
        }
        if let Some(cond) = &self.merge_condition {
            push("merge_condition", cond.clone());
        }
        if let Some(txn_id) = self.txn_id {
            push("txn_id", txn_id.to_string());
            push("two_phase_commit", "true".into());
        }
        out
    }
}

// =============================================================================
// Verdict
// =============================================================================

/// `Status` of a load or 2PC control response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LoadStatus {
    Success,
    /// Committed but not yet visible on every replica. Probably landed.
    PublishTimeout,
    LabelAlreadyExists,
    #[default]
    Fail,
    Other(String),
}

impl LoadStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Success => "Success",
            Self::PublishTimeout => "Publish Timeout",
            Self::LabelAlreadyExists => "Label Already Exists",
            Self::Fail => "Fail",
            Self::Other(s) => s,
        }
    }

    /// `Success` and `Publish Timeout` both count as a landed load.
    pub fn is_success_equivalent(&self) -> bool {
        matches!(self, Self::Success | Self::PublishTimeout)
    }
}

impl From<String> for LoadStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Success" => Self::Success,
            "Publish Timeout" => Self::PublishTimeout,
            "Label Already Exists" => Self::LabelAlreadyExists,
            "Fail" => Self::Fail,
            _ => Self::Other(s),
        }
    }
}

impl From<LoadStatus> for String {
    fn from(s: LoadStatus) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The engine's answer to a stream load, field names as on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct LoadResponse {
    pub txn_id: i64,
    pub label: String,
    pub status: LoadStatus,
    #[serde(alias = "msg")]
    pub message: String,
    pub number_total_rows: i64,
    pub number_loaded_rows: i64,
    pub number_filtered_rows: i64,
    pub number_unselected_rows: i64,
    pub load_bytes: i64,
    pub load_time_ms: i64,
    pub begin_txn_time_ms: i64,
    pub stream_load_put_time_ms: i64,
    pub read_data_time_ms: i64,
    pub write_data_time_ms: i64,
    pub commit_and_publish_time_ms: i64,
    #[serde(rename = "ErrorURL", skip_serializing_if = "Option::is_none")]
    pub error_url: Option<String>,
}

impl LoadResponse {
    pub fn is_success_equivalent(&self) -> bool {
        self.status.is_success_equivalent()
    }

    /// `Publish Timeout`: the caller should verify visibility before relying on the data.
    pub fn needs_verification(&self) -> bool {
        self.status == LoadStatus::PublishTimeout
    }

    /// `loaded + filtered + unselected == total`.
    pub fn rows_balanced(&self) -> bool {
        self.number_loaded_rows + self.number_filtered_rows + self.number_unselected_rows
            == self.number_total_rows
    }
}
