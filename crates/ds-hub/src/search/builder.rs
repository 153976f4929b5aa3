//! # Match Query Builder
//!
//! Turns a [`SearchRequest`] into one SQL statement per target table:
//!
//! ```sql
//! SELECT * FROM logs.app
//! WHERE (message MATCH_ANY 'disk full' OR detail MATCH_ANY 'disk full')
//!   AND timestamp >= '2024-05-01 00:00:00' AND level = 'error'
//! LIMIT 1000 OFFSET 0
//! ```
//!
//! Identifiers are checked against a strict pattern; literals are quoted.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use ds_core::{Error, Result, SearchRequest, TimeRangeFilter};

pub const MATCH_ANY: &str = "MATCH_ANY";
pub const MATCH_ALL: &str = "MATCH_ALL";

const SQL_DATETIME: &str = "%Y-%m-%d %H:%M:%S";

static IDENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());
static TABLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").unwrap()
});

/// The statement planned for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct TablePlan {
    pub table: String,
    pub fields: Vec<String>,
    pub sql: String,
}

/// Validate the request and build one plan per table, in request order.
pub fn plan(request: &SearchRequest, per_table_limit: usize, default_time_field: &str) -> Result<Vec<TablePlan>> {
    let keywords = request.keywords.trim();
    if keywords.is_empty() {
        return Err(Error::invalid("keywords must not be empty"));
    }
    if request.target_tables.is_empty() {
        return Err(Error::invalid("target tables must be specified"));
    }

    let operator = if request.recall_priority { MATCH_ANY } else { MATCH_ALL };
    let extra = extra_conditions(request, default_time_field)?;

    request
        .target_tables
        .iter()
        .map(|table| {
            if !TABLE_RE.is_match(table) {
                return Err(Error::invalid(format!("invalid table name: {:?}", table)));
            }
            let fields = request.fields_for(table);
            if fields.is_empty() {
                return Err(Error::invalid(format!(
                    "target fields must be specified for table {} (auto-discovery is not supported)",
                    table
                )));
            }
            for field in fields {
                check_ident(field, "field")?;
            }

            let matches: Vec<String> = fields
                .iter()
                .map(|f| format!("{} {} {}", f, operator, quote(keywords)))
                .collect();
            let mut clauses = vec![format!("({})", matches.join(" OR "))];
            clauses.extend(extra.iter().cloned());

            Ok(TablePlan {
                table: table.clone(),
                fields: fields.to_vec(),
                sql: format!(
                    "SELECT * FROM {} WHERE {} LIMIT {} OFFSET 0",
                    table,
                    clauses.join(" AND "),
                    per_table_limit
                ),
            })
        })
        .collect()
}

/// Time-range and equality conditions shared by every table.
fn extra_conditions(request: &SearchRequest, default_time_field: &str) -> Result<Vec<String>> {
    let mut out = Vec::new();

    if let Some(range) = request.time_range.as_ref().filter(|r| !r.is_empty()) {
        out.extend(time_conditions(range, default_time_field)?);
    }

    for (field, value) in &request.filters {
        check_ident(field, "filter field")?;
        let condition = match value {
            Value::Null => format!("{} IS NULL", field),
            Value::String(s) => format!("{} = {}", field, quote(s)),
            Value::Number(n) => format!("{} = {}", field, n),
            Value::Bool(b) => format!("{} = {}", field, b),
            Value::Array(_) | Value::Object(_) => {
                return Err(Error::invalid(format!(
                    "filter {} must be a scalar value",
                    field
                )))
            }
        };
        out.push(condition);
    }
    Ok(out)
}

fn time_conditions(range: &TimeRangeFilter, default_time_field: &str) -> Result<Vec<String>> {
    let field = range.field.as_deref().unwrap_or(default_time_field);
    check_ident(field, "time field")?;

    if let (Some(start), Some(end)) = (range.start, range.end) {
        if start > end {
            return Err(Error::invalid("time range start is after its end"));
        }
    }

    let mut out = Vec::new();
    if let Some(start) = range.start {
        out.push(format!("{} >= '{}'", field, start.format(SQL_DATETIME)));
    }
    if let Some(end) = range.end {
        out.push(format!("{} <= '{}'", field, end.format(SQL_DATETIME)));
    }
    Ok(out)
}

pub(crate) fn check_ident(name: &str, what: &str) -> Result<()> {
    if IDENT_RE.is_match(name) {
        Ok(())
    } else {
        Err(Error::invalid(format!("invalid {} name: {:?}", what, name)))
    }
}

/// Single-quoted SQL literal with `\` and `'` escaped.
pub fn quote(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('\'');
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}
