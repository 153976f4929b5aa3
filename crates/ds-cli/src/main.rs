//! # ds: DataSeap command line
//!
//! Thin client over the hub's HTTP API.
//!
//! - `ds query "SELECT ..."` runs SQL and prints a table.
//! - `ds search "disk full" --table logs.app --field message` runs a full-text search.
//! - `ds load logs app --file rows.json --strip-outer-array` stream-loads a file.
//! - `ds txn begin|commit|abort|list` drives two-phase loads.
//!
//! The hub address comes from `DS_HUB_URL` (default `http://127.0.0.1:8080`).

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tabled::builder::Builder;
use tabled::settings::Style;

use ds_core::{PageRequest, SearchRequest};

const DEFAULT_HUB_URL: &str = "http://127.0.0.1:8080";

/// DataSeap: full-text search and ingestion over an analytical engine.
#[derive(Parser)]
#[command(name = "ds", version, about, long_about = None)]
struct Cli {
    /// Print raw JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hub and engine endpoint status.
    Health,

    /// Run a SQL statement.
    Query {
        sql: String,
        #[arg(long)]
        database: Option<String>,
    },

    /// Full-text search across tables.
    Search {
        keywords: String,
        /// Target table, repeatable (`db.table` or `table`).
        #[arg(long = "table", required = true)]
        tables: Vec<String>,
        /// Field to match, repeatable.
        #[arg(long = "field", required = true)]
        fields: Vec<String>,
        /// Require every keyword (MATCH_ALL) instead of any.
        #[arg(long)]
        precision: bool,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        page_size: u32,
    },

    /// Stream-load a file into a table.
    Load {
        database: String,
        table: String,
        #[arg(long)]
        file: PathBuf,
        /// json or csv
        #[arg(long, default_value = "json")]
        format: String,
        #[arg(long)]
        strip_outer_array: bool,
        #[arg(long)]
        column_separator: Option<String>,
        #[arg(long)]
        label: Option<String>,
        /// Stage the load under an open transaction.
        #[arg(long)]
        txn_id: Option<i64>,
    },

    /// Ingest raw events from a JSON file (an array of events).
    Ingest {
        #[arg(long)]
        file: PathBuf,
    },

    /// Two-phase load transactions.
    Txn {
        #[command(subcommand)]
        action: TxnCmd,
    },

    /// Describe a table.
    Schema { database: String, table: String },
}

#[derive(Subcommand)]
enum TxnCmd {
    Begin {
        database: String,
        table: String,
        /// Generated by the hub when omitted.
        label: Option<String>,
        /// Engine-side transaction timeout in seconds.
        #[arg(long)]
        timeout: Option<u64>,
    },
    Commit {
        database: String,
        txn_id: i64,
    },
    Abort {
        database: String,
        txn_id: i64,
    },
    /// Transactions tracked by the hub.
    List {
        /// Only transactions still open.
        #[arg(long)]
        open: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime");

    if let Err(e) = rt.block_on(async_main(cli)) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn async_main(cli: Cli) -> Result<(), String> {
    let client = reqwest::Client::new();
    let base_url = std::env::var("DS_HUB_URL").unwrap_or_else(|_| DEFAULT_HUB_URL.to_string());
    let base_url = base_url.trim_end_matches('/');

    match cli.command {
        Commands::Health => {
            let data = send(client.get(format!("{}/health", base_url))).await?;
            print_json(&data);
        }

        Commands::Query { sql, database } => {
            let payload = json!({ "sql": sql, "database": database });
            let data = send(
                client
                    .post(format!("{}/api/v1/query/sql", base_url))
                    .json(&payload),
            )
            .await?;
            if cli.json {
                print_json(&data);
            } else {
                print_rows(&data);
            }
        }

        Commands::Search {
            keywords,
            tables,
            fields,
            precision,
            page,
            page_size,
        } => {
            let tables: Vec<&str> = tables.iter().map(String::as_str).collect();
            let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
            let mut request = SearchRequest::new(keywords, &tables, &fields);
            request.recall_priority = !precision;
            request.pagination = PageRequest::new(page, page_size);

            let data = send(
                client
                    .post(format!("{}/api/v1/query/search/fulltext", base_url))
                    .json(&request),
            )
            .await?;
            if cli.json {
                print_json(&data);
            } else {
                print_hits(&data);
            }
        }

        Commands::Load {
            database,
            table,
            file,
            format,
            strip_outer_array,
            column_separator,
            label,
            txn_id,
        } => {
            let body = tokio::fs::read(&file)
                .await
                .map_err(|e| format!("cannot read {}: {}", file.display(), e))?;

            let mut params = vec![("format", format)];
            if strip_outer_array {
                params.push(("strip_outer_array", "true".to_string()));
            }
            if let Some(sep) = column_separator {
                params.push(("column_separator", sep));
            }
            if let Some(label) = label {
                params.push(("label", label));
            }
            if let Some(id) = txn_id {
                params.push(("txn_id", id.to_string()));
            }

            let data = send(
                client
                    .put(format!("{}/api/v1/load/{}/{}", base_url, database, table))
                    .query(&params)
                    .body(body),
            )
            .await?;
            print_json(&data);
        }

        Commands::Ingest { file } => {
            let raw = tokio::fs::read_to_string(&file)
                .await
                .map_err(|e| format!("cannot read {}: {}", file.display(), e))?;
            let events: Value = serde_json::from_str(&raw)
                .map_err(|e| format!("{} is not valid JSON: {}", file.display(), e))?;
            if !events.is_array() {
                return Err(format!("{} must hold a JSON array of events", file.display()));
            }
            let data = send(
                client
                    .post(format!("{}/api/v1/ingest/events", base_url))
                    .json(&json!({ "events": events })),
            )
            .await?;
            print_json(&data);
        }

        Commands::Txn { action } => {
            let data = match action {
                TxnCmd::Begin {
                    database,
                    table,
                    label,
                    timeout,
                } => {
                    let payload = json!({
                        "database": database,
                        "table": table,
                        "label": label,
                        "timeout_secs": timeout,
                    });
                    send(
                        client
                            .post(format!("{}/api/v1/txn/begin", base_url))
                            .json(&payload),
                    )
                    .await?
                }
                TxnCmd::Commit { database, txn_id } => {
                    send(client.post(format!(
                        "{}/api/v1/txn/{}/{}/commit",
                        base_url, database, txn_id
                    )))
                    .await?
                }
                TxnCmd::Abort { database, txn_id } => {
                    send(client.post(format!(
                        "{}/api/v1/txn/{}/{}/abort",
                        base_url, database, txn_id
                    )))
                    .await?
                }
                TxnCmd::List { open } => {
                    let mut req = client.get(format!("{}/api/v1/txn", base_url));
                    if open {
                        req = req.query(&[("state", "begun")]);
                    }
                    send(req).await?
                }
            };
            print_json(&data);
        }

        Commands::Schema { database, table } => {
            let data = send(client.get(format!(
                "{}/api/v1/tables/{}/{}/schema",
                base_url, database, table
            )))
            .await?;
            if cli.json {
                print_json(&data);
            } else {
                print_schema(&data);
            }
        }
    }
    Ok(())
}

/// Send and unwrap the hub envelope: `data` on success, the error message otherwise.
async fn send(request: reqwest::RequestBuilder) -> Result<Value, String> {
    let resp = request
        .send()
        .await
        .map_err(|e| format!("hub unreachable: {}", e))?;
    let status = resp.status();
    let body: Value = resp
        .json()
        .await
        .map_err(|e| format!("unreadable hub response (HTTP {}): {}", status, e))?;

    if body.get("success").and_then(Value::as_bool) == Some(true) {
        return Ok(body.get("data").cloned().unwrap_or(Value::Null));
    }
    let error = &body["error"];
    let mut message = format!(
        "{} (HTTP {}): {}",
        error["code"].as_str().unwrap_or("Error"),
        status.as_u16(),
        error["message"].as_str().unwrap_or("unknown error")
    );
    if let Some(url) = error["load"]["ErrorURL"].as_str() {
        message.push_str(&format!("\n  rejected rows: {}", url));
    }
    Err(message)
}

fn print_json(value: &Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}

fn print_rows(data: &Value) {
    let columns = data["columns"].as_array().cloned().unwrap_or_default();
    let rows = data["rows"].as_array().cloned().unwrap_or_default();

    let mut builder = Builder::default();
    builder.push_record(columns.iter().map(cell));
    for row in &rows {
        builder.push_record(row.as_array().into_iter().flatten().map(cell));
    }
    println!("{}", builder.build().with(Style::psql()));
    println!("({} rows)", rows.len());
    if let Some(ms) = data["stats"]["duration_ms"].as_u64() {
        println!("Time: {} ms", ms);
    }
}

fn print_hits(data: &Value) {
    let mut builder = Builder::default();
    builder.push_record(["table", "id", "matched"]);
    for hit in data["hits"].as_array().into_iter().flatten() {
        let matched = hit["hit_fields"]
            .as_object()
            .map(|fields| {
                fields
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, cell(v)))
                    .collect::<Vec<_>>()
                    .join(" | ")
            })
            .unwrap_or_default();
        builder.push_record([cell(&hit["source_table"]), cell(&hit["id"]), matched]);
    }
    println!("{}", builder.build().with(Style::psql()));

    let page = &data["pagination"];
    println!(
        "page {} of {} hits ({} per page) in {} ms",
        page["page"], data["total_hits"], page["page_size"], data["took_ms"]
    );
    for failure in data["tables_failed"].as_array().into_iter().flatten() {
        eprintln!(
            "warning: {} failed: {}",
            cell(&failure["table"]),
            cell(&failure["error"])
        );
    }
}

fn print_schema(data: &Value) {
    let mut builder = Builder::default();
    builder.push_record(["field", "type", "nullable", "comment"]);
    for field in data["fields"].as_array().into_iter().flatten() {
        builder.push_record([
            cell(&field["name"]),
            cell(&field["data_type"]),
            cell(&field["nullable"]),
            cell(&field["comment"]),
        ]);
    }
    println!("{}", builder.build().with(Style::psql()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_renders_scalars() {
        assert_eq!(cell(&json!("a")), "a");
        assert_eq!(cell(&json!(null)), "NULL");
        assert_eq!(cell(&json!(42)), "42");
        assert_eq!(cell(&json!(true)), "true");
    }

    #[test]
    fn test_search_args_parse() {
        let cli = Cli::try_parse_from([
            "ds", "search", "disk full", "--table", "logs.app", "--table", "audit", "--field",
            "message", "--precision",
        ])
        .unwrap();
        match cli.command {
            Commands::Search {
                tables, precision, page, ..
            } => {
                assert_eq!(tables, vec!["logs.app", "audit"]);
                assert!(precision);
                assert_eq!(page, 1);
            }
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn test_txn_begin_label_is_optional() {
        let cli = Cli::try_parse_from(["ds", "txn", "begin", "logs", "app", "--timeout", "60"]).unwrap();
        match cli.command {
            Commands::Txn {
                action: TxnCmd::Begin { label, timeout, .. },
            } => {
                assert!(label.is_none());
                assert_eq!(timeout, Some(60));
            }
            _ => panic!("expected txn begin"),
        }
    }
}
