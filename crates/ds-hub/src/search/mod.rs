//! # Cross-Table Search Orchestrator
//!
//! One match query per target table, run through an order-preserving
//! bounded stream, folded into hits and paged locally.
//!
//! A table whose query fails is logged and reported in `tables_failed`; the
//! search carries on with the rest. Hits are never re-ranked: the order is
//! request table order, then engine row order, so the same request pages the
//! same way every time.

pub mod builder;

use std::sync::Arc;
use std::time::Instant;

use futures_util::stream::{self, StreamExt};

use ds_core::{
    paginate, PageEcho, QueryResult, Result, SearchHit, SearchRequest, SearchResult, TableFailure,
};
use ds_link::SqlExecutor;

use crate::config::SearchConfig;
use builder::TablePlan;

pub struct SearchOrchestrator {
    executor: Arc<dyn SqlExecutor>,
    config: SearchConfig,
}

impl SearchOrchestrator {
    pub fn new(executor: Arc<dyn SqlExecutor>, config: SearchConfig) -> Self {
        Self { executor, config }
    }

    /// Fails only on an invalid request; engine failures are absorbed per table.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResult> {
        let started = Instant::now();
        let plans = builder::plan(
            request,
            self.config.per_table_limit,
            &self.config.default_time_field,
        )?;

        let outcomes: Vec<(TablePlan, Result<QueryResult>)> = stream::iter(plans)
            .map(|plan| {
                let executor = self.executor.clone();
                async move {
                    tracing::debug!(table = %plan.table, "Full-text query: {}", plan.sql);
                    let result = executor.execute(&plan.sql).await;
                    (plan, result)
                }
            })
            .buffered(self.config.fan_out.max(1))
            .collect()
            .await;

        let keywords = request.keywords.trim();
        let mut hits = Vec::new();
        let mut tables_searched = Vec::new();
        let mut tables_failed = Vec::new();

        for (plan, outcome) in outcomes {
            match outcome {
                Ok(result) => {
                    tracing::debug!(table = %plan.table, rows = result.len(), "Table searched");
                    hits.extend(result.rows.iter().map(|row| {
                        SearchHit::from_row(
                            &plan.table,
                            &result.columns,
                            row,
                            &plan.fields,
                            keywords,
                            self.config.snippet_chars,
                        )
                    }));
                    tables_searched.push(plan.table);
                }
                Err(e) => {
                    tracing::error!(table = %plan.table, sql = %plan.sql, "Full-text query failed, skipping table: {}", e);
                    tables_failed.push(TableFailure {
                        table: plan.table,
                        error: e.to_string(),
                    });
                }
            }
        }

        let page = request.pagination.normalized();
        let total_hits = hits.len();
        let hits = paginate(hits, page);

        tracing::info!(
            tables = tables_searched.len(),
            failed = tables_failed.len(),
            total_hits,
            "Search completed"
        );

        Ok(SearchResult {
            hits,
            total_hits,
            pagination: PageEcho {
                page: page.page,
                page_size: page.page_size,
                total: total_hits,
            },
            tables_searched,
            tables_failed,
            took_ms: started.elapsed().as_millis() as u64,
        })
    }
}
