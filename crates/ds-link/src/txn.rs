//! # Transaction Coordinator
//!
//! Two-phase-commit control for stream loads:
//!
//! - begin:  `PUT /api/{db}/{table}/_stream_load_2pc?txn_action=begin`
//! - commit: `PUT /api/{db}/_stream_load_2pc?txn_action=commit&txn_id=N`
//! - abort:  `PUT /api/{db}/_stream_load_2pc?txn_action=abort&txn_id=N`
//!
//! Commit failures propagate. Abort failures reported by the engine are
//! logged and swallowed: the transaction may already be final or unknown.
//!
//! Every transaction begun here is tracked as a [`TxnLease`] that expires
//! after the engine timeout plus a grace period. [`TxnCoordinator::sweep_expired`]
//! aborts leases still open past expiry, so a caller that vanishes between
//! begin and commit does not leave the transaction to the engine's timeout alone.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, EXPECT};
use reqwest::Url;
use serde::Deserialize;
use tokio::task::JoinHandle;

use ds_core::{
    BeginOutcome, Error, LoadOptions, LoadResponse, LoadStatus, Result, TxnId, TxnLease, TxnState,
};

use crate::client::{engine_timeout, EngineClient};

#[derive(Deserialize)]
struct TxnReply {
    #[serde(rename = "Status", default)]
    status: LoadStatus,
    #[serde(rename = "TxnId", default)]
    txn_id: TxnId,
    #[serde(rename = "ExistingTxnId", default)]
    existing_txn_id: Option<TxnId>,
    #[serde(rename = "Label", default)]
    label: Option<String>,
    #[serde(alias = "Message", default)]
    msg: String,
}

// =============================================================================
// Raw protocol calls
// =============================================================================

impl EngineClient {
    /// Begin a 2PC transaction under `label`.
    ///
    /// When the label already names an open transaction the engine returns
    /// its id through `ExistingTxnId`; the outcome is then marked `reused`.
    pub async fn begin_txn(
        &self,
        database: &str,
        table: &str,
        label: &str,
        timeout_secs: u64,
    ) -> Result<BeginOutcome> {
        engine_timeout(timeout_secs)?;
        let url = format!(
            "{}/api/{}/{}/_stream_load_2pc?txn_action=begin",
            self.selector().next_load().base_url(),
            database,
            table
        );
        let reply = self
            .txn_call(
                &url,
                &[("label", label.to_string()), ("timeout", timeout_secs.to_string())],
                "begin transaction",
            )
            .await?;

        let existing = reply.existing_txn_id.filter(|id| *id > 0);
        let outcome = match (&reply.status, existing) {
            (LoadStatus::Success, None) => BeginOutcome {
                txn_id: reply.txn_id,
                label: label.to_string(),
                reused: false,
            },
            (LoadStatus::Success | LoadStatus::LabelAlreadyExists, Some(id)) => BeginOutcome {
                txn_id: id,
                label: reply.label.clone().unwrap_or_else(|| label.to_string()),
                reused: true,
            },
            (status, _) => {
                tracing::error!(database, table, label, status = %status, "Failed to begin transaction: {}", reply.msg);
                return Err(Error::database(format!(
                    "failed to begin transaction: {} - {}",
                    status, reply.msg
                )));
            }
        };

        if outcome.reused {
            tracing::warn!(
                database,
                table,
                label,
                txn_id = outcome.txn_id,
                "Label already names an open transaction; reusing it"
            );
        } else {
            tracing::info!(database, table, label, txn_id = outcome.txn_id, "Transaction begun");
        }
        Ok(outcome)
    }

    /// Commit; any non-`Success` status is a [`Error::Database`].
    pub async fn commit_txn(&self, database: &str, txn_id: TxnId) -> Result<()> {
        let url = self.txn_control_url(database, "commit", txn_id);
        let reply = self.txn_call(&url, &[], "commit transaction").await?;
        if reply.status != LoadStatus::Success {
            tracing::error!(database, txn_id, status = %reply.status, "Failed to commit transaction: {}", reply.msg);
            return Err(Error::database(format!(
                "failed to commit transaction {}: {} - {}",
                txn_id, reply.status, reply.msg
            )));
        }
        tracing::info!(database, txn_id, "Transaction committed");
        Ok(())
    }

    /// Best-effort abort. A non-`Success` status is logged, not returned;
    /// transport and decode failures still are.
    pub async fn abort_txn(&self, database: &str, txn_id: TxnId) -> Result<()> {
        let url = self.txn_control_url(database, "abort", txn_id);
        let reply = self.txn_call(&url, &[], "abort transaction").await?;
        if reply.status != LoadStatus::Success {
            tracing::warn!(
                database,
                txn_id,
                status = %reply.status,
                "Abort not acknowledged (already final or unknown): {}",
                reply.msg
            );
        } else {
            tracing::info!(database, txn_id, "Transaction aborted");
        }
        Ok(())
    }

    fn txn_control_url(&self, database: &str, action: &str, txn_id: TxnId) -> String {
        format!(
            "{}/api/{}/_stream_load_2pc?txn_action={}&txn_id={}",
            self.selector().next_load().base_url(),
            database,
            action,
            txn_id
        )
    }

    /// One control `PUT`. Redirects are followed; a non-2xx answer is a
    /// [`Error::Database`] carrying the body.
    async fn txn_call(
        &self,
        url: &str,
        headers: &[(&'static str, String)],
        what: &str,
    ) -> Result<TxnReply> {
        let url = Url::parse(url)
            .map_err(|e| Error::invalid(format!("invalid {} target: {}", what, e)))?;
        let mut header_map = HeaderMap::new();
        header_map.insert(EXPECT, HeaderValue::from_static("100-continue"));
        for (name, value) in headers {
            let value = HeaderValue::from_str(value)
                .map_err(|_| Error::invalid(format!("invalid value for {} header {}", what, name)))?;
            header_map.insert(*name, value);
        }
        let timeout = self.timeout_or(self.config().query_timeout());

        let (status, body) = self
            .put_following_redirects(url, &header_map, Vec::new(), timeout, what)
            .await?;
        if !(200..300).contains(&status) {
            tracing::error!(status, "{} failed with HTTP {}: {}", what, status, body);
            return Err(Error::database(format!(
                "{} failed with HTTP {}: {}",
                what, status, body
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            Error::Deserialization(format!("failed to decode {} response: {}: {}", what, e, body))
        })
    }
}

// =============================================================================
// Coordinator + leases
// =============================================================================

#[derive(Clone)]
pub struct TxnCoordinator {
    client: EngineClient,
    leases: Arc<Mutex<HashMap<TxnId, TxnLease>>>,
    grace: Duration,
}

impl TxnCoordinator {
    pub fn new(client: EngineClient, grace: Duration) -> Self {
        Self {
            client,
            leases: Arc::new(Mutex::new(HashMap::new())),
            grace,
        }
    }

    pub fn client(&self) -> &EngineClient {
        &self.client
    }

    fn leases(&self) -> MutexGuard<'_, HashMap<TxnId, TxnLease>> {
        self.leases.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn begin(
        &self,
        database: &str,
        table: &str,
        label: &str,
        timeout_secs: u64,
    ) -> Result<BeginOutcome> {
        let outcome = self
            .client
            .begin_txn(database, table, label, timeout_secs)
            .await?;

        let now = Utc::now();
        let expires_at = lease_expiry(now, timeout_secs, self.grace);
        let mut leases = self.leases();
        let lease = leases.entry(outcome.txn_id).or_insert_with(|| TxnLease {
            txn_id: outcome.txn_id,
            label: outcome.label.clone(),
            database: database.to_string(),
            table: table.to_string(),
            state: TxnState::Begun,
            began_at: now,
            expires_at,
        });
        if !outcome.reused {
            lease.state = TxnState::Begun;
            lease.expires_at = expires_at;
        }
        Ok(outcome)
    }

    /// Begin and wrap the transaction in an owned handle.
    pub async fn transaction(
        &self,
        database: &str,
        table: &str,
        label: &str,
        timeout_secs: u64,
    ) -> Result<LoadTransaction> {
        let outcome = self.begin(database, table, label, timeout_secs).await?;
        Ok(LoadTransaction {
            coordinator: self.clone(),
            database: database.to_string(),
            table: table.to_string(),
            outcome,
        })
    }

    pub async fn commit(&self, database: &str, txn_id: TxnId) -> Result<()> {
        self.client.commit_txn(database, txn_id).await?;
        self.mark(txn_id, TxnState::Committed);
        Ok(())
    }

    pub async fn abort(&self, database: &str, txn_id: TxnId) -> Result<()> {
        self.client.abort_txn(database, txn_id).await?;
        self.mark(txn_id, TxnState::Aborted);
        Ok(())
    }

    fn mark(&self, txn_id: TxnId, state: TxnState) {
        if let Some(lease) = self.leases().get_mut(&txn_id) {
            lease.state = state;
        }
    }

    /// Leases sorted by transaction id.
    pub fn leases_snapshot(&self) -> Vec<TxnLease> {
        let mut all: Vec<TxnLease> = self.leases().values().cloned().collect();
        all.sort_by_key(|l| l.txn_id);
        all
    }

    /// Abort every lease still `Begun` past its expiry. Final leases past
    /// expiry are dropped from the registry. Returns the number aborted.
    pub async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<TxnLease> = {
            let mut leases = self.leases();
            leases.retain(|_, l| !(l.state.is_terminal() && now >= l.expires_at));
            leases.values().filter(|l| l.is_expired(now)).cloned().collect()
        };

        let mut aborted = 0;
        for lease in expired {
            tracing::warn!(
                txn_id = lease.txn_id,
                label = %lease.label,
                database = %lease.database,
                table = %lease.table,
                "Aborting orphaned transaction"
            );
            match self.client.abort_txn(&lease.database, lease.txn_id).await {
                Ok(()) => {
                    self.mark(lease.txn_id, TxnState::Aborted);
                    aborted += 1;
                }
                Err(e) => {
                    tracing::warn!(txn_id = lease.txn_id, "Sweeper abort failed, will retry: {}", e);
                }
            }
        }
        aborted
    }

    /// Run [`Self::sweep_expired`] every `interval` on the current runtime.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let n = coordinator.sweep_expired().await;
                if n > 0 {
                    tracing::info!("Transaction sweeper aborted {} orphaned transaction(s)", n);
                }
            }
        })
    }
}

/// `now + timeout + grace`, saturating at the latest representable instant.
fn lease_expiry(now: DateTime<Utc>, timeout_secs: u64, grace: Duration) -> DateTime<Utc> {
    Duration::from_secs(timeout_secs)
        .checked_add(grace)
        .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Owned handle over one begun transaction. `commit` and `abort` consume it,
/// so a handle cannot be finalized twice.
pub struct LoadTransaction {
    coordinator: TxnCoordinator,
    database: String,
    table: String,
    outcome: BeginOutcome,
}

impl LoadTransaction {
    pub fn id(&self) -> TxnId {
        self.outcome.txn_id
    }

    pub fn label(&self) -> &str {
        &self.outcome.label
    }

    /// The label named an already-open transaction.
    pub fn reused(&self) -> bool {
        self.outcome.reused
    }

    /// Stage a load under this transaction. Data is invisible until commit.
    pub async fn load(&self, payload: impl Into<Vec<u8>>, options: &LoadOptions) -> Result<LoadResponse> {
        let options = options.clone().in_transaction(self.outcome.txn_id);
        self.coordinator
            .client
            .stream_load(&self.database, &self.table, payload, &options)
            .await
    }

    pub async fn commit(self) -> Result<()> {
        self.coordinator.commit(&self.database, self.outcome.txn_id).await
    }

    pub async fn abort(self) -> Result<()> {
        self.coordinator.abort(&self.database, self.outcome.txn_id).await
    }
}
