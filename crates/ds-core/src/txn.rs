//! # Two-Phase-Commit Lifecycle
//!
//! `NotStarted --begin--> Begun --commit--> Committed`
//! `                      Begun --abort---> Aborted`
//!
//! Both end states are final. The engine owns the authoritative state; the
//! [`TxnLease`] kept locally only tracks what this process started so stale
//! transactions can be reclaimed.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Engine-assigned transaction id.
pub type TxnId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxnState {
    NotStarted,
    Begun,
    Committed,
    Aborted,
}

impl TxnState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }
}

impl fmt::Display for TxnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::Begun => "begun",
            Self::Committed => "committed",
            Self::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Result of a begin call.
///
/// `reused` is set when the label already named an open transaction and the
/// engine handed back its id instead of starting a new one. Callers must not
/// treat such a transaction as fresh: it may already hold staged data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeginOutcome {
    pub txn_id: TxnId,
    pub label: String,
    pub reused: bool,
}

/// Local record of a transaction begun by this process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnLease {
    pub txn_id: TxnId,
    pub label: String,
    pub database: String,
    pub table: String,
    pub state: TxnState,
    pub began_at: DateTime<Utc>,
    /// Engine timeout plus a grace period. A lease still `Begun` past this
    /// point is considered orphaned.
    pub expires_at: DateTime<Utc>,
}

impl TxnLease {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.state == TxnState::Begun && now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn lease(state: TxnState, expires_in_secs: i64) -> TxnLease {
        let now = Utc::now();
        TxnLease {
            txn_id: 1,
            label: "l".into(),
            database: "db".into(),
            table: "t".into(),
            state,
            began_at: now,
            expires_at: now + Duration::seconds(expires_in_secs),
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(TxnState::Committed.is_terminal());
        assert!(TxnState::Aborted.is_terminal());
        assert!(!TxnState::Begun.is_terminal());
        assert!(!TxnState::NotStarted.is_terminal());
    }

    #[test]
    fn test_only_open_leases_expire() {
        let later = Utc::now() + Duration::seconds(120);
        assert!(lease(TxnState::Begun, 60).is_expired(later));
        assert!(!lease(TxnState::Committed, 60).is_expired(later));
        assert!(!lease(TxnState::Begun, 600).is_expired(later));
    }

    #[test]
    fn test_state_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&TxnState::NotStarted).unwrap(), "\"not_started\"");
        assert_eq!(TxnState::Begun.to_string(), "begun");
    }
}
