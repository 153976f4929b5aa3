//! # ds-core: The "Model" of DataSeap
//!
//! Plain data shared by the engine client (`ds-link`), the hub service and
//! the CLI. Nothing in this crate performs I/O.
//!
//! - [`QueryResult`]: columns + positional rows returned by the engine.
//! - [`LoadOptions`] / [`LoadResponse`]: the stream-load request knobs and the
//!   engine's flat JSON verdict.
//! - [`TxnState`] / [`BeginOutcome`]: the two-phase-commit lifecycle.
//! - [`SearchRequest`] / [`SearchHit`] / [`SearchResult`]: cross-table keyword
//!   search, plus the client-side [`paginate`] window.

pub mod error;
pub mod load;
pub mod page;
pub mod query;
pub mod schema;
pub mod search;
pub mod txn;

pub use error::{Error, ErrorKind, Result};
pub use load::{LoadFormat, LoadOptions, LoadResponse, LoadStatus, DEFAULT_LOAD_TIMEOUT_SECS};
pub use page::{paginate, PageEcho, PageRequest, DEFAULT_PAGE_SIZE};
pub use query::{QueryResult, QueryStats};
pub use schema::{FieldSchema, TableSchema};
pub use search::{
    SearchHit, SearchRequest, SearchResult, TableFailure, TimeRangeFilter, PLACEHOLDER_SCORE,
};
pub use txn::{BeginOutcome, TxnId, TxnLease, TxnState};
