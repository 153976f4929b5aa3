//! # ds-link: The "Link" of DataSeap
//!
//! HTTP protocol client for the analytical engine's frontend nodes.
//!
//! - [`EndpointSelector`]: round-robin choice of frontend, separate cursors
//!   for query and load traffic.
//! - [`EngineClient::execute`]: `POST /api/v1/query` and envelope parsing.
//! - [`EngineClient::stream_load`]: synchronous bulk load over `PUT`.
//! - [`TxnCoordinator`]: two-phase-commit begin/commit/abort plus a lease
//!   registry that reclaims orphaned transactions.
//! - [`DescribeMetadata`]: table schema lookup via `DESCRIBE`.
//!
//! Nothing in this crate retries. Every failure reaches the caller as a
//! typed [`ds_core::Error`].

pub mod client;
pub mod config;
pub mod endpoint;
pub mod load;
pub mod metadata;
pub mod query;
pub mod txn;

#[cfg(test)]
pub(crate) mod mock_fe;

pub use client::EngineClient;
pub use config::EngineConfig;
pub use endpoint::{Endpoint, EndpointRole, EndpointSelector};
pub use load::StreamLoader;
pub use metadata::{DescribeMetadata, MetadataLookup};
pub use query::SqlExecutor;
pub use txn::{LoadTransaction, TxnCoordinator};
