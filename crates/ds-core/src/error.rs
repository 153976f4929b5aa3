//! # Error Taxonomy
//!
//! Every failure surfaced by the engine client and the hub services maps onto
//! one [`ErrorKind`]. The protocol layer never retries; it reports the kind
//! plus enough context (raw response body, `ErrorURL`) for the caller to act.

use serde::Serialize;
use thiserror::Error;

use crate::load::LoadResponse;

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Missing or unusable configuration (e.g. no frontend endpoints).
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport-level failure: connect, timeout, broken body stream.
    #[error("network error: {0}")]
    Network(String),

    /// The engine answered but reported failure (non-zero code, non-OK HTTP
    /// status, non-success load or transaction status).
    #[error("database error: {message}")]
    Database {
        message: String,
        /// The load verdict that caused the failure, when there is one.
        load: Option<Box<LoadResponse>>,
    },

    /// A request body could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A response body could not be decoded.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// The caller supplied an unusable request.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Discriminant of [`Error`], cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    #[serde(rename = "ConfigError")]
    Config,
    #[serde(rename = "NetworkError")]
    Network,
    #[serde(rename = "DatabaseError")]
    Database,
    #[serde(rename = "SerializationError")]
    Serialization,
    #[serde(rename = "DeserializationError")]
    Deserialization,
    #[serde(rename = "InvalidArgument")]
    InvalidArgument,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config => write!(f, "ConfigError"),
            Self::Network => write!(f, "NetworkError"),
            Self::Database => write!(f, "DatabaseError"),
            Self::Serialization => write!(f, "SerializationError"),
            Self::Deserialization => write!(f, "DeserializationError"),
            Self::InvalidArgument => write!(f, "InvalidArgument"),
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Network(_) => ErrorKind::Network,
            Self::Database { .. } => ErrorKind::Database,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Deserialization(_) => ErrorKind::Deserialization,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            load: None,
        }
    }

    /// A database error that keeps the offending load verdict attached.
    pub fn load_failed(message: impl Into<String>, response: LoadResponse) -> Self {
        Self::Database {
            message: message.into(),
            load: Some(Box::new(response)),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// The load verdict attached to a failed stream load, if any.
    pub fn load_response(&self) -> Option<&LoadResponse> {
        match self {
            Self::Database { load, .. } => load.as_deref(),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            Self::Deserialization(err.to_string())
        } else {
            Self::Serialization(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::LoadStatus;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(Error::database("x").kind(), ErrorKind::Database);
        assert_eq!(Error::invalid("x").kind(), ErrorKind::InvalidArgument);
        assert_eq!(Error::Network("x".into()).kind(), ErrorKind::Network);
        assert_eq!(Error::Config("x".into()).kind(), ErrorKind::Config);
    }

    #[test]
    fn test_kind_serializes_with_taxonomy_names() {
        let json = serde_json::to_string(&ErrorKind::Database).unwrap();
        assert_eq!(json, "\"DatabaseError\"");
        assert_eq!(ErrorKind::Network.to_string(), "NetworkError");
    }

    #[test]
    fn test_load_failure_keeps_error_url() {
        let response = LoadResponse {
            status: LoadStatus::Fail,
            error_url: Some("http://be:8040/api/_load_error_log?file=abc".into()),
            ..Default::default()
        };
        let err = Error::load_failed("stream load failed", response);
        let attached = err.load_response().unwrap();
        assert_eq!(
            attached.error_url.as_deref(),
            Some("http://be:8040/api/_load_error_log?file=abc")
        );
    }

    #[test]
    fn test_malformed_json_is_deserialization_error() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert_eq!(err.kind(), ErrorKind::Deserialization);
    }
}
