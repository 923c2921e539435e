//! Error types shared across the autoscaling engine

use crate::load::Dimension;
use crate::models::ClusterId;
use thiserror::Error;

/// Raised when a load vector is constructed from invalid components
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    #[error("{dimension} load must be a non-negative number, but is {value}")]
    InvalidArgument { dimension: Dimension, value: f64 },
}

/// Errors from the metrics store
#[derive(Debug, Error)]
pub enum MetricsDbError {
    /// The table's backing state is unreadable; the table can be repaired
    #[error("table {table} is corrupt: {reason}")]
    Corrupt { table: String, reason: String },

    #[error("i/o error on table {table}: {source}")]
    Io {
        table: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not serialize snapshot: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Repair was attempted and the operation still failed
    #[error("table {table} failed after repair: {reason}")]
    Fatal { table: String, reason: String },
}

impl MetricsDbError {
    /// Whether wiping and recreating the table may let the operation succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            MetricsDbError::Corrupt { .. } => true,
            MetricsDbError::Io { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::NotFound
                    | std::io::ErrorKind::InvalidData
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }

    pub(crate) fn poisoned(table: &str) -> Self {
        MetricsDbError::Fatal {
            table: table.to_string(),
            reason: "lock poisoned".to_string(),
        }
    }
}

/// Errors building a cluster model for one evaluation
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("cluster {0} has no active nodes")]
    NoNodes(ClusterId),

    #[error("could not read metrics: {0}")]
    Storage(#[from] MetricsDbError),
}

/// Errors inside the metrics fetch adapter. These never leave the adapter:
/// a failed fetch resolves to an empty response.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid metrics url: {0}")]
    Url(#[from] url::ParseError),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("metrics endpoint returned status {0}")]
    Status(u16),

    #[error("could not parse metrics response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("metrics request timed out after {0:?}")]
    Timeout(std::time::Duration),
}
