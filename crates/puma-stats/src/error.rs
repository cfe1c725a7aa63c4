//! Error types for a single poll cycle

use crate::config::StatsKind;

/// Errors that abort a poll. None of them are retried.
#[derive(Debug, thiserror::Error)]
pub enum PumaError {
    #[error("failed to reach {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    #[error("{endpoint} responded with {status}")]
    Remote { endpoint: String, status: String },

    #[error("failed to decode {kind} response: {source}")]
    Decode {
        kind: StatsKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("no workers reported in worker_status while running in clustered mode")]
    NoWorkers,

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl PumaError {
    pub(crate) fn transport(endpoint: impl Into<String>, err: impl std::fmt::Display) -> Self {
        PumaError::Transport {
            endpoint: endpoint.into(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PumaError>;
