//! Common error types for eawatch

use thiserror::Error;

/// Common result type for eawatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the eawatch pipeline
///
/// Upstream HTTP failures are split into transient (retryable) and terminal
/// (not retryable) variants so retry loops and the run log can treat them
/// differently.
#[derive(Error, Debug)]
pub enum Error {
    /// Retryable upstream failure: timeout, connection error, 5xx
    #[error("Transient upstream error{}: {message}", fmt_status(.status))]
    TransientUpstream {
        status: Option<u16>,
        message: String,
    },

    /// Non-retryable upstream failure: 4xx, malformed payload
    #[error("Terminal upstream error{}: {message}", fmt_status(.status))]
    TerminalUpstream {
        status: Option<u16>,
        message: String,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Graph store error: {0}")]
    Graph(#[from] neo4rs::Error),

    /// Terminal failure of the embedding service; the incident is still
    /// persisted in the document and graph stores.
    #[error("Embedding service error: {0}")]
    Embedding(String),

    /// The cycle was cancelled or ran past its deadline.
    #[error("Cycle aborted: {0}")]
    CycleAborted(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a retry loop may attempt this operation again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientUpstream { .. })
    }

    /// Classify an HTTP status code into a transient or terminal error.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status >= 500 {
            Error::TransientUpstream {
                status: Some(status),
                message,
            }
        } else {
            Error::TerminalUpstream {
                status: Some(status),
                message,
            }
        }
    }
}

fn fmt_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" ({code})"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(Error::from_status(502, "bad gateway").is_transient());
        assert!(Error::from_status(500, "oops").is_transient());
        assert!(!Error::from_status(404, "not found").is_transient());
        assert!(!Error::from_status(400, "bad request").is_transient());
    }

    #[test]
    fn test_display_includes_status() {
        let err = Error::from_status(503, "unavailable");
        assert_eq!(
            err.to_string(),
            "Transient upstream error (503): unavailable"
        );
    }
}
