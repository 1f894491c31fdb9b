//! Error handling for the cupchain mining client
//!
//! A single error type covering HTTP, serialization, and domain failures with
//! enough context to decide whether an operation is worth retrying.

use thiserror::Error;

/// Result type alias for cupchain mining operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the cupchain mining client
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML configuration parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Block construction or validation errors
    #[error("Block error: {message}")]
    Block { message: String },

    /// Chain authority communication errors
    #[error("Chain authority error: {message}")]
    Authority { message: String },

    /// Block submission errors (retry budget exhausted)
    #[error("Submission failed: {message}")]
    Submit { message: String },

    /// Mining worker errors
    #[error("Worker {worker_id} failed: {message}")]
    Worker { worker_id: usize, message: String },

    /// Balance ledger errors
    #[error("Ledger error: {message}")]
    Ledger { message: String },
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a block error
    pub fn block(message: impl Into<String>) -> Self {
        Self::Block {
            message: message.into(),
        }
    }

    /// Create a chain authority error
    pub fn authority(message: impl Into<String>) -> Self {
        Self::Authority {
            message: message.into(),
        }
    }

    /// Create a submission error
    pub fn submit(message: impl Into<String>) -> Self {
        Self::Submit {
            message: message.into(),
        }
    }

    /// Create a worker error
    pub fn worker(worker_id: usize, message: impl Into<String>) -> Self {
        Self::Worker {
            worker_id,
            message: message.into(),
        }
    }

    /// Create a ledger error
    pub fn ledger(message: impl Into<String>) -> Self {
        Self::Ledger {
            message: message.into(),
        }
    }

    /// Check if the error is worth retrying
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => {
                if let Some(status) = e.status() {
                    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
                } else {
                    // Network-level failures are typically transient
                    e.is_timeout() || e.is_connect() || e.is_request()
                }
            }
            Error::Authority { .. } => true,
            Error::Io(_) => true,
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::Http(_) => "http",
            Error::Json(_) => "json",
            Error::Yaml(_) => "yaml",
            Error::Io(_) => "io",
            Error::Config { .. } => "config",
            Error::Block { .. } => "block",
            Error::Authority { .. } => "authority",
            Error::Submit { .. } => "submit",
            Error::Worker { .. } => "worker",
            Error::Ledger { .. } => "ledger",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_carry_message() {
        let err = Error::config("bad difficulty");
        assert!(err.to_string().contains("bad difficulty"));

        let err = Error::worker(3, "search panicked");
        assert!(err.to_string().contains('3'));
        assert_eq!(err.category(), "worker");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::authority("node returned 503").is_retryable());
        assert!(!Error::block("missing previous hash").is_retryable());
        assert!(!Error::config("missing miner address").is_retryable());
    }
}
