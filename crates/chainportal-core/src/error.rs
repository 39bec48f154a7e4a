//! Error types for the portal ingestion pipeline.

use thiserror::Error;

/// Errors that can occur while streaming from a portal.
#[derive(Debug, Error)]
pub enum PortalError {
    /// Transient failures kept happening after every retry was spent.
    /// `status` is `"HTTP <code>"` for server errors or the network failure reason.
    #[error("Portal request to {url} failed after {attempts} attempts: {status}")]
    RetriesExhausted {
        status: String,
        url: String,
        attempts: u32,
    },

    /// Connection refused, reset, timed out before a status line arrived.
    #[error("Network error talking to {url}: {reason}")]
    Network { url: String, reason: String },

    /// HTTP status the client does not handle itself. 5xx is retryable.
    #[error("Unexpected HTTP {status} from {url}: {body}")]
    UnexpectedStatus { status: u16, url: String, body: String },

    #[error(
        "Unable to resolve fork at block {block_number}: expected hash {expected}, portal reported {actual}"
    )]
    ForkUnresolved {
        block_number: u64,
        expected: String,
        actual: String,
    },

    /// The portal answered with a body that breaks the wire contract.
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Decoder error in '{decoder}': {reason}")]
    Decoder { decoder: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl PortalError {
    /// Returns `true` if the error is transient and the request may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::UnexpectedStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if the stream stopped because no common ancestor was found.
    pub fn is_fork(&self) -> bool {
        matches!(self, Self::ForkUnresolved { .. })
    }

    /// Shorthand for a decoder failure.
    pub fn decoder(decoder: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Decoder {
            decoder: decoder.into(),
            reason: reason.to_string(),
        }
    }
}
