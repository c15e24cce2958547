//! Error types for Courier gateway

use thiserror::Error;

/// Result type alias for Courier operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Courier gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Messaging channel error (dispatch failures, bad addresses)
    #[error("channel error: {0}")]
    Channel(String),

    /// Completion service error
    #[error("completion error: {0}")]
    Completion(String),

    /// Live sync error (snapshot polling, stream subscriptions)
    #[error("sync error: {0}")]
    Sync(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
