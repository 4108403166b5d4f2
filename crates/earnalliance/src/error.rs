//! Error types for the Earn Alliance SDK.

/// Errors that can occur when using the Earn Alliance SDK.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status after all retries.
    #[error("HTTP {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Client has been closed.
    #[error("Client has been closed")]
    Shutdown,

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Response body was not a JSON object.
    #[error("Failed to decode response body: {0}")]
    Decode(String),

    /// The API rejected the batch.
    #[error("Server returned error: {0}")]
    Server(String),

    /// The API answered with a JSON shape the SDK does not recognize.
    #[error("Unexpected response from server: {0}")]
    UnexpectedResponse(String),
}
