//! Error types for Gmail API calls.

use reqwest::StatusCode;

/// Result type alias for Gmail operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Gmail client error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport failure before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response from the API.
    #[error("Gmail API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message from the error body, or the raw body.
        message: String,
    },

    /// No usable access token.
    #[error("Authorization error: {0}")]
    Auth(#[from] billdigest_oauth::Error),

    /// Response body did not match the expected shape.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Outgoing message could not be rendered.
    #[error("MIME error: {0}")]
    Mime(#[from] billdigest_mime::Error),

    /// Identifier that cannot be placed in a request path.
    #[error("Invalid identifier: {0:?}")]
    InvalidId(String),
}

impl Error {
    pub(crate) fn api(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Api {
            status: status.as_u16(),
            message: message.into(),
        }
    }

    /// Returns the HTTP status for API errors.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}
