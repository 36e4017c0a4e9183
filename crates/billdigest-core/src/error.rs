//! Error types for the core library.

use thiserror::Error;

/// Fatal errors that abort a run.
///
/// Per-message, per-attachment and per-parser failures are recovered inside
/// the pipeline and never surface here.
#[derive(Debug, Error)]
pub enum Error {
    /// The mailbox label listing failed or returned nothing usable.
    #[error("Failed to list labels: {0}")]
    LabelList(String),

    /// No message id list could be obtained for any active label.
    #[error("Failed to list messages: {0}")]
    MessageList(String),

    /// The summary could not be built or delivered.
    #[error("Failed to send summary: {0}")]
    Send(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors a bill parser may report for a single message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The message carried no body to parse.
    #[error("message {0} has no body")]
    MissingBody(String),

    /// The expected pattern was not found in the body.
    #[error("no bill amount found for {label}")]
    NoMatch {
        /// Label the parser was registered for.
        label: String,
    },

    /// The extracted amount is not a decimal number.
    #[error("invalid bill amount: {0:?}")]
    InvalidAmount(String),

    /// Any other parser-specific failure.
    #[error("{0}")]
    Other(String),
}
