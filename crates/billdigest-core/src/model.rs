//! Domain models shared across the pipeline.

use std::path::PathBuf;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::mailbox::MimePart;

/// A mailbox label: human-chosen name and mailbox-assigned id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    /// Mailbox-assigned identifier.
    pub id: String,
    /// Human-chosen name.
    pub name: String,
}

impl Label {
    /// Creates a label.
    #[must_use]
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A PDF attachment extracted from a message and saved to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    /// Attachment id assigned by the mail API.
    pub id: String,
    /// Attachment payload as delivered by the mail API (transport Base64).
    pub base64_value: String,
    /// Generated, run-unique file name (`<uuid>.pdf`).
    pub file_name: String,
    /// Directory the decoded bytes were written to.
    pub directory: PathBuf,
}

impl AttachmentRef {
    /// Full path of the saved file.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }
}

/// Which MIME branch produced a message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// Decoded `text/plain` child of a `multipart/alternative` part.
    Plain,
    /// Decoded top-level `text/html` part.
    Html,
}

/// The extracted view of one mail message.
#[derive(Debug, Clone)]
pub struct MessageDetail {
    /// Message id.
    pub id: String,
    /// The single active label this message was assigned to.
    pub label_id: String,
    /// Decoded body text, if any body part was found.
    pub body: Option<String>,
    /// Branch that produced `body`.
    pub body_kind: Option<BodyKind>,
    /// Saved PDF attachments, in part order.
    pub attachments: Vec<AttachmentRef>,
    /// Untouched MIME payload for parsers that need more than the body.
    pub raw_payload: MimePart,
    /// Mailbox receive time in epoch milliseconds.
    pub internal_date: Option<i64>,
}

impl MessageDetail {
    /// Creates a detail with no body or attachments.
    #[must_use]
    pub fn new(id: impl Into<String>, label_id: impl Into<String>, raw_payload: MimePart) -> Self {
        Self {
            id: id.into(),
            label_id: label_id.into(),
            body: None,
            body_kind: None,
            attachments: Vec::new(),
            raw_payload,
            internal_date: None,
        }
    }

    /// Sets the body, replacing any earlier one.
    pub fn set_body(&mut self, body: String, kind: BodyKind) {
        self.body = Some(body);
        self.body_kind = Some(kind);
    }
}

/// A parser's normalized description of one bill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillRecord {
    /// Amount as a decimal string (e.g. `"42.17"`).
    pub bill_amount: String,
    /// One-line human description.
    pub bill_description: String,
    /// File name for the re-attached bill, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Standard Base64 file content, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_data: Option<String>,
}

impl BillRecord {
    /// Creates a record without an attachment.
    #[must_use]
    pub fn new(amount: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            bill_amount: amount.into(),
            bill_description: description.into(),
            file_name: None,
            file_data: None,
        }
    }

    /// Adds an attachment to re-send with the summary.
    #[must_use]
    pub fn with_attachment(mut self, file_name: impl Into<String>, file_data: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self.file_data = Some(file_data.into());
        self
    }

    /// Parses `bill_amount` as a decimal.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidAmount`] if the amount is not numeric.
    pub fn amount(&self) -> Result<Decimal, ParseError> {
        parse_amount(&self.bill_amount)
    }
}

/// Parses a money amount, tolerating a leading `$` and thousands separators.
///
/// # Errors
///
/// Returns [`ParseError::InvalidAmount`] if what remains is not a decimal.
pub fn parse_amount(raw: &str) -> Result<Decimal, ParseError> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',')
        .collect();

    Decimal::from_str(cleaned.trim()).map_err(|_| ParseError::InvalidAmount(raw.to_string()))
}

/// One attachment of the composed summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportAttachment {
    /// File name shown to the recipient.
    pub filename: String,
    /// Encoded file content.
    pub content: String,
    /// Encoding of `content`; always `base64`.
    pub encoding: String,
}

/// The composed summary, ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateReport {
    /// Plain text rendering.
    pub text: String,
    /// HTML rendering.
    pub html: String,
    /// Sum of all bill amounts.
    pub total: Decimal,
    /// Bills re-attached to the summary.
    pub attachments: Vec<ReportAttachment>,
}
