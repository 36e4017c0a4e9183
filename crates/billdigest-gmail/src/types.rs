//! Wire types of the `users.labels` and `users.messages` resources.
//!
//! Full messages deserialize straight into
//! [`billdigest_core::RawMessage`]; only the envelopes around it live here.

use billdigest_core::Label;
use serde::{Deserialize, Serialize};

/// Response of `labels.list`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabelList {
    /// Every label in the mailbox. Required; a response without it is an error.
    pub labels: Vec<LabelEntry>,
}

/// One label as listed.
#[derive(Debug, Clone, Deserialize)]
pub struct LabelEntry {
    /// Label id, e.g. `Label_12` or `INBOX`.
    pub id: String,
    /// Display name.
    pub name: String,
    /// `system` or `user`.
    #[serde(rename = "type", default)]
    pub label_type: Option<String>,
}

impl From<LabelEntry> for Label {
    fn from(entry: LabelEntry) -> Self {
        Self::new(entry.name, entry.id)
    }
}

/// Response of `messages.list`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageList {
    /// Absent when nothing matched.
    #[serde(default)]
    pub messages: Vec<MessageIndex>,
    /// Token for the next page, absent on the last one.
    #[serde(default)]
    pub next_page_token: Option<String>,
    /// Server estimate of the total.
    #[serde(default)]
    pub result_size_estimate: Option<u64>,
}

/// A message id with its thread.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageIndex {
    /// Message id.
    pub id: String,
    /// Thread id.
    #[serde(default)]
    pub thread_id: Option<String>,
}

/// Response of `messages.attachments.get`.
#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentBody {
    /// Decoded size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Content in URL-safe Base64.
    pub data: String,
}

/// Request body of `messages.send`.
#[derive(Debug, Clone, Serialize)]
pub struct SendRequest {
    /// Whole RFC 5322 message in URL-safe Base64.
    pub raw: String,
}

/// Response of `messages.send`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMessage {
    /// Id of the sent message.
    pub id: String,
    /// Thread it was filed in.
    #[serde(default)]
    pub thread_id: Option<String>,
    /// Labels applied, normally `SENT`.
    #[serde(default)]
    pub label_ids: Vec<String>,
}

/// Error body returned with non-success statuses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    /// Error details.
    pub error: ErrorDetail,
}

/// Details inside [`ErrorEnvelope`].
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// Canonical status, e.g. `RESOURCE_EXHAUSTED`.
    #[serde(default)]
    pub status: Option<String>,
}
