//! Mailbox capabilities consumed and produced by the pipeline.
//!
//! The mail API and the outbound delivery service are external
//! collaborators. They are modelled as traits so the pipeline can be driven
//! by the Gmail client in production and by in-memory fakes in tests. The
//! wire types mirror the Gmail `users.messages` resource, which is the shape
//! the pipeline is written against.

use std::fmt::Display;
use std::future::Future;

use billdigest_mime::{ContentType, format_mailbox};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::{AggregateReport, Label, ReportAttachment};

/// A raw message as returned by the mail API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    /// Message id.
    pub id: String,
    /// Thread id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Label ids in mailbox order.
    #[serde(default)]
    pub label_ids: Vec<String>,
    /// Receive time in epoch milliseconds, as a decimal string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_date: Option<String>,
    /// Root MIME part.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<MimePart>,
}

impl RawMessage {
    /// Receive time in epoch milliseconds, if present and numeric.
    #[must_use]
    pub fn received_at_millis(&self) -> Option<i64> {
        self.internal_date.as_deref().and_then(|d| d.parse().ok())
    }
}

/// One node of a message's MIME tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MimePart {
    /// Part id (`""` for the root, `"0"`, `"1.2"`...).
    #[serde(default)]
    pub part_id: String,
    /// Declared MIME type, e.g. `text/plain`.
    #[serde(default)]
    pub mime_type: String,
    /// File name for attachment parts.
    #[serde(default)]
    pub filename: String,
    /// Part headers.
    #[serde(default)]
    pub headers: Vec<PartHeader>,
    /// Part body.
    #[serde(default)]
    pub body: PartBody,
    /// Child parts for multipart types.
    #[serde(default)]
    pub parts: Vec<MimePart>,
}

impl MimePart {
    /// Creates a leaf part with inline transport Base64 data.
    #[must_use]
    pub fn inline(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            body: PartBody {
                data: Some(data.into()),
                ..PartBody::default()
            },
            ..Self::default()
        }
    }

    /// Creates an attachment part whose bytes must be fetched separately.
    #[must_use]
    pub fn attachment(
        mime_type: impl Into<String>,
        filename: impl Into<String>,
        attachment_id: impl Into<String>,
    ) -> Self {
        Self {
            mime_type: mime_type.into(),
            filename: filename.into(),
            body: PartBody {
                attachment_id: Some(attachment_id.into()),
                ..PartBody::default()
            },
            ..Self::default()
        }
    }

    /// Creates a container part.
    #[must_use]
    pub fn multipart(mime_type: impl Into<String>, parts: Vec<Self>) -> Self {
        Self {
            mime_type: mime_type.into(),
            parts,
            ..Self::default()
        }
    }

    /// Parsed content type; `None` when the declared type is malformed.
    #[must_use]
    pub fn content_type(&self) -> Option<ContentType> {
        ContentType::parse(&self.mime_type).ok()
    }

    /// Checks the declared type, ignoring case and parameters.
    #[must_use]
    pub fn is(&self, main_type: &str, sub_type: &str) -> bool {
        self.content_type()
            .is_some_and(|ct| ct.is(main_type, sub_type))
    }

    /// First header value with the given name, ignoring case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Top-level parts to scan. A single-part message is its own only part.
    #[must_use]
    pub fn top_level_parts(&self) -> &[Self] {
        if self.parts.is_empty() {
            std::slice::from_ref(self)
        } else {
            &self.parts
        }
    }
}

/// A MIME part header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartHeader {
    /// Header name.
    pub name: String,
    /// Header value.
    pub value: String,
}

/// Body of a MIME part.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartBody {
    /// Set when the body must be fetched with `get_attachment`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_id: Option<String>,
    /// Body size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Inline body data in transport Base64.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// Read access to a mailbox.
///
/// Implementations own their connection and authentication state; one
/// instance is built at start-up and passed by reference.
pub trait MailApi: Sync {
    /// Error reported by the underlying service.
    type Error: Display + Send;

    /// Lists every label in the mailbox.
    fn list_labels(&self) -> impl Future<Output = Result<Vec<Label>, Self::Error>> + Send;

    /// Lists ids of messages carrying `label_id` received on or after `since`.
    fn list_message_ids(
        &self,
        label_id: &str,
        since: NaiveDate,
    ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send;

    /// Fetches a full message including its MIME payload.
    fn get_message(
        &self,
        message_id: &str,
    ) -> impl Future<Output = Result<RawMessage, Self::Error>> + Send;

    /// Fetches attachment bytes as transport Base64.
    fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> impl Future<Output = Result<String, Self::Error>> + Send;
}

/// Outbound delivery of the composed summary.
pub trait MailSender: Sync {
    /// Error reported by the delivery service.
    type Error: Display + Send;

    /// Sends the message and returns the id assigned by the service.
    fn send_mail(
        &self,
        mail: &OutgoingMail,
    ) -> impl Future<Output = Result<String, Self::Error>> + Send;
}

/// Who the summary comes from and goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Display name of the sender.
    pub sender_name: String,
    /// Sender address.
    pub sender_address: String,
    /// Recipient addresses.
    pub to: Vec<String>,
    /// Subject line.
    pub subject: String,
}

impl Envelope {
    /// Wraps a report into a message ready for a [`MailSender`].
    #[must_use]
    pub fn address(&self, report: &AggregateReport) -> OutgoingMail {
        OutgoingMail {
            from: format_mailbox(Some(&self.sender_name), &self.sender_address),
            to: self.to.clone(),
            subject: self.subject.clone(),
            text: report.text.clone(),
            html: report.html.clone(),
            attachments: report.attachments.clone(),
        }
    }
}

/// A fully addressed summary message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    /// Formatted `From` mailbox.
    pub from: String,
    /// Recipient addresses.
    pub to: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Plain text body.
    pub text: String,
    /// HTML body.
    pub html: String,
    /// Files to attach.
    pub attachments: Vec<ReportAttachment>,
}
