//! Outbound MIME message generation.

use crate::content_type::ContentType;
use crate::encoding::{decode_transport, encode_base64_wrapped, encode_rfc2047};
use crate::error::{Error, Result};
use crate::header::Headers;
use chrono::{DateTime, FixedOffset, Utc};

/// Every generated leaf part is Base64 transfer-encoded.
const TRANSFER_ENCODING: &str = "base64";

/// A file attached to an outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// File name announced in `Content-Disposition`.
    pub filename: String,
    /// Content type of the file.
    pub content_type: ContentType,
    /// Raw file bytes.
    pub data: Vec<u8>,
}

impl Attachment {
    /// Creates an attachment from raw bytes.
    #[must_use]
    pub fn new(filename: impl Into<String>, content_type: ContentType, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type,
            data,
        }
    }

    /// Creates an attachment from Base64 content (standard or URL-safe).
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not valid Base64.
    pub fn from_base64(
        filename: impl Into<String>,
        content_type: ContentType,
        content: &str,
    ) -> Result<Self> {
        Ok(Self::new(filename, content_type, decode_transport(content)?))
    }
}

/// Formats a mailbox as `Display Name <address>`.
///
/// The display name is RFC 2047 encoded when it is not plain ASCII and
/// quoted when it contains specials.
#[must_use]
pub fn format_mailbox(name: Option<&str>, address: &str) -> String {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        None => address.to_string(),
        Some(name) if !name.is_ascii() => {
            format!("{} <{address}>", encode_rfc2047(name, "utf-8"))
        }
        Some(name) if name.contains(|c: char| "()<>[]:;@\\,.\"".contains(c)) => {
            let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
            format!("\"{escaped}\" <{address}>")
        }
        Some(name) => format!("{name} <{address}>"),
    }
}

/// Builder for RFC 5322 messages with text, HTML and attachments.
///
/// Layout:
/// - text and HTML together become `multipart/alternative`
/// - any attachment wraps the body in `multipart/mixed`
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    from: Option<String>,
    to: Vec<String>,
    subject: Option<String>,
    date: Option<DateTime<FixedOffset>>,
    text: Option<String>,
    html: Option<String>,
    attachments: Vec<Attachment>,
}

impl MessageBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the `From` mailbox.
    #[must_use]
    pub fn from(mut self, mailbox: impl Into<String>) -> Self {
        self.from = Some(mailbox.into());
        self
    }

    /// Adds a recipient.
    #[must_use]
    pub fn to(mut self, mailbox: impl Into<String>) -> Self {
        self.to.push(mailbox.into());
        self
    }

    /// Sets the subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the `Date` header; defaults to the build time.
    #[must_use]
    pub const fn date(mut self, date: DateTime<FixedOffset>) -> Self {
        self.date = Some(date);
        self
    }

    /// Sets the plain text body.
    #[must_use]
    pub fn text_body(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Sets the HTML body.
    #[must_use]
    pub fn html_body(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    /// Attaches a file.
    #[must_use]
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Renders the message.
    ///
    /// # Errors
    ///
    /// Returns an error if `From` or recipients are missing, or a header
    /// value contains a line break.
    pub fn build(self) -> Result<String> {
        let from = self
            .from
            .ok_or_else(|| Error::MissingHeader("From".to_string()))?;
        if self.to.is_empty() {
            return Err(Error::MissingHeader("To".to_string()));
        }

        let mut headers = Headers::new();
        headers.add("From", from)?;
        headers.add("To", self.to.join(", "))?;
        headers.add_encoded("Subject", self.subject.as_deref().unwrap_or_default())?;
        let date = self.date.unwrap_or_else(|| Utc::now().fixed_offset());
        headers.add("Date", date.to_rfc2822())?;
        headers.add("MIME-Version", "1.0")?;

        let body = match (self.text, self.html) {
            (Some(text), Some(html)) => Entity::Multipart {
                content_type: ContentType::multipart_alternative(new_boundary()),
                parts: vec![Entity::text(&text, ContentType::text_plain()), Entity::text(&html, ContentType::text_html())],
            },
            (Some(text), None) => Entity::text(&text, ContentType::text_plain()),
            (None, Some(html)) => Entity::text(&html, ContentType::text_html()),
            (None, None) => Entity::text("", ContentType::text_plain()),
        };

        let root = if self.attachments.is_empty() {
            body
        } else {
            let mut parts = vec![body];
            parts.extend(self.attachments.iter().map(Entity::attachment));
            Entity::Multipart {
                content_type: ContentType::multipart_mixed(new_boundary()),
                parts,
            }
        };

        let mut out = headers.to_string();
        root.render(&mut out);
        Ok(out)
    }
}

/// One node of the generated MIME tree.
enum Entity {
    Leaf {
        headers: Vec<(&'static str, String)>,
        body: String,
    },
    Multipart {
        content_type: ContentType,
        parts: Vec<Entity>,
    },
}

impl Entity {
    fn text(content: &str, content_type: ContentType) -> Self {
        Self::Leaf {
            headers: vec![
                ("Content-Type", content_type.to_string()),
                ("Content-Transfer-Encoding", TRANSFER_ENCODING.to_string()),
            ],
            body: encode_base64_wrapped(content.as_bytes()),
        }
    }

    fn attachment(attachment: &Attachment) -> Self {
        let filename = encode_rfc2047(&attachment.filename, "utf-8").replace('"', "");
        let content_type = attachment
            .content_type
            .clone()
            .with_parameter("name", filename.clone());
        Self::Leaf {
            headers: vec![
                ("Content-Type", content_type.to_string()),
                ("Content-Transfer-Encoding", TRANSFER_ENCODING.to_string()),
                ("Content-Disposition", format!("attachment; filename=\"{filename}\"")),
            ],
            body: encode_base64_wrapped(&attachment.data),
        }
    }

    fn render(&self, out: &mut String) {
        match self {
            Self::Leaf { headers, body } => {
                for (name, value) in headers {
                    out.push_str(name);
                    out.push_str(": ");
                    out.push_str(value);
                    out.push_str("\r\n");
                }
                out.push_str("\r\n");
                out.push_str(body);
                out.push_str("\r\n");
            }
            Self::Multipart {
                content_type,
                parts,
            } => {
                let boundary = content_type.boundary().unwrap_or_default().to_string();
                out.push_str("Content-Type: ");
                out.push_str(&content_type.to_string());
                out.push_str("\r\n\r\n");
                for part in parts {
                    out.push_str("--");
                    out.push_str(&boundary);
                    out.push_str("\r\n");
                    part.render(out);
                }
                out.push_str("--");
                out.push_str(&boundary);
                out.push_str("--\r\n");
            }
        }
    }
}

fn new_boundary() -> String {
    format!("bd_{}", uuid::Uuid::new_v4().simple())
}
