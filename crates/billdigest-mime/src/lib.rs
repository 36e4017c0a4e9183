//! # billdigest-mime
//!
//! MIME encodings and outbound message generation for billdigest.
//!
//! ## Features
//!
//! - **Transport encoding**: URL-safe Base64 as used by mail APIs, with a
//!   lenient decoder that also accepts the standard alphabet
//! - **Encoding**: Base64 and RFC 2047 header encoding
//! - **Content types**: MIME content type parsing and rendering
//! - **Message generation**: RFC 5322 messages with text, HTML and attachments
//!
//! ## Quick Start
//!
//! ### Building a summary message
//!
//! ```ignore
//! use billdigest_mime::{Attachment, ContentType, MessageBuilder, format_mailbox};
//!
//! let raw = MessageBuilder::new()
//!     .from(format_mailbox(Some("Bill Digest"), "bills@example.com"))
//!     .to("me@example.com")
//!     .subject("Utility bills")
//!     .text_body("Total: $42.00")
//!     .html_body("<div>Total: <b>$42.00</b></div>")
//!     .attach(Attachment::new("Electric.pdf", ContentType::application_pdf(), pdf_bytes))
//!     .build()?;
//! ```
//!
//! ### Transport Base64
//!
//! ```ignore
//! use billdigest_mime::encoding::{decode_transport, encode_transport};
//!
//! let encoded = encode_transport(b"%PDF-1.4");
//! assert_eq!(decode_transport(&encoded)?, b"%PDF-1.4");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod builder;
mod content_type;
mod error;
mod header;

pub mod encoding;

pub use builder::{Attachment, MessageBuilder, format_mailbox};
pub use content_type::ContentType;
pub use error::{Error, Result};
pub use header::Headers;
