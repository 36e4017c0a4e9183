//! # billdigest-core
//!
//! Bill extraction and aggregation pipeline for billdigest.
//!
//! This crate provides:
//! - **Label resolution**: joins registered parsers to mailbox labels
//! - **Message fetching**: bounded-concurrency retrieval with per-call deadlines
//! - **MIME extraction**: body text and PDF attachments per message, one
//!   message per label
//! - **Parser dispatch**: an explicit registry of [`BillParser`]s, including
//!   the regex-driven [`PatternParser`]
//! - **Composition**: the plain text and HTML summary with an exact decimal total
//!
//! The mailbox and the delivery service are reached through the [`MailApi`]
//! and [`MailSender`] traits.
//!
//! ## Pipeline
//!
//! ```text
//! labels ─→ resolve ─→ list ids ─→ fetch ─→ extract ─→ dispatch ─→ compose ─→ send
//!                                              │
//!                                              └─→ attachment directory (cleaned at end)
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use billdigest_core::{Envelope, ParserDescriptor, ParserRegistry, PatternParser, PipelineOptions};
//!
//! let mut registry = ParserRegistry::new();
//! registry.register(ParserDescriptor::new(
//!     "Bills/Electric",
//!     "Electric",
//!     PatternParser::new("Electric", r"Amount due:\s*\$([\d,.]+)")?,
//! ));
//!
//! let outcome = billdigest_core::run(
//!     &gmail,
//!     &gmail,
//!     &envelope,
//!     &mut registry,
//!     &PipelineOptions::default(),
//!     chrono::Local::now().fixed_offset(),
//! )
//! .await?;
//! println!("{}", outcome.report.text);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod codec;
pub mod compose;
mod error;
pub mod extract;
pub mod fetch;
pub mod labels;
pub mod mailbox;
pub mod model;
pub mod parsers;
pub mod pipeline;
pub mod registry;

pub use codec::AttachmentStore;
pub use compose::{ReportSettings, compose_report};
pub use error::{Error, ParseError, Result};
pub use extract::{ExtractedMessages, MimeExtractor};
pub use fetch::{FetchOptions, MessageFetcher};
pub use labels::{ActiveLabels, resolve_labels};
pub use mailbox::{Envelope, MailApi, MailSender, MimePart, OutgoingMail, RawMessage};
pub use model::{AggregateReport, AttachmentRef, BillRecord, BodyKind, Label, MessageDetail};
pub use parsers::PatternParser;
pub use pipeline::{PipelineOptions, RunOutcome, RunStats, preview, run};
pub use registry::{BillParser, ParserDescriptor, ParserRegistry};
