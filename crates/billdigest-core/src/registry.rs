//! Parser registry and dispatch.
//!
//! Parsers are registered explicitly at start-up. The label resolver fills in
//! each descriptor's `label_id`; dispatch then pairs every resolved descriptor
//! with the message extracted for its label.

use std::fmt;

use tracing::{debug, warn};

use crate::error::ParseError;
use crate::extract::ExtractedMessages;
use crate::model::{BillRecord, MessageDetail};

/// Turns one extracted message into a bill record.
pub trait BillParser: Send + Sync {
    /// Parses the message.
    ///
    /// # Errors
    ///
    /// Returns a [`ParseError`] if the message does not look like a bill
    /// from this source.
    fn parse_email(&self, detail: &MessageDetail) -> Result<BillRecord, ParseError>;
}

impl<F> BillParser for F
where
    F: Fn(&MessageDetail) -> Result<BillRecord, ParseError> + Send + Sync,
{
    fn parse_email(&self, detail: &MessageDetail) -> Result<BillRecord, ParseError> {
        self(detail)
    }
}

/// A registered parser and the label it handles.
pub struct ParserDescriptor {
    /// Mailbox label name this parser handles.
    pub label_name: String,
    /// Name used in logs and descriptions.
    pub display_name: String,
    /// Mailbox label id, set by the label resolver. `None` means inert.
    pub label_id: Option<String>,
    parser: Box<dyn BillParser>,
}

impl ParserDescriptor {
    /// Creates an unresolved descriptor.
    pub fn new(
        label_name: impl Into<String>,
        display_name: impl Into<String>,
        parser: impl BillParser + 'static,
    ) -> Self {
        Self {
            label_name: label_name.into(),
            display_name: display_name.into(),
            label_id: None,
            parser: Box::new(parser),
        }
    }

    /// Runs the parser and checks that the amount is a decimal.
    ///
    /// # Errors
    ///
    /// Returns the parser's error, or [`ParseError::InvalidAmount`] if the
    /// record's amount is not numeric.
    pub fn parse(&self, detail: &MessageDetail) -> Result<BillRecord, ParseError> {
        let record = self.parser.parse_email(detail)?;
        record.amount()?;
        Ok(record)
    }
}

impl fmt::Debug for ParserDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserDescriptor")
            .field("label_name", &self.label_name)
            .field("display_name", &self.display_name)
            .field("label_id", &self.label_id)
            .finish_non_exhaustive()
    }
}

/// Ordered set of parser descriptors. Registration order is dispatch order.
#[derive(Debug, Default)]
pub struct ParserRegistry {
    descriptors: Vec<ParserDescriptor>,
}

impl ParserRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a descriptor.
    pub fn register(&mut self, descriptor: ParserDescriptor) {
        self.descriptors.push(descriptor);
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, descriptor: ParserDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    /// Descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ParserDescriptor> {
        self.descriptors.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut ParserDescriptor> {
        self.descriptors.iter_mut()
    }

    /// Number of registered descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Lazily dispatches every resolved descriptor to its message.
    ///
    /// Descriptors without a label id, or whose label received no message
    /// this run, are skipped silently.
    #[must_use]
    pub fn dispatch<'a>(&'a self, messages: &'a ExtractedMessages) -> Dispatch<'a> {
        Dispatch {
            descriptors: self.descriptors.iter(),
            messages,
        }
    }
}

/// Result of running one descriptor.
#[derive(Debug)]
pub struct DispatchOutcome<'a> {
    /// The descriptor that ran.
    pub descriptor: &'a ParserDescriptor,
    /// The message it was given.
    pub detail: &'a MessageDetail,
    /// What the parser produced.
    pub result: Result<BillRecord, ParseError>,
}

/// Single-pass iterator over dispatch outcomes, in registry order.
#[derive(Debug)]
pub struct Dispatch<'a> {
    descriptors: std::slice::Iter<'a, ParserDescriptor>,
    messages: &'a ExtractedMessages,
}

impl<'a> Iterator for Dispatch<'a> {
    type Item = DispatchOutcome<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        for descriptor in self.descriptors.by_ref() {
            let Some(label_id) = descriptor.label_id.as_deref() else {
                continue;
            };
            let Some(detail) = self.messages.get(label_id) else {
                debug!(parser = %descriptor.display_name, "No message for label this run");
                continue;
            };

            return Some(DispatchOutcome {
                descriptor,
                detail,
                result: descriptor.parse(detail),
            });
        }
        None
    }
}

/// Counts from [`collect_records`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Parsers that produced a record.
    pub succeeded: usize,
    /// Parsers that failed and were skipped.
    pub failed: usize,
}

/// Runs dispatch to completion, keeping successful records in registry order.
///
/// Parser failures are logged and skipped.
#[must_use]
pub fn collect_records(
    registry: &ParserRegistry,
    messages: &ExtractedMessages,
) -> (Vec<BillRecord>, DispatchStats) {
    let mut records = Vec::new();
    let mut stats = DispatchStats::default();

    for outcome in registry.dispatch(messages) {
        match outcome.result {
            Ok(record) => {
                debug!(
                    parser = %outcome.descriptor.display_name,
                    message = %outcome.detail.id,
                    amount = %record.bill_amount,
                    "Parsed bill"
                );
                stats.succeeded += 1;
                records.push(record);
            }
            Err(e) => {
                warn!(
                    parser = %outcome.descriptor.display_name,
                    message = %outcome.detail.id,
                    error = %e,
                    "Parser failed, skipping bill"
                );
                stats.failed += 1;
            }
        }
    }

    (records, stats)
}
