//! MIME extraction.
//!
//! Turns fetched messages into [`MessageDetail`]s: picks the one active label
//! a message belongs to, pulls out its body text and saves its PDF
//! attachments. Results are folded into a map keyed by label id where the
//! later message for a label replaces the earlier one.

use std::collections::HashMap;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::codec::{AttachmentStore, decode_transport, decode_transport_text};
use crate::fetch::with_timeout;
use crate::labels::ActiveLabels;
use crate::mailbox::{MailApi, MimePart, RawMessage};
use crate::model::{AttachmentRef, BodyKind, MessageDetail};

/// Extraction output: at most one message per active label.
#[derive(Debug, Clone, Default)]
pub struct ExtractedMessages {
    by_label: HashMap<String, MessageDetail>,
}

impl ExtractedMessages {
    /// Inserts a detail under its label, returning the one it replaced.
    pub fn insert(&mut self, detail: MessageDetail) -> Option<MessageDetail> {
        self.by_label.insert(detail.label_id.clone(), detail)
    }

    /// The message kept for `label_id`.
    #[must_use]
    pub fn get(&self, label_id: &str) -> Option<&MessageDetail> {
        self.by_label.get(label_id)
    }

    /// Number of labels with a message.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_label.len()
    }

    /// Returns true if no message was kept.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_label.is_empty()
    }

    /// Kept messages in arbitrary order.
    pub fn values(&self) -> impl Iterator<Item = &MessageDetail> {
        self.by_label.values()
    }
}

/// Counts from an extraction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    /// Messages carrying no active label.
    pub orphans: usize,
    /// Attachments decoded and written to disk.
    pub attachments_saved: usize,
    /// Attachments that could not be fetched, decoded or written.
    pub attachments_failed: usize,
    /// Body parts that could not be decoded.
    pub bodies_failed: usize,
    /// Messages replaced by a later message for the same label.
    pub overwritten: usize,
}

impl ExtractStats {
    fn absorb(&mut self, other: Self) {
        self.orphans += other.orphans;
        self.attachments_saved += other.attachments_saved;
        self.attachments_failed += other.attachments_failed;
        self.bodies_failed += other.bodies_failed;
        self.overwritten += other.overwritten;
    }
}

/// Walks message MIME trees against the active label set.
#[derive(Debug)]
pub struct MimeExtractor<'a, A> {
    api: &'a A,
    store: &'a AttachmentStore,
    active: &'a ActiveLabels,
    call_timeout: Duration,
}

impl<'a, A: MailApi> MimeExtractor<'a, A> {
    /// Creates an extractor.
    pub const fn new(
        api: &'a A,
        store: &'a AttachmentStore,
        active: &'a ActiveLabels,
        call_timeout: Duration,
    ) -> Self {
        Self {
            api,
            store,
            active,
            call_timeout,
        }
    }

    /// Extracts one message. Returns `None` for orphans and payload-less
    /// messages.
    pub async fn extract(&self, message: &RawMessage) -> (Option<MessageDetail>, ExtractStats) {
        let mut stats = ExtractStats::default();

        let Some(payload) = message.payload.as_ref() else {
            return (None, stats);
        };
        let Some(label_id) = self.active.first_active(&message.label_ids) else {
            debug!(message = %message.id, "No active label, dropping");
            stats.orphans += 1;
            return (None, stats);
        };

        let mut detail = MessageDetail::new(&message.id, label_id, payload.clone());
        detail.internal_date = message.received_at_millis();

        for part in payload.top_level_parts() {
            if part.is("text", "html") {
                read_html(part, &mut detail, &mut stats);
            } else if part.is("multipart", "alternative") {
                read_alternative(part, &mut detail, &mut stats);
            } else if part.is("application", "pdf") {
                self.save_pdf(part, &mut detail, &mut stats).await;
            } else {
                debug!(message = %message.id, mime_type = %part.mime_type, "Ignoring part");
            }
        }

        (Some(detail), stats)
    }

    async fn save_pdf(&self, part: &MimePart, detail: &mut MessageDetail, stats: &mut ExtractStats) {
        let fetched = self.fetch_pdf(part, &detail.id).await;
        match fetched {
            Ok(attachment) => {
                stats.attachments_saved += 1;
                detail.attachments.push(attachment);
            }
            Err(e) => {
                warn!(message = %detail.id, filename = %part.filename, error = %e, "Skipping attachment");
                stats.attachments_failed += 1;
            }
        }
    }

    async fn fetch_pdf(&self, part: &MimePart, message_id: &str) -> Result<AttachmentRef, String> {
        let (id, base64_value) = match (&part.body.attachment_id, &part.body.data) {
            (None, Some(data)) => (String::new(), data.clone()),
            (Some(attachment_id), _) => {
                let data = with_timeout(
                    self.call_timeout,
                    self.api.get_attachment(message_id, attachment_id),
                )
                .await?;
                (attachment_id.clone(), data)
            }
            (None, None) => return Err("part has neither data nor attachment id".to_string()),
        };

        let bytes = decode_transport(&base64_value).map_err(|e| e.to_string())?;
        let file_name = AttachmentStore::new_file_name();
        self.store
            .persist(&bytes, &file_name)
            .await
            .map_err(|e| e.to_string())?;

        Ok(AttachmentRef {
            id,
            base64_value,
            file_name,
            directory: self.store.directory().to_path_buf(),
        })
    }

    /// Extracts every message and folds the results in input order.
    ///
    /// Extraction runs up to `concurrency` messages at a time; the fold is
    /// sequential, so for two messages sharing a label the later one in
    /// `messages` is kept.
    pub async fn extract_all(
        &self,
        messages: &[RawMessage],
        concurrency: usize,
    ) -> (ExtractedMessages, ExtractStats) {
        let results: Vec<_> = stream::iter(messages)
            .map(|message| self.extract(message))
            .buffered(concurrency.max(1))
            .collect()
            .await;

        let mut extracted = ExtractedMessages::default();
        let mut stats = ExtractStats::default();

        for (detail, message_stats) in results {
            stats.absorb(message_stats);
            let Some(detail) = detail else { continue };

            let (label_id, id) = (detail.label_id.clone(), detail.id.clone());
            if let Some(replaced) = extracted.insert(detail) {
                warn!(
                    label = %label_id,
                    kept = %id,
                    dropped = %replaced.id,
                    "Several messages for one label, keeping the latest"
                );
                stats.overwritten += 1;
            }
        }

        info!(
            kept = extracted.len(),
            orphans = stats.orphans,
            attachments = stats.attachments_saved,
            attachment_failures = stats.attachments_failed,
            "Extracted messages"
        );
        (extracted, stats)
    }
}

fn read_html(part: &MimePart, detail: &mut MessageDetail, stats: &mut ExtractStats) {
    let data = part.body.data.as_deref().unwrap_or_default();
    match decode_transport_text(data) {
        Ok(html) => detail.set_body(html, BodyKind::Html),
        Err(e) => {
            warn!(message = %detail.id, error = %e, "Undecodable HTML body");
            stats.bodies_failed += 1;
        }
    }
}

fn read_alternative(part: &MimePart, detail: &mut MessageDetail, stats: &mut ExtractStats) {
    let Some(plain) = part.parts.iter().find(|child| child.is("text", "plain")) else {
        debug!(message = %detail.id, "Alternative part has no text/plain child");
        return;
    };

    let data = plain.body.data.as_deref().unwrap_or_default();
    match decode_transport_text(data) {
        Ok(text) => detail.set_body(text, BodyKind::Plain),
        Err(e) => {
            warn!(message = %detail.id, error = %e, "Undecodable text body");
            stats.bodies_failed += 1;
        }
    }
}

/// Stable sort by receive time, oldest first. Messages without a time keep
/// their relative position ahead of timed ones.
pub fn sort_by_received(messages: &mut [RawMessage]) {
    messages.sort_by_key(RawMessage::received_at_millis);
}
