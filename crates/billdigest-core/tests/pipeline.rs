//! Integration tests for the bill pipeline.
//!
//! These tests drive the full run against an in-memory mailbox and a
//! recording sender, without any network access.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone};
use rust_decimal::Decimal;

use billdigest_core::codec::encode_transport;
use billdigest_core::{
    BillRecord, Envelope, Error, Label, MailApi, MailSender, MessageDetail, MimePart,
    OutgoingMail, ParseError, ParserDescriptor, ParserRegistry, PatternParser, PipelineOptions,
    RawMessage,
};

/// Mailbox served from memory.
#[derive(Default)]
struct MockMailbox {
    labels: Option<Vec<Label>>,
    /// Message ids per label id; a missing entry makes the listing fail.
    listings: HashMap<String, Vec<String>>,
    messages: HashMap<String, RawMessage>,
    attachments: HashMap<String, String>,
    /// Recorded `since` dates passed to listing.
    queried_since: Mutex<Vec<NaiveDate>>,
}

impl MockMailbox {
    fn with_labels(labels: &[(&str, &str)]) -> Self {
        Self {
            labels: Some(labels.iter().map(|(name, id)| Label::new(*name, *id)).collect()),
            ..Self::default()
        }
    }

    fn list(mut self, label_id: &str, ids: &[&str]) -> Self {
        self.listings
            .insert(label_id.to_string(), ids.iter().map(ToString::to_string).collect());
        self
    }

    fn message(mut self, message: RawMessage) -> Self {
        self.messages.insert(message.id.clone(), message);
        self
    }

    fn attachment(mut self, id: &str, bytes: &[u8]) -> Self {
        self.attachments.insert(id.to_string(), encode_transport(bytes));
        self
    }
}

impl MailApi for MockMailbox {
    type Error = String;

    async fn list_labels(&self) -> Result<Vec<Label>, String> {
        self.labels.clone().ok_or_else(|| "403 Forbidden".to_string())
    }

    async fn list_message_ids(&self, label_id: &str, since: NaiveDate) -> Result<Vec<String>, String> {
        self.queried_since.lock().unwrap().push(since);
        self.listings
            .get(label_id)
            .cloned()
            .ok_or_else(|| format!("listing {label_id} failed"))
    }

    async fn get_message(&self, message_id: &str) -> Result<RawMessage, String> {
        self.messages
            .get(message_id)
            .cloned()
            .ok_or_else(|| format!("404 {message_id}"))
    }

    async fn get_attachment(&self, _message_id: &str, attachment_id: &str) -> Result<String, String> {
        self.attachments
            .get(attachment_id)
            .cloned()
            .ok_or_else(|| format!("404 attachment {attachment_id}"))
    }
}

/// Sender that records what it was given.
#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<OutgoingMail>>,
    fail: bool,
}

impl MailSender for RecordingSender {
    type Error = String;

    async fn send_mail(&self, mail: &OutgoingMail) -> Result<String, String> {
        if self.fail {
            return Err("503 Service Unavailable".to_string());
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(mail.clone());
        Ok(format!("sent-{}", sent.len()))
    }
}

fn now() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(2024, 6, 15, 8, 0, 0)
        .unwrap()
}

fn envelope() -> Envelope {
    Envelope {
        sender_name: "Bill Digest".to_string(),
        sender_address: "bills@example.com".to_string(),
        to: vec!["household@example.com".to_string()],
        subject: "Monthly bills".to_string(),
    }
}

fn options(dir: &std::path::Path) -> PipelineOptions {
    PipelineOptions {
        attachment_dir: dir.join("attachments"),
        ..PipelineOptions::default()
    }
}

fn text_message(id: &str, labels: &[&str], received: i64, body: &str, extra: Vec<MimePart>) -> RawMessage {
    let mut parts = vec![MimePart::multipart(
        "multipart/alternative",
        vec![MimePart::inline("text/plain", encode_transport(body.as_bytes()))],
    )];
    parts.extend(extra);

    RawMessage {
        id: id.to_string(),
        label_ids: labels.iter().map(ToString::to_string).collect(),
        internal_date: Some(received.to_string()),
        payload: Some(MimePart::multipart("multipart/mixed", parts)),
        ..RawMessage::default()
    }
}

fn amount_parser(display_name: &str) -> PatternParser {
    PatternParser::new(display_name, r"Amount due: \$([\d,.]+)").unwrap()
}

fn utility_registry() -> ParserRegistry {
    ParserRegistry::new()
        .with(ParserDescriptor::new("Electric", "Electric", amount_parser("Electric")))
        .with(ParserDescriptor::new("Water", "Water", amount_parser("Water")))
}

#[tokio::test]
async fn test_end_to_end_two_bills() {
    let temp = tempfile::tempdir().unwrap();
    let mailbox = MockMailbox::with_labels(&[("Electric", "L1"), ("Water", "L2"), ("INBOX", "INBOX")])
        .list("L1", &["m1"])
        .list("L2", &["m2"])
        .message(text_message(
            "m1",
            &["INBOX", "L1"],
            1,
            "Amount due: $12.5",
            vec![MimePart::attachment("application/pdf", "statement.pdf", "A1")],
        ))
        .message(text_message("m2", &["L2"], 2, "Amount due: $7.25", Vec::new()))
        .attachment("A1", b"%PDF-1.7 electric");
    let sender = RecordingSender::default();
    let mut registry = utility_registry();

    let outcome = billdigest_core::run(
        &mailbox,
        &sender,
        &envelope(),
        &mut registry,
        &options(temp.path()),
        now(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.report.total, Decimal::new(1975, 2));
    assert!(outcome.report.text.contains("* Electric: $12.50\n* Water: $7.25"));
    assert!(outcome.report.text.contains("Total: $19.75"));
    assert!(outcome.report.html.contains("<li>Water: $7.25</li>"));
    assert_eq!(outcome.since, NaiveDate::from_ymd_opt(2024, 5, 14).unwrap());
    assert_eq!(
        *mailbox.queried_since.lock().unwrap(),
        vec![outcome.since, outcome.since]
    );

    assert_eq!(outcome.report.attachments.len(), 1);
    assert_eq!(outcome.report.attachments[0].filename, "Electric.pdf");
    assert_eq!(
        billdigest_mime::encoding::decode_base64(&outcome.report.attachments[0].content).unwrap(),
        b"%PDF-1.7 electric"
    );

    let sent = sender.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].from, "Bill Digest <bills@example.com>");
    assert_eq!(sent[0].subject, "Monthly bills");
    assert_eq!(sent[0].text, outcome.report.text);
    assert_eq!(outcome.sent_id.as_deref(), Some("sent-1"));

    assert_eq!(outcome.stats.labels_active, 2);
    assert_eq!(outcome.stats.extract.attachments_saved, 1);
    assert_eq!(outcome.stats.attachments_cleaned, 1);
    let leftover = std::fs::read_dir(temp.path().join("attachments")).unwrap().count();
    assert_eq!(leftover, 0);
}

#[tokio::test]
async fn test_orphan_and_unmatched_parser() {
    let temp = tempfile::tempdir().unwrap();
    let mailbox = MockMailbox::with_labels(&[("Electric", "L1")])
        .list("L1", &["m1", "m2"])
        .message(text_message("m1", &["L1"], 1, "Amount due: $40.00", Vec::new()))
        .message(text_message("m2", &["CATEGORY_UPDATES"], 2, "Amount due: $99.00", Vec::new()));
    let mut registry = utility_registry();

    let outcome = billdigest_core::preview(&mailbox, &mut registry, &options(temp.path()), now())
        .await
        .unwrap();

    assert_eq!(outcome.records, vec![BillRecord::new("40.00", "Electric: $40.00")]);
    assert_eq!(outcome.stats.extract.orphans, 1);
    assert_eq!(outcome.stats.labels_active, 1);
    assert!(registry.iter().any(|d| d.label_name == "Water" && d.label_id.is_none()));
    assert!(!outcome.sent());
}

#[tokio::test]
async fn test_attachment_failure_keeps_message() {
    let temp = tempfile::tempdir().unwrap();
    let mailbox = MockMailbox::with_labels(&[("Electric", "L1")])
        .list("L1", &["m1"])
        .message(text_message(
            "m1",
            &["L1"],
            1,
            "Amount due: $10.00",
            vec![
                MimePart::attachment("application/pdf", "missing.pdf", "gone"),
                MimePart::attachment("application/pdf", "present.pdf", "A2"),
            ],
        ))
        .attachment("A2", b"%PDF-second");
    let mut registry = utility_registry();

    let outcome = billdigest_core::preview(&mailbox, &mut registry, &options(temp.path()), now())
        .await
        .unwrap();

    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].bill_amount, "10.00");
    assert_eq!(outcome.stats.extract.attachments_failed, 1);
    assert_eq!(outcome.stats.extract.attachments_saved, 1);
    assert_eq!(
        billdigest_mime::encoding::decode_base64(outcome.records[0].file_data.as_deref().unwrap())
            .unwrap(),
        b"%PDF-second"
    );
}

#[tokio::test]
async fn test_latest_message_per_label_wins() {
    let temp = tempfile::tempdir().unwrap();
    // Listed newest first, as the mailbox does; the fold still keeps the newest.
    let mailbox = MockMailbox::with_labels(&[("Electric", "L1")])
        .list("L1", &["new", "old"])
        .message(text_message("new", &["L1"], 2_000, "Amount due: $20.00", Vec::new()))
        .message(text_message("old", &["L1"], 1_000, "Amount due: $10.00", Vec::new()));
    let mut registry = utility_registry();

    let outcome = billdigest_core::preview(&mailbox, &mut registry, &options(temp.path()), now())
        .await
        .unwrap();

    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].bill_amount, "20.00");
    assert_eq!(outcome.stats.extract.overwritten, 1);
}

#[tokio::test]
async fn test_skips_failed_fetch_and_failed_parser() {
    let temp = tempfile::tempdir().unwrap();
    let mailbox = MockMailbox::with_labels(&[("Electric", "L1"), ("Water", "L2"), ("Gas", "L3")])
        .list("L1", &["m1", "vanished"])
        .list("L2", &["m2"])
        .message(text_message("m1", &["L1"], 1, "Amount due: $5.00", Vec::new()))
        .message(text_message("m2", &["L2"], 2, "We changed our layout", Vec::new()));
    let broken = |_: &MessageDetail| -> Result<BillRecord, ParseError> {
        Err(ParseError::Other("never called".to_string()))
    };
    let mut registry = utility_registry().with(ParserDescriptor::new("Gas", "Gas", broken));

    let outcome = billdigest_core::preview(&mailbox, &mut registry, &options(temp.path()), now())
        .await
        .unwrap();

    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.stats.fetch.skipped, 1);
    assert_eq!(outcome.stats.fetch.lists_failed, 1);
    assert_eq!(outcome.stats.dispatch.succeeded, 1);
    assert_eq!(outcome.stats.dispatch.failed, 1);
    assert!(outcome.report.text.contains("Total: $5.00"));
}

#[tokio::test]
async fn test_label_listing_failure_is_fatal() {
    let temp = tempfile::tempdir().unwrap();
    let mailbox = MockMailbox::default();
    let mut registry = utility_registry();

    let result = billdigest_core::preview(&mailbox, &mut registry, &options(temp.path()), now()).await;
    assert!(matches!(result, Err(Error::LabelList(_))));
}

#[tokio::test]
async fn test_unused_attachment_dir_is_left_alone() {
    let temp = tempfile::tempdir().unwrap();
    let options = options(temp.path());
    std::fs::create_dir_all(&options.attachment_dir).unwrap();
    let keep = options.attachment_dir.join("notes.txt");
    std::fs::write(&keep, "keep me").unwrap();
    let mut registry = utility_registry();

    let result = billdigest_core::preview(&MockMailbox::default(), &mut registry, &options, now()).await;
    assert!(matches!(result, Err(Error::LabelList(_))));
    assert!(keep.exists());

    let mailbox = MockMailbox::with_labels(&[("Electric", "L1")])
        .list("L1", &["m1"])
        .message(text_message("m1", &["L1"], 1, "Amount due: $2.00", Vec::new()));
    let outcome = billdigest_core::preview(&mailbox, &mut registry, &options, now())
        .await
        .unwrap();
    assert_eq!(outcome.stats.attachments_cleaned, 0);
    assert!(keep.exists());
}

#[tokio::test]
async fn test_message_listing_failure_is_fatal() {
    let temp = tempfile::tempdir().unwrap();
    let mailbox = MockMailbox::with_labels(&[("Electric", "L1"), ("Water", "L2")]);
    let mut registry = utility_registry();

    let result = billdigest_core::preview(&mailbox, &mut registry, &options(temp.path()), now()).await;
    assert!(matches!(result, Err(Error::MessageList(_))));
}

#[tokio::test]
async fn test_send_failure_still_cleans_attachments() {
    let temp = tempfile::tempdir().unwrap();
    let mailbox = MockMailbox::with_labels(&[("Electric", "L1")])
        .list("L1", &["m1"])
        .message(text_message(
            "m1",
            &["L1"],
            1,
            "Amount due: $1.00",
            vec![MimePart::attachment("application/pdf", "bill.pdf", "A1")],
        ))
        .attachment("A1", b"%PDF");
    let sender = RecordingSender {
        fail: true,
        ..RecordingSender::default()
    };
    let mut registry = utility_registry();

    let result = billdigest_core::run(
        &mailbox,
        &sender,
        &envelope(),
        &mut registry,
        &options(temp.path()),
        now(),
    )
    .await;

    assert!(matches!(result, Err(Error::Send(_))));
    let leftover = std::fs::read_dir(temp.path().join("attachments")).unwrap().count();
    assert_eq!(leftover, 0);
}

#[tokio::test]
async fn test_no_matching_labels_yields_empty_report() {
    let temp = tempfile::tempdir().unwrap();
    let mailbox = MockMailbox::with_labels(&[("Receipts", "L9")]);
    let mut registry = utility_registry();

    let outcome = billdigest_core::preview(&mailbox, &mut registry, &options(temp.path()), now())
        .await
        .unwrap();

    assert!(outcome.records.is_empty());
    assert_eq!(outcome.report.total, Decimal::ZERO);
    assert!(outcome.report.text.contains("Total: $0.00"));
    assert!(outcome.report.attachments.is_empty());
}

#[tokio::test]
async fn test_empty_label_list_yields_empty_report() {
    let temp = tempfile::tempdir().unwrap();
    let mailbox = MockMailbox::with_labels(&[]);
    let mut registry = utility_registry();

    let outcome = billdigest_core::preview(&mailbox, &mut registry, &options(temp.path()), now())
        .await
        .unwrap();

    assert_eq!(outcome.stats.labels_active, 0);
    assert!(outcome.records.is_empty());
    assert!(outcome.report.text.contains("Total: $0.00"));
}
