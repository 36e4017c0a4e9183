//! Run orchestration.
//!
//! Label resolution, fetching, extraction, dispatch and composition in
//! sequence, followed by delivery. The attachment directory is cleaned at
//! the end of every run, successful or not.

use std::path::PathBuf;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use tracing::{info, warn};

use crate::codec::AttachmentStore;
use crate::compose::{ReportSettings, compose_report, format_money};
use crate::error::{Error, Result};
use crate::extract::{ExtractStats, MimeExtractor, sort_by_received};
use crate::fetch::{FetchOptions, FetchStats, MessageFetcher, with_timeout};
use crate::labels::load_active_labels;
use crate::mailbox::{Envelope, MailApi, MailSender};
use crate::model::{AggregateReport, BillRecord};
use crate::registry::{DispatchStats, ParserRegistry, collect_records};

/// Settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Mail API call tuning and search window.
    pub fetch: FetchOptions,
    /// Where decoded attachments are written during the run.
    pub attachment_dir: PathBuf,
    /// Summary presentation.
    pub report: ReportSettings,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            fetch: FetchOptions::default(),
            attachment_dir: PathBuf::from("attachments"),
            report: ReportSettings::default(),
        }
    }
}

impl PipelineOptions {
    /// Checks the options before any call is made.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.fetch.concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".to_string()));
        }
        if self.fetch.call_timeout.is_zero() {
            return Err(Error::Config("call timeout must be positive".to_string()));
        }
        if self.attachment_dir.as_os_str().is_empty() {
            return Err(Error::Config("attachment directory is empty".to_string()));
        }
        Ok(())
    }
}

/// Counters collected across a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Labels with a registered parser.
    pub labels_active: usize,
    /// Listing and retrieval.
    pub fetch: FetchStats,
    /// MIME extraction.
    pub extract: ExtractStats,
    /// Parser dispatch.
    pub dispatch: DispatchStats,
    /// Files removed from the attachment directory.
    pub attachments_cleaned: usize,
}

/// What a run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The composed summary.
    pub report: AggregateReport,
    /// Records that went into it, in registry order.
    pub records: Vec<BillRecord>,
    /// Lower-bound search date.
    pub since: NaiveDate,
    /// Counters.
    pub stats: RunStats,
    /// Id of the delivered message, if it was sent.
    pub sent_id: Option<String>,
}

impl RunOutcome {
    /// Returns true if the summary was delivered.
    #[must_use]
    pub const fn sent(&self) -> bool {
        self.sent_id.is_some()
    }
}

/// Runs the pipeline up to composition without sending.
///
/// # Errors
///
/// Returns [`Error::LabelList`] or [`Error::MessageList`] when listing fails
/// outright, or [`Error::Config`] for invalid options.
pub async fn preview<A: MailApi>(
    api: &A,
    registry: &mut ParserRegistry,
    options: &PipelineOptions,
    now: DateTime<FixedOffset>,
) -> Result<RunOutcome> {
    let store = AttachmentStore::new(&options.attachment_dir);
    let result = gather(api, registry, options, &store, now).await;
    finish(&store, result).await
}

/// Runs the pipeline and delivers the summary through `sender`.
///
/// # Errors
///
/// Everything [`preview`] returns, plus [`Error::Send`] if delivery fails.
pub async fn run<A: MailApi, S: MailSender>(
    api: &A,
    sender: &S,
    envelope: &Envelope,
    registry: &mut ParserRegistry,
    options: &PipelineOptions,
    now: DateTime<FixedOffset>,
) -> Result<RunOutcome> {
    let store = AttachmentStore::new(&options.attachment_dir);

    let result = async {
        let mut outcome = gather(api, registry, options, &store, now).await?;

        let mail = envelope.address(&outcome.report);
        let id = with_timeout(options.fetch.call_timeout, sender.send_mail(&mail))
            .await
            .map_err(Error::Send)?;

        info!(id = %id, to = ?envelope.to, "Sent summary");
        outcome.sent_id = Some(id);
        Ok::<_, Error>(outcome)
    }
    .await;

    finish(&store, result).await
}

async fn gather<A: MailApi>(
    api: &A,
    registry: &mut ParserRegistry,
    options: &PipelineOptions,
    store: &AttachmentStore,
    now: DateTime<FixedOffset>,
) -> Result<RunOutcome> {
    options.validate()?;
    let fetch = options.fetch;

    let active = load_active_labels(api, registry, fetch.call_timeout).await?;
    if active.is_empty() {
        warn!("No registered parser matches a mailbox label");
    }

    let since = fetch.since(now.with_timezone(&Utc));
    let fetcher = MessageFetcher::new(api, fetch);
    let mut fetch_stats = FetchStats::default();
    let ids = fetcher.list_ids(&active, since, &mut fetch_stats).await?;
    let mut messages = fetcher.fetch_all(&ids, &mut fetch_stats).await;
    sort_by_received(&mut messages);

    let extractor = MimeExtractor::new(api, store, &active, fetch.call_timeout);
    let (extracted, extract_stats) = extractor.extract_all(&messages, fetch.concurrency).await;

    let (records, dispatch_stats) = collect_records(registry, &extracted);
    let report = compose_report(&records, now, since, &options.report);
    info!(
        bills = records.len(),
        total = %format_money(report.total),
        attachments = report.attachments.len(),
        "Composed summary"
    );

    Ok(RunOutcome {
        report,
        records,
        since,
        stats: RunStats {
            labels_active: active.len(),
            fetch: fetch_stats,
            extract: extract_stats,
            dispatch: dispatch_stats,
            attachments_cleaned: 0,
        },
        sent_id: None,
    })
}

async fn finish(store: &AttachmentStore, result: Result<RunOutcome>) -> Result<RunOutcome> {
    let cleaned = if store.is_used() {
        store.cleanup().await
    } else {
        0
    };
    result.map(|mut outcome| {
        outcome.stats.attachments_cleaned = cleaned;
        outcome
    })
}
