//! Message listing and retrieval.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Days, Months, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::labels::ActiveLabels;
use crate::mailbox::{MailApi, RawMessage};

/// Tuning for calls against the mail API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Maximum in-flight message or attachment fetches.
    pub concurrency: usize,
    /// Deadline for each individual call.
    pub call_timeout: Duration,
    /// Whole months to look back from now.
    pub lookback_months: u32,
    /// Extra days subtracted on top of the months.
    pub slack_days: u64,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            call_timeout: Duration::from_secs(30),
            lookback_months: 1,
            slack_days: 1,
        }
    }
}

impl FetchOptions {
    /// Lower-bound search date relative to `now`.
    #[must_use]
    pub fn since(&self, now: DateTime<Utc>) -> NaiveDate {
        lookback_date(now, self.lookback_months, self.slack_days)
    }
}

/// `months` months and `days` days before `now`, as a UTC date.
///
/// Month arithmetic clamps to the end of shorter months (March 31st minus
/// one month is February 28th or 29th).
#[must_use]
pub fn lookback_date(now: DateTime<Utc>, months: u32, days: u64) -> NaiveDate {
    let today = now.date_naive();
    today
        .checked_sub_months(Months::new(months))
        .and_then(|d| d.checked_sub_days(Days::new(days)))
        .unwrap_or(NaiveDate::MIN)
}

/// Awaits `future` under a deadline, flattening timeout and call errors into
/// a message.
pub(crate) async fn with_timeout<T, E, F>(deadline: Duration, future: F) -> std::result::Result<T, String>
where
    E: Display,
    F: Future<Output = std::result::Result<T, E>>,
{
    match tokio::time::timeout(deadline, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("timed out after {}s", deadline.as_secs_f32())),
    }
}

/// Counts from a fetch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    /// Ids returned across all label queries, duplicates included.
    pub ids_listed: usize,
    /// Labels whose listing failed.
    pub lists_failed: usize,
    /// Messages retrieved with a payload.
    pub fetched: usize,
    /// Messages skipped on failure, timeout or missing payload.
    pub skipped: usize,
}

/// Lists and retrieves messages for the active labels.
#[derive(Debug)]
pub struct MessageFetcher<'a, A> {
    api: &'a A,
    options: FetchOptions,
}

impl<'a, A: MailApi> MessageFetcher<'a, A> {
    /// Creates a fetcher over `api`.
    pub const fn new(api: &'a A, options: FetchOptions) -> Self {
        Self { api, options }
    }

    /// Lists message ids for every active label received on or after `since`.
    ///
    /// Ids are concatenated in label order; duplicates are kept. A label
    /// whose listing fails is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageList`] if every label listing failed.
    pub async fn list_ids(
        &self,
        active: &ActiveLabels,
        since: NaiveDate,
        stats: &mut FetchStats,
    ) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut last_error = None;
        let mut succeeded = 0usize;

        for label_id in active.iter() {
            let listed = with_timeout(
                self.options.call_timeout,
                self.api.list_message_ids(label_id, since),
            )
            .await;

            match listed {
                Ok(found) => {
                    debug!(label = %label_id, count = found.len(), "Listed messages");
                    succeeded += 1;
                    ids.extend(found);
                }
                Err(e) => {
                    warn!(label = %label_id, error = %e, "Failed to list messages for label");
                    stats.lists_failed += 1;
                    last_error = Some(e);
                }
            }
        }

        if succeeded == 0 {
            if let Some(e) = last_error {
                return Err(Error::MessageList(e));
            }
        }

        stats.ids_listed = ids.len();
        info!(labels = active.len(), ids = ids.len(), since = %since, "Listed message ids");
        Ok(ids)
    }

    /// Retrieves every message, keeping input order.
    ///
    /// Failed, timed-out and payload-less messages are skipped.
    pub async fn fetch_all(&self, ids: &[String], stats: &mut FetchStats) -> Vec<RawMessage> {
        let results: Vec<_> = stream::iter(ids)
            .map(|id| async move {
                let fetched = with_timeout(self.options.call_timeout, self.api.get_message(id)).await;
                (id, fetched)
            })
            .buffered(self.options.concurrency.max(1))
            .collect()
            .await;

        let mut messages = Vec::with_capacity(results.len());
        for (id, fetched) in results {
            match fetched {
                Ok(message) if message.payload.is_some() => {
                    stats.fetched += 1;
                    messages.push(message);
                }
                Ok(_) => {
                    warn!(message = %id, "Message has no payload, skipping");
                    stats.skipped += 1;
                }
                Err(e) => {
                    warn!(message = %id, error = %e, "Failed to fetch message, skipping");
                    stats.skipped += 1;
                }
            }
        }

        info!(fetched = stats.fetched, skipped = stats.skipped, "Fetched messages");
        messages
    }
}
