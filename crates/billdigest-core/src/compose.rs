//! Summary composition.
//!
//! Folds bill records into the plain text and HTML summary. Composition is a
//! pure function of the records, the run time and the search date.

use chrono::{DateTime, FixedOffset, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::warn;

use crate::model::{AggregateReport, BillRecord, ReportAttachment};

const RULE: &str = "--------------------------------------------------------";

/// Presentation settings for the summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSettings {
    /// Title prefix; the month and year are appended.
    pub title: String,
    /// Symbol printed before the total.
    pub currency_symbol: String,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            title: "Utility Bill".to_string(),
            currency_symbol: "$".to_string(),
        }
    }
}

/// Formats a money amount with exactly two decimals.
#[must_use]
pub fn format_money(amount: Decimal) -> String {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded.to_string()
}

/// Sums record amounts.
///
/// Non-numeric amounts count as zero, as does an amount that would push the
/// total past the decimal range.
#[must_use]
pub fn total_amount(records: &[BillRecord]) -> Decimal {
    records.iter().fold(Decimal::ZERO, |total, record| {
        let amount = match record.amount() {
            Ok(amount) => amount,
            Err(e) => {
                warn!(description = %record.bill_description, error = %e, "Amount excluded from total");
                return total;
            }
        };
        total.checked_add(amount).unwrap_or_else(|| {
            warn!(description = %record.bill_description, amount = %amount, "Amount overflows total, excluded");
            total
        })
    })
}

/// Builds the summary for `records`, in their order.
///
/// `now` is the run time shown in the title and footer; `since` is the
/// lower-bound date the mailbox was searched from.
#[must_use]
pub fn compose_report(
    records: &[BillRecord],
    now: DateTime<FixedOffset>,
    since: NaiveDate,
    settings: &ReportSettings,
) -> AggregateReport {
    let title = format!("{} for {}", settings.title, now.format("%B %Y"));
    let total = total_amount(records);
    let total_text = format!("{}{}", settings.currency_symbol, format_money(total));
    let footer = format!(
        "This bill was auto-generated and ran on {}. It looked for any new bills that came in a month ago after {}",
        now.format("%m/%d/%Y"),
        since.format("%m/%d/%Y"),
    );

    let mut text = title.clone();
    let mut html = format!("<h2>{}</h2>\n<ul>", html_escape::encode_text(&title));
    let mut attachments = Vec::new();

    for record in records {
        text.push_str("\n* ");
        text.push_str(&record.bill_description);

        html.push_str("\n<li>");
        html.push_str(&html_escape::encode_text(&record.bill_description));
        html.push_str("</li>");

        if let (Some(filename), Some(content)) = (&record.file_name, &record.file_data) {
            attachments.push(ReportAttachment {
                filename: filename.clone(),
                content: content.clone(),
                encoding: "base64".to_string(),
            });
        }
    }

    text.push_str(&format!("\n\nTotal: {total_text}\n{RULE}\n{footer}"));
    html.push_str(&format!(
        "\n</ul><br/><div>Total: <b>{}</b></div><div>{RULE}</div><div>{}</div>",
        html_escape::encode_text(&total_text),
        html_escape::encode_text(&footer),
    ));

    AggregateReport {
        text,
        html,
        total,
        attachments,
    }
}
