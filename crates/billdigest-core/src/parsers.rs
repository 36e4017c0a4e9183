//! Built-in bill parsers.

use billdigest_mime::encoding::encode_base64;
use htmd::HtmlToMarkdown;
use regex::Regex;

use crate::codec::decode_transport;
use crate::compose::format_money;
use crate::error::{Error, ParseError};
use crate::model::{BillRecord, BodyKind, MessageDetail, parse_amount};
use crate::registry::BillParser;

/// Description used when none is configured.
pub const DEFAULT_DESCRIPTION: &str = "{display_name}: ${amount}";

/// Finds the amount with a regular expression over the message body.
///
/// The first capture group is the amount. HTML bodies are flattened to text
/// before matching. If the message carried a PDF, the first one is attached
/// to the record.
#[derive(Debug, Clone)]
pub struct PatternParser {
    display_name: String,
    pattern: Regex,
    description: String,
    attachment_name: Option<String>,
}

impl PatternParser {
    /// Creates a parser for `display_name` matching `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the pattern does not compile or has no
    /// capture group.
    pub fn new(display_name: impl Into<String>, pattern: &str) -> Result<Self, Error> {
        let display_name = display_name.into();
        let pattern = Regex::new(pattern)
            .map_err(|e| Error::Config(format!("invalid amount pattern for {display_name}: {e}")))?;
        if pattern.captures_len() < 2 {
            return Err(Error::Config(format!(
                "amount pattern for {display_name} needs a capture group"
            )));
        }

        Ok(Self {
            display_name,
            pattern,
            description: DEFAULT_DESCRIPTION.to_string(),
            attachment_name: None,
        })
    }

    /// Sets the description template. `{display_name}` and `{amount}` are
    /// substituted.
    #[must_use]
    pub fn with_description(mut self, template: impl Into<String>) -> Self {
        self.description = template.into();
        self
    }

    /// Sets the file name stem for the re-attached PDF.
    #[must_use]
    pub fn with_attachment_name(mut self, name: impl Into<String>) -> Self {
        self.attachment_name = Some(name.into());
        self
    }

    fn searchable_body(detail: &MessageDetail) -> Result<String, ParseError> {
        let body = detail
            .body
            .as_deref()
            .ok_or_else(|| ParseError::MissingBody(detail.id.clone()))?;

        if detail.body_kind != Some(BodyKind::Html) {
            return Ok(body.to_string());
        }

        let converter = HtmlToMarkdown::builder()
            .skip_tags(vec!["script", "style", "head", "img", "svg"])
            .build();
        let markdown = converter
            .convert(body)
            .map_err(|e| ParseError::Other(format!("cannot read HTML body: {e}")))?;

        // Emphasis markers split "Total: **$12.00**" away from its label.
        Ok(markdown.replace(['*', '\\'], ""))
    }

    fn attachment(&self, detail: &MessageDetail) -> Result<Option<(String, String)>, ParseError> {
        let Some(first) = detail.attachments.first() else {
            return Ok(None);
        };

        let bytes = decode_transport(&first.base64_value)
            .map_err(|e| ParseError::Other(format!("cannot decode attachment: {e}")))?;
        let stem = self.attachment_name.as_deref().unwrap_or(&self.display_name);

        Ok(Some((format!("{stem}.pdf"), encode_base64(&bytes))))
    }
}

impl BillParser for PatternParser {
    fn parse_email(&self, detail: &MessageDetail) -> Result<BillRecord, ParseError> {
        let body = Self::searchable_body(detail)?;

        let raw = self
            .pattern
            .captures(&body)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .ok_or_else(|| ParseError::NoMatch {
                label: self.display_name.clone(),
            })?;

        let amount = format_money(parse_amount(&normalize_amount(raw)?)?);
        let description = self
            .description
            .replace("{display_name}", &self.display_name)
            .replace("{amount}", &amount);

        let record = BillRecord::new(amount, description);
        Ok(match self.attachment(detail)? {
            Some((name, data)) => record.with_attachment(name, data),
            None => record,
        })
    }
}

/// Strips currency symbols, spaces and thousands separators, keeping digits,
/// the decimal point and a sign.
///
/// Amounts must use a dot as the decimal point. A comma followed by exactly
/// two trailing digits (`12,00`) reads as a decimal comma and is rejected.
///
/// # Errors
///
/// Returns [`ParseError::InvalidAmount`] for a decimal-comma amount.
pub fn normalize_amount(raw: &str) -> Result<String, ParseError> {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | ','))
        .collect();

    let decimal_comma = kept
        .rsplit_once(',')
        .is_some_and(|(_, tail)| tail.len() == 2 && tail.bytes().all(|b| b.is_ascii_digit()));
    if decimal_comma {
        return Err(ParseError::InvalidAmount(raw.to_string()));
    }

    Ok(kept.chars().filter(|c| *c != ',').collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::codec::encode_transport;
    use crate::mailbox::MimePart;
    use crate::model::AttachmentRef;

    fn plain(body: &str) -> MessageDetail {
        let mut detail = MessageDetail::new("m1", "L1", MimePart::default());
        detail.set_body(body.to_string(), BodyKind::Plain);
        detail
    }

    #[test]
    fn test_pattern_parser_plain_body() {
        let parser = PatternParser::new("Electric", r"Amount due:\s*\$?([\d,]+\.\d{2})").unwrap();

        let record = parser.parse_email(&plain("Hello\nAmount due: $1,204.50\nThanks")).unwrap();

        assert_eq!(record.bill_amount, "1204.50");
        assert_eq!(record.bill_description, "Electric: $1204.50");
        assert!(record.file_name.is_none());
    }

    #[test]
    fn test_pattern_parser_html_body() {
        let parser = PatternParser::new("Water", r"Total\s+\$([\d.]+)")
            .unwrap()
            .with_description("{display_name} bill ({amount})");
        let mut detail = MessageDetail::new("m1", "L1", MimePart::default());
        detail.set_body(
            "<html><body><p>Total <b>$7.25</b></p></body></html>".to_string(),
            BodyKind::Html,
        );

        let record = parser.parse_email(&detail).unwrap();
        assert_eq!(record.bill_amount, "7.25");
        assert_eq!(record.bill_description, "Water bill (7.25)");
    }

    #[test]
    fn test_pattern_parser_attaches_first_pdf() {
        let parser = PatternParser::new("Electric", r"due (\d+)")
            .unwrap()
            .with_attachment_name("electric-statement");
        let mut detail = plain("due 40");
        detail.attachments.push(AttachmentRef {
            id: "A1".to_string(),
            base64_value: encode_transport(&[0xfb, 0xff]),
            file_name: "x.pdf".to_string(),
            directory: "attachments".into(),
        });

        let record = parser.parse_email(&detail).unwrap();
        assert_eq!(record.bill_amount, "40.00");
        assert_eq!(record.file_name.as_deref(), Some("electric-statement.pdf"));
        assert_eq!(record.file_data.as_deref(), Some("+/8="));
    }

    #[test]
    fn test_pattern_parser_errors() {
        let parser = PatternParser::new("Gas", r"Due: (\S+)").unwrap();

        let empty = MessageDetail::new("m9", "L1", MimePart::default());
        assert_eq!(parser.parse_email(&empty), Err(ParseError::MissingBody("m9".to_string())));
        assert_eq!(
            parser.parse_email(&plain("nothing here")),
            Err(ParseError::NoMatch { label: "Gas".to_string() })
        );
        assert!(matches!(
            parser.parse_email(&plain("Due: soon")),
            Err(ParseError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_pattern_requires_capture_group() {
        assert!(matches!(PatternParser::new("Gas", r"\d+"), Err(Error::Config(_))));
        assert!(matches!(PatternParser::new("Gas", r"(\d+"), Err(Error::Config(_))));
    }

    #[test]
    fn test_normalize_amount() {
        assert_eq!(normalize_amount("$1,234.56").unwrap(), "1234.56");
        assert_eq!(normalize_amount("1,204").unwrap(), "1204");
        assert_eq!(normalize_amount("-3.10 USD").unwrap(), "-3.10");
    }

    #[test]
    fn test_normalize_amount_rejects_decimal_comma() {
        assert_eq!(
            normalize_amount("€ 12,00"),
            Err(ParseError::InvalidAmount("€ 12,00".to_string()))
        );

        let parser = PatternParser::new("Gas", r"Due: (.+)").unwrap();
        assert!(matches!(
            parser.parse_email(&plain("Due: 1.234,56 EUR")),
            Err(ParseError::InvalidAmount(_))
        ));
    }
}
