//! Gmail REST client.

use std::time::Duration;

use billdigest_core::{Label, MailApi, MailSender, OutgoingMail, RawMessage};
use billdigest_mime::encoding::encode_transport;
use billdigest_mime::{Attachment, ContentType, MessageBuilder};
use billdigest_oauth::AccessTokens;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::types::{AttachmentBody, ErrorEnvelope, LabelList, MessageList, SendRequest, SentMessage};

/// Gmail API root.
pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";

const DEFAULT_USER: &str = "me";
const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_RETRY_BASE: Duration = Duration::from_millis(500);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Which failures a request may be repeated after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retry {
    /// Rate limiting and server errors.
    Transient,
    /// Rate limiting only; the request may have taken effect otherwise.
    RateLimited,
}

impl Retry {
    fn allows(self, status: StatusCode) -> bool {
        match self {
            Self::Transient => {
                status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            Self::RateLimited => status == StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

/// Client for one Gmail mailbox.
///
/// Every request carries a bearer token from [`AccessTokens`]. A `401`
/// forces one refresh, and `429`/`5xx` responses are retried with
/// exponential backoff.
#[derive(Debug)]
pub struct GmailClient {
    tokens: AccessTokens,
    http: Client,
    base_url: String,
    user_id: String,
    max_retries: u32,
    retry_base: Duration,
}

impl GmailClient {
    /// Creates a client for the authorized user.
    #[must_use]
    pub fn new(tokens: AccessTokens) -> Self {
        Self::with_base_url(tokens, GMAIL_API_BASE)
    }

    /// Creates a client against another API root.
    #[must_use]
    pub fn with_base_url(tokens: AccessTokens, base_url: &str) -> Self {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            tokens,
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id: DEFAULT_USER.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base: DEFAULT_RETRY_BASE,
        }
    }

    /// Targets another mailbox the token may act for.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    /// Sets how many times a failed request is repeated.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the first backoff delay; each retry doubles it.
    #[must_use]
    pub const fn with_retry_base(mut self, retry_base: Duration) -> Self {
        self.retry_base = retry_base;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/users/{}/{path}", self.base_url, self.user_id)
    }

    /// Sends a request, refreshing the token once on `401` and backing off
    /// on retryable statuses.
    async fn execute<T, F>(&self, retry: Retry, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn(&str) -> RequestBuilder,
    {
        let mut attempt = 0;
        let mut reauthorized = false;

        loop {
            let token = self.tokens.access_token().await?;
            let response = build(&token).send().await?;
            let status = response.status();

            if status.is_success() {
                let body = response.bytes().await?;
                return Ok(serde_json::from_slice(&body)?);
            }

            let body = response.text().await.unwrap_or_default();

            if status == StatusCode::UNAUTHORIZED && !reauthorized {
                debug!("Access token rejected, refreshing");
                reauthorized = true;
                self.tokens.invalidate().await;
                continue;
            }

            if retry.allows(status) && attempt < self.max_retries {
                let delay = self.retry_base * 2u32.saturating_pow(attempt);
                attempt += 1;
                warn!(
                    status = status.as_u16(),
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Gmail request failed, retrying"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            return Err(Error::api(status, error_message(&body)));
        }
    }

    /// Lists every label in the mailbox.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn labels(&self) -> Result<Vec<Label>> {
        let url = self.endpoint("labels");
        let list: LabelList = self
            .execute(Retry::Transient, |token| self.http.get(&url).bearer_auth(token))
            .await?;

        debug!(count = list.labels.len(), "Listed labels");
        Ok(list.labels.into_iter().map(Label::from).collect())
    }

    /// Lists ids of messages with `label_id` received after `since`,
    /// following every result page.
    ///
    /// # Errors
    ///
    /// Returns an error if any page fails.
    pub async fn message_ids(&self, label_id: &str, since: NaiveDate) -> Result<Vec<String>> {
        let url = self.endpoint("messages");
        let query = search_query(since);
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page: MessageList = self
                .execute(Retry::Transient, |token| {
                    let request = self
                        .http
                        .get(&url)
                        .bearer_auth(token)
                        .query(&[("labelIds", label_id), ("q", query.as_str())]);
                    match &page_token {
                        Some(page) => request.query(&[("pageToken", page.as_str())]),
                        None => request,
                    }
                })
                .await?;

            ids.extend(page.messages.into_iter().map(|m| m.id));

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        debug!(label_id, query = %query, count = ids.len(), "Listed messages");
        Ok(ids)
    }

    /// Fetches a full message.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is malformed or the request fails.
    pub async fn message(&self, message_id: &str) -> Result<RawMessage> {
        let url = self.endpoint(&format!("messages/{}", path_segment(message_id)?));
        self.execute(Retry::Transient, |token| {
            self.http
                .get(&url)
                .bearer_auth(token)
                .query(&[("format", "full")])
        })
        .await
    }

    /// Fetches attachment content as URL-safe Base64.
    ///
    /// # Errors
    ///
    /// Returns an error if an id is malformed or the request fails.
    pub async fn attachment(&self, message_id: &str, attachment_id: &str) -> Result<String> {
        let url = self.endpoint(&format!(
            "messages/{}/attachments/{}",
            path_segment(message_id)?,
            path_segment(attachment_id)?
        ));
        let body: AttachmentBody = self
            .execute(Retry::Transient, |token| self.http.get(&url).bearer_auth(token))
            .await?;

        debug!(message_id, size = body.size, "Fetched attachment");
        Ok(body.data)
    }

    /// Sends a message and returns its id.
    ///
    /// Server errors are not retried so a message that was accepted is never
    /// delivered twice.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be rendered or the request fails.
    pub async fn send(&self, mail: &OutgoingMail) -> Result<String> {
        let raw = render_mail(mail, Utc::now().fixed_offset())?;
        let request = SendRequest {
            raw: encode_transport(raw.as_bytes()),
        };

        let url = self.endpoint("messages/send");
        let sent: SentMessage = self
            .execute(Retry::RateLimited, |token| {
                self.http.post(&url).bearer_auth(token).json(&request)
            })
            .await?;

        info!(id = %sent.id, recipients = mail.to.len(), "Sent message");
        Ok(sent.id)
    }
}

impl MailApi for GmailClient {
    type Error = Error;

    async fn list_labels(&self) -> Result<Vec<Label>> {
        self.labels().await
    }

    async fn list_message_ids(&self, label_id: &str, since: NaiveDate) -> Result<Vec<String>> {
        self.message_ids(label_id, since).await
    }

    async fn get_message(&self, message_id: &str) -> Result<RawMessage> {
        self.message(message_id).await
    }

    async fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Result<String> {
        self.attachment(message_id, attachment_id).await
    }
}

impl MailSender for GmailClient {
    type Error = Error;

    async fn send_mail(&self, mail: &OutgoingMail) -> Result<String> {
        self.send(mail).await
    }
}

/// Search expression for messages received after `since`.
#[must_use]
pub fn search_query(since: NaiveDate) -> String {
    format!("after:{}", since.format("%Y/%m/%d"))
}

/// Renders an outgoing mail as an RFC 5322 message dated `date`.
///
/// # Errors
///
/// Returns an error if an attachment is not valid Base64, or an address or
/// the subject would break the header block.
pub fn render_mail(mail: &OutgoingMail, date: DateTime<FixedOffset>) -> Result<String> {
    let mut builder = MessageBuilder::new()
        .from(mail.from.as_str())
        .subject(mail.subject.as_str())
        .date(date)
        .text_body(mail.text.as_str())
        .html_body(mail.html.as_str());

    for to in &mail.to {
        builder = builder.to(to.as_str());
    }
    for attachment in &mail.attachments {
        builder = builder.attach(Attachment::from_base64(
            attachment.filename.as_str(),
            content_type_for(&attachment.filename),
            &attachment.content,
        )?);
    }

    Ok(builder.build()?)
}

fn content_type_for(filename: &str) -> ContentType {
    let is_pdf = std::path::Path::new(filename)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if is_pdf {
        ContentType::application_pdf()
    } else {
        ContentType::new("application", "octet-stream")
    }
}

fn path_segment(id: &str) -> Result<&str> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(id)
    } else {
        Err(Error::InvalidId(id.to_string()))
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .ok()
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| body.trim().to_string())
}
