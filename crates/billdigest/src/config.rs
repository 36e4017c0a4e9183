//! JSON configuration file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail, ensure};
use billdigest_core::{
    Envelope, FetchOptions, ParserDescriptor, ParserRegistry, PatternParser, PipelineOptions,
    ReportSettings,
};
use serde::{Deserialize, Serialize};

/// Directory under the platform config dir holding config and token.
const APP_DIR: &str = "billdigest";

/// Default location of the configuration file.
pub fn default_config_path() -> PathBuf {
    app_dir().join("config.json")
}

fn app_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Everything a run needs besides the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Envelope of the summary message.
    pub email: EmailConfig,
    /// Scratch directory for attachments.
    pub attachment_dir: PathBuf,
    /// API call tuning.
    pub fetch: FetchConfig,
    /// Gmail account access.
    pub gmail: GmailConfig,
    /// Summary presentation.
    pub report: ReportConfig,
    /// One entry per bill label.
    pub parsers: Vec<ParserConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            email: EmailConfig::default(),
            attachment_dir: PathBuf::from("attachments"),
            fetch: FetchConfig::default(),
            gmail: GmailConfig::default(),
            report: ReportConfig::default(),
            parsers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub sender_name: String,
    pub email_address: String,
    #[serde(deserialize_with = "one_or_many")]
    pub to: Vec<String>,
    pub subject: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub concurrency: usize,
    pub call_timeout_secs: u64,
    pub lookback_months: u32,
    pub slack_days: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        let defaults = FetchOptions::default();
        Self {
            concurrency: defaults.concurrency,
            call_timeout_secs: defaults.call_timeout.as_secs(),
            lookback_months: defaults.lookback_months,
            slack_days: defaults.slack_days,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GmailConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    /// Defaults to `token.json` in the platform config directory.
    pub token_path: Option<PathBuf>,
    pub user_id: String,
    pub max_retries: u32,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            token_path: None,
            user_id: "me".to_string(),
            max_retries: 2,
        }
    }
}

impl GmailConfig {
    /// Where the OAuth token is kept.
    pub fn token_path(&self) -> PathBuf {
        self.token_path
            .clone()
            .unwrap_or_else(|| app_dir().join("token.json"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub title: String,
    pub currency_symbol: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        let defaults = ReportSettings::default();
        Self {
            title: defaults.title,
            currency_symbol: defaults.currency_symbol,
        }
    }
}

/// A label-to-parser binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Mailbox label the bills are filed under.
    pub label_name: String,
    /// Name shown in the summary.
    pub display_name: String,
    /// Regex whose first capture group is the amount.
    pub amount_pattern: String,
    /// Line template with `{display_name}` and `{amount}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Stem of the re-attached PDF.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_name: Option<String>,
}

impl ParserConfig {
    fn build(&self) -> anyhow::Result<PatternParser> {
        let mut parser = PatternParser::new(&self.display_name, &self.amount_pattern)
            .with_context(|| format!("parser for label {:?}", self.label_name))?;
        if let Some(template) = &self.description {
            parser = parser.with_description(template);
        }
        if let Some(name) = &self.attachment_name {
            parser = parser.with_attachment_name(name);
        }
        Ok(parser)
    }
}

impl Config {
    /// Reads and validates the file at `path`.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        tracing::debug!(path = %path.display(), parsers = config.parsers.len(), "Loaded config");
        Ok(config)
    }

    /// Checks settings that every command relies on.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.gmail.client_id.trim().is_empty(), "gmail.client_id is required");
        self.pipeline_options().validate()?;

        for (index, parser) in self.parsers.iter().enumerate() {
            ensure!(
                !parser.label_name.trim().is_empty(),
                "parsers[{index}]: label_name is empty"
            );
            parser.build()?;
        }
        Ok(())
    }

    /// Builds the parser registry in file order.
    pub fn registry(&self) -> anyhow::Result<ParserRegistry> {
        let mut registry = ParserRegistry::new();
        for parser in &self.parsers {
            registry.register(ParserDescriptor::new(
                &parser.label_name,
                &parser.display_name,
                parser.build()?,
            ));
        }
        Ok(registry)
    }

    /// Pipeline settings.
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            fetch: FetchOptions {
                concurrency: self.fetch.concurrency,
                call_timeout: Duration::from_secs(self.fetch.call_timeout_secs),
                lookback_months: self.fetch.lookback_months,
                slack_days: self.fetch.slack_days,
            },
            attachment_dir: self.attachment_dir.clone(),
            report: ReportSettings {
                title: self.report.title.clone(),
                currency_symbol: self.report.currency_symbol.clone(),
            },
        }
    }

    /// Envelope for sending; only the send step needs it.
    pub fn envelope(&self) -> anyhow::Result<Envelope> {
        let email = &self.email;
        if email.email_address.trim().is_empty() {
            bail!("email.email_address is required to send");
        }
        let to: Vec<String> = email
            .to
            .iter()
            .map(|address| address.trim().to_string())
            .filter(|address| !address.is_empty())
            .collect();
        ensure!(!to.is_empty(), "email.to needs at least one recipient");

        Ok(Envelope {
            sender_name: email.sender_name.clone(),
            sender_address: email.email_address.trim().to_string(),
            to,
            subject: email.subject.clone(),
        })
    }
}

/// Accepts `"a@x"` as well as `["a@x", "b@x"]`.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(address) => vec![address],
        OneOrMany::Many(addresses) => addresses,
    })
}
