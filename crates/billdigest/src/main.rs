//! `billdigest` - Monthly digest of utility bills found in a Gmail mailbox.
//!
//! Scans the labels that have a configured parser, pulls the amount out of
//! each bill and mails one summary with the total and the bill PDFs.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod config;

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::Context;
use billdigest_core::{RunOutcome, RunStats};
use billdigest_gmail::GmailClient;
use billdigest_oauth::{
    AccessTokens, AuthorizationRequest, LOOPBACK_REDIRECT, OAuthClient, Provider, TokenStore,
};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;

#[derive(Parser)]
#[command(name = "billdigest", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file
    #[arg(short, long, global = true, env = "BILLDIGEST_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Scan bills and send the summary
    Run,
    /// Scan bills and print the summary without sending
    Preview {
        /// Also print the HTML body
        #[arg(long)]
        html: bool,
    },
    /// Grant access to the mailbox and store the token
    Authorize,
    /// List mailbox labels and show which have a parser
    Labels,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = dispatch(cli).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "billdigest=debug,billdigest_core=debug,billdigest_gmail=debug,billdigest_oauth=debug"
    } else {
        "billdigest=info,billdigest_core=info,billdigest_gmail=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let path = cli.config.unwrap_or_else(config::default_config_path);
    let config = Config::load(&path).await?;

    match cli.command {
        Command::Run => cmd_run(&config).await,
        Command::Preview { html } => cmd_preview(&config, html).await,
        Command::Authorize => cmd_authorize(&config).await,
        Command::Labels => cmd_labels(&config).await,
    }
}

fn oauth_client(config: &Config) -> anyhow::Result<OAuthClient> {
    let mut client = OAuthClient::new(&config.gmail.client_id, Provider::google()?);
    if let Some(secret) = &config.gmail.client_secret {
        client = client.with_client_secret(secret);
    }
    Ok(client)
}

fn gmail_client(config: &Config) -> anyhow::Result<GmailClient> {
    let store = TokenStore::new(config.gmail.token_path());
    let tokens = AccessTokens::new(oauth_client(config)?, store);

    Ok(GmailClient::new(tokens)
        .with_user_id(&config.gmail.user_id)
        .with_max_retries(config.gmail.max_retries))
}

async fn cmd_run(config: &Config) -> anyhow::Result<()> {
    let envelope = config.envelope()?;
    let gmail = gmail_client(config)?;
    let mut registry = config.registry()?;

    let outcome = billdigest_core::run(
        &gmail,
        &gmail,
        &envelope,
        &mut registry,
        &config.pipeline_options(),
        chrono::Local::now().fixed_offset(),
    )
    .await?;

    log_outcome(&outcome);
    Ok(())
}

async fn cmd_preview(config: &Config, html: bool) -> anyhow::Result<()> {
    let gmail = gmail_client(config)?;
    let mut registry = config.registry()?;

    let outcome = billdigest_core::preview(
        &gmail,
        &mut registry,
        &config.pipeline_options(),
        chrono::Local::now().fixed_offset(),
    )
    .await?;

    log_outcome(&outcome);
    println!("{}", outcome.report.text);
    if html {
        println!("\n{}", outcome.report.html);
    }
    for attachment in &outcome.report.attachments {
        println!("[attachment] {}", attachment.filename);
    }
    Ok(())
}

async fn cmd_authorize(config: &Config) -> anyhow::Result<()> {
    let request = AuthorizationRequest::new(oauth_client(config)?, LOOPBACK_REDIRECT);

    println!("Open this URL in a browser and grant access:\n");
    println!("{}\n", request.authorization_url(None));
    println!("The browser then fails to load a {LOOPBACK_REDIRECT} page.");
    println!("Paste that page's full address here:");

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("reading redirect address")?;

    let token = request.finish(&line).await?;
    let store = TokenStore::new(config.gmail.token_path());
    store.save(&token).await?;

    info!(path = %store.path().display(), "Authorized");
    Ok(())
}

async fn cmd_labels(config: &Config) -> anyhow::Result<()> {
    let gmail = gmail_client(config)?;
    let configured: HashSet<&str> = config
        .parsers
        .iter()
        .map(|p| p.label_name.as_str())
        .collect();

    let mut labels = gmail.labels().await?;
    labels.sort_by(|a, b| a.name.cmp(&b.name));

    for label in &labels {
        let marker = if configured.contains(label.name.as_str()) { "*" } else { " " };
        println!("{marker} {:<40} {}", label.name, label.id);
    }

    let missing: Vec<&str> = configured
        .iter()
        .copied()
        .filter(|name| !labels.iter().any(|l| l.name == *name))
        .collect();
    if !missing.is_empty() {
        println!("\nConfigured but not in the mailbox: {}", missing.join(", "));
    }
    Ok(())
}

fn log_outcome(outcome: &RunOutcome) {
    let RunStats {
        labels_active,
        fetch,
        extract,
        dispatch,
        attachments_cleaned,
    } = &outcome.stats;

    info!(
        since = %outcome.since,
        labels_active,
        ids_listed = fetch.ids_listed,
        fetched = fetch.fetched,
        skipped = fetch.skipped,
        orphans = extract.orphans,
        attachments_saved = extract.attachments_saved,
        attachments_failed = extract.attachments_failed,
        parsed = dispatch.succeeded,
        parse_failed = dispatch.failed,
        attachments_cleaned,
        sent = outcome.sent(),
        "Run finished"
    );
}
