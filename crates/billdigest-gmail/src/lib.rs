//! # billdigest-gmail
//!
//! Gmail REST API client implementing the mailbox capabilities of
//! `billdigest-core`.
//!
//! ## Features
//!
//! - **Labels and messages**: label listing, paginated message search,
//!   full messages and attachment bodies
//! - **Sending**: renders the summary as RFC 5322 and posts it raw
//! - **Resilience**: token refresh on `401`, exponential backoff on `429`
//!   and `5xx`
//!
//! ## Quick Start
//!
//! ```ignore
//! use billdigest_gmail::GmailClient;
//! use billdigest_oauth::{AccessTokens, OAuthClient, Provider, TokenStore};
//!
//! let oauth = OAuthClient::new(client_id, Provider::google()?).with_client_secret(secret);
//! let gmail = GmailClient::new(AccessTokens::new(oauth, TokenStore::new(token_path)))
//!     .with_max_retries(2);
//!
//! for label in gmail.labels().await? {
//!     println!("{} {}", label.id, label.name);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod client;
mod error;
pub mod types;

pub use client::{GMAIL_API_BASE, GmailClient, render_mail, search_query};
pub use error::{Error, Result};
