//! # billdigest-oauth
//!
//! `OAuth2` for the Gmail API.
//!
//! ## Features
//!
//! - **Authorization code flow** with PKCE and a loopback redirect, for the
//!   one-time consent of an installed application
//! - **Token management**: JSON token file, expiry checks, refresh on demand
//! - **Google provider** preconfigured with the Gmail read and send scopes
//!
//! ## Quick Start
//!
//! ### First-time authorization
//!
//! ```ignore
//! use billdigest_oauth::{AuthorizationRequest, OAuthClient, Provider, TokenStore, LOOPBACK_REDIRECT};
//!
//! let client = OAuthClient::new("id.apps.googleusercontent.com", Provider::google()?)
//!     .with_client_secret("secret");
//! let request = AuthorizationRequest::new(client, LOOPBACK_REDIRECT);
//!
//! println!("Visit: {}", request.authorization_url(None));
//! let pasted = read_line()?;
//! let token = request.finish(&pasted).await?;
//! TokenStore::new("token.json").save(&token).await?;
//! ```
//!
//! ### Using the stored token
//!
//! ```ignore
//! use billdigest_oauth::AccessTokens;
//!
//! let tokens = AccessTokens::new(client, TokenStore::new("token.json"));
//! let bearer = tokens.access_token().await?; // refreshed when expired
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod authorize;
mod client;
mod error;
mod pkce;
pub mod provider;
pub mod token;

pub use authorize::{AuthorizationRequest, LOOPBACK_REDIRECT, parse_redirect};
pub use client::{AccessTokens, OAuthClient};
pub use error::{Error, Result};
pub use pkce::Pkce;
pub use provider::Provider;
pub use token::{Token, TokenStore};
