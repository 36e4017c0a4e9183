//! Authorization code flow for installed applications.
//!
//! The user opens the authorization URL in a browser, consents, and is
//! redirected to a loopback address. Nothing listens there; the user pastes
//! the address bar back and [`AuthorizationRequest::finish`] exchanges the
//! code it carries.

use rand::distributions::{Alphanumeric, DistString};
use url::Url;

use crate::client::OAuthClient;
use crate::error::{Error, Result};
use crate::pkce::Pkce;
use crate::token::Token;

/// Loopback redirect registered for desktop clients.
pub const LOOPBACK_REDIRECT: &str = "http://127.0.0.1:8085";

/// One pending authorization: PKCE secret, CSRF state and the URL to visit.
#[derive(Debug)]
pub struct AuthorizationRequest {
    client: OAuthClient,
    redirect_uri: String,
    pkce: Pkce,
    state: String,
}

impl AuthorizationRequest {
    /// Starts an authorization with a fresh PKCE pair and state.
    #[must_use]
    pub fn new(client: OAuthClient, redirect_uri: impl Into<String>) -> Self {
        let state = Alphanumeric.sample_string(&mut rand::thread_rng(), 32);
        Self {
            client,
            redirect_uri: redirect_uri.into(),
            pkce: Pkce::generate(),
            state,
        }
    }

    /// CSRF state expected back on the redirect.
    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }

    /// Builds the consent URL.
    ///
    /// `scopes` overrides the provider's defaults when given.
    #[must_use]
    pub fn authorization_url(&self, scopes: Option<&[String]>) -> Url {
        let mut url = self.client.provider.auth_url.clone();

        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("client_id", &self.client.client_id)
                .append_pair("response_type", "code")
                .append_pair("redirect_uri", &self.redirect_uri)
                .append_pair("state", &self.state)
                .append_pair("code_challenge", self.pkce.challenge())
                .append_pair("code_challenge_method", Pkce::METHOD);

            let scope_str = scopes.map_or_else(
                || self.client.provider.default_scopes.join(" "),
                |s| s.join(" "),
            );
            if !scope_str.is_empty() {
                pairs.append_pair("scope", &scope_str);
            }

            // Google only returns a refresh token for offline access on a
            // fresh consent.
            if self.client.provider.is_google() {
                pairs
                    .append_pair("access_type", "offline")
                    .append_pair("prompt", "consent");
            }
        }

        url
    }

    /// Exchanges the code from the pasted redirect for a token.
    ///
    /// # Errors
    ///
    /// Returns an error if the redirect is malformed, carries an error, has
    /// the wrong state, or the exchange fails.
    pub async fn finish(&self, redirect: &str) -> Result<Token> {
        let code = parse_redirect(redirect, &self.state)?;
        self.client
            .exchange_code(&code, &self.redirect_uri, self.pkce.verifier())
            .await
    }
}

/// Extracts the authorization code from a redirect URL.
///
/// # Errors
///
/// Returns [`Error::AccessDenied`] when the user declined,
/// [`Error::StateMismatch`] when the state differs, and
/// [`Error::InvalidRedirect`] when there is no code.
pub fn parse_redirect(redirect: &str, expected_state: &str) -> Result<String> {
    let url = Url::parse(redirect.trim())?;

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" if value == "access_denied" => return Err(Error::AccessDenied),
            "error" => return Err(Error::oauth_error(value.into_owned(), "authorization failed")),
            _ => {}
        }
    }

    if state.as_deref() != Some(expected_state) {
        return Err(Error::StateMismatch);
    }
    code.filter(|c| !c.is_empty())
        .ok_or_else(|| Error::InvalidRedirect("no code parameter".to_string()))
}
