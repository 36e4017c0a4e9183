//! Token endpoint client and the refreshing token source.

use std::collections::HashMap;

use chrono::Utc;
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::Result;
use crate::provider::Provider;
use crate::token::{ErrorResponse, Token, TokenResponse, TokenStore};

/// Registered `OAuth2` client and its provider.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    /// Client ID from provider.
    pub client_id: String,
    /// Client secret (Google issues one even to installed apps).
    pub client_secret: Option<String>,
    /// Provider configuration.
    pub provider: Provider,
    http_client: Client,
}

impl OAuthClient {
    /// Creates a new OAuth client.
    #[must_use]
    pub fn new(client_id: impl Into<String>, provider: Provider) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            provider,
            http_client: Client::new(),
        }
    }

    /// Sets the client secret.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Uses a shared HTTP client.
    #[must_use]
    pub fn with_http_client(mut self, http_client: Client) -> Self {
        self.http_client = http_client;
        self
    }

    /// Refreshes an access token using its refresh token.
    ///
    /// The refresh token is carried over when the server does not rotate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh fails or if the token has no refresh token.
    pub async fn refresh_token(&self, token: &Token) -> Result<Token> {
        let refresh_token = token.refresh_token()?;

        let mut params = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token);

        let mut new_token = self.request_token(params).await?;
        if new_token.refresh_token.is_none() {
            new_token.refresh_token.clone_from(&token.refresh_token);
        }

        Ok(new_token)
    }

    /// Exchanges an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        code_verifier: &str,
    ) -> Result<Token> {
        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", code);
        params.insert("redirect_uri", redirect_uri);
        params.insert("code_verifier", code_verifier);

        self.request_token(params).await
    }

    async fn request_token(&self, mut params: HashMap<&str, &str>) -> Result<Token> {
        params.insert("client_id", &self.client_id);
        if let Some(secret) = &self.client_secret {
            params.insert("client_secret", secret);
        }

        let response = self
            .http_client
            .post(self.provider.token_url.clone())
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let error: ErrorResponse = response.json().await?;
            return Err(error.into_error());
        }

        let token_response: TokenResponse = response.json().await?;
        Ok(Token::from_response(token_response, Utc::now()))
    }
}

/// Hands out valid access tokens, refreshing and persisting as needed.
#[derive(Debug)]
pub struct AccessTokens {
    client: OAuthClient,
    store: TokenStore,
    current: Mutex<Option<Token>>,
}

impl AccessTokens {
    /// Creates a token source. Nothing is read until the first request.
    #[must_use]
    pub fn new(client: OAuthClient, store: TokenStore) -> Self {
        Self {
            client,
            store,
            current: Mutex::new(None),
        }
    }

    /// Returns a bearer token that is valid for at least another minute.
    ///
    /// # Errors
    ///
    /// Returns an error if no token is stored or the refresh fails.
    pub async fn access_token(&self) -> Result<String> {
        let mut current = self.current.lock().await;

        let token = match current.take() {
            Some(token) => token,
            None => self.store.load().await?,
        };

        let token = if token.is_expired() {
            debug!("Access token expired, refreshing");
            let refreshed = self.client.refresh_token(&token).await?;
            self.store.save(&refreshed).await?;
            info!("Refreshed access token");
            refreshed
        } else {
            token
        };

        let access = token.access_token.clone();
        *current = Some(token);
        Ok(access)
    }

    /// Drops the cached token so the next request reloads or refreshes it.
    pub async fn invalidate(&self) {
        if let Some(token) = self.current.lock().await.as_mut() {
            token.expires_at = Some(Utc::now());
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_oauth_client_with_secret() {
        let client = OAuthClient::new("client.apps.googleusercontent.com", Provider::google().unwrap())
            .with_client_secret("secret");

        assert_eq!(client.client_id, "client.apps.googleusercontent.com");
        assert_eq!(client.client_secret.as_deref(), Some("secret"));
    }

    #[tokio::test]
    async fn test_access_tokens_uses_stored_valid_token() {
        let temp = tempfile::tempdir().unwrap();
        let store = TokenStore::new(temp.path().join("token.json"));
        store
            .save(&Token::new("stored", "Bearer").with_expires_at(Utc::now() + Duration::hours(1)))
            .await
            .unwrap();

        let tokens = AccessTokens::new(OAuthClient::new("id", Provider::google().unwrap()), store);
        assert_eq!(tokens.access_token().await.unwrap(), "stored");
        assert_eq!(tokens.access_token().await.unwrap(), "stored");
    }

    #[tokio::test]
    async fn test_access_tokens_expired_without_refresh_token() {
        let temp = tempfile::tempdir().unwrap();
        let store = TokenStore::new(temp.path().join("token.json"));
        store
            .save(&Token::new("old", "Bearer").with_expires_at(Utc::now() - Duration::hours(1)))
            .await
            .unwrap();

        let tokens = AccessTokens::new(OAuthClient::new("id", Provider::google().unwrap()), store);
        assert!(matches!(
            tokens.access_token().await,
            Err(crate::Error::NoRefreshToken)
        ));
    }
}
