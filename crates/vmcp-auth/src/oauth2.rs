//! OAuth 2.0 authorization-code-with-PKCE upstream auth (spec §4.1).
//!
//! Holds the access/refresh token for one upstream session. On a 401 the
//! session attempts exactly one refresh; if that fails it surfaces
//! `authorization_url` so the caller can re-run the interactive flow.

use std::sync::Arc;
use std::time::Duration;

use oauth2::basic::{BasicClient, BasicTokenType};
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken, Scope, TokenResponse, TokenUrl,
};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;
use tokio::time::Instant;

type ConfiguredClient = BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("invalid OAuth endpoint URL: {0}")]
    InvalidUrl(String),
    #[error("token exchange failed: {0}")]
    Exchange(String),
    #[error("no refresh token available")]
    NoRefreshToken,
}

#[derive(Clone)]
pub struct OAuth2Config {
    pub client_id: String,
    pub client_secret: Option<SecretString>,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_url: String,
    pub scopes: Vec<String>,
}

struct TokenState {
    access_token: SecretString,
    refresh_token: Option<SecretString>,
    expires_at: Option<Instant>,
}

/// A single upstream's OAuth2 state: the configured client plus whatever
/// tokens are currently held.
pub struct OAuth2Session {
    client: ConfiguredClient,
    http_client: reqwest::Client,
    scopes: Vec<String>,
    tokens: RwLock<Option<TokenState>>,
    pending_verifier: RwLock<Option<SecretString>>,
}

impl OAuth2Session {
    pub fn new(config: &OAuth2Config) -> Result<Arc<Self>, OAuthError> {
        let auth_url =
            AuthUrl::new(config.auth_url.clone()).map_err(|e| OAuthError::InvalidUrl(e.to_string()))?;
        let token_url = TokenUrl::new(config.token_url.clone())
            .map_err(|e| OAuthError::InvalidUrl(e.to_string()))?;
        let redirect_url = RedirectUrl::new(config.redirect_url.clone())
            .map_err(|e| OAuthError::InvalidUrl(e.to_string()))?;

        let mut client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url)
            .set_redirect_uri(redirect_url);
        if let Some(secret) = &config.client_secret {
            client = client.set_client_secret(ClientSecret::new(secret.expose_secret().to_string()));
        }

        // OAuth providers frequently redirect on token exchange; following
        // those redirects blindly would let a malicious token endpoint
        // leak the authorization code to an attacker-controlled host.
        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| OAuthError::Exchange(e.to_string()))?;

        Ok(Arc::new(Self {
            client,
            http_client,
            scopes: config.scopes.clone(),
            tokens: RwLock::new(None),
            pending_verifier: RwLock::new(None),
        }))
    }

    /// Start the authorization-code + PKCE flow. Returns the URL the
    /// caller must redirect the user to (spec §4.1 `authorization_url`).
    pub async fn authorization_url(&self) -> String {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (auth_url, _csrf) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .set_pkce_challenge(pkce_challenge)
            .url();
        *self.pending_verifier.write().await = Some(SecretString::from(pkce_verifier.secret().clone()));
        auth_url.to_string()
    }

    /// Complete the flow after the user is redirected back with `code`.
    pub async fn exchange_code(&self, code: String) -> Result<(), OAuthError> {
        let verifier = self
            .pending_verifier
            .write()
            .await
            .take()
            .ok_or_else(|| OAuthError::Exchange("no pending PKCE verifier".to_string()))?;

        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(PkceCodeVerifier::new(verifier.expose_secret().to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| OAuthError::Exchange(e.to_string()))?;

        self.store_response(response).await;
        Ok(())
    }

    /// One implicit refresh attempt (spec §4.1 "on 401 it attempts one
    /// refresh"). Returns `Err` if there is no refresh token or the
    /// provider rejects it — the caller transitions to `auth_required`.
    pub async fn refresh(&self) -> Result<(), OAuthError> {
        let refresh_token = {
            let guard = self.tokens.read().await;
            guard
                .as_ref()
                .and_then(|t| t.refresh_token.clone())
                .ok_or(OAuthError::NoRefreshToken)?
        };

        let response = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.expose_secret().to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| OAuthError::Exchange(e.to_string()))?;

        self.store_response(response).await;
        Ok(())
    }

    async fn store_response(
        &self,
        response: oauth2::StandardTokenResponse<oauth2::EmptyExtraTokenFields, BasicTokenType>,
    ) {
        let expires_at = response.expires_in().map(|d| Instant::now() + d);
        let refresh_token = response
            .refresh_token()
            .map(|t| SecretString::from(t.secret().clone()));
        let access_token = SecretString::from(response.access_token().secret().clone());

        let mut guard = self.tokens.write().await;
        // OAuth 2.1 refresh-token rotation: only replace the stored
        // refresh token when the server actually issued a new one.
        let refresh_token = refresh_token.or_else(|| guard.take().and_then(|t| t.refresh_token));
        *guard = Some(TokenState {
            access_token,
            refresh_token,
            expires_at,
        });
    }

    /// Current bearer header value, if we hold a (possibly stale) token.
    pub async fn bearer_header(&self) -> Option<String> {
        let guard = self.tokens.read().await;
        guard
            .as_ref()
            .map(|t| format!("Bearer {}", t.access_token.expose_secret()))
    }

    pub async fn is_expired(&self) -> bool {
        match &*self.tokens.read().await {
            Some(t) => t.expires_at.map(|at| Instant::now() >= at).unwrap_or(false),
            None => true,
        }
    }

    pub async fn expires_within(&self, margin: Duration) -> bool {
        match &*self.tokens.read().await {
            Some(t) => t
                .expires_at
                .map(|at| Instant::now() + margin >= at)
                .unwrap_or(false),
            None => true,
        }
    }

    /// Wipe stored tokens (spec §4.1 "Clearing auth wipes stored tokens
    /// and forces `disconnected`").
    pub async fn clear(&self) {
        *self.tokens.write().await = None;
        *self.pending_verifier.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> OAuth2Config {
        OAuth2Config {
            client_id: "client".to_string(),
            client_secret: None,
            auth_url: "https://provider.example.com/authorize".to_string(),
            token_url: "https://provider.example.com/token".to_string(),
            redirect_url: "https://aggregator.example.com/callback".to_string(),
            scopes: vec!["read".to_string()],
        }
    }

    #[tokio::test]
    async fn authorization_url_embeds_pkce_challenge_and_scope() {
        let session = OAuth2Session::new(&config()).unwrap();
        let url = session.authorization_url().await;
        assert!(url.contains("code_challenge="));
        assert!(url.contains("scope=read"));
    }

    #[tokio::test]
    async fn clear_wipes_tokens_and_bearer_header_is_none() {
        let session = OAuth2Session::new(&config()).unwrap();
        session.clear().await;
        assert!(session.bearer_header().await.is_none());
        assert!(session.is_expired().await);
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_fails() {
        let session = OAuth2Session::new(&config()).unwrap();
        let err = session.refresh().await.unwrap_err();
        assert!(matches!(err, OAuthError::NoRefreshToken));
    }
}
