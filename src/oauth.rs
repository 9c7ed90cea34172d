use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rand::{Rng, distr::Alphanumeric, rng};
use reqwest::{Client, Url};
use secrecy::{ExposeSecret, SecretString};

use crate::configuration::GmailSettings;

const STATE_TTL_MINUTES: i64 = 10;

#[derive(Debug)]
pub struct GoogleOAuth {
    http_client: Client,
    client_id: String,
    client_secret: SecretString,
    auth_url: String,
    token_url: String,
    redirect_uri: String,
    scopes: Vec<String>,
    // state token -> issued at
    pending_states: parking_lot::Mutex<HashMap<String, DateTime<Utc>>>,
}

#[derive(Debug)]
pub struct OAuthTokens {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl OAuthTokens {
    pub fn expires_within(&self, margin: Duration) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at <= Utc::now() + margin)
    }
}

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
}

impl From<TokenResponse> for OAuthTokens {
    fn from(response: TokenResponse) -> Self {
        Self {
            access_token: SecretString::from(response.access_token),
            refresh_token: response.refresh_token.map(SecretString::from),
            expires_at: response
                .expires_in
                .map(|seconds| Utc::now() + Duration::seconds(seconds)),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum OAuthError {
    #[error("invalid authorization endpoint: {0}")]
    InvalidAuthUrl(String),
    #[error("Error fetching token: {status} {body}")]
    TokenEndpoint { status: u16, body: String },
    #[error("Error fetching token: {0}")]
    Http(#[from] reqwest::Error),
}

impl GoogleOAuth {
    pub fn new(settings: &GmailSettings, http_client: Client) -> Self {
        Self {
            http_client,
            client_id: settings.client_id.clone(),
            client_secret: SecretString::from(settings.client_secret.expose_secret().to_owned()),
            auth_url: settings.auth_url.clone(),
            token_url: settings.token_url.clone(),
            redirect_uri: settings.redirect_uri.clone(),
            scopes: settings.scopes.clone(),
            pending_states: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Consent-screen URL carrying a fresh CSRF state.
    pub fn authorization_url(&self) -> Result<String, OAuthError> {
        let mut url =
            Url::parse(&self.auth_url).map_err(|e| OAuthError::InvalidAuthUrl(e.to_string()))?;
        let state = generate_state_token();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("state", &state)
            .append_pair("access_type", "offline")
            .append_pair("include_granted_scopes", "true")
            .append_pair("prompt", "consent");

        let now = Utc::now();
        let mut pending = self.pending_states.lock();
        pending.retain(|_, issued_at| now - *issued_at < Duration::minutes(STATE_TTL_MINUTES));
        pending.insert(state, now);

        Ok(url.into())
    }

    /// Consumes `state`; true only for a state issued here and not yet expired.
    pub fn take_state(&self, state: &str) -> bool {
        self.pending_states
            .lock()
            .remove(state)
            .is_some_and(|issued_at| Utc::now() - issued_at < Duration::minutes(STATE_TTL_MINUTES))
    }

    #[tracing::instrument(name = "Exchanging authorization code", skip_all)]
    pub async fn exchange_code(&self, code: &str) -> Result<OAuthTokens, OAuthError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
        ];
        self.request_token(&params).await
    }

    #[tracing::instrument(name = "Refreshing access token", skip_all)]
    pub async fn refresh(&self, refresh_token: &SecretString) -> Result<OAuthTokens, OAuthError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.expose_secret()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
        ];
        self.request_token(&params).await
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<OAuthTokens, OAuthError> {
        let response = self
            .http_client
            .post(&self.token_url)
            .form(params)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OAuthError::TokenEndpoint {
                status: status.as_u16(),
                body,
            });
        }
        let token: TokenResponse = response.json().await?;
        Ok(token.into())
    }
}

fn generate_state_token() -> String {
    let mut rng = rng();
    std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(32)
        .collect()
}
