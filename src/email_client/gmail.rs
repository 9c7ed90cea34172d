use std::sync::Arc;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose};
use lettre::message::Mailbox;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{DeliveryError, MailTransport, OutgoingEmail};
use crate::oauth::{GoogleOAuth, OAuthTokens};

/// Access tokens this close to expiry are refreshed before use.
const REFRESH_MARGIN_MINUTES: i64 = 5;

/// Sends through the Gmail REST API on behalf of one OAuth-connected account.
#[derive(Debug)]
pub struct GmailClient {
    http_client: Client,
    base_url: String,
    sender: Mailbox,
    oauth: Arc<GoogleOAuth>,
    // Held across a refresh so concurrent sends do not refresh twice.
    tokens: tokio::sync::Mutex<OAuthTokens>,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    raw: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Profile {
    email_address: String,
}

impl GmailClient {
    pub fn new(
        http_client: Client,
        base_url: String,
        sender: Mailbox,
        oauth: Arc<GoogleOAuth>,
        tokens: OAuthTokens,
    ) -> Self {
        Self {
            http_client,
            base_url,
            sender,
            oauth,
            tokens: tokio::sync::Mutex::new(tokens),
        }
    }

    async fn access_token(&self) -> Result<SecretString, DeliveryError> {
        let mut tokens = self.tokens.lock().await;
        if tokens.expires_within(chrono::Duration::minutes(REFRESH_MARGIN_MINUTES)) {
            if let Some(refresh_token) = tokens.refresh_token.take() {
                let mut refreshed = match self.oauth.refresh(&refresh_token).await {
                    Ok(refreshed) => refreshed,
                    Err(e) => {
                        tokens.refresh_token = Some(refresh_token);
                        return Err(e.into());
                    }
                };
                // Google only returns a refresh token on the first exchange.
                refreshed.refresh_token.get_or_insert(refresh_token);
                *tokens = refreshed;
                tracing::info!(sender = %self.sender.email, "refreshed Gmail access token");
            }
        }
        Ok(SecretString::from(
            tokens.access_token.expose_secret().to_owned(),
        ))
    }
}

#[async_trait]
impl MailTransport for GmailClient {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), DeliveryError> {
        let message = email.to_message(&self.sender)?;
        let raw = general_purpose::URL_SAFE.encode(message.formatted());
        let token = self.access_token().await?;

        let url = format!("{}/gmail/v1/users/me/messages/send", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(token.expose_secret())
            .json(&SendMessageRequest { raw: &raw })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(DeliveryError::Api {
                status: status.as_u16(),
                body,
            })
        }
    }

    async fn probe(&self) -> Result<(), DeliveryError> {
        let token = self.access_token().await?;
        fetch_profile_address(&self.http_client, &self.base_url, &token)
            .await
            .map(|_| ())
    }
}

/// Address of the mailbox that owns `access_token`.
pub async fn fetch_profile_address(
    http_client: &Client,
    base_url: &str,
    access_token: &SecretString,
) -> Result<String, DeliveryError> {
    let url = format!("{}/gmail/v1/users/me/profile", base_url);
    let response = http_client
        .get(&url)
        .bearer_auth(access_token.expose_secret())
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(DeliveryError::Api {
            status: status.as_u16(),
            body,
        });
    }
    let profile: Profile = response.json().await?;
    Ok(profile.email_address)
}
