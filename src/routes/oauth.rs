use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use rinja_axum::Template;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{MessageBody, error_response};
use crate::{
    email_client::{DeliveryError, GmailClient, fetch_profile_address, sender_mailbox},
    oauth::OAuthError,
    registry::{Account, AccountDetails, AccountKind},
    startup::AppState,
};

#[derive(Serialize, Deserialize, Debug)]
pub struct OAuthUrl {
    pub url: String,
}

#[derive(Deserialize, Debug)]
pub struct CallbackParameters {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct GmailStatusParameters {
    pub email: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GmailStatus {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<Uuid>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RevokeParameters {
    #[serde(alias = "account_id")]
    pub account_id: Option<String>,
    pub email: Option<String>,
}

#[derive(Template)]
#[template(path = "oauth_success.html")]
struct OAuthSuccessTemplate<'a> {
    email: &'a str,
}

#[derive(Template)]
#[template(path = "oauth_error.html")]
struct OAuthErrorTemplate<'a> {
    message: &'a str,
}

#[derive(thiserror::Error, Debug)]
pub enum OAuthRouteError {
    #[error("Authorization was denied: {0}")]
    Denied(String),
    #[error("No state found for this request. Please try again.")]
    UnknownState,
    #[error("No authorization code was returned")]
    MissingCode,
    #[error(transparent)]
    OAuth(#[from] OAuthError),
    #[error("Error getting user profile: {0}")]
    Profile(DeliveryError),
    #[error("Invalid Gmail address: {0}")]
    Sender(DeliveryError),
    #[error("Account not found or not connected")]
    NotFound,
    #[error("Could not render page: {0}")]
    Render(String),
}

impl IntoResponse for OAuthRouteError {
    fn into_response(self) -> Response {
        tracing::error!("{}", self);
        let status = match &self {
            OAuthRouteError::NotFound => StatusCode::NOT_FOUND,
            OAuthRouteError::OAuth(_) | OAuthRouteError::Render(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        };
        error_response(status, self)
    }
}

#[tracing::instrument(name = "Creating an authorization URL", skip(app_state))]
pub async fn get_oauth_url(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<OAuthUrl>, OAuthRouteError> {
    let url = app_state.oauth.authorization_url()?;
    Ok(Json(OAuthUrl { url }))
}

/// Redirect target of the consent screen. Always answers with an HTML page.
#[tracing::instrument(
    name = "Handling OAuth callback",
    skip(app_state, parameters),
    fields(has_code = parameters.code.is_some())
)]
pub async fn oauth_callback(
    State(app_state): State<Arc<AppState>>,
    Query(parameters): Query<CallbackParameters>,
) -> Response {
    let outcome = match connect_gmail_account(&app_state, parameters).await {
        Ok(email) => OAuthSuccessTemplate { email: &email }
            .render()
            .map(|page| Html(page).into_response()),
        Err(e) => {
            tracing::error!(error = %e, "Gmail account connection failed");
            let message = e.to_string();
            OAuthErrorTemplate { message: &message }
                .render()
                .map(|page| (StatusCode::BAD_REQUEST, Html(page)).into_response())
        }
    };
    outcome.unwrap_or_else(|e| OAuthRouteError::Render(e.to_string()).into_response())
}

/// Registers a connected Gmail account for the consenting user and returns its address.
async fn connect_gmail_account(
    app_state: &AppState,
    parameters: CallbackParameters,
) -> Result<String, OAuthRouteError> {
    let state = parameters.state.ok_or(OAuthRouteError::UnknownState)?;
    if !app_state.oauth.take_state(&state) {
        return Err(OAuthRouteError::UnknownState);
    }
    if let Some(error) = parameters.error {
        return Err(OAuthRouteError::Denied(error));
    }
    let code = parameters.code.ok_or(OAuthRouteError::MissingCode)?;

    let tokens = app_state.oauth.exchange_code(&code).await?;
    let email = fetch_profile_address(
        &app_state.http_client,
        &app_state.gmail_api_base_url,
        &tokens.access_token,
    )
    .await
    .map_err(OAuthRouteError::Profile)?;

    let display_name = email.split('@').next().unwrap_or_default().to_owned();
    let sender = sender_mailbox(&display_name, &email).map_err(OAuthRouteError::Sender)?;
    let client = GmailClient::new(
        app_state.http_client.clone(),
        app_state.gmail_api_base_url.clone(),
        sender,
        Arc::clone(&app_state.oauth),
        tokens,
    );

    // Reconnecting replaces the stale credentials.
    if let Some(previous) = app_state.registry.find_by_address(AccountKind::Gmail, &email) {
        app_state.registry.remove(previous.id);
    }
    let mut account = Account::new(
        AccountDetails::Gmail,
        display_name,
        email.clone(),
        Arc::new(client),
    );
    // The profile fetch above already proved the token works.
    account.is_connected = true;
    app_state.registry.insert(account);

    Ok(email)
}

pub async fn gmail_status(
    State(app_state): State<Arc<AppState>>,
    Query(parameters): Query<GmailStatusParameters>,
) -> Json<GmailStatus> {
    let account = parameters
        .email
        .as_deref()
        .and_then(|email| app_state.registry.find_by_address(AccountKind::Gmail, email));
    Json(match account {
        Some(account) => GmailStatus {
            connected: true,
            email: Some(account.address),
            account_id: Some(account.id),
        },
        None => GmailStatus {
            connected: false,
            email: None,
            account_id: None,
        },
    })
}

#[tracing::instrument(name = "Revoking a Gmail account", skip(app_state))]
pub async fn revoke_oauth(
    State(app_state): State<Arc<AppState>>,
    Query(parameters): Query<RevokeParameters>,
) -> Result<Json<MessageBody>, OAuthRouteError> {
    let by_id = parameters
        .account_id
        .as_deref()
        .and_then(|id| Uuid::parse_str(id.trim()).ok())
        .and_then(|id| app_state.registry.get(id))
        .filter(|account| account.kind() == AccountKind::Gmail);
    let account = by_id
        .or_else(|| {
            parameters
                .email
                .as_deref()
                .and_then(|email| app_state.registry.find_by_address(AccountKind::Gmail, email))
        })
        .ok_or(OAuthRouteError::NotFound)?;

    app_state
        .registry
        .remove(account.id)
        .ok_or(OAuthRouteError::NotFound)?;
    Ok(MessageBody::new("OAuth account revoked successfully"))
}
