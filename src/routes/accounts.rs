use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_aux::field_attributes::deserialize_option_number_from_string;
use uuid::Uuid;

use super::{MessageBody, error_response};
use crate::{
    domain::RecipientEmail,
    email_client::{DeliveryError, OutgoingEmail, SmtpAccountConfig, SmtpClient, sender_mailbox},
    registry::{Account, AccountDetails, AccountKind, AccountView, ProbeError},
    startup::AppState,
};

const TEST_SUBJECT: &str = "Test Email from Email Automation System";

fn test_body(kind: AccountKind) -> &'static str {
    match kind {
        AccountKind::Gmail => "This is a test email to verify your Gmail account connection.",
        AccountKind::Smtp => {
            "This is a test email to verify your SMTP configuration is working correctly."
        }
    }
}

fn short_label(kind: AccountKind) -> &'static str {
    match kind {
        AccountKind::Gmail => "Gmail",
        AccountKind::Smtp => "SMTP",
    }
}

#[derive(Deserialize)]
pub struct SmtpAccountData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub host: String,
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: Option<SecretString>,
    #[serde(default, alias = "useSsl")]
    pub use_ssl: bool,
}

#[derive(Debug)]
pub struct NewSmtpAccount {
    pub name: String,
    pub email: RecipientEmail,
    pub config: SmtpAccountConfig,
}

impl TryFrom<SmtpAccountData> for NewSmtpAccount {
    type Error = AccountsError;

    fn try_from(value: SmtpAccountData) -> Result<Self, Self::Error> {
        let password = value
            .password
            .filter(|p| !p.expose_secret().trim().is_empty())
            .ok_or(AccountsError::MissingFields)?;
        let port = value.port.filter(|p| *p != 0).ok_or(AccountsError::MissingFields)?;
        let blank = [&value.name, &value.email, &value.host, &value.username]
            .iter()
            .any(|field| field.trim().is_empty());
        if blank {
            return Err(AccountsError::MissingFields);
        }
        let email = RecipientEmail::parse(value.email).map_err(AccountsError::InvalidAccount)?;
        Ok(Self {
            name: value.name.trim().to_owned(),
            email,
            config: SmtpAccountConfig {
                host: value.host.trim().to_owned(),
                port,
                username: value.username.trim().to_owned(),
                password,
                use_ssl: value.use_ssl,
            },
        })
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct AccountAdded {
    pub message: String,
    pub id: Uuid,
}

#[derive(Serialize, Debug)]
pub struct AccountList {
    pub accounts: Vec<AccountView>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TestAccountBody {
    #[serde(default, alias = "account_id")]
    pub account_id: Option<String>,
    #[serde(default, alias = "test_email")]
    pub test_email: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum AccountsError {
    #[error("All fields are required")]
    MissingFields,
    #[error("{0}")]
    InvalidAccount(String),
    #[error("Account ID is required")]
    MissingAccountId,
    #[error("Account not found")]
    NotFound,
    #[error("Valid account ID is required")]
    InvalidAccountId,
    #[error("Test email address is required")]
    MissingTestEmail,
    #[error("{0}")]
    InvalidTestEmail(String),
    #[error("{} Error: {source}", .kind.label())]
    Transport {
        kind: AccountKind,
        source: DeliveryError,
    },
}

impl IntoResponse for AccountsError {
    fn into_response(self) -> Response {
        tracing::error!("{}", self);
        let status = match &self {
            AccountsError::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::BAD_REQUEST,
        };
        error_response(status, self)
    }
}

pub async fn list_accounts(State(app_state): State<Arc<AppState>>) -> Json<AccountList> {
    let accounts = app_state.registry.list().iter().map(Account::view).collect();
    Json(AccountList { accounts })
}

#[tracing::instrument(
    name = "Adding an SMTP account",
    skip(app_state, body),
    fields(email = %body.email, host = %body.host)
)]
pub async fn add_smtp_account(
    State(app_state): State<Arc<AppState>>,
    Json(body): Json<SmtpAccountData>,
) -> Result<Json<AccountAdded>, AccountsError> {
    let new_account = NewSmtpAccount::try_from(body)?;
    let transport_error = |source: DeliveryError| AccountsError::Transport {
        kind: AccountKind::Smtp,
        source,
    };

    let sender =
        sender_mailbox(&new_account.name, new_account.email.as_ref()).map_err(transport_error)?;
    let client =
        SmtpClient::new(&new_account.config, sender, &app_state.smtp).map_err(transport_error)?;

    let details = AccountDetails::Smtp {
        host: new_account.config.host.clone(),
        port: new_account.config.port,
        username: new_account.config.username.clone(),
        use_ssl: new_account.config.use_ssl,
    };
    let id = app_state.registry.insert(Account::new(
        details,
        new_account.name,
        new_account.email.as_ref().to_owned(),
        Arc::new(client),
    ));

    Ok(Json(AccountAdded {
        message: "SMTP account added successfully".into(),
        id,
    }))
}

#[tracing::instrument(name = "Deleting an account", skip(app_state))]
pub async fn delete_account(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MessageBody>, AccountsError> {
    let id = Uuid::parse_str(&id).map_err(|_| AccountsError::NotFound)?;
    app_state
        .registry
        .remove(id)
        .ok_or(AccountsError::NotFound)?;
    Ok(MessageBody::new("Account deleted successfully"))
}

/// Verifies the account (updating its connection flag) and optionally sends a test message.
#[tracing::instrument(name = "Testing an account", skip(app_state, body), fields(account_id = ?body.account_id))]
pub async fn test_account(
    State(app_state): State<Arc<AppState>>,
    Json(body): Json<TestAccountBody>,
) -> Result<Json<MessageBody>, AccountsError> {
    let raw_id = body
        .account_id
        .filter(|id| !id.trim().is_empty())
        .ok_or(AccountsError::MissingAccountId)?;
    let account = Uuid::parse_str(raw_id.trim())
        .ok()
        .and_then(|id| app_state.registry.get(id))
        .ok_or(AccountsError::NotFound)?;
    let kind = account.kind();

    app_state
        .registry
        .probe(account.id)
        .await
        .map_err(|e| match e {
            ProbeError::UnknownAccount => AccountsError::NotFound,
            ProbeError::Delivery(source) => AccountsError::Transport { kind, source },
        })?;

    if let Some(test_email) = body.test_email.filter(|e| !e.trim().is_empty()) {
        send_test_message(&account, test_email).await?;
    }

    tracing::info!(email = %account.address, "account tested successfully");
    Ok(MessageBody::new(format!(
        "{} account connection successful",
        short_label(kind)
    )))
}

/// Sends the fixed test message without touching the connection flag.
#[tracing::instrument(name = "Sending a test email", skip(app_state, body), fields(account_id = ?body.account_id))]
pub async fn send_test_email(
    State(app_state): State<Arc<AppState>>,
    Json(body): Json<TestAccountBody>,
) -> Result<Json<MessageBody>, AccountsError> {
    let test_email = body
        .test_email
        .filter(|e| !e.trim().is_empty())
        .ok_or(AccountsError::MissingTestEmail)?;
    let account = body
        .account_id
        .and_then(|id| Uuid::parse_str(id.trim()).ok())
        .and_then(|id| app_state.registry.get(id))
        .ok_or(AccountsError::InvalidAccountId)?;

    send_test_message(&account, test_email).await?;
    Ok(MessageBody::new(format!(
        "Test email sent successfully via {}",
        account.kind().label()
    )))
}

async fn send_test_message(account: &Account, to: String) -> Result<(), AccountsError> {
    let kind = account.kind();
    let email = OutgoingEmail {
        to: RecipientEmail::parse(to).map_err(AccountsError::InvalidTestEmail)?,
        to_name: None,
        subject: TEST_SUBJECT.into(),
        body: test_body(kind).into(),
        attachments: Vec::new(),
    };
    account
        .transport
        .send(&email)
        .await
        .map_err(|source| AccountsError::Transport { kind, source })?;
    tracing::info!(to = %email.to, from = %account.address, "test email sent");
    Ok(())
}
