use std::{sync::Arc, time::Duration};

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_aux::field_attributes::deserialize_option_number_from_string;
use tracing::Instrument;
use uuid::Uuid;

use super::{ContactData, MessageBody, error_response, parse_contacts};
use crate::{
    campaign::{CampaignRequest, CampaignStatus, StartError, StatusError},
    configuration::CampaignDefaults,
    domain::CampaignSettings,
    startup::AppState,
};

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailsBody {
    #[serde(default)]
    pub subject: String,
    #[serde(
        default,
        alias = "pause_between_messages",
        deserialize_with = "deserialize_option_number_from_string"
    )]
    pub pause_between_messages: Option<u64>,
    #[serde(
        default,
        alias = "pause_between_blocks",
        deserialize_with = "deserialize_option_number_from_string"
    )]
    pub pause_between_blocks: Option<u64>,
    #[serde(
        default,
        alias = "messages_per_block",
        deserialize_with = "deserialize_option_number_from_string"
    )]
    pub messages_per_block: Option<usize>,
    #[serde(
        default,
        alias = "max_connections",
        deserialize_with = "deserialize_option_number_from_string"
    )]
    pub max_connections: Option<usize>,
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    pub retries: Option<u32>,
    #[serde(
        default,
        alias = "selectedAccountIds",
        alias = "selected_accounts",
        alias = "selected_account_ids"
    )]
    pub selected_accounts: Vec<String>,
    /// Overrides the saved contacts for this run.
    #[serde(default)]
    pub contacts: Option<Vec<ContactData>>,
}

impl SendEmailsBody {
    fn settings(&self, defaults: &CampaignDefaults) -> Result<CampaignSettings, CampaignError> {
        let selected_account_ids = self
            .selected_accounts
            .iter()
            .map(|id| {
                Uuid::parse_str(id.trim()).map_err(|_| CampaignError::UnknownAccount(id.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CampaignSettings {
            subject: self.subject.trim().to_owned(),
            pause_between_messages: Duration::from_secs(
                self.pause_between_messages
                    .unwrap_or(defaults.pause_between_messages_seconds),
            ),
            pause_between_blocks: Duration::from_secs(
                self.pause_between_blocks
                    .unwrap_or(defaults.pause_between_blocks_seconds),
            ),
            messages_per_block: self.messages_per_block.unwrap_or(defaults.messages_per_block),
            max_connections: self.max_connections.unwrap_or(defaults.max_connections),
            retries: self.retries.unwrap_or(defaults.retries),
            selected_account_ids,
        })
    }
}

#[derive(Serialize, Debug)]
pub struct CampaignStarted {
    pub message: String,
    pub total: usize,
}

#[derive(thiserror::Error, Debug)]
pub enum CampaignError {
    #[error(transparent)]
    Start(#[from] StartError),
    #[error("Account ID {0} not found")]
    UnknownAccount(String),
    #[error("invalid contact, {0}")]
    InvalidContacts(String),
    #[error(transparent)]
    Status(#[from] StatusError),
    #[error("No campaign is running")]
    NotRunning,
}

impl IntoResponse for CampaignError {
    fn into_response(self) -> Response {
        tracing::error!("{}", self);
        let status = match &self {
            CampaignError::Start(StartError::Status(_))
            | CampaignError::Status(_)
            | CampaignError::NotRunning => StatusCode::CONFLICT,
            CampaignError::Start(_)
            | CampaignError::UnknownAccount(_)
            | CampaignError::InvalidContacts(_) => StatusCode::BAD_REQUEST,
        };
        error_response(status, self)
    }
}

#[tracing::instrument(
    name = "Starting a campaign",
    skip(app_state, body),
    fields(
        subject = %body.subject,
        selected_accounts = body.selected_accounts.len()
    )
)]
pub async fn send_emails(
    State(app_state): State<Arc<AppState>>,
    Json(body): Json<SendEmailsBody>,
) -> Result<Json<CampaignStarted>, CampaignError> {
    let settings = body.settings(&app_state.campaign_defaults)?;
    let recipients = match body.contacts {
        Some(contacts) => parse_contacts(contacts).map_err(CampaignError::InvalidContacts)?,
        None => app_state.contacts.read().clone(),
    };
    let templates = app_state.templates.read().clone();
    let attachments = app_state.attachments.read().to_vec();
    let total = recipients.len();

    let run = app_state.dispatcher.start(CampaignRequest {
        settings,
        recipients,
        templates,
        attachments,
    })?;

    let status = Arc::clone(app_state.dispatcher.status());
    tokio::spawn(
        async move {
            match run.await {
                Ok(report) => tracing::debug!(
                    attempts = report.attempts.len(),
                    stopped = report.stopped,
                    "campaign run joined"
                ),
                Err(e) => {
                    tracing::error!(error = %e, "campaign task failed");
                    status.finish(Some(format!("Campaign aborted: {e}")));
                }
            }
        }
        .in_current_span(),
    );

    Ok(Json(CampaignStarted {
        message: "Email campaign started!".into(),
        total,
    }))
}

pub async fn campaign_status(State(app_state): State<Arc<AppState>>) -> Json<CampaignStatus> {
    Json(CampaignStatus::clone(&app_state.status().get()))
}

#[tracing::instrument(name = "Resetting campaign status", skip(app_state))]
pub async fn reset_campaign(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<MessageBody>, CampaignError> {
    app_state.status().reset()?;
    Ok(MessageBody::new("Campaign status reset successfully"))
}

#[tracing::instrument(name = "Stopping the running campaign", skip(app_state))]
pub async fn stop_campaign(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<MessageBody>, CampaignError> {
    if !app_state.dispatcher.stop() {
        return Err(CampaignError::NotRunning);
    }
    Ok(MessageBody::new("Campaign stop requested"))
}
