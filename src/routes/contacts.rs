use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use super::error_response;
use crate::{
    domain::{Recipient, RecipientEmail, RecipientName, RecipientQueue},
    startup::AppState,
};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ContactData {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

impl TryFrom<ContactData> for Recipient {
    type Error = String;

    fn try_from(value: ContactData) -> Result<Self, Self::Error> {
        let email = RecipientEmail::parse(value.email)?;
        // A blank name column means "no name", not an invalid one.
        let name = value
            .name
            .filter(|name| !name.trim().is_empty())
            .map(RecipientName::parse)
            .transpose()
            .map_err(|e| format!("{email}: {e}"))?;
        Ok(Recipient::new(email, name, value.language))
    }
}

impl From<&Recipient> for ContactData {
    fn from(recipient: &Recipient) -> Self {
        Self {
            email: recipient.email.as_ref().to_owned(),
            name: recipient.name.as_ref().map(|n| n.as_ref().to_owned()),
            language: Some(recipient.template_key.clone()),
        }
    }
}

/// Validates every contact and builds the run order.
pub fn parse_contacts(contacts: Vec<ContactData>) -> Result<RecipientQueue, String> {
    let recipients = contacts
        .into_iter()
        .map(Recipient::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    RecipientQueue::parse(recipients)
}

#[derive(Deserialize, Debug)]
pub struct SaveContactsBody {
    #[serde(default)]
    pub contacts: Vec<ContactData>,
}

#[derive(Serialize, Debug)]
pub struct ContactsSaved {
    pub message: String,
    pub total: usize,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ContactList {
    pub contacts: Vec<ContactData>,
}

#[derive(thiserror::Error, Debug)]
pub enum ContactsError {
    #[error("invalid contact, {0}")]
    InvalidContact(String),
}

impl IntoResponse for ContactsError {
    fn into_response(self) -> Response {
        tracing::error!("{}", self);
        error_response(StatusCode::BAD_REQUEST, self)
    }
}

#[tracing::instrument(
    name = "Saving contacts",
    skip(app_state, body),
    fields(contacts = body.contacts.len())
)]
pub async fn save_contacts(
    State(app_state): State<Arc<AppState>>,
    Json(body): Json<SaveContactsBody>,
) -> Result<Json<ContactsSaved>, ContactsError> {
    let queue = parse_contacts(body.contacts).map_err(ContactsError::InvalidContact)?;
    let total = queue.len();
    *app_state.contacts.write() = queue;
    tracing::info!(total, "contacts saved");
    Ok(Json(ContactsSaved {
        message: "Contacts saved successfully!".into(),
        total,
    }))
}

pub async fn get_contacts(State(app_state): State<Arc<AppState>>) -> Json<ContactList> {
    let contacts = app_state.contacts.read().iter().map(ContactData::from).collect();
    Json(ContactList { contacts })
}
