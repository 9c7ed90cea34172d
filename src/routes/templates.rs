use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use super::{MessageBody, error_response};
use crate::{
    domain::{Template, TemplateError, TemplateSet},
    startup::AppState,
};

#[derive(Deserialize, Debug)]
pub struct SaveTemplatesBody {
    #[serde(default)]
    pub templates: Vec<Template>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct TemplateList {
    pub templates: Vec<Template>,
}

#[derive(thiserror::Error, Debug)]
pub enum TemplatesError {
    #[error(transparent)]
    Invalid(#[from] TemplateError),
}

impl IntoResponse for TemplatesError {
    fn into_response(self) -> Response {
        tracing::error!("{}", self);
        error_response(StatusCode::BAD_REQUEST, self)
    }
}

#[tracing::instrument(
    name = "Saving templates",
    skip(app_state, body),
    fields(templates = body.templates.len())
)]
pub async fn save_templates(
    State(app_state): State<Arc<AppState>>,
    Json(body): Json<SaveTemplatesBody>,
) -> Result<Json<MessageBody>, TemplatesError> {
    let templates = TemplateSet::parse(body.templates)?;
    *app_state.templates.write() = templates;
    Ok(MessageBody::new("Email templates saved successfully!"))
}

pub async fn get_templates(State(app_state): State<Arc<AppState>>) -> Json<TemplateList> {
    let templates = app_state.templates.read().templates().to_vec();
    Json(TemplateList { templates })
}
