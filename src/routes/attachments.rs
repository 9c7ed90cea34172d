use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use lettre::message::header::ContentType;
use serde::{Deserialize, Serialize};

use super::{MessageBody, error_response};
use crate::{
    domain::{Attachment, AttachmentSummary, DEFAULT_CONTENT_TYPE},
    startup::AppState,
};

#[derive(Serialize, Deserialize, Debug)]
pub struct AttachmentUploaded {
    pub message: String,
    pub filename: String,
}

#[derive(Serialize, Debug)]
pub struct AttachmentList {
    pub attachments: Vec<AttachmentSummary>,
}

#[derive(Deserialize, Debug)]
pub struct DeleteAttachmentBody {
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum AttachmentsError {
    #[error("No file part")]
    NoFilePart,
    #[error("{0}")]
    Invalid(String),
    #[error("Failed to read the upload: {0}")]
    Upload(#[from] MultipartError),
    #[error("No filename provided")]
    MissingFilename,
    #[error("File not found")]
    NotFound,
}

impl IntoResponse for AttachmentsError {
    fn into_response(self) -> Response {
        tracing::error!("{}", self);
        let status = match &self {
            AttachmentsError::NotFound => StatusCode::NOT_FOUND,
            AttachmentsError::Upload(e) => e.status(),
            AttachmentsError::NoFilePart
            | AttachmentsError::Invalid(_)
            | AttachmentsError::MissingFilename => StatusCode::BAD_REQUEST,
        };
        error_response(status, self)
    }
}

/// Stores the multipart field `file`, replacing an upload with the same name.
#[tracing::instrument(name = "Uploading an attachment", skip(app_state, multipart))]
pub async fn upload_attachment(
    State(app_state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<AttachmentUploaded>, AttachmentsError> {
    let attachment = loop {
        let Some(field) = multipart.next_field().await? else {
            return Err(AttachmentsError::NoFilePart);
        };
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_owned();
        let content_type = field
            .content_type()
            .filter(|t| ContentType::parse(t).is_ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_owned();
        let content = field.bytes().await?;
        break Attachment::parse(&filename, Some(&content_type), content.to_vec())
            .map_err(AttachmentsError::Invalid)?;
    };

    let filename = attachment.filename().to_owned();
    tracing::info!(%filename, size = attachment.size(), "attachment stored");
    app_state.attachments.write().upsert(attachment);

    Ok(Json(AttachmentUploaded {
        message: "Attachment uploaded successfully!".into(),
        filename,
    }))
}

pub async fn get_attachments(State(app_state): State<Arc<AppState>>) -> Json<AttachmentList> {
    let attachments = app_state.attachments.read().summaries();
    Json(AttachmentList { attachments })
}

#[tracing::instrument(name = "Deleting an attachment", skip(app_state))]
pub async fn delete_attachment(
    State(app_state): State<Arc<AppState>>,
    Json(body): Json<DeleteAttachmentBody>,
) -> Result<Json<MessageBody>, AttachmentsError> {
    let filename = body
        .filename
        .map(|f| f.trim().to_owned())
        .filter(|f| !f.is_empty())
        .ok_or(AttachmentsError::MissingFilename)?;

    app_state
        .attachments
        .write()
        .remove(&filename)
        .ok_or(AttachmentsError::NotFound)?;
    Ok(MessageBody::new(format!(
        "Attachment {} deleted successfully",
        filename
    )))
}
