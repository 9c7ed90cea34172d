mod accounts;
mod attachments;
mod campaign;
mod contacts;
mod health_check;
mod oauth;
mod templates;

pub use accounts::*;
pub use attachments::*;
pub use campaign::*;
pub use contacts::*;
pub use health_check::*;
pub use oauth::*;
pub use templates::*;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Serialize, Debug)]
pub struct MessageBody {
    pub message: String,
}

impl MessageBody {
    pub fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

/// `{ "error": ... }` with the given status.
fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
        }),
    )
        .into_response()
}
