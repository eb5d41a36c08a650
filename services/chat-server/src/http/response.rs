//! Uniform REST envelope: `{code, message, data?}` where code 200 is success,
//! 400 carries a user-visible failure message, and 500 is a generic system
//! error with the details kept in the logs.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::error::ChatError;

#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

pub fn ok(message: impl Into<String>, data: Option<serde_json::Value>) -> Response {
    (
        StatusCode::OK,
        Json(Envelope {
            code: 200,
            message: message.into(),
            data,
        }),
    )
        .into_response()
}

pub fn user_failure(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(Envelope {
            code: 400,
            message: message.into(),
            data: None,
        }),
    )
        .into_response()
}

pub fn system_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(Envelope {
            code: 500,
            message: "internal server error".to_owned(),
            data: None,
        }),
    )
        .into_response()
}

pub fn from_error(err: &ChatError) -> Response {
    match err {
        ChatError::UserVisible(message) => user_failure(message.clone()),
        other => {
            tracing::error!(error = %other, "request failed");
            system_error()
        }
    }
}
