//! HTTP mapping of the shared error type.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use vigil_core::{ClientCode, VigilError};

/// `VigilError` as an axum response: `{"error": CODE, "message": text}`.
#[derive(Debug)]
pub struct ApiError(pub VigilError);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<VigilError> for ApiError {
    fn from(e: VigilError) -> Self {
        Self(e)
    }
}

pub fn status_of(code: ClientCode) -> StatusCode {
    match code {
        ClientCode::BadRequest | ClientCode::Integrity => StatusCode::BAD_REQUEST,
        ClientCode::NotFound => StatusCode::NOT_FOUND,
        ClientCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        ClientCode::Unsupported => StatusCode::NOT_IMPLEMENTED,
        ClientCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ClientCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.client_code();
        let body = Json(json!({
            "error": code.as_str(),
            "message": self.0.to_string(),
        }));
        (status_of(code), body).into_response()
    }
}
