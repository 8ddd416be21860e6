//! HTTP mapping for request-terminating errors.
//!
//! Only invalid input and prerequisite failures end a scrape early. Every
//! other failure is absorbed per query and still renders a 200.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use chainscrape_core::error::{ClientCode, ExporterError};

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub ExporterError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.client_code() {
            ClientCode::InvalidInput => StatusCode::BAD_REQUEST,
            ClientCode::PrerequisiteFailed => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Label value for the `outcome` self-metric.
    pub fn outcome(&self) -> &'static str {
        match self.0.client_code() {
            ClientCode::InvalidInput => "rejected_invalid_input",
            ClientCode::PrerequisiteFailed => "rejected_prerequisite",
            _ => "error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.0.client_code().as_str(),
            "message": self.0.to_string(),
        }));
        (self.status(), body).into_response()
    }
}
