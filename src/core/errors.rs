use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("rate limit exceeded")]
    TooManyRequests,
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let message = match &self {
            ApiError::TooManyRequests => {
                "Rate limit exceeded. Please try again in a minute.".to_string()
            }
            ApiError::BadRequest(msg) | ApiError::Upstream(msg) | ApiError::Internal(msg) => {
                msg.clone()
            }
            ApiError::Timeout(_) => self.to_string(),
        };

        let body = Json(json!({ "success": false, "error": message }));
        (status, body).into_response()
    }
}
