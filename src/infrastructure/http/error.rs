//! HTTP Error Handling
//!
//! 统一错误信封：JSON `{"error": "<message>"}` + 按错误类别映射状态码

use axum::{
    response::{IntoResponse, Response},
    Json,
};

use crate::application::error::SynthesisError;

use super::dto::ErrorResponse;

/// API 错误
///
/// 包装 SynthesisError 并实现 IntoResponse
#[derive(Debug)]
pub struct ApiError(pub SynthesisError);

impl From<SynthesisError> for ApiError {
    fn from(err: SynthesisError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.http_status();
        let message = self.0.to_string();

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %message, "Request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %message, "Request rejected");
        }

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
