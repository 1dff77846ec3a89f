//! HTTP Middleware
//!
//! API 密钥校验与错误状态日志

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use super::dto::ErrorResponse;
use super::state::AppState;

/// TTS 接口鉴权
///
/// 配置了 api_key 时，要求 `api_key` 查询参数或 `Authorization` 头
/// 携带该密钥；未配置时直接放行
pub async fn tts_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let expected = &state.config.tts.api_key;
    if expected.is_empty() {
        return next.run(request).await;
    }

    let query_key = query_param(request.uri().query().unwrap_or(""), "api_key");
    let header_key = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start_matches("Bearer ").to_string());

    let authorized = query_key.as_deref() == Some(expected.as_str())
        || header_key.as_deref() == Some(expected.as_str());

    if !authorized {
        tracing::warn!(uri = %request.uri(), "Rejected request with invalid api key");
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "invalid api key".to_string(),
            }),
        )
            .into_response();
    }

    next.run(request).await
}

/// OpenAI 兼容接口鉴权（Bearer）
pub async fn openai_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let expected = &state.config.openai.api_key;
    if expected.is_empty() {
        return next.run(request).await;
    }

    let bearer = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    if bearer != Some(expected.as_str()) {
        tracing::warn!(uri = %request.uri(), "Rejected OpenAI request with invalid bearer token");
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "invalid api key".to_string(),
            }),
        )
            .into_response();
    }

    next.run(request).await
}

/// HTTP 状态码错误日志中间件
///
/// 拦截响应，4xx 记 warn，5xx 记 error
pub async fn error_logging(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;
    let status = response.status();

    if status.is_server_error() {
        tracing::error!(
            method = %method,
            uri = %uri,
            status = status.as_u16(),
            "HTTP server error"
        );
    } else if status.is_client_error() {
        tracing::warn!(
            method = %method,
            uri = %uri,
            status = status.as_u16(),
            "HTTP client error"
        );
    }

    response
}

/// 从查询字符串中取参数值（不做百分号解码）
fn query_param(query: &str, name: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key == name {
            Some(value.to_string())
        } else {
            None
        }
    })
}
