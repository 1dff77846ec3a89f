//! 统一错误分类
//!
//! 上游错误优先按 HTTP 状态码分类；没有状态码时按错误消息中的
//! 关键子串启发式分类

use http::StatusCode;
use thiserror::Error;

/// 合成错误
#[derive(Debug, Clone, Error)]
pub enum SynthesisError {
    /// 参数缺失/冲突/超长
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 上游认证失败（401/403）
    #[error("Upstream auth error: {0}")]
    UpstreamAuth(String),

    /// 上游限流（429）
    #[error("Upstream rate limited: {0}")]
    UpstreamRateLimit(String),

    /// 上游超时
    #[error("Upstream timeout: {0}")]
    UpstreamTimeout(String),

    /// 网络/DNS 错误
    #[error("Upstream network error: {0}")]
    UpstreamNetwork(String),

    /// 上游 5xx 或未分类错误
    #[error("Upstream server error: {0}")]
    UpstreamServer(String),

    /// 资源不存在（如未知任务 ID）
    #[error("Not found: {0}")]
    NotFound(String),

    /// 合并失败等内部错误
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SynthesisError {
    /// 根据上游 HTTP 状态码分类
    ///
    /// `body` 取响应体片段，便于排查
    pub fn from_upstream_status(status: u16, body: &str) -> Self {
        let snippet: String = body.chars().take(200).collect();
        let message = format!("status {}: {}", status, snippet);

        match status {
            401 | 403 => SynthesisError::UpstreamAuth(message),
            429 => SynthesisError::UpstreamRateLimit(message),
            408 => SynthesisError::UpstreamTimeout(message),
            _ => SynthesisError::UpstreamServer(message),
        }
    }

    /// 根据错误消息分类（无状态码时的回退路径）
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if lower.contains("timeout") || lower.contains("deadline") {
            SynthesisError::UpstreamTimeout(message)
        } else if lower.contains("connection") || lower.contains("network") {
            SynthesisError::UpstreamNetwork(message)
        } else if lower.contains("unauthorized") || lower.contains("authentication") {
            SynthesisError::UpstreamAuth(message)
        } else {
            SynthesisError::UpstreamServer(message)
        }
    }

    /// 映射为对外 HTTP 状态码
    pub fn http_status(&self) -> StatusCode {
        match self {
            SynthesisError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            SynthesisError::UpstreamAuth(_)
            | SynthesisError::UpstreamRateLimit(_)
            | SynthesisError::UpstreamTimeout(_)
            | SynthesisError::UpstreamNetwork(_)
            | SynthesisError::UpstreamServer(_) => StatusCode::BAD_GATEWAY,
            SynthesisError::NotFound(_) => StatusCode::NOT_FOUND,
            SynthesisError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 错误是否可重试
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            SynthesisError::UpstreamRateLimit(_)
                | SynthesisError::UpstreamTimeout(_)
                | SynthesisError::UpstreamNetwork(_)
                | SynthesisError::UpstreamServer(_)
        )
    }
}

impl From<reqwest::Error> for SynthesisError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SynthesisError::UpstreamTimeout(err.to_string())
        } else if err.is_connect() {
            SynthesisError::UpstreamNetwork(format!("connection failed: {}", err))
        } else {
            SynthesisError::from_message(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            SynthesisError::from_upstream_status(401, ""),
            SynthesisError::UpstreamAuth(_)
        ));
        assert!(matches!(
            SynthesisError::from_upstream_status(403, ""),
            SynthesisError::UpstreamAuth(_)
        ));
        assert!(matches!(
            SynthesisError::from_upstream_status(429, ""),
            SynthesisError::UpstreamRateLimit(_)
        ));
        assert!(matches!(
            SynthesisError::from_upstream_status(500, ""),
            SynthesisError::UpstreamServer(_)
        ));
        assert!(matches!(
            SynthesisError::from_upstream_status(503, ""),
            SynthesisError::UpstreamServer(_)
        ));
    }

    #[test]
    fn test_message_classification() {
        assert!(matches!(
            SynthesisError::from_message("request Timeout after 30s"),
            SynthesisError::UpstreamTimeout(_)
        ));
        assert!(matches!(
            SynthesisError::from_message("deadline exceeded"),
            SynthesisError::UpstreamTimeout(_)
        ));
        assert!(matches!(
            SynthesisError::from_message("Connection refused"),
            SynthesisError::UpstreamNetwork(_)
        ));
        assert!(matches!(
            SynthesisError::from_message("Unauthorized access"),
            SynthesisError::UpstreamAuth(_)
        ));
        assert!(matches!(
            SynthesisError::from_message("something odd"),
            SynthesisError::UpstreamServer(_)
        ));
    }

    #[test]
    fn test_http_mapping() {
        assert_eq!(
            SynthesisError::InvalidInput("x".into()).http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            SynthesisError::UpstreamServer("x".into()).http_status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            SynthesisError::NotFound("x".into()).http_status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            SynthesisError::Internal("x".into()).http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_retriability() {
        assert!(SynthesisError::UpstreamTimeout("x".into()).is_retriable());
        assert!(SynthesisError::UpstreamRateLimit("x".into()).is_retriable());
        assert!(!SynthesisError::InvalidInput("x".into()).is_retriable());
        assert!(!SynthesisError::UpstreamAuth("x".into()).is_retriable());
    }

    #[test]
    fn test_body_snippet_truncated() {
        let body = "x".repeat(500);
        if let SynthesisError::UpstreamServer(msg) =
            SynthesisError::from_upstream_status(500, &body)
        {
            assert!(msg.len() < 300);
        } else {
            panic!("expected UpstreamServer");
        }
    }
}
