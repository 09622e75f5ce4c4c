//! 网关错误类型
//!
//! 只有边界条件才是对客户端可见的硬错误：请求体解析失败、缺凭证、
//! 后端连不上。后端的非 2xx 响应不算错误，状态码和响应体原样透传，
//! 不做二次解释。规范化层的异常一律降级处理，不会走到这里。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// 请求体不是合法 JSON，原样带上解析错误信息
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// 既没有 Authorization 也没有 api key 头
    #[error("missing API key")]
    MissingCredentials,

    /// 后端网络层失败（连接、TLS、读写）
    #[error("upstream connection failed: {0}")]
    Connect(String),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match self {
            GatewayError::InvalidRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": { "message": message } })),
            )
                .into_response(),
            GatewayError::MissingCredentials => (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": { "type": "unauthorized", "message": "Missing API key" }
                })),
            )
                .into_response(),
            GatewayError::Connect(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": { "message": message } })),
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            GatewayError::InvalidRequest("bad".into())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::MissingCredentials.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::Connect("refused".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
