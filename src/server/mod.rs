//! HTTP 网关边界
//!
//! 一条入站请求对应一条出站后端连接和一个独立的流转换管道，请求
//! 之间不共享任何可变状态。处理流程：收齐请求体 → 解析 → 转换 →
//! 发往后端 → 把后端 SSE 重组为客户端 SSE 逐块回写。
//!
//! 凭证只做转发不做校验：入站的 Authorization / x-api-key / api-key
//! 互相补齐后原样带给后端，环境变量 `CODEX_API_KEY` 存在时强制覆盖。
//! 客户端断开时响应体流被 drop，reqwest 连接随之中止，后端不会白跑。

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::models::MessagesRequest;
use crate::stream::reframe;
use crate::translator::{transform, SkillResolver};

/// 请求体上限，Claude Code 的长会话带图片也用不到 50MB
const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// 进程级共享状态，全部只读
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub client: reqwest::Client,
    pub resolver: Arc<dyn SkillResolver>,
}

impl AppState {
    pub fn new(config: GatewayConfig, resolver: Arc<dyn SkillResolver>) -> Self {
        Self {
            config: Arc::new(config),
            client: reqwest::Client::new(),
            resolver,
        }
    }
}

/// 构建路由：两个路径都指向同一个处理器，兼容带 /v1 前缀的客户端
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/messages", post(handle_messages))
        .route("/messages", post(handle_messages))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

/// 从入站头里凑出出站的 Authorization / x-api-key 头对
///
/// 两种认证方式互相补齐：只有 api key 时合成 Bearer 头，只有
/// Bearer 头时拆出 api key。两者都没有才算缺凭证。
fn forward_credentials(headers: &HeaderMap) -> Result<(String, String), GatewayError> {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string()
    };

    let mut auth = header_str("authorization");
    let mut api_key = header_str("x-api-key");
    if api_key.is_empty() {
        api_key = header_str("api-key");
    }

    if let Ok(forced) = std::env::var("CODEX_API_KEY") {
        if !forced.is_empty() {
            api_key = forced;
            auth = format!("Bearer {api_key}");
        }
    }

    if auth.is_empty() && !api_key.is_empty() {
        auth = format!("Bearer {api_key}");
    }
    if api_key.is_empty() && !auth.is_empty() {
        api_key = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .unwrap_or(&auth)
            .trim()
            .to_string();
    }

    if auth.is_empty() && api_key.is_empty() {
        return Err(GatewayError::MissingCredentials);
    }
    Ok((auth, api_key))
}

async fn handle_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match proxy_messages(&state, &headers, &body).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn proxy_messages(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, GatewayError> {
    let request: MessagesRequest = serde_json::from_slice(body)
        .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;

    tracing::info!(
        "[GATEWAY] Inbound request: model={:?} messages={} tools={}",
        request.model,
        request.messages.len(),
        request.tools.as_ref().map(|t| t.len()).unwrap_or(0)
    );

    let (auth, api_key) = forward_credentials(headers)?;

    // 工作目录从用户消息里猜测（见 translator::request），这里不提供提示
    let outcome = transform(&request, &state.config, state.resolver.as_ref(), None);

    let anthropic_version = headers
        .get("x-anthropic-version")
        .or_else(|| headers.get("anthropic-version"))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("2023-06-01");

    let upstream = state
        .client
        .post(&state.config.target_url)
        .header(header::AUTHORIZATION, &auth)
        .header("x-api-key", &api_key)
        .header(header::USER_AGENT, "Anthropic-Node/0.3.4")
        .header("x-anthropic-version", anthropic_version)
        .header("originator", "codex_cli_rs")
        .header(header::ACCEPT, "text/event-stream")
        .header("conversation_id", &outcome.session_id)
        .header("session_id", &outcome.session_id)
        .json(&outcome.request)
        .send()
        .await
        .map_err(|e| GatewayError::Connect(e.to_string()))?;

    let status = upstream.status();
    if !status.is_success() {
        // 非 2xx 原样透传，状态码和响应体都不改写
        let error_body = upstream.bytes().await.unwrap_or_default();
        tracing::warn!(
            "[GATEWAY] Upstream returned {} ({} bytes)",
            status,
            error_body.len()
        );
        return Ok(Response::builder()
            .status(StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(error_body))
            .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response()));
    }

    tracing::info!(
        "[GATEWAY] Streaming response started: session={} model={}",
        outcome.session_id,
        outcome.request.model
    );

    // message_start 里展示的模型名用客户端请求的名字，保持客户端视角一致
    let display_model = request
        .model
        .clone()
        .unwrap_or_else(|| state.config.default_model.clone());
    let sse = reframe(upstream.bytes_stream(), display_model);

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header("X-Accel-Buffering", "no")
        .body(Body::from_stream(sse))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()))
}
