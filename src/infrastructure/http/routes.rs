//! HTTP Routes
//!
//! API Endpoints:
//! - /tts              GET/POST  语音合成（长文本 -> 异步任务 202）
//! - /tts/stream       GET/POST  语音合成（长文本 -> 顺序流式输出）
//! - /api/tts          GET/POST  /tts 的别名（兼容旧客户端）
//! - /jobs/:id         GET       查询任务状态
//! - /jobs/:id/result  GET       取回任务音频
//! - /voices           GET       列出可用语音（locale 前缀过滤）
//! - /v1/audio/speech  POST      OpenAI 兼容接口
//! - /audio/speech     POST      OpenAI 兼容接口别名
//! - /health           GET       健康检查
//! - /metrics          GET       指标快照
//! - /metrics/reset    POST      重置指标

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::middleware as mw;
use super::state::AppState;

/// 创建所有路由
pub fn create_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .merge(tts_routes(state.clone()))
        .merge(openai_routes(state))
        .route("/jobs/:job_id", get(handlers::job_status))
        .route("/jobs/:job_id/result", get(handlers::job_result))
        .route("/voices", get(handlers::list_voices))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/metrics/reset", post(handlers::reset_metrics))
}

/// TTS 路由（带 api_key 鉴权）
fn tts_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/tts",
            get(handlers::synthesize_get).post(handlers::synthesize_post),
        )
        .route(
            "/tts/stream",
            get(handlers::stream_get).post(handlers::stream_post),
        )
        .route(
            "/api/tts",
            get(handlers::synthesize_get).post(handlers::synthesize_post),
        )
        .route_layer(middleware::from_fn_with_state(state, mw::tts_auth))
}

/// OpenAI 兼容路由（带 Bearer 鉴权）
fn openai_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/audio/speech", post(handlers::openai_speech))
        .route("/audio/speech", post(handlers::openai_speech))
        .route_layer(middleware::from_fn_with_state(state, mw::openai_auth))
}
