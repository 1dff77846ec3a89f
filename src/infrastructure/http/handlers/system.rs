//! System Handlers - 健康检查与指标

use axum::{extract::State, Json};
use std::sync::Arc;

use super::super::dto::{HealthResponse, MetricsResponse, PoolMetricsSummary};
use super::super::state::AppState;

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// GET /metrics - 进程/缓存/工作池指标快照
pub async fn metrics(State(state): State<Arc<AppState>>) -> Json<MetricsResponse> {
    let pool = state.long_text.pool_metrics();

    Json(MetricsResponse {
        process: state.metrics.snapshot(),
        cache: state.cache.as_ref().map(|cache| cache.stats()),
        pool: PoolMetricsSummary {
            total_jobs: pool.total(),
            completed_jobs: pool.completed(),
            failed_jobs: pool.failed(),
            avg_latency_ms: pool.average_latency().as_millis() as f64,
        },
    })
}

/// POST /metrics/reset
pub async fn reset_metrics(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    state.metrics.reset();
    tracing::info!("Process metrics reset");
    Json(HealthResponse { status: "ok" })
}
