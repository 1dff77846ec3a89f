//! Job Handlers - 异步任务查询

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use crate::application::error::SynthesisError;
use crate::application::ports::JobStatus;

use super::super::dto::{JobPendingResponse, JobStatusResponse};
use super::super::error::ApiError;
use super::super::state::AppState;

/// GET /jobs/:job_id - 查询任务状态
pub async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let job = state
        .job_store
        .get(&job_id)
        .ok_or_else(|| SynthesisError::NotFound(format!("job {} not found", job_id)))?;

    tracing::debug!(
        job_id = %job.id,
        status = job.status.as_str(),
        progress = %job.progress,
        "Job status queried"
    );

    Ok(Json(JobStatusResponse {
        job_id: job.id,
        status: job.status.as_str(),
        progress: job.progress,
        error: job.error,
    }))
}

/// GET /jobs/:job_id/result - 取回任务结果
///
/// 完成返回 200 音频；未完成返回 202；未知任务返回 404
pub async fn job_result(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Response, ApiError> {
    let job = state
        .job_store
        .get(&job_id)
        .ok_or_else(|| SynthesisError::NotFound(format!("job {} not found", job_id)))?;

    if job.status != JobStatus::Complete {
        return Ok((
            StatusCode::ACCEPTED,
            Json(JobPendingResponse {
                status: job.status.as_str(),
                error: "Job not complete",
            }),
        )
            .into_response());
    }

    let audio = job.audio.unwrap_or_default();
    tracing::info!(job_id = %job.id, audio_size = audio.len(), "Serving job result");

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "audio/mpeg")
        .header(header::CONTENT_LENGTH, audio.len())
        .body(Body::from(audio))
        .unwrap())
}
