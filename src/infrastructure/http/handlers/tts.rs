//! TTS Handlers - 请求分发
//!
//! 决策逻辑（缓存未命中后）：
//! - SSML 或文本长度 <= 分段阈值：同步路径，整块返回
//! - 长文本 + /tts：创建异步任务，返回 202
//! - 长文本 + /tts/stream：按片段索引顺序流式返回

use axum::{
    body::Body,
    extract::{FromRequest, Query, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::application::error::SynthesisError;
use crate::domain::speech::SpeechRequest;

use super::super::dto::AcceptedResponse;
use super::super::error::ApiError;
use super::super::state::AppState;

/// GET 查询参数（短参数名与历史客户端保持一致）
#[derive(Debug, Default, Deserialize)]
pub struct TtsQuery {
    /// 文本
    #[serde(default)]
    pub t: String,
    /// SSML
    #[serde(default)]
    pub ssml: String,
    /// 语音
    #[serde(default)]
    pub v: String,
    /// 语速
    #[serde(default)]
    pub r: String,
    /// 语调
    #[serde(default)]
    pub p: String,
    /// 风格
    #[serde(default)]
    pub s: String,
}

impl From<TtsQuery> for SpeechRequest {
    fn from(q: TtsQuery) -> Self {
        SpeechRequest {
            text: q.t,
            ssml: q.ssml,
            voice: q.v,
            rate: q.r,
            pitch: q.p,
            style: q.s,
            format: String::new(),
        }
    }
}

/// 分发模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DispatchMode {
    /// 长文本走异步任务
    Standard,
    /// 长文本走顺序流式输出
    Streaming,
}

pub async fn synthesize_get(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TtsQuery>,
) -> Result<Response, ApiError> {
    dispatch(state, query.into(), DispatchMode::Standard).await
}

pub async fn synthesize_post(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Response, ApiError> {
    let speech = parse_body(request).await?;
    dispatch(state, speech, DispatchMode::Standard).await
}

pub async fn stream_get(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TtsQuery>,
) -> Result<Response, ApiError> {
    dispatch(state, query.into(), DispatchMode::Streaming).await
}

pub async fn stream_post(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Response, ApiError> {
    let speech = parse_body(request).await?;
    dispatch(state, speech, DispatchMode::Streaming).await
}

/// 从 POST 体解析请求：JSON 或表单
async fn parse_body(request: Request) -> Result<SpeechRequest, ApiError> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if content_type.starts_with("application/json") {
        let Json(speech) = Json::<SpeechRequest>::from_request(request, &())
            .await
            .map_err(|e| SynthesisError::InvalidInput(format!("invalid JSON body: {}", e)))?;
        Ok(speech)
    } else {
        let Form(speech) = Form::<SpeechRequest>::from_request(request, &())
            .await
            .map_err(|e| SynthesisError::InvalidInput(format!("invalid form body: {}", e)))?;
        Ok(speech)
    }
}

/// 核心分发逻辑
pub(crate) async fn dispatch(
    state: Arc<AppState>,
    mut speech: SpeechRequest,
    mode: DispatchMode,
) -> Result<Response, ApiError> {
    validate_and_fill(&state, &mut speech)?;

    let is_long = !speech.is_ssml()
        && state.config.long_text.enabled
        && speech.content_len() > state.config.tts.segment_threshold;

    if !is_long {
        return sync_response(state, speech).await;
    }

    match mode {
        DispatchMode::Standard => Ok(accept_job(state, speech)),
        DispatchMode::Streaming => Ok(stream_response(state, speech)),
    }
}

/// 验证请求并填充默认值
fn validate_and_fill(state: &AppState, speech: &mut SpeechRequest) -> Result<(), ApiError> {
    if speech.text.is_empty() && speech.ssml.is_empty() {
        return Err(SynthesisError::InvalidInput(
            "either text or ssml must be provided".to_string(),
        )
        .into());
    }

    if !speech.text.is_empty() && !speech.ssml.is_empty() {
        return Err(SynthesisError::InvalidInput(
            "text and ssml are mutually exclusive".to_string(),
        )
        .into());
    }

    if speech.voice.is_empty() {
        speech.voice = state.config.tts.default_voice.clone();
    }
    if speech.rate.is_empty() {
        speech.rate = state.config.tts.default_rate.clone();
    }
    if speech.pitch.is_empty() {
        speech.pitch = state.config.tts.default_pitch.clone();
    }

    let length = speech.content_len();
    if length > state.config.tts.max_text_length {
        return Err(SynthesisError::InvalidInput(format!(
            "content length {} exceeds the {} character limit",
            length, state.config.tts.max_text_length
        ))
        .into());
    }

    Ok(())
}

/// 同步路径：整块合成并返回
async fn sync_response(state: Arc<AppState>, speech: SpeechRequest) -> Result<Response, ApiError> {
    let start = Instant::now();
    let cancel = CancellationToken::new();

    let result = state.tts_service.synthesize(&speech, &cancel).await;
    state.metrics.record_request(start.elapsed(), result.is_err());
    let response = result?;

    tracing::info!(
        content_length = speech.content_len(),
        audio_size = response.audio.len(),
        cache_hit = response.cache_hit,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Synthesis request served"
    );

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, response.content_type)
        .header(header::CONTENT_LENGTH, response.audio.len())
        .header("X-Cache", if response.cache_hit { "HIT" } else { "MISS" })
        .body(Body::from(response.audio))
        .unwrap())
}

/// 异步路径：创建任务后台合成，立即返回 202
fn accept_job(state: Arc<AppState>, speech: SpeechRequest) -> Response {
    let job = state.job_store.create();
    tracing::info!(
        job_id = %job.id,
        content_length = speech.content_len(),
        "Created async synthesis job"
    );

    let job_id = job.id.clone();
    let task_state = state.clone();
    tokio::spawn(async move {
        run_synthesis_job(task_state, speech, job_id).await;
    });

    (
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            status: "processing",
            job_id: job.id,
            progress: "0/0".to_string(),
        }),
    )
        .into_response()
}

/// 后台执行异步合成任务
async fn run_synthesis_job(state: Arc<AppState>, speech: SpeechRequest, job_id: String) {
    let start = Instant::now();

    // 缓存命中直接完成任务
    if let Some(cache) = &state.cache {
        if let Some(cached) = cache.peek(&speech) {
            tracing::info!(job_id = %job_id, "Async job served from cache");
            state.job_store.set_complete(&job_id, cached.audio);
            state.metrics.record_request(start.elapsed(), false);
            return;
        }
    }

    // 异步任务不随客户端断连取消，客户端通过轮询取回结果
    let cancel = CancellationToken::new();

    let store = state.job_store.clone();
    let progress_job_id = job_id.clone();
    let progress = move |done: usize, total: usize| {
        store.set_progress(&progress_job_id, &format!("{}/{}", done, total));
    };

    let result = state
        .long_text
        .synthesize_with_progress(&speech, &cancel, Some(&progress))
        .await;
    state.metrics.record_request(start.elapsed(), result.is_err());

    match result {
        Ok(response) => {
            if let Some(cache) = &state.cache {
                cache.store(&speech, &response);
            }
            tracing::info!(
                job_id = %job_id,
                audio_size = response.audio.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Async synthesis job completed"
            );
            state.job_store.set_complete(&job_id, response.audio);
        }
        Err(err) => {
            tracing::error!(job_id = %job_id, error = %err, "Async synthesis job failed");
            state.job_store.set_error(&job_id, &err.to_string());
        }
    }
}

/// 流式路径：body 按片段索引顺序渐进产出
fn stream_response(state: Arc<AppState>, speech: SpeechRequest) -> Response {
    let (tx, rx) = mpsc::channel(8);

    let long_text = state.long_text.clone();
    let metrics = state.metrics.clone();
    tokio::spawn(async move {
        let start = Instant::now();
        // 客户端断连表现为通道接收端关闭，编排层据此中止
        let cancel = CancellationToken::new();
        let result = long_text.synthesize_streaming(&speech, &cancel, tx).await;
        metrics.record_request(start.elapsed(), result.is_err());
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "audio/mpeg")
        .body(Body::from_stream(ReceiverStream::new(rx)))
        .unwrap()
}
