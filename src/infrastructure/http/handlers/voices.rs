//! Voices Handler - 语音列表查询

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::domain::speech::Voice;

use super::super::error::ApiError;
use super::super::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct VoicesQuery {
    /// locale 前缀过滤，如 zh / zh-CN
    #[serde(default)]
    pub locale: String,
}

/// GET /voices - 列出可用语音
///
/// 中文语音排在前面，其余按本地名称排序
pub async fn list_voices(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VoicesQuery>,
) -> Result<Json<Vec<Voice>>, ApiError> {
    let mut voices = state.tts_service.list_voices(&query.locale).await?;

    voices.sort_by(|a, b| {
        let a_chinese = a.locale.starts_with("zh");
        let b_chinese = b.locale.starts_with("zh");
        b_chinese
            .cmp(&a_chinese)
            .then_with(|| a.local_name.cmp(&b.local_name))
    });

    Ok(Json(voices))
}
