//! OpenAI-Compatible Handler
//!
//! POST /v1/audio/speech：语音名经配置表映射到上游语音，
//! speed 转换为带符号百分比语速

use axum::{extract::State, response::Response, Json};
use std::sync::Arc;

use crate::application::error::SynthesisError;
use crate::config::TtsConfig;
use crate::domain::speech::{OpenAiSpeechRequest, SpeechRequest};

use super::super::error::ApiError;
use super::super::state::AppState;
use super::tts::{dispatch, DispatchMode};

pub async fn openai_speech(
    State(state): State<Arc<AppState>>,
    Json(request): Json<OpenAiSpeechRequest>,
) -> Result<Response, ApiError> {
    if request.input.is_empty() {
        return Err(SynthesisError::InvalidInput("input must not be empty".to_string()).into());
    }

    let speech = convert_request(&state.config.tts, request);

    tracing::info!(
        voice = %speech.voice,
        rate = %speech.rate,
        text_length = speech.content_len(),
        "OpenAI synthesis request"
    );

    dispatch(state, speech, DispatchMode::Standard).await
}

/// OpenAI 请求转换为内部请求
///
/// speed 为浮点倍速（1.0 = 原速），转换为 round((speed - 1) * 100)
/// 的带符号百分比；0 表示未指定，使用默认语速
fn convert_request(cfg: &TtsConfig, request: OpenAiSpeechRequest) -> SpeechRequest {
    let voice = cfg
        .voice_mapping
        .get(&request.voice)
        .cloned()
        .unwrap_or_else(|| request.voice.clone());

    let rate = if request.speed == 0.0 {
        cfg.default_rate.clone()
    } else {
        let percentage = (request.speed - 1.0) * 100.0;
        if percentage >= 0.0 {
            format!("+{:.0}", percentage)
        } else {
            format!("{:.0}", percentage)
        }
    };

    SpeechRequest {
        text: request.input,
        ssml: String::new(),
        voice,
        rate,
        pitch: cfg.default_pitch.clone(),
        style: request.model,
        format: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_mapping() -> TtsConfig {
        let mut cfg = TtsConfig::default();
        cfg.voice_mapping
            .insert("alloy".to_string(), "zh-CN-XiaoxiaoNeural".to_string());
        cfg
    }

    fn openai_request(voice: &str, speed: f64) -> OpenAiSpeechRequest {
        OpenAiSpeechRequest {
            model: "tts-1".to_string(),
            input: "hello".to_string(),
            voice: voice.to_string(),
            speed,
        }
    }

    #[test]
    fn test_voice_mapped_through_table() {
        let speech = convert_request(&config_with_mapping(), openai_request("alloy", 1.0));
        assert_eq!(speech.voice, "zh-CN-XiaoxiaoNeural");
    }

    #[test]
    fn test_unmapped_voice_passes_through() {
        let speech = convert_request(&config_with_mapping(), openai_request("en-US-AriaNeural", 1.0));
        assert_eq!(speech.voice, "en-US-AriaNeural");
    }

    #[test]
    fn test_speed_to_rate_conversion() {
        let cfg = config_with_mapping();
        assert_eq!(convert_request(&cfg, openai_request("alloy", 1.25)).rate, "+25");
        assert_eq!(convert_request(&cfg, openai_request("alloy", 0.8)).rate, "-20");
        assert_eq!(convert_request(&cfg, openai_request("alloy", 1.0)).rate, "+0");
        // 未指定时使用默认语速
        assert_eq!(convert_request(&cfg, openai_request("alloy", 0.0)).rate, "0");
    }

    #[test]
    fn test_model_carried_as_style() {
        let speech = convert_request(&config_with_mapping(), openai_request("alloy", 1.0));
        assert_eq!(speech.style, "tts-1");
    }
}
