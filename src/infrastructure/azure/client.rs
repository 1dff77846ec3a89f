//! Azure TTS Client
//!
//! 上游合成客户端：构建 SSML、携带凭证发起合成请求、分类上游错误。
//! 另提供带 24 小时缓存的语音列表查询。

use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::application::error::SynthesisError;
use crate::application::ports::Synthesizer;
use crate::config::TtsConfig;
use crate::domain::speech::{SpeechRequest, SpeechResponse, Voice};

use super::credentials::CredentialCache;
use super::ssml::{build_ssml, escape_text_nodes, extract_locale, strip_markdown};

const TTS_ENDPOINT: &str = "https://{region}.tts.speech.microsoft.com/cognitiveservices/v1";
const VOICES_ENDPOINT: &str =
    "https://{region}.tts.speech.microsoft.com/cognitiveservices/voices/list";

const USER_AGENT: &str = "okhttp/4.5.0";

/// 语音列表缓存时长
const VOICES_CACHE_TTL: Duration = Duration::from_secs(24 * 3600);

/// 客户端配置
#[derive(Debug, Clone)]
pub struct AzureClientConfig {
    /// 认证发现端点
    pub endpoint_url: String,
    /// 默认语音
    pub default_voice: String,
    /// 默认语速
    pub default_rate: String,
    /// 默认语调
    pub default_pitch: String,
    /// 默认输出格式
    pub default_format: String,
    /// 最大文本长度（字符数）
    pub max_text_length: usize,
    /// 请求超时时间（秒）
    pub timeout_secs: u64,
}

impl AzureClientConfig {
    pub fn from_tts_config(cfg: &TtsConfig) -> Self {
        Self {
            endpoint_url: cfg.endpoint_url.clone(),
            default_voice: cfg.default_voice.clone(),
            default_rate: cfg.default_rate.clone(),
            default_pitch: cfg.default_pitch.clone(),
            default_format: cfg.default_format.clone(),
            max_text_length: cfg.max_text_length,
            timeout_secs: cfg.request_timeout_secs,
        }
    }
}

/// Azure TTS 客户端
pub struct AzureClient {
    http: Client,
    config: AzureClientConfig,
    credentials: CredentialCache,
    voices_cache: RwLock<Option<(Vec<Voice>, Instant)>>,
}

impl AzureClient {
    /// 创建新的客户端
    pub fn new(config: AzureClientConfig) -> Result<Self, SynthesisError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SynthesisError::Internal(format!("http client: {}", e)))?;

        let credentials = CredentialCache::new(http.clone(), config.endpoint_url.clone());

        Ok(Self {
            http,
            config,
            credentials,
            voices_cache: RwLock::new(None),
        })
    }

    /// 生效的输出格式（请求值优先）
    pub fn effective_format(&self, request: &SpeechRequest) -> String {
        if request.format.is_empty() {
            self.config.default_format.clone()
        } else {
            request.format.clone()
        }
    }

    /// 验证请求并填充默认值
    fn prepare(&self, request: &SpeechRequest) -> Result<SpeechRequest, SynthesisError> {
        if request.text.is_empty() && request.ssml.is_empty() {
            return Err(SynthesisError::InvalidInput(
                "either text or ssml must be provided".to_string(),
            ));
        }

        if !request.text.is_empty() && !request.ssml.is_empty() {
            return Err(SynthesisError::InvalidInput(
                "text and ssml are mutually exclusive".to_string(),
            ));
        }

        let length = request.content_len();
        if length > self.config.max_text_length {
            return Err(SynthesisError::InvalidInput(format!(
                "content length {} exceeds the {} character limit",
                length, self.config.max_text_length
            )));
        }

        let mut prepared = request.clone();
        if prepared.voice.is_empty() {
            prepared.voice = self.config.default_voice.clone();
        }
        if prepared.rate.is_empty() {
            prepared.rate = self.config.default_rate.clone();
        }
        if prepared.pitch.is_empty() {
            prepared.pitch = self.config.default_pitch.clone();
        }
        if prepared.style.is_empty() {
            prepared.style = "general".to_string();
        }
        Ok(prepared)
    }

    /// 构建待发送的 SSML 文档
    fn render_ssml(&self, request: &SpeechRequest) -> String {
        if request.is_ssml() {
            // SSML 模式：文档原样通过，仅做文本节点转义
            return escape_text_nodes(&request.ssml);
        }

        let locale = extract_locale(&request.voice);
        let cleaned = strip_markdown(&request.text);
        let escaped = escape_text_nodes(&cleaned);

        build_ssml(
            &locale,
            &request.voice,
            &request.style,
            &request.rate,
            &request.pitch,
            &escaped,
        )
    }

    /// 执行一次合成 POST
    async fn post_synthesis(
        &self,
        ssml: String,
        format: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, SynthesisError> {
        let credential = self.credentials.fetch().await?;
        let url = TTS_ENDPOINT.replace("{region}", &credential.region);

        let send = self
            .http
            .post(&url)
            .header("Authorization", &credential.token)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", format)
            .header("User-Agent", USER_AGENT)
            .body(ssml)
            .send();

        let response = tokio::select! {
            result = send => result.map_err(SynthesisError::from)?,
            _ = cancel.cancelled() => {
                return Err(SynthesisError::Internal("request cancelled".to_string()));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                status = status.as_u16(),
                body = %body.chars().take(200).collect::<String>(),
                "Upstream TTS error"
            );
            if status.as_u16() == 401 || status.as_u16() == 403 {
                self.credentials.invalidate().await;
            }
            return Err(SynthesisError::from_upstream_status(status.as_u16(), &body));
        }

        let audio = tokio::select! {
            bytes = response.bytes() => bytes.map_err(SynthesisError::from)?,
            _ = cancel.cancelled() => {
                return Err(SynthesisError::Internal("request cancelled".to_string()));
            }
        };

        Ok(audio.to_vec())
    }
}

#[async_trait]
impl Synthesizer for AzureClient {
    async fn synthesize(
        &self,
        request: &SpeechRequest,
        cancel: &CancellationToken,
    ) -> Result<SpeechResponse, SynthesisError> {
        let prepared = self.prepare(request)?;
        let format = self.effective_format(&prepared);
        let ssml = self.render_ssml(&prepared);

        tracing::debug!(
            voice = %prepared.voice,
            format = %format,
            content_length = prepared.content_len(),
            ssml_mode = prepared.is_ssml(),
            "Sending synthesis request"
        );

        let audio = self.post_synthesis(ssml, &format, cancel).await?;

        tracing::debug!(audio_size = audio.len(), "Synthesis completed");

        Ok(SpeechResponse::mp3(audio))
    }

    async fn list_voices(&self, locale: &str) -> Result<Vec<Voice>, SynthesisError> {
        // 检查缓存是否有效
        {
            let guard = self.voices_cache.read().await;
            if let Some((voices, fetched_at)) = guard.as_ref() {
                if fetched_at.elapsed() < VOICES_CACHE_TTL {
                    return Ok(filter_by_locale(voices, locale));
                }
            }
        }

        let credential = self.credentials.fetch().await?;
        let url = VOICES_ENDPOINT.replace("{region}", &credential.region);

        let response = self
            .http
            .get(&url)
            .header("Authorization", &credential.token)
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(SynthesisError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::from_upstream_status(status.as_u16(), &body));
        }

        let voices: Vec<Voice> = response
            .json()
            .await
            .map_err(|e| SynthesisError::UpstreamServer(format!("voices parse: {}", e)))?;

        tracing::info!(count = voices.len(), "Voice list refreshed");

        let filtered = filter_by_locale(&voices, locale);
        *self.voices_cache.write().await = Some((voices, Instant::now()));

        Ok(filtered)
    }
}

/// 按 locale 前缀过滤语音列表
fn filter_by_locale(voices: &[Voice], locale: &str) -> Vec<Voice> {
    if locale.is_empty() {
        return voices.to_vec();
    }
    voices
        .iter()
        .filter(|v| v.locale.starts_with(locale))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> AzureClient {
        AzureClient::new(AzureClientConfig {
            endpoint_url: "http://127.0.0.1:1/endpoint".to_string(),
            default_voice: "zh-CN-XiaoxiaoNeural".to_string(),
            default_rate: "0".to_string(),
            default_pitch: "0".to_string(),
            default_format: "audio-24khz-48kbitrate-mono-mp3".to_string(),
            max_text_length: 100,
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_prepare_rejects_empty_request() {
        let client = test_client();
        let err = client.prepare(&SpeechRequest::default()).unwrap_err();
        assert!(matches!(err, SynthesisError::InvalidInput(_)));
    }

    #[test]
    fn test_prepare_rejects_both_text_and_ssml() {
        let client = test_client();
        let req = SpeechRequest {
            text: "a".to_string(),
            ssml: "<speak>a</speak>".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            client.prepare(&req).unwrap_err(),
            SynthesisError::InvalidInput(_)
        ));
    }

    #[test]
    fn test_prepare_rejects_over_limit() {
        let client = test_client();
        let req = SpeechRequest {
            text: "很".repeat(101),
            ..Default::default()
        };
        assert!(matches!(
            client.prepare(&req).unwrap_err(),
            SynthesisError::InvalidInput(_)
        ));
    }

    #[test]
    fn test_prepare_fills_defaults() {
        let client = test_client();
        let prepared = client
            .prepare(&SpeechRequest {
                text: "你好".to_string(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(prepared.voice, "zh-CN-XiaoxiaoNeural");
        assert_eq!(prepared.rate, "0");
        assert_eq!(prepared.pitch, "0");
        assert_eq!(prepared.style, "general");
    }

    #[test]
    fn test_render_ssml_text_mode() {
        let client = test_client();
        let prepared = client
            .prepare(&SpeechRequest {
                text: "**你好** & 再见".to_string(),
                voice: "en-US-AriaNeural".to_string(),
                ..Default::default()
            })
            .unwrap();
        let ssml = client.render_ssml(&prepared);
        // Markdown 已清理，文本已转义，locale 来自 voice
        assert!(ssml.contains("你好 &amp; 再见"));
        assert!(!ssml.contains("**"));
        assert!(ssml.contains("xml:lang='en-US'"));
    }

    #[test]
    fn test_render_ssml_passthrough_mode() {
        let client = test_client();
        let req = SpeechRequest {
            ssml: "<speak>已有文档</speak>".to_string(),
            ..Default::default()
        };
        let prepared = client.prepare(&req).unwrap();
        assert_eq!(client.render_ssml(&prepared), "<speak>已有文档</speak>");
    }

    #[test]
    fn test_effective_format() {
        let client = test_client();
        let mut req = SpeechRequest {
            text: "x".to_string(),
            ..Default::default()
        };
        assert_eq!(
            client.effective_format(&req),
            "audio-24khz-48kbitrate-mono-mp3"
        );
        req.format = "audio-16khz-32kbitrate-mono-mp3".to_string();
        assert_eq!(client.effective_format(&req), "audio-16khz-32kbitrate-mono-mp3");
    }

    #[test]
    fn test_filter_by_locale() {
        let voice = |locale: &str| Voice {
            name: String::new(),
            display_name: String::new(),
            local_name: String::new(),
            short_name: String::new(),
            gender: String::new(),
            locale: locale.to_string(),
            locale_name: String::new(),
            style_list: Vec::new(),
            sample_rate_hertz: String::new(),
        };
        let voices = vec![voice("zh-CN"), voice("zh-TW"), voice("en-US")];
        assert_eq!(filter_by_locale(&voices, "zh").len(), 2);
        assert_eq!(filter_by_locale(&voices, "en-US").len(), 1);
        assert_eq!(filter_by_locale(&voices, "").len(), 3);
    }
}
