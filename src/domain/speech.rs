//! Speech Models
//!
//! 合成请求/响应与语音模型

use serde::{Deserialize, Serialize};

/// 语音合成请求
///
/// `text` 与 `ssml` 二选一；`rate`/`pitch` 为带符号百分比字符串
/// （如 "+10" / "-5" / "0"）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpeechRequest {
    /// 要转换的纯文本
    #[serde(default)]
    pub text: String,

    /// 要转换的 SSML 文档
    #[serde(default)]
    pub ssml: String,

    /// 语音 ID，如 zh-CN-XiaoxiaoNeural
    #[serde(default)]
    pub voice: String,

    /// 语速
    #[serde(default)]
    pub rate: String,

    /// 语调
    #[serde(default)]
    pub pitch: String,

    /// 说话风格
    #[serde(default)]
    pub style: String,

    /// 输出格式（空表示使用默认格式）
    #[serde(default)]
    pub format: String,
}

impl SpeechRequest {
    /// 是否为 SSML 模式
    pub fn is_ssml(&self) -> bool {
        !self.ssml.is_empty()
    }

    /// 获取输入内容（SSML 优先）
    pub fn content(&self) -> &str {
        if self.is_ssml() {
            &self.ssml
        } else {
            &self.text
        }
    }

    /// 输入内容的字符数（rune 计数）
    pub fn content_len(&self) -> usize {
        self.content().chars().count()
    }
}

/// 语音合成响应
#[derive(Debug, Clone)]
pub struct SpeechResponse {
    /// 音频数据（完整 MP3）
    pub audio: Vec<u8>,

    /// MIME 类型
    pub content_type: String,

    /// 是否命中缓存
    pub cache_hit: bool,
}

impl SpeechResponse {
    pub fn mp3(audio: Vec<u8>) -> Self {
        Self {
            audio,
            content_type: "audio/mpeg".to_string(),
            cache_hit: false,
        }
    }
}

/// OpenAI 兼容的合成请求
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiSpeechRequest {
    #[serde(default)]
    pub model: String,
    pub input: String,
    #[serde(default)]
    pub voice: String,
    #[serde(default)]
    pub speed: f64,
}

/// 上游语音条目
///
/// 字段名与上游 voices/list 返回保持一致（PascalCase）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voice {
    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "DisplayName")]
    pub display_name: String,

    #[serde(rename = "LocalName")]
    pub local_name: String,

    /// 简称，例如 zh-CN-XiaoxiaoNeural
    #[serde(rename = "ShortName")]
    pub short_name: String,

    #[serde(rename = "Gender")]
    pub gender: String,

    /// 语言区域，如 zh-CN
    #[serde(rename = "Locale")]
    pub locale: String,

    #[serde(rename = "LocaleName")]
    pub locale_name: String,

    /// 支持的说话风格列表
    #[serde(rename = "StyleList", default, skip_serializing_if = "Vec::is_empty")]
    pub style_list: Vec<String>,

    #[serde(rename = "SampleRateHertz")]
    pub sample_rate_hertz: String,
}
