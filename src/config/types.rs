//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,

    /// 上游 TTS 配置
    #[serde(default)]
    pub tts: TtsConfig,

    /// 长文本分段合成配置
    #[serde(default)]
    pub long_text: LongTextConfig,

    /// 响应缓存配置
    #[serde(default)]
    pub cache: CacheConfig,

    /// 异步任务配置
    #[serde(default)]
    pub jobs: JobsConfig,

    /// OpenAI 兼容接口配置
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,

    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,

    /// URL 路径前缀（如 "/tts-api"，空表示根路径）
    #[serde(default)]
    pub base_path: String,

    /// 静态文件目录（None 表示不提供静态文件服务）
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_path: String::new(),
            static_dir: None,
        }
    }
}

impl ServerConfig {
    /// 获取服务器监听地址
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 上游 TTS 配置
#[derive(Debug, Clone, Deserialize)]
pub struct TtsConfig {
    /// 认证发现端点 URL（返回 {"t": <jwt>, "r": <region>}）
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: String,

    /// 网关 API 密钥（空表示不鉴权）
    #[serde(default)]
    pub api_key: String,

    /// 默认语音
    #[serde(default = "default_voice")]
    pub default_voice: String,

    /// 默认语速（带符号百分比字符串，如 "+10" / "-5" / "0"）
    #[serde(default = "default_rate")]
    pub default_rate: String,

    /// 默认语调（同语速格式）
    #[serde(default = "default_pitch")]
    pub default_pitch: String,

    /// 默认输出格式
    #[serde(default = "default_format")]
    pub default_format: String,

    /// 单次请求最大文本长度（字符数）
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,

    /// 上游请求超时时间（秒）
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// 同步/异步分界阈值（字符数，超过则走长文本管线）
    #[serde(default = "default_segment_threshold")]
    pub segment_threshold: usize,

    /// OpenAI 语音名 -> 上游语音名 映射表
    #[serde(default)]
    pub voice_mapping: HashMap<String, String>,
}

fn default_endpoint_url() -> String {
    "https://dev.microsofttranslator.com/apps/endpoint?api-version=1.0".to_string()
}

fn default_voice() -> String {
    "zh-CN-XiaoxiaoNeural".to_string()
}

fn default_rate() -> String {
    "0".to_string()
}

fn default_pitch() -> String {
    "0".to_string()
}

fn default_format() -> String {
    "audio-24khz-48kbitrate-mono-mp3".to_string()
}

fn default_max_text_length() -> usize {
    10000
}

fn default_request_timeout() -> u64 {
    30
}

fn default_segment_threshold() -> usize {
    1000
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            endpoint_url: default_endpoint_url(),
            api_key: String::new(),
            default_voice: default_voice(),
            default_rate: default_rate(),
            default_pitch: default_pitch(),
            default_format: default_format(),
            max_text_length: default_max_text_length(),
            request_timeout_secs: default_request_timeout(),
            segment_threshold: default_segment_threshold(),
            voice_mapping: HashMap::new(),
        }
    }
}

/// 长文本分段合成配置
#[derive(Debug, Clone, Deserialize)]
pub struct LongTextConfig {
    /// 是否启用长文本管线（禁用时所有请求走同步路径）
    #[serde(default = "default_long_text_enabled")]
    pub enabled: bool,

    /// 每个片段的最大字符数
    #[serde(default = "default_max_segment_length")]
    pub max_segment_length: usize,

    /// 并发 worker 数量（限制在 1..=50）
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// 是否使用智能分段（句子边界优先），否则固定长度切割
    #[serde(default = "default_smart_segment")]
    pub smart_segment: bool,

    /// FFmpeg 可执行文件路径（空表示使用 PATH 中的 ffmpeg）
    #[serde(default)]
    pub ffmpeg_path: String,
}

fn default_long_text_enabled() -> bool {
    true
}

fn default_max_segment_length() -> usize {
    500
}

fn default_worker_count() -> usize {
    5
}

fn default_smart_segment() -> bool {
    true
}

impl Default for LongTextConfig {
    fn default() -> Self {
        Self {
            enabled: default_long_text_enabled(),
            max_segment_length: default_max_segment_length(),
            worker_count: default_worker_count(),
            smart_segment: default_smart_segment(),
            ffmpeg_path: String::new(),
        }
    }
}

/// 响应缓存配置
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// 是否启用响应缓存
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// 缓存条目过期时间（分钟）
    #[serde(default = "default_cache_expiration")]
    pub expiration_minutes: u64,

    /// 过期清理间隔（分钟）
    #[serde(default = "default_cache_cleanup")]
    pub cleanup_interval_minutes: u64,

    /// 缓存总大小上限（字节），0 表示不限制
    #[serde(default)]
    pub max_total_size_bytes: u64,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_expiration() -> u64 {
    60
}

fn default_cache_cleanup() -> u64 {
    10
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            expiration_minutes: default_cache_expiration(),
            cleanup_interval_minutes: default_cache_cleanup(),
            max_total_size_bytes: 0,
        }
    }
}

/// 异步任务配置
#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    /// 已完成任务的保留时间（分钟）
    #[serde(default = "default_jobs_ttl")]
    pub ttl_minutes: u64,

    /// 过期任务清理间隔（分钟）
    #[serde(default = "default_jobs_cleanup")]
    pub cleanup_interval_minutes: u64,
}

fn default_jobs_ttl() -> u64 {
    10
}

fn default_jobs_cleanup() -> u64 {
    1
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_jobs_ttl(),
            cleanup_interval_minutes: default_jobs_cleanup(),
        }
    }
}

/// OpenAI 兼容接口配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiConfig {
    /// Bearer 密钥（空表示不鉴权）
    #[serde(default)]
    pub api_key: String,
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否启用 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
