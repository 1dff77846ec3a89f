//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量（前缀 `TTS_`）
//! 2. 配置文件（config.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::AppConfig;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 加载应用配置
///
/// 按优先级从高到低合并配置：
/// 1. 环境变量（前缀 `TTS_`，层级分隔符 `__`，另支持一组扁平别名）
/// 2. 配置文件（config.toml 或 config.local.toml）
/// 3. 默认值
///
/// # 环境变量示例
/// - `TTS_SERVER__HOST=127.0.0.1` 或扁平别名 `TTS_SERVER_PORT=9000`
/// - `TTS_DEFAULT_VOICE=zh-CN-YunxiNeural`
/// - `TTS_CACHE_ENABLED=false`
/// - `TTS_LONG_TEXT_ENABLED=false`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// # 参数
/// - `config_path` - 可选的配置文件路径，如果为 None 则使用默认搜索路径
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 添加配置文件（如果存在）
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 2. 添加环境变量（最高优先级）
    // 前缀: TTS_，层级分隔符: __ (双下划线)
    // 例如: TTS_SERVER__PORT=9000
    builder = builder.add_source(
        Environment::with_prefix("TTS")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    // 3. 反序列化为 AppConfig（缺省字段由 serde default 填充）
    let mut app_config: AppConfig = config
        .try_deserialize()
        .map_err(|e| ConfigError::ParseError(format!("Failed to deserialize config: {}", e)))?;

    // 4. 应用扁平环境变量别名（与历史部署保持兼容）
    apply_env_aliases(&mut app_config);

    // 5. 验证配置
    validate_config(&app_config)?;

    Ok(app_config)
}

/// 应用扁平环境变量别名
///
/// 支持 `TTS_SERVER_PORT` 这类不带双下划线分隔的变量名，
/// 覆盖优先级高于配置文件与嵌套形式。
fn apply_env_aliases(config: &mut AppConfig) {
    fn env(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }

    if let Some(v) = env("TTS_SERVER_PORT").and_then(|v| v.parse().ok()) {
        config.server.port = v;
    }
    if let Some(v) = env("TTS_SERVER_HOST") {
        config.server.host = v;
    }
    if let Some(v) = env("TTS_SERVER_BASE_PATH") {
        config.server.base_path = v;
    }
    if let Some(v) = env("TTS_API_KEY") {
        config.tts.api_key = v;
    }
    if let Some(v) = env("TTS_ENDPOINT_URL") {
        config.tts.endpoint_url = v;
    }
    if let Some(v) = env("TTS_DEFAULT_VOICE") {
        config.tts.default_voice = v;
    }
    if let Some(v) = env("TTS_DEFAULT_RATE") {
        config.tts.default_rate = v;
    }
    if let Some(v) = env("TTS_DEFAULT_PITCH") {
        config.tts.default_pitch = v;
    }
    if let Some(v) = env("TTS_DEFAULT_FORMAT") {
        config.tts.default_format = v;
    }
    if let Some(v) = env("TTS_MAX_TEXT_LENGTH").and_then(|v| v.parse().ok()) {
        config.tts.max_text_length = v;
    }
    if let Some(v) = env("TTS_REQUEST_TIMEOUT").and_then(|v| v.parse().ok()) {
        config.tts.request_timeout_secs = v;
    }
    if let Some(v) = env("TTS_SEGMENT_THRESHOLD").and_then(|v| v.parse().ok()) {
        config.tts.segment_threshold = v;
    }
    if let Some(v) = env("TTS_LONG_TEXT_ENABLED") {
        config.long_text.enabled = v.eq_ignore_ascii_case("true");
    }
    if let Some(v) = env("TTS_MAX_SEGMENT_LENGTH").and_then(|v| v.parse().ok()) {
        config.long_text.max_segment_length = v;
    }
    if let Some(v) = env("TTS_WORKER_COUNT").and_then(|v| v.parse().ok()) {
        config.long_text.worker_count = v;
    }
    if let Some(v) = env("TTS_FFMPEG_PATH") {
        config.long_text.ffmpeg_path = v;
    }
    if let Some(v) = env("TTS_CACHE_ENABLED") {
        config.cache.enabled = v.eq_ignore_ascii_case("true");
    }
    if let Some(v) = env("TTS_CACHE_EXPIRATION_MINUTES").and_then(|v| v.parse().ok()) {
        config.cache.expiration_minutes = v;
    }
    if let Some(v) = env("TTS_CACHE_CLEANUP_INTERVAL_MINUTES").and_then(|v| v.parse().ok()) {
        config.cache.cleanup_interval_minutes = v;
    }
    if let Some(v) = env("TTS_CACHE_MAX_TOTAL_SIZE_BYTES").and_then(|v| v.parse().ok()) {
        config.cache.max_total_size_bytes = v;
    }
    if let Some(v) = env("TTS_JOBS_TTL_MINUTES").and_then(|v| v.parse().ok()) {
        config.jobs.ttl_minutes = v;
    }
    if let Some(v) = env("OPENAI_API_KEY") {
        config.openai.api_key = v;
    }
    if let Some(v) = env("TTS_LOG_LEVEL") {
        config.log.level = v;
    }
}

/// 验证配置有效性
fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "Server port cannot be 0".to_string(),
        ));
    }

    if config.tts.endpoint_url.is_empty() {
        return Err(ConfigError::ValidationError(
            "TTS endpoint URL cannot be empty".to_string(),
        ));
    }

    if config.tts.max_text_length == 0 {
        return Err(ConfigError::ValidationError(
            "Max text length cannot be 0".to_string(),
        ));
    }

    if config.long_text.enabled && config.long_text.max_segment_length == 0 {
        return Err(ConfigError::ValidationError(
            "Max segment length cannot be 0 when long text is enabled".to_string(),
        ));
    }

    if config.cache.enabled && config.cache.cleanup_interval_minutes == 0 {
        return Err(ConfigError::ValidationError(
            "Cache cleanup interval cannot be 0 when cache is enabled".to_string(),
        ));
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Server: {}:{}", config.server.host, config.server.port);
    if !config.server.base_path.is_empty() {
        tracing::info!("Base Path: {}", config.server.base_path);
    }
    tracing::info!("Default Voice: {}", config.tts.default_voice);
    tracing::info!("Default Format: {}", config.tts.default_format);
    tracing::info!("Max Text Length: {}", config.tts.max_text_length);
    tracing::info!("Request Timeout: {}s", config.tts.request_timeout_secs);
    tracing::info!("Segment Threshold: {}", config.tts.segment_threshold);
    tracing::info!("Long Text Enabled: {}", config.long_text.enabled);
    if config.long_text.enabled {
        tracing::info!("Max Segment Length: {}", config.long_text.max_segment_length);
        tracing::info!("Worker Count: {}", config.long_text.worker_count);
        tracing::info!("Smart Segment: {}", config.long_text.smart_segment);
    }
    tracing::info!("Cache Enabled: {}", config.cache.enabled);
    if config.cache.enabled {
        tracing::info!("Cache Expiration: {}min", config.cache.expiration_minutes);
        if config.cache.max_total_size_bytes > 0 {
            tracing::info!("Cache Max Size: {} bytes", config.cache.max_total_size_bytes);
        }
    }
    tracing::info!("Job TTL: {}min", config.jobs.ttl_minutes);
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_passes_for_valid_config() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_error_for_zero_port() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_empty_endpoint() {
        let mut config = AppConfig::default();
        config.tts.endpoint_url = String::new();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_zero_segment_length() {
        let mut config = AppConfig::default();
        config.long_text.max_segment_length = 0;
        assert!(validate_config(&config).is_err());
    }
}
