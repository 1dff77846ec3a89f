//! Voxgate - 长文本 TTS 网关
//!
//! 服务组合（构造时注入，见 application/ports/synthesizer.rs）：
//! AzureClient -> LongTextSynthesizer -> CachingSynthesizer

use std::sync::Arc;
use std::time::Duration;

use voxgate::application::metrics::Metrics;
use voxgate::application::ports::Synthesizer;
use voxgate::config::{load_config, print_config};
use voxgate::infrastructure::audio::FfmpegMerger;
use voxgate::infrastructure::azure::{AzureClient, AzureClientConfig};
use voxgate::infrastructure::cache::{CachingConfig, CachingSynthesizer};
use voxgate::infrastructure::http::{AppState, HttpServer, ServerConfig};
use voxgate::infrastructure::memory::InMemoryJobStore;
use voxgate::infrastructure::pipeline::{LongTextServiceConfig, LongTextSynthesizer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    // 初始化日志
    let log_filter = format!(
        "{},voxgate={},tower_http=warn",
        config.log.level, config.log.level
    );
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter));
    if config.log.json {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    tracing::info!("Voxgate - TTS gateway");
    print_config(&config);

    let metrics = Arc::new(Metrics::new());

    // 上游客户端（凭证缓存内置）
    let client = Arc::new(
        AzureClient::new(AzureClientConfig::from_tts_config(&config.tts))
            .map_err(|e| anyhow::anyhow!("Failed to create upstream client: {}", e))?,
    );

    // 音频合并器
    let merger = Arc::new(FfmpegMerger::new(config.long_text.ffmpeg_path.clone()));

    // 长文本编排服务
    let long_text = Arc::new(LongTextSynthesizer::new(
        client.clone(),
        merger,
        LongTextServiceConfig::from_config(&config.tts, &config.long_text),
    ));

    // 响应缓存（启用时包装长文本服务）
    let (tts_service, cache): (Arc<dyn Synthesizer>, Option<Arc<CachingSynthesizer>>) =
        if config.cache.enabled {
            tracing::info!("Response cache enabled");
            let cache = Arc::new(CachingSynthesizer::new(
                long_text.clone(),
                CachingConfig::from_config(&config.cache, &config.tts.default_format),
                metrics.clone(),
            ));
            cache.clone().spawn_reaper();
            (cache.clone(), Some(cache))
        } else {
            (long_text.clone(), None)
        };

    // 异步任务存储
    let job_store = InMemoryJobStore::new(
        Duration::from_secs(config.jobs.ttl_minutes * 60),
        Duration::from_secs(config.jobs.cleanup_interval_minutes * 60),
    )
    .arc();
    job_store.clone().spawn_reaper();

    // HTTP 服务器
    let server_config = ServerConfig::from_config(&config.server);
    let state = Arc::new(AppState::new(
        config,
        tts_service,
        long_text,
        cache,
        job_store,
        metrics,
    ));

    let server = HttpServer::new(server_config, state);

    tracing::info!("Starting HTTP server...");

    server
        .run_with_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to listen for ctrl-c");
            tracing::info!("Received shutdown signal");
        })
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}
