//! Application State
//!
//! 持有组合完毕的服务与共享资源

use std::sync::Arc;

use crate::application::metrics::Metrics;
use crate::application::ports::{JobStore, Synthesizer};
use crate::config::AppConfig;
use crate::infrastructure::cache::CachingSynthesizer;
use crate::infrastructure::pipeline::LongTextSynthesizer;

/// 应用状态
///
/// `tts_service` 是对外的组合服务（启用缓存时为缓存包装层），
/// `long_text` 保留具体类型以支持进度回调与流式输出
pub struct AppState {
    pub config: AppConfig,
    pub tts_service: Arc<dyn Synthesizer>,
    pub long_text: Arc<LongTextSynthesizer>,
    pub cache: Option<Arc<CachingSynthesizer>>,
    pub job_store: Arc<dyn JobStore>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        tts_service: Arc<dyn Synthesizer>,
        long_text: Arc<LongTextSynthesizer>,
        cache: Option<Arc<CachingSynthesizer>>,
        job_store: Arc<dyn JobStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            tts_service,
            long_text,
            cache,
            job_store,
            metrics,
        }
    }
}
