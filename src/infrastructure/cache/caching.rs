//! 缓存合成服务
//!
//! 包装另一个 Synthesizer：命中直接返回缓存音频，未命中穿透到
//! 底层服务，成功结果写入缓存（失败永不缓存）。
//!
//! 大小上限淘汰策略：按 expires_at 升序（最早过期优先），同值按
//! 大小降序（先淘汰大条目），直到腾出足够空间；单条目本身超过
//! 上限时跳过缓存，直接返回音频。

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::application::error::SynthesisError;
use crate::application::metrics::Metrics;
use crate::application::ports::Synthesizer;
use crate::config::CacheConfig;
use crate::domain::fingerprint::Fingerprint;
use crate::domain::speech::{SpeechRequest, SpeechResponse, Voice};

/// 缓存配置
#[derive(Debug, Clone)]
pub struct CachingConfig {
    /// 条目过期时间
    pub ttl: Duration,
    /// 过期清理间隔
    pub cleanup_interval: Duration,
    /// 缓存总大小上限（字节），0 表示不限制
    pub max_total_size: u64,
    /// 默认输出格式（指纹计算需要生效格式）
    pub default_format: String,
}

impl CachingConfig {
    pub fn from_config(cache: &CacheConfig, default_format: &str) -> Self {
        Self {
            ttl: Duration::from_secs(cache.expiration_minutes * 60),
            cleanup_interval: Duration::from_secs(cache.cleanup_interval_minutes * 60),
            max_total_size: cache.max_total_size_bytes,
            default_format: default_format.to_string(),
        }
    }
}

/// 缓存条目
#[derive(Debug, Clone)]
struct CachedEntry {
    audio: Vec<u8>,
    content_type: String,
    expires_at: DateTime<Utc>,
}

/// 缓存统计信息
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub item_count: usize,
    pub total_size_bytes: u64,
    pub max_total_size_bytes: u64,
}

/// 缓存合成服务
pub struct CachingSynthesizer {
    next: Arc<dyn Synthesizer>,
    entries: DashMap<String, CachedEntry>,
    total_size: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    config: CachingConfig,
    metrics: Arc<Metrics>,
}

impl CachingSynthesizer {
    pub fn new(next: Arc<dyn Synthesizer>, config: CachingConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            next,
            entries: DashMap::new(),
            total_size: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            config,
            metrics,
        }
    }

    /// 启动后台清理任务，按配置间隔移除过期条目
    pub fn spawn_reaper(self: Arc<Self>) {
        let cache = self;
        let interval = cache.config.cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                cache.remove_expired();
            }
        });
    }

    /// 查询缓存；过期条目在读取时移除
    fn lookup(&self, fingerprint: &Fingerprint) -> Option<SpeechResponse> {
        let key = fingerprint.as_str();
        let entry = self.entries.get(key)?;

        if entry.expires_at <= Utc::now() {
            drop(entry);
            self.remove_entry(key);
            return None;
        }

        Some(SpeechResponse {
            audio: entry.audio.clone(),
            content_type: entry.content_type.clone(),
            cache_hit: true,
        })
    }

    /// 写入缓存，必要时先淘汰
    ///
    /// 腾不出足够空间时放弃写入（调用方仍持有音频）
    fn try_insert(&self, fingerprint: Fingerprint, response: &SpeechResponse) {
        let size = response.audio.len() as u64;
        let max = self.config.max_total_size;

        if max > 0 && self.total_size.load(Ordering::SeqCst) + size > max {
            self.evict_for(size);

            if self.total_size.load(Ordering::SeqCst) + size > max {
                tracing::debug!(
                    fingerprint = %fingerprint,
                    size,
                    max_total_size = max,
                    "Skipping cache insert due to size limit"
                );
                return;
            }
        }

        let entry = CachedEntry {
            audio: response.audio.clone(),
            content_type: response.content_type.clone(),
            expires_at: Utc::now()
                + ChronoDuration::from_std(self.config.ttl).unwrap_or(ChronoDuration::zero()),
        };

        self.entries.insert(fingerprint.as_str().to_string(), entry);
        self.total_size.fetch_add(size, Ordering::SeqCst);
    }

    /// 淘汰条目直到能容纳 `incoming` 字节
    ///
    /// 顺序：expires_at 升序，同值按大小降序
    fn evict_for(&self, incoming: u64) {
        let max = self.config.max_total_size;

        let mut candidates: Vec<(String, DateTime<Utc>, u64)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.expires_at, e.audio.len() as u64))
            .collect();
        candidates.sort_by(|a, b| a.1.cmp(&b.1).then(b.2.cmp(&a.2)));

        for (key, _, _) in candidates {
            if self.total_size.load(Ordering::SeqCst) + incoming <= max {
                break;
            }
            if self.remove_entry(&key) {
                tracing::debug!(fingerprint = %key, "Evicted cache entry");
            }
        }
    }

    /// 移除条目并同步大小计数
    fn remove_entry(&self, key: &str) -> bool {
        if let Some((_, entry)) = self.entries.remove(key) {
            self.total_size
                .fetch_sub(entry.audio.len() as u64, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    /// 移除所有过期条目（后台清理任务调用）
    fn remove_expired(&self) {
        let now = Utc::now();
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.expires_at <= now)
            .map(|e| e.key().clone())
            .collect();

        let count = expired.len();
        for key in expired {
            self.remove_entry(&key);
        }

        if count > 0 {
            tracing::debug!(count, "Removed expired cache entries");
        }
    }

    /// 生效格式（请求值优先于默认值）
    fn effective_format<'a>(&'a self, request: &'a SpeechRequest) -> &'a str {
        if request.format.is_empty() {
            self.config.default_format.as_str()
        } else {
            request.format.as_str()
        }
    }

    /// 查询缓存而不穿透（异步任务路径在入队前调用）
    pub fn peek(&self, request: &SpeechRequest) -> Option<SpeechResponse> {
        let fingerprint = Fingerprint::new(request, self.effective_format(request));
        let found = self.lookup(&fingerprint);
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            self.metrics.record_cache_hit();
        }
        found
    }

    /// 写入合成结果（异步任务路径绕过 synthesize 包装时调用）
    pub fn store(&self, request: &SpeechRequest, response: &SpeechResponse) {
        let fingerprint = Fingerprint::new(request, self.effective_format(request));
        self.try_insert(fingerprint, response);
    }

    /// 清空缓存
    pub fn clear(&self) {
        self.entries.clear();
        self.total_size.store(0, Ordering::SeqCst);
        tracing::info!("Cache cleared");
    }

    /// 获取缓存统计信息
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            item_count: self.entries.len(),
            total_size_bytes: self.total_size.load(Ordering::SeqCst),
            max_total_size_bytes: self.config.max_total_size,
        }
    }
}

#[async_trait]
impl Synthesizer for CachingSynthesizer {
    async fn synthesize(
        &self,
        request: &SpeechRequest,
        cancel: &CancellationToken,
    ) -> Result<SpeechResponse, SynthesisError> {
        let fingerprint = Fingerprint::new(request, self.effective_format(request));

        if let Some(response) = self.lookup(&fingerprint) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            self.metrics.record_cache_hit();
            tracing::debug!(fingerprint = %fingerprint, "Cache hit");
            return Ok(response);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_cache_miss();
        tracing::debug!(fingerprint = %fingerprint, "Cache miss");

        let response = self.next.synthesize(request, cancel).await?;
        self.try_insert(fingerprint, &response);

        Ok(response)
    }

    async fn list_voices(&self, locale: &str) -> Result<Vec<Voice>, SynthesisError> {
        self.next.list_voices(locale).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// 记录调用次数的假合成引擎
    struct CountingEngine {
        calls: AtomicUsize,
        fail: bool,
        /// 每次调用返回的音频大小
        audio_size: usize,
    }

    impl CountingEngine {
        fn new(audio_size: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
                audio_size,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: true,
                audio_size: 4,
            }
        }
    }

    #[async_trait]
    impl Synthesizer for CountingEngine {
        async fn synthesize(
            &self,
            request: &SpeechRequest,
            _cancel: &CancellationToken,
        ) -> Result<SpeechResponse, SynthesisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SynthesisError::from_upstream_status(500, "mock"));
            }
            let mut audio = request.content().as_bytes().to_vec();
            audio.resize(self.audio_size, 0xFB);
            Ok(SpeechResponse::mp3(audio))
        }

        async fn list_voices(&self, _locale: &str) -> Result<Vec<Voice>, SynthesisError> {
            Ok(Vec::new())
        }
    }

    fn cache_config(max_total_size: u64) -> CachingConfig {
        CachingConfig {
            ttl: Duration::from_secs(3600),
            cleanup_interval: Duration::from_secs(3600),
            max_total_size,
            default_format: "audio-24khz-48kbitrate-mono-mp3".to_string(),
        }
    }

    fn request(text: &str) -> SpeechRequest {
        SpeechRequest {
            text: text.to_string(),
            voice: "en-US-A".to_string(),
            rate: "0".to_string(),
            pitch: "0".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let engine = Arc::new(CountingEngine::new(16));
        let cache = CachingSynthesizer::new(engine.clone(), cache_config(0), Arc::new(Metrics::new()));
        let cancel = CancellationToken::new();

        let first = cache.synthesize(&request("Hello world"), &cancel).await.unwrap();
        assert!(!first.cache_hit);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);

        let second = cache.synthesize(&request("Hello world"), &cancel).await.unwrap();
        assert!(second.cache_hit);
        assert_eq!(second.audio, first.audio);
        // 第二次不再调用底层服务
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_failure_not_cached() {
        let engine = Arc::new(CountingEngine::failing());
        let cache = CachingSynthesizer::new(engine.clone(), cache_config(0), Arc::new(Metrics::new()));
        let cancel = CancellationToken::new();

        assert!(cache.synthesize(&request("x"), &cancel).await.is_err());
        assert!(cache.synthesize(&request("x"), &cancel).await.is_err());
        // 两次都穿透到底层服务
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().item_count, 0);
    }

    #[tokio::test]
    async fn test_no_eviction_below_cap() {
        let engine = Arc::new(CountingEngine::new(10));
        let cache = CachingSynthesizer::new(engine, cache_config(100), Arc::new(Metrics::new()));
        let cancel = CancellationToken::new();

        for i in 0..10 {
            cache.synthesize(&request(&format!("text {}", i)), &cancel).await.unwrap();
        }

        let stats = cache.stats();
        assert_eq!(stats.item_count, 10);
        assert_eq!(stats.total_size_bytes, 100);
    }

    #[tokio::test]
    async fn test_eviction_keeps_total_under_cap() {
        let engine = Arc::new(CountingEngine::new(40));
        let cache = CachingSynthesizer::new(engine, cache_config(100), Arc::new(Metrics::new()));
        let cancel = CancellationToken::new();

        for i in 0..6 {
            cache.synthesize(&request(&format!("text {}", i)), &cancel).await.unwrap();
            assert!(
                cache.stats().total_size_bytes <= 100,
                "size {} exceeds cap after insert {}",
                cache.stats().total_size_bytes,
                i
            );
        }
    }

    #[tokio::test]
    async fn test_oversized_entry_skipped() {
        let engine = Arc::new(CountingEngine::new(200));
        let cache = CachingSynthesizer::new(engine.clone(), cache_config(100), Arc::new(Metrics::new()));
        let cancel = CancellationToken::new();

        // 音频本身超过上限：返回成功但不缓存
        let resp = cache.synthesize(&request("big"), &cancel).await.unwrap();
        assert_eq!(resp.audio.len(), 200);
        assert_eq!(cache.stats().item_count, 0);
        assert_eq!(cache.stats().total_size_bytes, 0);

        // 再次请求仍然穿透
        cache.synthesize(&request("big"), &cancel).await.unwrap();
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_expired_entry_misses() {
        let engine = Arc::new(CountingEngine::new(8));
        let config = CachingConfig {
            ttl: Duration::from_millis(30),
            ..cache_config(0)
        };
        let cache = CachingSynthesizer::new(engine.clone(), config, Arc::new(Metrics::new()));
        let cancel = CancellationToken::new();

        cache.synthesize(&request("x"), &cancel).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let resp = cache.synthesize(&request("x"), &cancel).await.unwrap();
        assert!(!resp.cache_hit);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reaper_updates_size_counter() {
        let engine = Arc::new(CountingEngine::new(8));
        let config = CachingConfig {
            ttl: Duration::from_millis(10),
            ..cache_config(0)
        };
        let cache = CachingSynthesizer::new(engine, config, Arc::new(Metrics::new()));
        let cancel = CancellationToken::new();

        cache.synthesize(&request("a"), &cancel).await.unwrap();
        cache.synthesize(&request("b"), &cancel).await.unwrap();
        assert_eq!(cache.stats().total_size_bytes, 16);

        tokio::time::sleep(Duration::from_millis(30)).await;
        cache.remove_expired();

        assert_eq!(cache.stats().item_count, 0);
        assert_eq!(cache.stats().total_size_bytes, 0);
    }

    #[tokio::test]
    async fn test_clear() {
        let engine = Arc::new(CountingEngine::new(8));
        let cache = CachingSynthesizer::new(engine, cache_config(0), Arc::new(Metrics::new()));
        let cancel = CancellationToken::new();

        cache.synthesize(&request("x"), &cancel).await.unwrap();
        cache.clear();
        assert_eq!(cache.stats().item_count, 0);
        assert_eq!(cache.stats().total_size_bytes, 0);
    }

    #[tokio::test]
    async fn test_format_default_fill_affects_key() {
        let engine = Arc::new(CountingEngine::new(8));
        let cache = CachingSynthesizer::new(engine.clone(), cache_config(0), Arc::new(Metrics::new()));
        let cancel = CancellationToken::new();

        // 显式默认格式与留空格式生成相同指纹
        let mut explicit = request("x");
        explicit.format = "audio-24khz-48kbitrate-mono-mp3".to_string();
        cache.synthesize(&explicit, &cancel).await.unwrap();

        let resp = cache.synthesize(&request("x"), &cancel).await.unwrap();
        assert!(resp.cache_hit);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
    }
}
