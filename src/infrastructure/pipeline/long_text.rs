//! 长文本编排
//!
//! 组合 分段器 -> 工作池 -> 合并器：短文本直接委托上游客户端，
//! 长文本分段并发合成后按索引顺序合并。单个片段失败则整个请求
//! 失败（保留第一个错误），不会拼接缺段的音频。

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::application::error::SynthesisError;
use crate::application::ports::{AudioMerger, Synthesizer};
use crate::config::{LongTextConfig, TtsConfig};
use crate::domain::segmenter::{FixedLengthSegmenter, SegmentationStrategy, SmartSegmenter};
use crate::domain::speech::{SpeechRequest, SpeechResponse, Voice};

use super::worker_pool::{PoolMetrics, SegmentJob, SegmentResult, WorkerPool};

/// 长文本服务配置
#[derive(Debug, Clone)]
pub struct LongTextServiceConfig {
    /// 触发分段的最小文本长度（字符数）
    pub split_threshold: usize,
    /// 每个片段的最大字符数
    pub max_segment_length: usize,
    /// 并发 worker 数量
    pub worker_count: usize,
    /// 是否使用智能分段
    pub smart_segment: bool,
}

impl LongTextServiceConfig {
    pub fn from_config(tts: &TtsConfig, long_text: &LongTextConfig) -> Self {
        Self {
            split_threshold: tts.segment_threshold,
            max_segment_length: long_text.max_segment_length,
            worker_count: long_text.worker_count,
            smart_segment: long_text.smart_segment,
        }
    }
}

/// 进度回调：(已收到片段数, 总片段数)
pub type ProgressFn<'a> = &'a (dyn Fn(usize, usize) + Send + Sync);

/// 长文本合成服务
///
/// 每次长文本请求实例化一个工作池（worker 共享上游客户端与凭证），
/// 结果流因此天然按请求隔离；`pool_metrics` 跨请求聚合。
pub struct LongTextSynthesizer {
    client: Arc<dyn Synthesizer>,
    segmenter: Box<dyn SegmentationStrategy>,
    merger: Arc<dyn AudioMerger>,
    config: LongTextServiceConfig,
    pool_metrics: Arc<PoolMetrics>,
}

impl LongTextSynthesizer {
    pub fn new(
        client: Arc<dyn Synthesizer>,
        merger: Arc<dyn AudioMerger>,
        config: LongTextServiceConfig,
    ) -> Self {
        let segmenter: Box<dyn SegmentationStrategy> = if config.smart_segment {
            tracing::info!("Using smart segmentation strategy");
            Box::new(SmartSegmenter::new())
        } else {
            tracing::info!("Using fixed-length segmentation strategy");
            Box::new(FixedLengthSegmenter::new())
        };

        Self {
            client,
            segmenter,
            merger,
            config,
            pool_metrics: Arc::new(PoolMetrics::new()),
        }
    }

    /// 聚合的工作池指标
    pub fn pool_metrics(&self) -> Arc<PoolMetrics> {
        self.pool_metrics.clone()
    }

    /// 带进度回调的合成入口
    pub async fn synthesize_with_progress(
        &self,
        request: &SpeechRequest,
        cancel: &CancellationToken,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<SpeechResponse, SynthesisError> {
        // SSML 不分段，整篇交给上游
        if request.is_ssml() {
            return self.client.synthesize(request, cancel).await;
        }

        let text_len = request.text.chars().count();
        if text_len <= self.config.split_threshold {
            tracing::debug!(
                text_len,
                threshold = self.config.split_threshold,
                "Below split threshold, using single synthesis"
            );
            return self.client.synthesize(request, cancel).await;
        }

        let segments = self
            .segmenter
            .segment(&request.text, self.config.max_segment_length);
        tracing::info!(text_len, segments = segments.len(), "Text segmented");

        if segments.len() <= 1 {
            return self.client.synthesize(request, cancel).await;
        }

        let audio_segments = self
            .collect_segments(request, segments, cancel, progress)
            .await?;

        let merged = self.merger.merge(audio_segments).await?;
        Ok(SpeechResponse::mp3(merged))
    }

    /// 流式合成：按片段索引顺序向 `tx` 发送音频块
    ///
    /// 后完成的片段会被缓冲，直到其之前的所有片段都已发出；
    /// 片段失败时发送错误并终止。短文本退化为单块输出。
    pub async fn synthesize_streaming(
        &self,
        request: &SpeechRequest,
        cancel: &CancellationToken,
        tx: mpsc::Sender<Result<Bytes, SynthesisError>>,
    ) -> Result<(), SynthesisError> {
        let segments = if request.is_ssml() {
            Vec::new()
        } else {
            let text_len = request.text.chars().count();
            if text_len <= self.config.split_threshold {
                Vec::new()
            } else {
                self.segmenter
                    .segment(&request.text, self.config.max_segment_length)
            }
        };

        if segments.len() <= 1 {
            return match self.client.synthesize(request, cancel).await {
                Ok(response) => {
                    let _ = tx.send(Ok(Bytes::from(response.audio))).await;
                    Ok(())
                }
                Err(err) => {
                    let _ = tx.send(Err(err.clone())).await;
                    Err(err)
                }
            };
        }

        match self.stream_segments(request, segments, cancel, &tx).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let _ = tx.send(Err(err.clone())).await;
                Err(err)
            }
        }
    }

    /// 并发提交片段并按索引顺序收集
    async fn collect_segments(
        &self,
        request: &SpeechRequest,
        segments: Vec<String>,
        cancel: &CancellationToken,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<Vec<Vec<u8>>, SynthesisError> {
        let count = segments.len();
        let mut slots: Vec<Option<Vec<u8>>> = Vec::new();
        slots.resize_with(count, || None);

        let mut first_error = None;
        let outcome = self
            .run_pool(request, segments, cancel, |result| {
                match result.outcome {
                    Ok(audio) => {
                        if result.index < count {
                            slots[result.index] = Some(audio);
                        }
                    }
                    Err(err) => {
                        if first_error.is_none() {
                            first_error = Some(segment_error(result.index, err));
                        }
                    }
                }
            }, progress)
            .await;

        outcome?;
        if let Some(err) = first_error {
            return Err(err);
        }

        let mut audio_segments = Vec::with_capacity(count);
        for (index, slot) in slots.into_iter().enumerate() {
            audio_segments.push(slot.ok_or_else(|| {
                SynthesisError::Internal(format!("missing audio segment at index {}", index))
            })?);
        }
        Ok(audio_segments)
    }

    /// 流式收集：重排序缓冲，片段一旦按序就绪立即发出
    ///
    /// 乱序完成的片段先进入缓冲，直到其之前的所有片段都已发出
    async fn stream_segments(
        &self,
        request: &SpeechRequest,
        segments: Vec<String>,
        cancel: &CancellationToken,
        tx: &mpsc::Sender<Result<Bytes, SynthesisError>>,
    ) -> Result<(), SynthesisError> {
        use std::collections::BTreeMap;

        let count = segments.len();
        let (pool, mut results_rx, pipeline_cancel, submitter) =
            self.launch(request, segments, cancel)?;

        let mut pending: BTreeMap<usize, Vec<u8>> = BTreeMap::new();
        let mut next_emit = 0usize;
        let mut first_error: Option<SynthesisError> = None;
        let mut received = 0usize;

        while received < count {
            let result = tokio::select! {
                _ = pipeline_cancel.cancelled() => break,
                result = results_rx.recv() => match result {
                    Some(result) => result,
                    None => break,
                },
            };

            received += 1;
            match result.outcome {
                Ok(audio) => {
                    pending.insert(result.index, audio);
                    // 发出所有已按序就绪的片段；出错后停止发送但继续收集
                    if first_error.is_none() {
                        while let Some(audio) = pending.remove(&next_emit) {
                            if tx.send(Ok(Bytes::from(audio))).await.is_err() {
                                tracing::debug!("Streaming receiver dropped, aborting");
                                pipeline_cancel.cancel();
                                break;
                            }
                            next_emit += 1;
                        }
                    }
                }
                Err(err) => {
                    if first_error.is_none() {
                        first_error = Some(segment_error(result.index, err));
                    }
                }
            }
        }

        pool.close().await;

        let submit_outcome = submitter
            .await
            .unwrap_or_else(|e| Err(SynthesisError::Internal(format!("submitter panicked: {}", e))));

        if let Some(err) = first_error {
            return Err(err);
        }
        submit_outcome?;

        if cancel.is_cancelled() {
            return Err(SynthesisError::Internal(
                "request cancelled during result collection".to_string(),
            ));
        }

        Ok(())
    }

    /// 启动工作池与提交任务
    ///
    /// 返回 (池, 结果接收端, 联动取消句柄, 提交任务句柄)；
    /// 提交失败时通过联动取消唤醒收集循环
    #[allow(clippy::type_complexity)]
    fn launch(
        &self,
        request: &SpeechRequest,
        segments: Vec<String>,
        cancel: &CancellationToken,
    ) -> Result<
        (
            Arc<WorkerPool>,
            mpsc::Receiver<SegmentResult>,
            CancellationToken,
            tokio::task::JoinHandle<Result<(), SynthesisError>>,
        ),
        SynthesisError,
    > {
        let job_id = format!("job_{}", Uuid::new_v4().simple());

        let pool = Arc::new(WorkerPool::start(
            self.config.worker_count,
            self.client.clone(),
            self.pool_metrics.clone(),
        ));
        let results_rx = pool
            .take_results()
            .ok_or_else(|| SynthesisError::Internal("results stream unavailable".to_string()))?;

        let pipeline_cancel = cancel.child_token();

        let submitter = {
            let pool = pool.clone();
            let pipeline_cancel = pipeline_cancel.clone();
            let cancel = cancel.clone();
            let base = request.clone();
            let job_id = job_id.clone();

            tokio::spawn(async move {
                for (index, segment) in segments.into_iter().enumerate() {
                    if cancel.is_cancelled() {
                        pipeline_cancel.cancel();
                        return Err(SynthesisError::Internal(
                            "request cancelled during job submission".to_string(),
                        ));
                    }

                    let job = SegmentJob {
                        id: format!("{}_seg_{}", job_id, index),
                        index,
                        request: segment_request(&base, segment),
                        cancel: cancel.clone(),
                    };

                    if let Err(err) = pool.submit(job).await {
                        tracing::error!(index, error = %err, "Failed to submit segment job");
                        pipeline_cancel.cancel();
                        return Err(err);
                    }
                }
                Ok(())
            })
        };

        Ok((pool, results_rx, pipeline_cancel, submitter))
    }

    /// 工作池驱动循环：提交全部片段，逐个消费结果
    ///
    /// `on_result` 对每个结果调用一次；函数返回时池已关闭
    async fn run_pool(
        &self,
        request: &SpeechRequest,
        segments: Vec<String>,
        cancel: &CancellationToken,
        mut on_result: impl FnMut(SegmentResult),
        progress: Option<ProgressFn<'_>>,
    ) -> Result<(), SynthesisError> {
        let count = segments.len();
        let (pool, mut results_rx, pipeline_cancel, submitter) =
            self.launch(request, segments, cancel)?;

        let mut received = 0usize;
        while received < count {
            let result = tokio::select! {
                _ = pipeline_cancel.cancelled() => break,
                result = results_rx.recv() => match result {
                    Some(result) => result,
                    None => break,
                },
            };

            received += 1;
            if let Some(report) = progress {
                report(received, count);
            }
            on_result(result);
        }

        pool.close().await;

        let submit_outcome = submitter
            .await
            .unwrap_or_else(|e| Err(SynthesisError::Internal(format!("submitter panicked: {}", e))));
        submit_outcome?;

        if cancel.is_cancelled() {
            return Err(SynthesisError::Internal(
                "request cancelled during result collection".to_string(),
            ));
        }

        if received < count {
            return Err(SynthesisError::Internal(format!(
                "result stream closed unexpectedly, received {}/{} results",
                received, count
            )));
        }

        Ok(())
    }
}

/// 构造单片段请求：文本替换为片段内容，其余参数继承
fn segment_request(base: &SpeechRequest, segment: String) -> SpeechRequest {
    SpeechRequest {
        text: segment,
        ssml: String::new(),
        voice: base.voice.clone(),
        rate: base.rate.clone(),
        pitch: base.pitch.clone(),
        style: base.style.clone(),
        format: base.format.clone(),
    }
}

/// 保留错误类别，消息中标注片段序号（1 起始）
fn segment_error(index: usize, err: SynthesisError) -> SynthesisError {
    let prefix = |m: String| format!("segment {} failed: {}", index + 1, m);
    match err {
        SynthesisError::InvalidInput(m) => SynthesisError::InvalidInput(prefix(m)),
        SynthesisError::UpstreamAuth(m) => SynthesisError::UpstreamAuth(prefix(m)),
        SynthesisError::UpstreamRateLimit(m) => SynthesisError::UpstreamRateLimit(prefix(m)),
        SynthesisError::UpstreamTimeout(m) => SynthesisError::UpstreamTimeout(prefix(m)),
        SynthesisError::UpstreamNetwork(m) => SynthesisError::UpstreamNetwork(prefix(m)),
        SynthesisError::UpstreamServer(m) => SynthesisError::UpstreamServer(prefix(m)),
        SynthesisError::NotFound(m) => SynthesisError::NotFound(prefix(m)),
        SynthesisError::Internal(m) => SynthesisError::Internal(prefix(m)),
    }
}

#[async_trait]
impl Synthesizer for LongTextSynthesizer {
    async fn synthesize(
        &self,
        request: &SpeechRequest,
        cancel: &CancellationToken,
    ) -> Result<SpeechResponse, SynthesisError> {
        self.synthesize_with_progress(request, cancel, None).await
    }

    async fn list_voices(&self, locale: &str) -> Result<Vec<Voice>, SynthesisError> {
        self.client.list_voices(locale).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// 按片段内容回显音频的假引擎，支持指定失败片段与时延
    struct EchoEngine {
        calls: AtomicUsize,
        fail_on_text: Option<String>,
        delays: Mutex<std::collections::HashMap<String, Duration>>,
    }

    impl EchoEngine {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_on_text: None,
                delays: Mutex::new(std::collections::HashMap::new()),
            }
        }

        fn failing_on(text: &str) -> Self {
            Self {
                fail_on_text: Some(text.to_string()),
                ..Self::new()
            }
        }

        fn with_delay(self, text: &str, delay: Duration) -> Self {
            self.delays.lock().unwrap().insert(text.to_string(), delay);
            self
        }
    }

    #[async_trait]
    impl Synthesizer for EchoEngine {
        async fn synthesize(
            &self,
            request: &SpeechRequest,
            cancel: &CancellationToken,
        ) -> Result<SpeechResponse, SynthesisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            let delay = self.delays.lock().unwrap().get(request.content()).copied();
            if let Some(delay) = delay {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        return Err(SynthesisError::Internal("request cancelled".to_string()));
                    }
                }
            }

            if self.fail_on_text.as_deref() == Some(request.content()) {
                return Err(SynthesisError::from_upstream_status(500, "mock failure"));
            }
            Ok(SpeechResponse::mp3(request.content().as_bytes().to_vec()))
        }

        async fn list_voices(&self, _locale: &str) -> Result<Vec<Voice>, SynthesisError> {
            Ok(Vec::new())
        }
    }

    /// 记录调用并拼接片段的假合并器
    struct RecordingMerger {
        calls: AtomicUsize,
    }

    impl RecordingMerger {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AudioMerger for RecordingMerger {
        async fn merge(&self, segments: Vec<Vec<u8>>) -> Result<Vec<u8>, SynthesisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(segments.concat())
        }
    }

    fn service(
        engine: Arc<EchoEngine>,
        merger: Arc<RecordingMerger>,
        threshold: usize,
        seg_len: usize,
    ) -> LongTextSynthesizer {
        LongTextSynthesizer::new(
            engine,
            merger,
            LongTextServiceConfig {
                split_threshold: threshold,
                max_segment_length: seg_len,
                worker_count: 3,
                smart_segment: false,
            },
        )
    }

    fn text_request(text: &str) -> SpeechRequest {
        SpeechRequest {
            text: text.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_short_text_delegates_directly() {
        let engine = Arc::new(EchoEngine::new());
        let merger = Arc::new(RecordingMerger::new());
        let svc = service(engine.clone(), merger.clone(), 100, 10);

        let resp = svc
            .synthesize(&text_request("short"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(resp.audio, b"short");
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
        assert_eq!(merger.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_ssml_bypasses_segmentation() {
        let engine = Arc::new(EchoEngine::new());
        let merger = Arc::new(RecordingMerger::new());
        let svc = service(engine.clone(), merger.clone(), 4, 4);

        let req = SpeechRequest {
            ssml: "<speak>a very long ssml document</speak>".to_string(),
            ..Default::default()
        };
        svc.synthesize(&req, &CancellationToken::new()).await.unwrap();

        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
        assert_eq!(merger.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_long_text_merged_in_index_order() {
        let engine = Arc::new(
            EchoEngine::new()
                // 前面的片段完成得更晚，验证按索引而非完成顺序合并
                .with_delay("aaaa", Duration::from_millis(60))
                .with_delay("bbbb", Duration::from_millis(30)),
        );
        let merger = Arc::new(RecordingMerger::new());
        let svc = service(engine.clone(), merger.clone(), 8, 4);

        let resp = svc
            .synthesize(&text_request("aaaabbbbccccdddd"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(resp.audio, b"aaaabbbbccccdddd");
        assert_eq!(engine.calls.load(Ordering::SeqCst), 4);
        assert_eq!(merger.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_partial_failure_fails_whole_request() {
        // 8 个片段，第 5 个（索引 4）失败
        let engine = Arc::new(EchoEngine::failing_on("e4e4"));
        let merger = Arc::new(RecordingMerger::new());
        let svc = service(engine.clone(), merger.clone(), 8, 4);

        let text = "a0a0b1b1c2c2d3d3e4e4f5f5g6g6h7h7";
        let err = svc
            .synthesize(&text_request(text), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SynthesisError::UpstreamServer(_)));
        assert!(err.to_string().contains("segment 5 failed"), "{}", err);
        // 所有片段都被执行（结果被完整收集），但不触发合并
        assert_eq!(engine.calls.load(Ordering::SeqCst), 8);
        assert_eq!(merger.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_progress_reported_monotonically() {
        let engine = Arc::new(EchoEngine::new());
        let merger = Arc::new(RecordingMerger::new());
        let svc = service(engine, merger, 4, 4);

        let seen = Mutex::new(Vec::new());
        svc.synthesize_with_progress(
            &text_request("aaaabbbbcccc"),
            &CancellationToken::new(),
            Some(&|done, total| {
                seen.lock().unwrap().push((done, total));
            }),
        )
        .await
        .unwrap();

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen.last(), Some(&(3, 3)));
        assert!(seen.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[tokio::test]
    async fn test_cancellation_aborts_without_merge() {
        let engine = Arc::new(
            EchoEngine::new()
                .with_delay("aaaa", Duration::from_secs(5))
                .with_delay("bbbb", Duration::from_secs(5))
                .with_delay("cccc", Duration::from_secs(5)),
        );
        let merger = Arc::new(RecordingMerger::new());
        let svc = service(engine, merger.clone(), 4, 4);

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let err = svc
            .synthesize(&text_request("aaaabbbbcccc"), &cancel)
            .await
            .unwrap_err();

        assert!(err.to_string().to_lowercase().contains("cancel"), "{}", err);
        assert_eq!(merger.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_streaming_emits_in_index_order() {
        let engine = Arc::new(
            EchoEngine::new()
                .with_delay("aaaa", Duration::from_millis(50))
                .with_delay("cccc", Duration::from_millis(20)),
        );
        let merger = Arc::new(RecordingMerger::new());
        let svc = service(engine, merger, 8, 4);

        let (tx, mut rx) = mpsc::channel(16);
        svc.synthesize_streaming(&text_request("aaaabbbbccccdddd"), &CancellationToken::new(), tx)
            .await
            .unwrap();

        let mut chunks = Vec::new();
        while let Some(item) = rx.recv().await {
            chunks.push(item.unwrap());
        }
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].as_ref(), b"aaaa");
        assert_eq!(chunks[1].as_ref(), b"bbbb");
        assert_eq!(chunks[2].as_ref(), b"cccc");
        assert_eq!(chunks[3].as_ref(), b"dddd");
    }

    #[tokio::test]
    async fn test_streaming_short_text_single_chunk() {
        let engine = Arc::new(EchoEngine::new());
        let merger = Arc::new(RecordingMerger::new());
        let svc = service(engine, merger, 100, 4);

        let (tx, mut rx) = mpsc::channel(4);
        svc.synthesize_streaming(&text_request("tiny"), &CancellationToken::new(), tx)
            .await
            .unwrap();

        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first.as_ref(), b"tiny");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_streaming_failure_sends_error() {
        let engine = Arc::new(EchoEngine::failing_on("bbbb"));
        let merger = Arc::new(RecordingMerger::new());
        let svc = service(engine, merger, 4, 4);

        let (tx, mut rx) = mpsc::channel(8);
        let outcome = svc
            .synthesize_streaming(&text_request("aaaabbbbcccc"), &CancellationToken::new(), tx)
            .await;
        assert!(outcome.is_err());

        let mut saw_error = false;
        while let Some(item) = rx.recv().await {
            if let Err(err) = item {
                assert!(err.to_string().contains("segment 2 failed"));
                saw_error = true;
            }
        }
        assert!(saw_error);
    }
}
