//! Providers that keep a model resident (in-process or in a local server).
//!
//! [`LocalAiProvider`] owns the lifecycle flag (loading the model on first
//! generation if nobody loaded it yet), merges constructor defaults
//! with call-time options, counts generations, and runs batches eagerly:
//! every prompt is generated before `create_batch_job` returns, and a failing
//! prompt becomes an error-content result instead of aborting the batch.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::batch::{local_job_id, validate_batch_input};
use super::stream::single_chunk;
use super::{
    ensure_input_supported, AiProvider, BatchJob, BatchResult, BatchStatus, GenerationOptions,
    ModelInfo, ProviderStats, TextStream,
};
use crate::error::ProviderError;
use crate::message::{AiResponse, Message};

/// Model-specific half of a local provider.
#[async_trait]
pub trait LocalBackend: Send + Sync {
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// Bring the model into memory.
    async fn load(&self) -> Result<(), ProviderError>;

    /// Release the model. Must drop every reference to model weights.
    async fn unload(&self) -> Result<(), ProviderError>;

    /// Generate with fully merged options.
    async fn generate_response(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<AiResponse, ProviderError>;

    /// Incremental generation. Defaults to a one-chunk stream of the full response.
    async fn stream_response(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<TextStream, ProviderError> {
        let response = self.generate_response(messages, options).await?;
        Ok(single_chunk(response.content))
    }

    fn supports_images(&self) -> bool;

    fn supports_streaming(&self) -> bool {
        false
    }

    fn timeout(&self) -> Duration;
}

#[derive(Debug, Default, Clone, Copy)]
struct GenerationCounters {
    total_generations: u64,
    total_tokens_generated: u64,
}

/// Local provider assembled from a backend plus lifecycle and defaults.
pub struct LocalAiProvider<B: LocalBackend> {
    backend: B,
    defaults: GenerationOptions,
    loaded: AtomicBool,
    counters: Mutex<GenerationCounters>,
}

impl<B: LocalBackend> LocalAiProvider<B> {
    pub fn new(backend: B, defaults: GenerationOptions) -> Self {
        Self {
            backend,
            defaults,
            loaded: AtomicBool::new(false),
            counters: Mutex::new(GenerationCounters::default()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn defaults(&self) -> &GenerationOptions {
        &self.defaults
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    /// Load the model. Calling twice loads twice unless the backend guards it.
    pub async fn load_model(&self) -> Result<(), ProviderError> {
        tracing::info!("{}: loading model {}", self.name(), self.model());
        self.backend.load().await?;
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub async fn unload_model(&self) -> Result<(), ProviderError> {
        self.backend.unload().await?;
        self.loaded.store(false, Ordering::SeqCst);
        tracing::info!("{}: unloaded model {}", self.name(), self.model());
        Ok(())
    }

    async fn ensure_loaded(&self) -> Result<(), ProviderError> {
        if !self.is_loaded() {
            self.load_model().await?;
        }
        Ok(())
    }

    fn record(&self, response: &AiResponse) {
        if let Ok(mut counters) = self.counters.lock() {
            counters.total_generations += 1;
            counters.total_tokens_generated += response
                .usage
                .map(|u| u.output_tokens)
                .unwrap_or(0);
        }
    }
}

#[async_trait]
impl<B: LocalBackend> AiProvider for LocalAiProvider<B> {
    fn name(&self) -> &str {
        self.backend.name()
    }

    fn model(&self) -> &str {
        self.backend.model()
    }

    async fn generate_text(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<AiResponse, ProviderError> {
        ensure_input_supported(self.name(), self.supports_images(), messages)?;
        self.ensure_loaded().await?;
        let merged = options.merged_over(&self.defaults);
        let response = self.backend.generate_response(messages, &merged).await?;
        self.record(&response);
        Ok(response)
    }

    async fn generate_text_stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<TextStream, ProviderError> {
        ensure_input_supported(self.name(), self.supports_images(), messages)?;
        self.ensure_loaded().await?;
        let merged = options.merged_over(&self.defaults);
        self.backend.stream_response(messages, &merged).await
    }

    async fn create_batch_job(
        &self,
        messages_list: &[Vec<Message>],
        custom_ids: &[String],
        options: &GenerationOptions,
    ) -> Result<BatchJob, ProviderError> {
        validate_batch_input(messages_list, custom_ids)?;

        let mut job = BatchJob::new(local_job_id(), BatchStatus::Completed);
        for (messages, custom_id) in messages_list.iter().zip(custom_ids) {
            let response = match self.generate_text(messages, options).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!("{}: batch item {custom_id} failed: {e}", self.name());
                    AiResponse::error(self.model(), e)
                }
            };
            job.results.push(BatchResult {
                custom_id: custom_id.clone(),
                response,
            });
        }
        Ok(job)
    }

    async fn get_batch_job(&self, _job_id: &str) -> Result<BatchJob, ProviderError> {
        Err(ProviderError::not_supported(self.name(), "batch job polling"))
    }

    async fn cancel_batch_job(&self, _job_id: &str) -> bool {
        false
    }

    fn supports_images(&self) -> bool {
        self.backend.supports_images()
    }

    fn supports_streaming(&self) -> bool {
        self.backend.supports_streaming()
    }

    /// Batches run synchronously; the returned job is already `Completed`.
    fn supports_batch(&self) -> bool {
        true
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: self.name().to_string(),
            model: self.model().to_string(),
            supports_images: self.supports_images(),
            supports_streaming: self.supports_streaming(),
            supports_batch: true,
            context_window: None,
        }
    }

    fn usage_stats(&self) -> ProviderStats {
        let counters = self.counters.lock().map(|c| *c).unwrap_or_default();
        ProviderStats::Local {
            total_generations: counters.total_generations,
            total_tokens_generated: counters.total_tokens_generated,
        }
    }

    fn timeout(&self) -> Duration {
        self.backend.timeout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ContentBlock, Usage};
    use std::sync::atomic::AtomicU32;

    /// Echoes the merged options back so tests can inspect them.
    struct EchoBackend {
        loads: AtomicU32,
        refuse_load: AtomicBool,
        weights: Mutex<Option<Vec<u8>>>,
        seen: Mutex<Vec<GenerationOptions>>,
    }

    impl EchoBackend {
        fn new() -> Self {
            Self {
                loads: AtomicU32::new(0),
                refuse_load: AtomicBool::new(false),
                weights: Mutex::new(None),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LocalBackend for EchoBackend {
        fn name(&self) -> &str {
            "echo"
        }

        fn model(&self) -> &str {
            "echo-1"
        }

        async fn load(&self) -> Result<(), ProviderError> {
            if self.refuse_load.load(Ordering::SeqCst) {
                return Err(ProviderError::unavailable("echo", "weights missing"));
            }
            self.loads.fetch_add(1, Ordering::SeqCst);
            *self.weights.lock().unwrap() = Some(vec![0; 16]);
            Ok(())
        }

        async fn unload(&self) -> Result<(), ProviderError> {
            *self.weights.lock().unwrap() = None;
            Ok(())
        }

        async fn generate_response(
            &self,
            messages: &[Message],
            options: &GenerationOptions,
        ) -> Result<AiResponse, ProviderError> {
            self.seen.lock().unwrap().push(options.clone());
            let prompt = messages.last().map(Message::text).unwrap_or_default();
            if prompt == "fail" {
                return Err(ProviderError::Inference {
                    model: "echo-1".to_string(),
                    message: "out of memory".to_string(),
                });
            }
            Ok(AiResponse::new(format!("echo: {prompt}"), "echo-1")
                .with_usage(Usage::from_tokens(3, 4)))
        }

        fn supports_images(&self) -> bool {
            false
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }
    }

    fn defaults() -> GenerationOptions {
        GenerationOptions {
            max_tokens: Some(512),
            temperature: Some(0.7),
            top_p: Some(0.9),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_load_unload_lifecycle() {
        let p = LocalAiProvider::new(EchoBackend::new(), defaults());
        assert!(!p.is_loaded());
        p.load_model().await.unwrap();
        assert!(p.is_loaded());
        assert!(p.backend().weights.lock().unwrap().is_some());
        p.unload_model().await.unwrap();
        assert!(!p.is_loaded());
        assert!(p.backend().weights.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_double_load_is_not_guarded() {
        let p = LocalAiProvider::new(EchoBackend::new(), defaults());
        p.load_model().await.unwrap();
        p.load_model().await.unwrap();
        assert_eq!(p.backend().loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_generate_loads_model_on_first_use() {
        let p = LocalAiProvider::new(EchoBackend::new(), defaults());
        let opts = GenerationOptions::default();
        p.generate_text(&[Message::user("a")], &opts).await.unwrap();
        assert!(p.is_loaded());
        p.generate_text(&[Message::user("b")], &opts).await.unwrap();
        assert_eq!(p.backend().loads.load(Ordering::SeqCst), 1);

        p.unload_model().await.unwrap();
        p.generate_text_stream(&[Message::user("c")], &opts).await.unwrap();
        assert!(p.is_loaded());
        assert_eq!(p.backend().loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_load_blocks_generation() {
        let backend = EchoBackend::new();
        backend.refuse_load.store(true, Ordering::SeqCst);
        let p = LocalAiProvider::new(backend, defaults());
        let err = p
            .generate_text(&[Message::user("a")], &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable { .. }));
        assert!(!p.is_loaded());
        assert!(p.backend().seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_call_time_options_win() {
        let p = LocalAiProvider::new(EchoBackend::new(), defaults());
        let call = GenerationOptions::default().with_temperature(0.2);
        p.generate_text(&[Message::user("hi")], &call).await.unwrap();
        let seen = p.backend().seen.lock().unwrap()[0].clone();
        assert_eq!(seen.temperature, Some(0.2));
        assert_eq!(seen.max_tokens, Some(512));
    }

    #[tokio::test]
    async fn test_images_rejected_for_text_backend() {
        let p = LocalAiProvider::new(EchoBackend::new(), defaults());
        let msg = Message::user_with_image("x", ContentBlock::image_bytes(&[1], "png"));
        let err = p
            .generate_text(&[msg], &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedInput { .. }));
    }

    #[tokio::test]
    async fn test_eager_batch_captures_item_errors() {
        let p = LocalAiProvider::new(EchoBackend::new(), defaults());
        let msgs = vec![
            vec![Message::user("one")],
            vec![Message::user("fail")],
            vec![Message::user("three")],
        ];
        let ids: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let job = p
            .create_batch_job(&msgs, &ids, &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(job.status, BatchStatus::Completed);
        assert_eq!(job.results.len(), 3);
        assert_eq!(job.results[0].response.content, "echo: one");
        assert!(job.results[1].is_error());
        assert!(job.results[1].response.content.starts_with("Error:"));
        assert_eq!(job.results[2].custom_id, "c");
    }

    #[tokio::test]
    async fn test_polling_unsupported_and_cancel_false() {
        let p = LocalAiProvider::new(EchoBackend::new(), defaults());
        assert!(p.supports_batch());
        assert!(p.model_info().supports_batch);
        let err = p.get_batch_job("local-batch-1").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotSupported { .. }));
        assert!(!p.cancel_batch_job("local-batch-1").await);
        assert!(!p.cancel_batch_job("local-batch-1").await);
    }

    #[tokio::test]
    async fn test_stats_count_generations() {
        let p = LocalAiProvider::new(EchoBackend::new(), defaults());
        let opts = GenerationOptions::default();
        p.generate_text(&[Message::user("a")], &opts).await.unwrap();
        p.generate_text(&[Message::user("b")], &opts).await.unwrap();
        assert_eq!(
            p.usage_stats(),
            ProviderStats::Local {
                total_generations: 2,
                total_tokens_generated: 8
            }
        );
    }

    #[tokio::test]
    async fn test_default_stream_is_single_chunk() {
        use futures_util::StreamExt;
        let p = LocalAiProvider::new(EchoBackend::new(), defaults());
        let parts: Vec<String> = p
            .generate_text_stream(&[Message::user("s")], &GenerationOptions::default())
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(parts, vec!["echo: s"]);
    }
}
