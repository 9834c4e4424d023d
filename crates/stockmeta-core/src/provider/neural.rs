//! Checkpoint-based neural network providers.
//!
//! A [`NeuralBackend`] supplies the model-specific stages: build, checkpoint
//! load/save, preprocess, forward pass, postprocess. [`NeuralNetworkProvider`]
//! owns the loaded model, runs the three-stage pipeline, and times the
//! forward pass. Inference is CPU-bound and runs inline on the calling task.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::batch::{local_job_id, validate_batch_input};
use super::{
    ensure_input_supported, AiProvider, BatchJob, BatchResult, BatchStatus, GenerationOptions,
    ModelInfo, ProviderStats, TextStream,
};
use crate::error::ProviderError;
use crate::message::{AiResponse, Message, Usage};

/// Model-specific stages of a neural provider.
pub trait NeuralBackend: Send + Sync {
    type Model: Send;
    type Input;
    type Output;

    fn name(&self) -> &str;

    fn model_name(&self) -> &str;

    /// Construct the model with its initial weights.
    fn build_model(&self) -> Result<Self::Model, ProviderError>;

    /// Restore weights from a checkpoint file.
    fn load_checkpoint(&self, model: &mut Self::Model, path: &Path) -> Result<(), ProviderError>;

    /// Persist weights. Parent directories already exist.
    fn save_checkpoint(&self, model: &Self::Model, path: &Path) -> Result<(), ProviderError>;

    /// Switch to inference mode. No-op for runtimes without a training mode.
    fn set_eval_mode(&self, _model: &mut Self::Model) {}

    fn preprocess_messages(&self, messages: &[Message]) -> Result<Self::Input, ProviderError>;

    fn forward_pass(
        &self,
        model: &mut Self::Model,
        input: Self::Input,
        options: &GenerationOptions,
    ) -> Result<Self::Output, ProviderError>;

    fn postprocess_output(&self, output: Self::Output) -> Result<String, ProviderError>;

    fn supports_images(&self) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
struct InferenceStats {
    total_inferences: u64,
    average_inference_ms: f64,
}

impl InferenceStats {
    fn record(&mut self, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        self.total_inferences += 1;
        let n = self.total_inferences as f64;
        self.average_inference_ms += (ms - self.average_inference_ms) / n;
    }
}

/// Neural provider assembled from a backend plus model ownership and timing.
pub struct NeuralNetworkProvider<B: NeuralBackend> {
    backend: B,
    checkpoint_path: Option<PathBuf>,
    model: Mutex<Option<B::Model>>,
    stats: Mutex<InferenceStats>,
}

impl<B: NeuralBackend> NeuralNetworkProvider<B> {
    pub fn new(backend: B, checkpoint_path: Option<PathBuf>) -> Self {
        Self {
            backend,
            checkpoint_path,
            model: Mutex::new(None),
            stats: Mutex::new(InferenceStats::default()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn is_loaded(&self) -> bool {
        self.model.lock().map(|m| m.is_some()).unwrap_or(false)
    }

    fn lock_model(&self) -> Result<std::sync::MutexGuard<'_, Option<B::Model>>, ProviderError> {
        self.model.lock().map_err(|e| ProviderError::Inference {
            model: self.backend.model_name().to_string(),
            message: format!("model lock poisoned: {e}"),
        })
    }

    /// Build the model, restore the configured checkpoint if present, enter eval mode.
    pub fn load_model(&self) -> Result<(), ProviderError> {
        let mut model = self.backend.build_model()?;
        if let Some(path) = &self.checkpoint_path {
            if path.exists() {
                self.backend.load_checkpoint(&mut model, path)?;
                tracing::info!("{}: restored checkpoint {:?}", self.name(), path);
            } else {
                tracing::warn!(
                    "{}: checkpoint {:?} not found, using built weights",
                    self.name(),
                    path
                );
            }
        }
        self.backend.set_eval_mode(&mut model);
        *self.lock_model()? = Some(model);
        tracing::info!("{}: model {} loaded", self.name(), self.model());
        Ok(())
    }

    pub fn unload_model(&self) -> Result<(), ProviderError> {
        *self.lock_model()? = None;
        Ok(())
    }

    /// Persist the loaded model. Fails with `NotLoaded` before `load_model`.
    pub fn save_model(&self, path: &Path) -> Result<(), ProviderError> {
        let guard = self.lock_model()?;
        let model = guard.as_ref().ok_or_else(|| ProviderError::NotLoaded {
            model: self.backend.model_name().to_string(),
        })?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.backend.save_checkpoint(model, path)
    }

    fn run_pipeline(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<AiResponse, ProviderError> {
        if !self.is_loaded() {
            self.load_model()?;
        }
        let input = self.backend.preprocess_messages(messages)?;

        let mut guard = self.lock_model()?;
        let model = guard.as_mut().ok_or_else(|| ProviderError::NotLoaded {
            model: self.backend.model_name().to_string(),
        })?;
        let start = Instant::now();
        let output = self.backend.forward_pass(model, input, options)?;
        let elapsed = start.elapsed();
        drop(guard);

        if let Ok(mut stats) = self.stats.lock() {
            stats.record(elapsed);
        }

        let content = self.backend.postprocess_output(output)?;
        let usage = Usage {
            inference_ms: Some(elapsed.as_millis() as u64),
            ..Default::default()
        };
        Ok(AiResponse::new(content, self.backend.model_name())
            .with_usage(usage)
            .with_finish_reason("stop"))
    }
}

#[async_trait]
impl<B: NeuralBackend> AiProvider for NeuralNetworkProvider<B> {
    fn name(&self) -> &str {
        self.backend.name()
    }

    fn model(&self) -> &str {
        self.backend.model_name()
    }

    async fn generate_text(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<AiResponse, ProviderError> {
        ensure_input_supported(self.name(), self.supports_images(), messages)?;
        self.run_pipeline(messages, options)
    }

    async fn generate_text_stream(
        &self,
        _messages: &[Message],
        _options: &GenerationOptions,
    ) -> Result<TextStream, ProviderError> {
        Err(ProviderError::not_supported(self.name(), "streaming"))
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
        false
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
            supports_streaming: false,
            supports_batch: true,
            context_window: None,
        }
    }

    fn usage_stats(&self) -> ProviderStats {
        let stats = self.stats.lock().map(|s| *s).unwrap_or_default();
        ProviderStats::Neural {
            total_inferences: stats.total_inferences,
            average_inference_ms: stats.average_inference_ms,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(120)
    }
}
