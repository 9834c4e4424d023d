//! Network-backed providers.
//!
//! A vendor implements [`CloudBackend`] (wire format, request execution,
//! pricing, batch endpoints). [`CloudAiProvider`] wraps it with the shared
//! policy: a rate-limit gate before every request, retry with backoff around
//! request execution, usage/cost accounting after each successful generation,
//! and the correlation list needed to order batch results.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::batch::{correlate_results, validate_batch_input, BatchRegistry};
use super::{
    ensure_input_supported, AiProvider, BatchJob, BatchStatus, GenerationOptions, ModelInfo,
    ProviderStats, RateLimiter, RetryPolicy, TextStream, UsageTracker,
};
use crate::error::ProviderError;
use crate::message::{AiResponse, Message, Usage};

/// Raw state of a backend batch resource.
#[derive(Debug, Clone)]
pub struct BatchSnapshot {
    pub status: BatchStatus,
    /// `(custom_id, response)` pairs, populated once the job is terminal.
    pub items: Vec<(String, AiResponse)>,
    pub created_at: Option<String>,
    pub completed_at: Option<String>,
}

/// Vendor-specific half of a cloud provider.
#[async_trait]
pub trait CloudBackend: Send + Sync {
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// Whether credentials are configured. Checked before every request.
    fn has_credentials(&self) -> bool;

    /// Execute one blocking request.
    async fn make_request(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<AiResponse, ProviderError>;

    /// Start a streaming request.
    async fn make_stream_request(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<TextStream, ProviderError>;

    /// Cost of one response in USD. Unknown models return 0.0.
    fn calculate_cost(&self, usage: &Usage) -> f64;

    /// Submit a backend-native batch and return its id.
    async fn create_batch(
        &self,
        messages_list: &[Vec<Message>],
        custom_ids: &[String],
        options: &GenerationOptions,
    ) -> Result<String, ProviderError>;

    async fn fetch_batch(&self, job_id: &str) -> Result<BatchSnapshot, ProviderError>;

    async fn cancel_batch(&self, job_id: &str) -> Result<(), ProviderError>;

    fn supports_images(&self) -> bool;

    fn supports_streaming(&self) -> bool {
        true
    }

    fn supports_batch(&self) -> bool {
        true
    }

    fn context_window(&self) -> u32;

    fn timeout(&self) -> Duration;
}

/// Cloud provider assembled from a backend plus rate limit, retry and usage policy.
pub struct CloudAiProvider<B: CloudBackend> {
    backend: B,
    limiter: RateLimiter,
    retry: RetryPolicy,
    usage: Arc<UsageTracker>,
    batches: BatchRegistry,
}

impl<B: CloudBackend> CloudAiProvider<B> {
    pub fn new(backend: B, requests_per_minute: u32, retry: RetryPolicy) -> Self {
        Self {
            backend,
            limiter: RateLimiter::new(requests_per_minute),
            retry,
            usage: Arc::new(UsageTracker::new()),
            batches: BatchRegistry::new(),
        }
    }

    /// Account usage into a tracker shared with other providers.
    pub fn with_usage_tracker(mut self, tracker: Arc<UsageTracker>) -> Self {
        self.usage = tracker;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn usage_tracker(&self) -> &Arc<UsageTracker> {
        &self.usage
    }

    pub fn reset_usage(&self) {
        self.usage.reset();
    }

    fn check_credentials(&self) -> Result<(), ProviderError> {
        if self.backend.has_credentials() {
            Ok(())
        } else {
            Err(ProviderError::unavailable(
                self.backend.name(),
                "API key not configured",
            ))
        }
    }
}

#[async_trait]
impl<B: CloudBackend> AiProvider for CloudAiProvider<B> {
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
        self.check_credentials()?;

        let label = format!("{}/{}", self.name(), self.model());
        let mut response = self
            .retry
            .run(&label, || async {
                self.limiter.acquire().await;
                self.backend.make_request(messages, options).await
            })
            .await?;

        let cost = response
            .usage
            .as_ref()
            .map(|u| self.backend.calculate_cost(u))
            .unwrap_or(0.0);
        if let Some(usage) = response.usage.as_mut() {
            usage.cost = Some(cost);
        }
        self.usage.record(response.usage.as_ref(), cost);

        tracing::debug!(
            "{label}: {} tokens, ${cost:.6}",
            response.total_tokens()
        );
        Ok(response)
    }

    async fn generate_text_stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<TextStream, ProviderError> {
        ensure_input_supported(self.name(), self.supports_images(), messages)?;
        if !self.backend.supports_streaming() {
            return Err(ProviderError::not_supported(self.name(), "streaming"));
        }
        self.check_credentials()?;

        let label = format!("{}/{} stream", self.name(), self.model());
        self.retry
            .run(&label, || async {
                self.limiter.acquire().await;
                self.backend.make_stream_request(messages, options).await
            })
            .await
    }

    async fn create_batch_job(
        &self,
        messages_list: &[Vec<Message>],
        custom_ids: &[String],
        options: &GenerationOptions,
    ) -> Result<BatchJob, ProviderError> {
        validate_batch_input(messages_list, custom_ids)?;
        if !self.backend.supports_batch() {
            return Err(ProviderError::not_supported(self.name(), "batch jobs"));
        }
        for messages in messages_list {
            ensure_input_supported(self.name(), self.supports_images(), messages)?;
        }
        self.check_credentials()?;

        // Submission is not idempotent, so it is gated but never retried.
        self.limiter.acquire().await;
        let job_id = self
            .backend
            .create_batch(messages_list, custom_ids, options)
            .await?;
        self.batches.register(&job_id, custom_ids);

        tracing::info!(
            "{}: submitted batch {job_id} with {} prompts",
            self.name(),
            custom_ids.len()
        );
        Ok(BatchJob::new(job_id, BatchStatus::Queued))
    }

    async fn get_batch_job(&self, job_id: &str) -> Result<BatchJob, ProviderError> {
        self.check_credentials()?;
        let label = format!("{} batch {job_id}", self.name());
        let snapshot = self
            .retry
            .run(&label, || async {
                self.limiter.acquire().await;
                self.backend.fetch_batch(job_id).await
            })
            .await?;

        let results = if snapshot.status.is_terminal() {
            let custom_ids = self.batches.custom_ids(job_id);
            correlate_results(self.model(), &custom_ids, snapshot.items)
        } else {
            Vec::new()
        };

        Ok(BatchJob {
            job_id: job_id.to_string(),
            status: snapshot.status,
            results,
            created_at: snapshot.created_at,
            completed_at: snapshot.completed_at,
        })
    }

    async fn cancel_batch_job(&self, job_id: &str) -> bool {
        if self.batches.cancel_requested(job_id) {
            tracing::debug!("{}: batch {job_id} already cancelled", self.name());
            return false;
        }
        if !self.backend.has_credentials() {
            return false;
        }

        self.limiter.acquire().await;
        match self.backend.fetch_batch(job_id).await {
            Ok(snapshot) if snapshot.status.is_terminal() => {
                tracing::debug!(
                    "{}: batch {job_id} is already {:?}",
                    self.name(),
                    snapshot.status
                );
                return false;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("{}: could not check batch {job_id}: {e}", self.name());
                return false;
            }
        }

        self.limiter.acquire().await;
        match self.backend.cancel_batch(job_id).await {
            Ok(()) => {
                self.batches.mark_cancel_requested(job_id);
                tracing::info!("{}: cancellation accepted for batch {job_id}", self.name());
                true
            }
            Err(e) => {
                tracing::warn!("{}: cancel rejected for batch {job_id}: {e}", self.name());
                false
            }
        }
    }

    fn supports_images(&self) -> bool {
        self.backend.supports_images()
    }

    fn supports_streaming(&self) -> bool {
        self.backend.supports_streaming()
    }

    fn supports_batch(&self) -> bool {
        self.backend.supports_batch()
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: self.name().to_string(),
            model: self.model().to_string(),
            supports_images: self.supports_images(),
            supports_streaming: self.supports_streaming(),
            supports_batch: self.supports_batch(),
            context_window: Some(self.backend.context_window()),
        }
    }

    fn usage_stats(&self) -> ProviderStats {
        ProviderStats::Cloud(self.usage.snapshot())
    }

    fn timeout(&self) -> Duration {
        self.backend.timeout()
    }
}
