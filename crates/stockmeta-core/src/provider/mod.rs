//! Provider capability interface and the building blocks backends assemble.
//!
//! Every backend implements [`AiProvider`]. Instead of a base-class hierarchy,
//! three generic wrappers supply the shared policy:
//!
//! - [`CloudAiProvider`] wraps a [`CloudBackend`] with rate limiting, retry and
//!   usage/cost accounting, and tracks true asynchronous batch jobs.
//! - [`LocalAiProvider`] wraps a [`LocalBackend`] with a load/unload lifecycle,
//!   parameter merging and the eager sequential batch path.
//! - [`NeuralNetworkProvider`] wraps a [`NeuralBackend`] with the
//!   preprocess → forward → postprocess pipeline and checkpoint persistence.

pub mod anthropic;
pub mod batch;
pub mod cloud;
pub mod local;
pub mod neural;
pub mod ollama;
pub mod onnx;
pub mod openai;
pub mod rate_limit;
pub mod retry;
pub(crate) mod stream;
pub mod usage;

pub use batch::{BatchJob, BatchResult, BatchStatus};
pub use cloud::{CloudAiProvider, CloudBackend};
pub use local::{LocalAiProvider, LocalBackend};
pub use neural::{NeuralBackend, NeuralNetworkProvider};
pub use rate_limit::RateLimiter;
pub use retry::{Backoff, RetryPolicy};
pub use usage::{ModelPricing, UsageStats, UsageTracker};

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::Serialize;
use std::time::Duration;

use crate::error::ProviderError;
use crate::message::{AiResponse, Message};

/// Lazily produced text fragments. `None` marks the end of the stream; errors
/// arrive as `Err` items. Dropping the stream cancels the request.
pub type TextStream = BoxStream<'static, Result<String, ProviderError>>;

/// Per-call generation parameters. Unset fields fall back to provider defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub stop: Vec<String>,
    /// Ask backends that support it for a JSON object response.
    pub json_mode: bool,
}

impl GenerationOptions {
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Fill unset fields from `defaults`. Values already set on `self` win.
    pub fn merged_over(&self, defaults: &GenerationOptions) -> GenerationOptions {
        GenerationOptions {
            max_tokens: self.max_tokens.or(defaults.max_tokens),
            temperature: self.temperature.or(defaults.temperature),
            top_p: self.top_p.or(defaults.top_p),
            top_k: self.top_k.or(defaults.top_k),
            stop: if self.stop.is_empty() {
                defaults.stop.clone()
            } else {
                self.stop.clone()
            },
            json_mode: self.json_mode || defaults.json_mode,
        }
    }
}

/// Static description of a provider instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub provider: String,
    pub model: String,
    pub supports_images: bool,
    pub supports_streaming: bool,
    pub supports_batch: bool,
    pub context_window: Option<u32>,
}

/// Accumulated counters, shaped per provider family.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderStats {
    Cloud(UsageStats),
    Local {
        total_generations: u64,
        total_tokens_generated: u64,
    },
    Neural {
        total_inferences: u64,
        average_inference_ms: f64,
    },
}

/// Contract every backend satisfies.
///
/// Uses `async_trait` because native async fn in trait is not object-safe
/// (the factory hands out `Arc<dyn AiProvider>`).
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Provider name for logging (e.g., "anthropic", "ollama").
    fn name(&self) -> &str;

    /// Model identifier requests are sent with.
    fn model(&self) -> &str;

    /// Generate a complete response.
    async fn generate_text(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<AiResponse, ProviderError>;

    /// Generate a response as a stream of text fragments.
    async fn generate_text_stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<TextStream, ProviderError>;

    /// Submit independent prompts as one unit. `custom_ids` correlates results.
    async fn create_batch_job(
        &self,
        messages_list: &[Vec<Message>],
        custom_ids: &[String],
        options: &GenerationOptions,
    ) -> Result<BatchJob, ProviderError>;

    /// Fresh status snapshot of a batch job.
    async fn get_batch_job(&self, job_id: &str) -> Result<BatchJob, ProviderError>;

    /// `true` if the backend accepted cancellation. Never errors for finished jobs.
    async fn cancel_batch_job(&self, job_id: &str) -> bool;

    fn supports_images(&self) -> bool;

    fn supports_streaming(&self) -> bool;

    fn supports_batch(&self) -> bool;

    fn model_info(&self) -> ModelInfo;

    fn usage_stats(&self) -> ProviderStats;

    /// Per-request timeout for this provider.
    fn timeout(&self) -> Duration;
}

/// Reject image content for providers without vision support.
pub fn ensure_input_supported(
    provider: &str,
    supports_images: bool,
    messages: &[Message],
) -> Result<(), ProviderError> {
    if messages.is_empty() {
        return Err(ProviderError::InvalidArgument(
            "at least one message is required".to_string(),
        ));
    }
    if !supports_images && messages.iter().any(Message::has_images) {
        return Err(ProviderError::UnsupportedInput {
            provider: provider.to_string(),
            message: "model does not accept image content".to_string(),
        });
    }
    Ok(())
}

/// Resolve `${ENV_VAR}` references in config strings.
pub fn resolve_env_var(value: &str) -> Option<String> {
    if value.starts_with("${") && value.ends_with('}') {
        let var_name = &value[2..value.len() - 1];
        std::env::var(var_name).ok().filter(|v| !v.is_empty())
    } else if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Map a reqwest transport failure onto the provider taxonomy.
pub(crate) fn transport_error(provider: &str, timeout: Duration, e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout {
            provider: provider.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    } else if e.is_connect() {
        ProviderError::unavailable(provider, format!("connection failed: {e}"))
    } else {
        ProviderError::Api {
            provider: provider.to_string(),
            message: format!("request failed: {e}"),
            status_code: e.status().map(|s| s.as_u16()),
        }
    }
}

/// Turn a non-success HTTP response into an `Api` error, keeping the body.
pub(crate) async fn error_from_response(provider: &str, resp: reqwest::Response) -> ProviderError {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    ProviderError::Api {
        provider: provider.to_string(),
        message: format!("HTTP {status}: {text}"),
        status_code: Some(status.as_u16()),
    }
}
