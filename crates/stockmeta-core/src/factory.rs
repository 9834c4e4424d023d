//! Provider registry and `"provider/model"` selector parsing.
//!
//! The registry maps a provider name to a plain constructor function. The
//! built-in providers are registered by [`AiFactory::new`]; callers can add
//! their own with [`AiFactory::register`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, ProvidersConfig, RuntimeConfig};
use crate::error::ProviderError;
use crate::provider::anthropic::AnthropicBackend;
use crate::provider::ollama::OllamaBackend;
use crate::provider::onnx::OnnxClassifier;
use crate::provider::openai::OpenAiBackend;
use crate::provider::{
    resolve_env_var, AiProvider, CloudAiProvider, LocalAiProvider, NeuralNetworkProvider,
    RetryPolicy, UsageTracker,
};

/// Per-call overrides applied on top of config.
#[derive(Debug, Clone, Default)]
pub struct ProviderOptions {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    pub requests_per_minute: Option<u32>,
    /// Shared accumulator for cloud usage across instances.
    pub usage_tracker: Option<Arc<UsageTracker>>,
}

impl ProviderOptions {
    fn retry_policy(&self, runtime: &RuntimeConfig) -> RetryPolicy {
        let mut policy = runtime.retry_policy();
        if let Some(max_retries) = self.max_retries {
            policy.max_retries = max_retries;
        }
        policy
    }

    fn requests_per_minute(&self, runtime: &RuntimeConfig) -> u32 {
        self.requests_per_minute.unwrap_or(runtime.requests_per_minute)
    }

    fn api_key(&self, configured: &str) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| resolve_env_var(configured))
    }
}

/// Builds a provider for a model name.
pub type Constructor = fn(
    &ProvidersConfig,
    &RuntimeConfig,
    &str,
    &ProviderOptions,
) -> Result<Arc<dyn AiProvider>, ProviderError>;

/// Registry of provider constructors plus the config they read.
pub struct AiFactory {
    providers: ProvidersConfig,
    runtime: RuntimeConfig,
    registry: BTreeMap<String, Constructor>,
}

impl AiFactory {
    /// Factory with the built-in providers registered.
    pub fn new(providers: ProvidersConfig, runtime: RuntimeConfig) -> Self {
        let mut factory = Self {
            providers,
            runtime,
            registry: BTreeMap::new(),
        };
        factory.register("anthropic", build_anthropic);
        factory.register("openai", build_openai);
        factory.register("ollama", build_ollama);
        factory.register("onnx", build_onnx);
        factory
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.providers.clone(), config.runtime.clone())
    }

    /// Add or replace a provider constructor.
    pub fn register(&mut self, name: &str, constructor: Constructor) {
        self.registry.insert(name.to_string(), constructor);
    }

    /// Registered provider names, sorted.
    pub fn providers(&self) -> Vec<&str> {
        self.registry.keys().map(String::as_str).collect()
    }

    /// Create from a `"provider/model"` selector with default options.
    pub fn create_from_model_selector(
        &self,
        selector: &str,
    ) -> Result<Arc<dyn AiProvider>, ProviderError> {
        self.create_with_options(selector, &ProviderOptions::default())
    }

    /// Create from a `"provider/model"` selector. An empty model part falls
    /// back to the provider's configured model.
    pub fn create_with_options(
        &self,
        selector: &str,
        options: &ProviderOptions,
    ) -> Result<Arc<dyn AiProvider>, ProviderError> {
        let (provider, model) = selector.split_once('/').ok_or_else(|| {
            ProviderError::InvalidArgument(format!(
                "model selector '{selector}' must look like provider/model"
            ))
        })?;
        let constructor = self.registry.get(provider).ok_or_else(|| {
            ProviderError::InvalidArgument(format!(
                "unknown provider '{provider}' (available: {})",
                self.providers().join(", ")
            ))
        })?;
        tracing::debug!("Creating provider {provider} for model '{model}'");
        constructor(&self.providers, &self.runtime, model.trim(), options)
    }
}

/// Static model catalog for a provider, for pickers and `models` listings.
pub fn available_models(provider: &str) -> &'static [&'static str] {
    match provider {
        "anthropic" => &[
            "claude-sonnet-4-20250514",
            "claude-opus-4-20250514",
            "claude-3-7-sonnet-20250219",
            "claude-3-5-haiku-20241022",
        ],
        "openai" => &[
            "gpt-4o",
            "gpt-4o-mini",
            "gpt-4.1",
            "gpt-4.1-mini",
            "gpt-4.1-nano",
            "gpt-5",
            "gpt-5-mini",
            "gpt-5-nano",
            "o3",
            "o4-mini",
        ],
        "ollama" => &[
            "llama3.2-vision",
            "llava:7b",
            "llava:13b",
            "moondream",
            "minicpm-v",
            "llama3.2",
        ],
        "onnx" => &["mobilenetv2", "resnet50", "efficientnet-b0"],
        _ => &[],
    }
}

fn or_default<'a>(model: &'a str, configured: &'a str) -> &'a str {
    if model.is_empty() {
        configured
    } else {
        model
    }
}

fn build_anthropic(
    providers: &ProvidersConfig,
    runtime: &RuntimeConfig,
    model: &str,
    options: &ProviderOptions,
) -> Result<Arc<dyn AiProvider>, ProviderError> {
    let cfg = &providers.anthropic;
    let backend = AnthropicBackend::new(options.api_key(&cfg.api_key), or_default(model, &cfg.model))
        .with_base_url(options.base_url.as_deref().unwrap_or(&cfg.base_url))
        .with_timeout(options.timeout.unwrap_or(runtime.timeout()));
    let mut provider = CloudAiProvider::new(
        backend,
        options.requests_per_minute(runtime),
        options.retry_policy(runtime),
    );
    if let Some(tracker) = &options.usage_tracker {
        provider = provider.with_usage_tracker(Arc::clone(tracker));
    }
    Ok(Arc::new(provider))
}

fn build_openai(
    providers: &ProvidersConfig,
    runtime: &RuntimeConfig,
    model: &str,
    options: &ProviderOptions,
) -> Result<Arc<dyn AiProvider>, ProviderError> {
    let cfg = &providers.openai;
    let backend = OpenAiBackend::new(options.api_key(&cfg.api_key), or_default(model, &cfg.model))
        .with_base_url(options.base_url.as_deref().unwrap_or(&cfg.base_url))
        .with_organization(cfg.organization.clone(), cfg.project.clone())
        .with_timeout(options.timeout.unwrap_or(runtime.timeout()));
    let mut provider = CloudAiProvider::new(
        backend,
        options.requests_per_minute(runtime),
        options.retry_policy(runtime),
    );
    if let Some(tracker) = &options.usage_tracker {
        provider = provider.with_usage_tracker(Arc::clone(tracker));
    }
    Ok(Arc::new(provider))
}

fn build_ollama(
    providers: &ProvidersConfig,
    _runtime: &RuntimeConfig,
    model: &str,
    options: &ProviderOptions,
) -> Result<Arc<dyn AiProvider>, ProviderError> {
    let cfg = &providers.ollama;
    let endpoint = options.base_url.as_deref().unwrap_or(&cfg.endpoint);
    let backend = OllamaBackend::new(endpoint, or_default(model, &cfg.model))
        .with_keep_alive(&cfg.keep_alive)
        .with_timeout(options.timeout.unwrap_or(Duration::from_millis(cfg.timeout_ms)));
    Ok(Arc::new(LocalAiProvider::new(backend, cfg.defaults())))
}

fn build_onnx(
    providers: &ProvidersConfig,
    _runtime: &RuntimeConfig,
    model: &str,
    _options: &ProviderOptions,
) -> Result<Arc<dyn AiProvider>, ProviderError> {
    if model.is_empty() {
        return Err(ProviderError::InvalidArgument(
            "onnx selector needs a model name, e.g. onnx/mobilenetv2".to_string(),
        ));
    }
    let cfg = &providers.onnx;
    let classifier = OnnxClassifier::from_config(model, cfg);
    Ok(Arc::new(NeuralNetworkProvider::new(
        classifier,
        cfg.resolved_checkpoint_path(),
    )))
}
