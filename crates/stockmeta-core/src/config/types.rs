//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::provider::{Backoff, GenerationOptions, RetryPolicy};

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

/// Retry, rate-limit and timeout policy shared by cloud providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Base delay between retries in milliseconds
    pub retry_delay_ms: u64,

    /// Delay growth: "linear", "fixed" or "exponential"
    pub backoff: Backoff,

    /// Request starts per minute per provider instance (0 disables the gate)
    pub requests_per_minute: u32,

    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1000,
            backoff: Backoff::Linear,
            requests_per_minute: 60,
            timeout_ms: 240_000,
        }
    }
}

impl RuntimeConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.retry_delay_ms),
            self.backoff,
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Metadata generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Token cap per field request (unset lets the provider decide)
    pub max_tokens: Option<u32>,

    /// Sampling temperature
    pub temperature: Option<f32>,

    /// Keywords requested from the model
    pub keyword_count: usize,

    /// Prompt template JSON file (optional, `~` expanded)
    pub prompts_path: Option<String>,

    /// Selector used when the CLI gets no `--model`
    pub default_model: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: None,
            temperature: Some(0.7),
            keyword_count: 50,
            prompts_path: None,
            default_model: "openai/gpt-4o-mini".to_string(),
        }
    }
}

impl GenerationConfig {
    pub fn prompts_path(&self) -> Option<PathBuf> {
        self.prompts_path.as_deref().map(expand)
    }

    pub fn options(&self) -> GenerationOptions {
        GenerationOptions {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            ..Default::default()
        }
    }
}

/// Available categories per photobank.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct PhotobanksConfig(pub BTreeMap<String, Vec<String>>);

impl Default for PhotobanksConfig {
    fn default() -> Self {
        let shutterstock = [
            "Abstract", "Animals/Wildlife", "Arts", "Backgrounds/Textures", "Beauty/Fashion",
            "Buildings/Landmarks", "Business/Finance", "Education", "Food and Drink",
            "Healthcare/Medical", "Holidays", "Industrial", "Nature", "Objects", "People",
            "Religion", "Science", "Signs/Symbols", "Sports/Recreation", "Technology",
            "Transportation", "Miscellaneous",
        ];
        let adobestock = [
            "Animals", "Buildings and Architecture", "Business", "Drinks", "The Environment",
            "States of Mind", "Food", "Graphic Resources", "Hobbies and Leisure", "Industry",
            "Landscapes", "Lifestyle", "People", "Plants and Flowers", "Culture and Religion",
            "Science", "Social Issues", "Sports", "Technology", "Transport", "Travel",
        ];
        let mut banks = BTreeMap::new();
        banks.insert("shutterstock".to_string(), shutterstock.map(String::from).to_vec());
        banks.insert("adobestock".to_string(), adobestock.map(String::from).to_vec());
        Self(banks)
    }
}

/// Provider settings, one table per backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub anthropic: AnthropicConfig,
    pub openai: OpenAiConfig,
    pub ollama: OllamaConfig,
    pub onnx: OnnxConfig,
}

/// Anthropic configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnthropicConfig {
    /// API key (supports ${ENV_VAR} syntax)
    pub api_key: String,

    /// API base URL
    pub base_url: String,

    /// Default model name
    pub model: String,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: "${ANTHROPIC_API_KEY}".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
        }
    }
}

/// OpenAI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    /// API key (supports ${ENV_VAR} syntax)
    pub api_key: String,

    /// API base URL
    pub base_url: String,

    /// Default model name
    pub model: String,

    /// Optional organization header
    pub organization: Option<String>,

    /// Optional project header
    pub project: Option<String>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: "${OPENAI_API_KEY}".to_string(),
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4o-mini".to_string(),
            organization: None,
            project: None,
        }
    }
}

/// Ollama configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Ollama API endpoint
    pub endpoint: String,

    /// Default model name
    pub model: String,

    /// How long the server keeps the model resident after a request
    pub keep_alive: String,

    /// Request timeout in milliseconds
    pub timeout_ms: u64,

    pub max_new_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "llama3.2-vision".to_string(),
            keep_alive: "5m".to_string(),
            timeout_ms: 300_000,
            max_new_tokens: 512,
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
        }
    }
}

impl OllamaConfig {
    /// Generation defaults the provider merges under call-time options.
    pub fn defaults(&self) -> GenerationOptions {
        GenerationOptions {
            max_tokens: Some(self.max_new_tokens),
            temperature: Some(self.temperature),
            top_p: Some(self.top_p),
            top_k: Some(self.top_k),
            ..Default::default()
        }
    }
}

/// ONNX classifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OnnxConfig {
    /// Directory searched for `<model>.onnx` when `model_path` is unset
    pub model_dir: String,

    /// Explicit model file, overriding `model_dir`
    pub model_path: Option<String>,

    /// Label file, one class name per line
    pub labels_path: Option<String>,

    /// Checkpoint restored on load when present
    pub checkpoint_path: Option<String>,

    /// Square input size in pixels
    pub image_size: u32,

    /// Labels reported per image
    pub top_k: usize,

    /// Normalize to [-1, 1] instead of ImageNet statistics
    pub symmetric_normalization: bool,
}

impl Default for OnnxConfig {
    fn default() -> Self {
        Self {
            model_dir: "~/.stockmeta/models".to_string(),
            model_path: None,
            labels_path: None,
            checkpoint_path: None,
            image_size: 224,
            top_k: 10,
            symmetric_normalization: false,
        }
    }
}

impl OnnxConfig {
    pub fn resolved_model_path(&self, model_name: &str) -> PathBuf {
        match &self.model_path {
            Some(path) => expand(path),
            None => expand(&self.model_dir).join(format!("{model_name}.onnx")),
        }
    }

    pub fn resolved_labels_path(&self) -> Option<PathBuf> {
        self.labels_path.as_deref().map(expand)
    }

    pub fn resolved_checkpoint_path(&self) -> Option<PathBuf> {
        self.checkpoint_path.as_deref().map(expand)
    }
}

/// Media discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// File extensions picked up when walking directories
    pub supported_formats: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            supported_formats: ["jpg", "jpeg", "png", "webp", "tif", "tiff"]
                .map(String::from)
                .to_vec(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
