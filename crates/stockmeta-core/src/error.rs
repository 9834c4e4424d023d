//! Error types for the stockmeta generation runtime.
//!
//! Provider errors carry the provider name so that a failure surfacing from a
//! deep call chain (factory → generator → provider) still says which backend
//! produced it.

use thiserror::Error;

/// Top-level error type for stockmeta operations.
#[derive(Error, Debug)]
pub enum StockmetaError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Provider and generation errors
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Errors raised by providers, the factory and the metadata generator.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Malformed caller input (selector string, mismatched batch lengths).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The request needs a capability the provider lacks.
    #[error("{provider} cannot handle this input: {message}")]
    UnsupportedInput { provider: String, message: String },

    /// The operation is not implemented by this kind of provider.
    #[error("{provider} does not support {operation}")]
    NotSupported { provider: String, operation: String },

    /// A model-holding provider was used before `load_model`.
    #[error("Model {model} is not loaded")]
    NotLoaded { model: String },

    /// Backend unreachable or credentials missing.
    #[error("{provider} unavailable: {message}")]
    Unavailable { provider: String, message: String },

    /// Backend answered with an error.
    #[error("{provider} API error: {message}")]
    Api {
        provider: String,
        message: String,
        status_code: Option<u16>,
    },

    /// Request exceeded the provider's timeout.
    #[error("{provider} request timed out after {timeout_ms}ms")]
    Timeout { provider: String, timeout_ms: u64 },

    /// Backend answered with something we could not interpret.
    #[error("Invalid response from {provider}: {message}")]
    InvalidResponse { provider: String, message: String },

    /// Local or neural inference failed.
    #[error("Inference failed for {model}: {message}")]
    Inference { model: String, message: String },

    /// Checkpoint or media I/O failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProviderError {
    /// Shorthand for an `Api` error without an HTTP status.
    pub fn api(provider: &str, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.to_string(),
            message: message.into(),
            status_code: None,
        }
    }

    /// Shorthand for an `Unavailable` error.
    pub fn unavailable(provider: &str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    /// Shorthand for an `InvalidResponse` error.
    pub fn invalid_response(provider: &str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    /// Shorthand for a `NotSupported` error.
    pub fn not_supported(provider: &str, operation: &str) -> Self {
        Self::NotSupported {
            provider: provider.to_string(),
            operation: operation.to_string(),
        }
    }
}

/// Convenience type alias for stockmeta results.
pub type Result<T> = std::result::Result<T, StockmetaError>;

/// Convenience type alias for provider-level results.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;
