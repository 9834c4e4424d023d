//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.runtime.requests_per_minute == 0 {
            return Err(invalid("runtime.requests_per_minute must be > 0"));
        }
        if self.runtime.timeout_ms == 0 {
            return Err(invalid("runtime.timeout_ms must be > 0"));
        }
        if let Some(t) = self.generation.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(invalid("generation.temperature must be between 0.0 and 2.0"));
            }
        }
        if self.generation.keyword_count == 0 {
            return Err(invalid("generation.keyword_count must be > 0"));
        }
        if !self.generation.default_model.contains('/') {
            return Err(invalid(
                "generation.default_model must look like provider/model",
            ));
        }
        if !(0.0..=2.0).contains(&self.providers.ollama.temperature) {
            return Err(invalid(
                "providers.ollama.temperature must be between 0.0 and 2.0",
            ));
        }
        if self.providers.ollama.timeout_ms == 0 {
            return Err(invalid("providers.ollama.timeout_ms must be > 0"));
        }
        if self.providers.onnx.image_size == 0 {
            return Err(invalid("providers.onnx.image_size must be > 0"));
        }
        if self.providers.onnx.top_k == 0 {
            return Err(invalid("providers.onnx.top_k must be > 0"));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(invalid("logging.format must be \"pretty\" or \"json\""));
        }
        Ok(())
    }
}
