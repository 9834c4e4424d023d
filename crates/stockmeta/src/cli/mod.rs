//! Subcommand implementations and the helpers they share.

pub mod ask;
pub mod batch;
pub mod config;
pub mod generate;
pub mod models;

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use stockmeta_core::{AiFactory, AiProvider, Config, ContentBlock};

/// Load config from `path`, or from the default location when `None`.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => {
            let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
            Config::load_from(Path::new(&expanded))
                .with_context(|| format!("loading config from {expanded}"))
        }
        None => Ok(Config::load()?),
    }
}

/// Resolve `--model`, falling back to `[generation].default_model`.
pub fn create_provider(config: &Config, model: Option<&str>) -> anyhow::Result<Arc<dyn AiProvider>> {
    let selector = model.unwrap_or(&config.generation.default_model);
    let provider = AiFactory::from_config(config)
        .create_from_model_selector(selector)
        .with_context(|| format!("creating provider for '{selector}'"))?;
    tracing::info!(
        "Using {}/{} (images: {}, streaming: {}, batch: {})",
        provider.name(),
        provider.model(),
        provider.supports_images(),
        provider.supports_streaming(),
        provider.supports_batch()
    );
    Ok(provider)
}

/// Read an image for use as message content.
pub async fn load_image(path: &Path) -> anyhow::Result<ContentBlock> {
    ContentBlock::image_file(path)
        .await
        .with_context(|| format!("reading image {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stockmeta.toml");
        std::fs::write(&path, "[generation]\nkeyword_count = 30\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.generation.keyword_count, 30);
        assert!(load_config(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_create_provider_rejects_bad_selector() {
        let config = Config::default();
        assert!(create_provider(&config, Some("no-separator")).is_err());
        assert!(create_provider(&config, Some("mystery/model")).is_err());
        assert!(create_provider(&config, Some("openai/gpt-4o")).is_ok());
    }
}
