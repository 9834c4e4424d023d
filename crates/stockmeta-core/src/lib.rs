//! stockmeta core - multi-provider AI runtime for stock-media metadata.
//!
//! One capability interface ([`AiProvider`]) fronts cloud vision APIs, a local
//! inference server and ONNX classifiers. The [`MetadataGenerator`] drives any
//! of them to produce submission-ready fields for a photo:
//!
//! ```text
//! image → title → description → keywords → categories per photobank → editorial flag
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use stockmeta_core::{AiFactory, Config, ContentBlock, GenerationRequest, MetadataGenerator, PromptManager};
//!
//! #[tokio::main]
//! async fn main() -> stockmeta_core::Result<()> {
//!     let config = Config::load()?;
//!     let provider = AiFactory::from_config(&config).create_from_model_selector("openai/gpt-4o")?;
//!     let prompts = PromptManager::load(config.generation.prompts_path().as_deref());
//!     let generator = MetadataGenerator::new(provider, prompts)
//!         .with_photobank_categories(config.photobanks.0.clone());
//!
//!     let image = ContentBlock::image_file("./lake.jpg".as_ref()).await?;
//!     let metadata = generator.generate(&GenerationRequest::new(image)).await?;
//!     println!("{}: {:?}", metadata.title, metadata.keywords);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod discovery;
pub mod error;
pub mod factory;
pub mod message;
pub mod metadata;
pub mod output;
pub mod prompt;
pub mod provider;

pub use config::Config;
pub use discovery::{DiscoveredFile, MediaDiscovery};
pub use error::{ConfigError, ProviderError, ProviderResult, Result, StockmetaError};
pub use factory::{available_models, AiFactory, ProviderOptions};
pub use message::{AiResponse, ContentBlock, Message, Role, Usage};
pub use metadata::{EditorialContext, GeneratedMetadata, GenerationRequest, MetadataGenerator};
pub use output::{MetadataRecord, OutputFormat, OutputWriter};
pub use prompt::{CharacterLimits, EditTag, PromptManager};
pub use provider::{
    AiProvider, BatchJob, BatchResult, BatchStatus, GenerationOptions, ModelInfo, ProviderStats,
    TextStream,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
