//! Stock metadata generation for one media file.
//!
//! Stages run in order, each feeding the next as prompt context:
//!
//! ```text
//! title → description → keywords → categories (per bank) → editorial flag
//! ```
//!
//! Provider failures in the first three stages abort the file. Category and
//! editorial failures degrade to fallback values with a warning.

pub mod parse;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ProviderError;
use crate::message::{ContentBlock, Message};
use crate::prompt::{CharacterLimits, EditTag, PromptManager};
use crate::provider::{AiProvider, GenerationOptions};
use parse::{
    clean_description, clean_title, fallback_category, parse_categories, parse_editorial,
    parse_keywords,
};

/// Minimum room left for the generated part of an editorial description.
const MIN_EDITORIAL_BODY_CHARS: usize = 20;

/// Keyword placed first for editorial submissions.
pub const EDITORIAL_KEYWORD: &str = "Editorial";

/// Where and when an editorial image was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorialContext {
    pub city: String,
    pub country: String,
    /// Free-form date, e.g. "03/15/2024".
    pub date: String,
}

impl EditorialContext {
    /// `"CITY, COUNTRY - date: "`
    pub fn prefix(&self) -> String {
        format!(
            "{}, {} - {}: ",
            self.city.trim().to_uppercase(),
            self.country.trim().to_uppercase(),
            self.date.trim()
        )
    }
}

/// Input for one generation run.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub image: ContentBlock,
    /// Free-text hint or an existing title/description to improve.
    pub context: Option<String>,
    pub editorial: Option<EditorialContext>,
}

impl GenerationRequest {
    pub fn new(image: ContentBlock) -> Self {
        Self {
            image,
            context: None,
            editorial: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_editorial(mut self, editorial: EditorialContext) -> Self {
        self.editorial = Some(editorial);
        self
    }
}

/// Everything a photobank submission needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedMetadata {
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    /// Selected categories per photobank.
    pub categories: BTreeMap<String, Vec<String>>,
    pub editorial: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edit_tag: Option<EditTag>,
}

/// Drives a provider through the generation stages.
pub struct MetadataGenerator {
    provider: Arc<dyn AiProvider>,
    prompts: PromptManager,
    limits: CharacterLimits,
    photobank_categories: BTreeMap<String, Vec<String>>,
    keyword_count: usize,
    options: GenerationOptions,
}

impl MetadataGenerator {
    pub fn new(provider: Arc<dyn AiProvider>, prompts: PromptManager) -> Self {
        let limits = prompts.character_limits();
        Self {
            provider,
            limits,
            keyword_count: limits.keywords_max,
            prompts,
            photobank_categories: BTreeMap::new(),
            options: GenerationOptions::default(),
        }
    }

    /// Available categories per photobank. Banks with an empty list are skipped.
    pub fn with_photobank_categories(mut self, categories: BTreeMap<String, Vec<String>>) -> Self {
        self.photobank_categories = categories;
        self
    }

    /// Keywords to request. Never more than the configured `keywords_max`.
    pub fn with_keyword_count(mut self, count: usize) -> Self {
        self.keyword_count = count;
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn provider(&self) -> &Arc<dyn AiProvider> {
        &self.provider
    }

    pub fn prompts(&self) -> &PromptManager {
        &self.prompts
    }

    fn keyword_cap(&self) -> usize {
        self.keyword_count.min(self.limits.keywords_max)
    }

    fn ensure_image_supported(&self, image: &ContentBlock) -> Result<(), ProviderError> {
        if image.is_image() && !self.provider.supports_images() {
            return Err(ProviderError::UnsupportedInput {
                provider: self.provider.name().to_string(),
                message: format!("model {} cannot analyse images", self.provider.model()),
            });
        }
        Ok(())
    }

    async fn ask(&self, image: &ContentBlock, prompt: String) -> Result<String, ProviderError> {
        let messages = [Message::user_with_image(prompt, image.clone())];
        let response = self.provider.generate_text(&messages, &self.options).await?;
        Ok(response.content)
    }

    fn non_empty(&self, field: &str, value: String) -> Result<String, ProviderError> {
        if value.is_empty() {
            return Err(ProviderError::invalid_response(
                self.provider.name(),
                format!("model returned an empty {field}"),
            ));
        }
        Ok(value)
    }

    pub async fn generate_title(
        &self,
        image: &ContentBlock,
        context: Option<&str>,
    ) -> Result<String, ProviderError> {
        let raw = self.ask(image, self.prompts.title_prompt(context)).await?;
        self.non_empty("title", clean_title(&raw, self.limits.title))
    }

    /// Description with the editorial prefix applied when `editorial` is set.
    pub async fn generate_description(
        &self,
        image: &ContentBlock,
        title: Option<&str>,
        context: Option<&str>,
        editorial: Option<&EditorialContext>,
    ) -> Result<String, ProviderError> {
        let prefix = editorial.map(EditorialContext::prefix).unwrap_or_default();
        let available = self
            .limits
            .description
            .saturating_sub(prefix.chars().count());
        if editorial.is_some() && available <= MIN_EDITORIAL_BODY_CHARS {
            return Err(ProviderError::InvalidArgument(format!(
                "editorial prefix '{prefix}' leaves only {available} characters for the description"
            )));
        }

        let raw = self
            .ask(image, self.prompts.description_prompt(title, context))
            .await?;
        let body = self.non_empty("description", clean_description(&raw, available))?;
        Ok(format!("{prefix}{body}"))
    }

    pub async fn generate_keywords(
        &self,
        image: &ContentBlock,
        title: Option<&str>,
        description: Option<&str>,
        editorial: bool,
    ) -> Result<Vec<String>, ProviderError> {
        let count = self.keyword_cap();
        let raw = self
            .ask(image, self.prompts.keywords_prompt(title, description, count))
            .await?;
        let leading: &[&str] = if editorial { &[EDITORIAL_KEYWORD] } else { &[] };
        Ok(parse_keywords(&raw, leading, count))
    }

    /// Categories for every configured bank. Never fails: each bank degrades to
    /// its fallback category on a provider error or an unmatched answer.
    pub async fn generate_categories(
        &self,
        image: &ContentBlock,
        title: Option<&str>,
        description: Option<&str>,
    ) -> BTreeMap<String, Vec<String>> {
        let mut result = BTreeMap::new();
        for (bank, available) in &self.photobank_categories {
            if available.is_empty() {
                continue;
            }
            let max = self.prompts.photobank_limit(bank);
            let prompt = self
                .prompts
                .categories_prompt(bank, available, title, description);

            let selected = match self.ask(image, prompt).await {
                Ok(raw) => parse_categories(&raw, available, max),
                Err(e) => {
                    tracing::warn!("Category generation for {bank} failed: {e}");
                    Vec::new()
                }
            };
            let selected = if selected.is_empty() {
                tracing::warn!("No usable categories for {bank}, using fallback");
                fallback_category(available).into_iter().take(max).collect()
            } else {
                selected
            };
            result.insert(bank.clone(), selected);
        }
        result
    }

    /// Editorial detection. Provider errors count as "not editorial".
    pub async fn detect_editorial(
        &self,
        image: &ContentBlock,
        title: Option<&str>,
        description: Option<&str>,
    ) -> bool {
        match self
            .ask(image, self.prompts.editorial_prompt(title, description))
            .await
        {
            Ok(raw) => parse_editorial(&raw),
            Err(e) => {
                tracing::warn!("Editorial detection failed, assuming commercial: {e}");
                false
            }
        }
    }

    /// Run every stage for one image.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedMetadata, ProviderError> {
        let image = &request.image;
        self.ensure_image_supported(image)?;
        let context = request.context.as_deref();
        let editorial_context = request.editorial.as_ref();

        let title = self.generate_title(image, context).await?;
        tracing::debug!("Generated title: {title}");

        let description = self
            .generate_description(image, Some(&title), context, editorial_context)
            .await?;
        tracing::debug!("Generated description ({} chars)", description.chars().count());

        let keywords = self
            .generate_keywords(
                image,
                Some(&title),
                Some(&description),
                editorial_context.is_some(),
            )
            .await?;
        tracing::debug!("Generated {} keywords", keywords.len());

        let categories = self
            .generate_categories(image, Some(&title), Some(&description))
            .await;

        let editorial = match editorial_context {
            Some(_) => true,
            None => {
                self.detect_editorial(image, Some(&title), Some(&description))
                    .await
            }
        };

        Ok(GeneratedMetadata {
            title,
            description,
            keywords,
            categories,
            editorial,
            edit_tag: None,
        })
    }

    /// Regenerate title, description and keywords for an edited variant.
    /// Categories and the editorial flag carry over from `base`.
    pub async fn generate_alternative(
        &self,
        edit: EditTag,
        base: &GeneratedMetadata,
        image: &ContentBlock,
    ) -> Result<GeneratedMetadata, ProviderError> {
        self.ensure_image_supported(image)?;

        let raw = self
            .ask(image, self.prompts.title_alternative_prompt(edit, &base.title))
            .await?;
        let title = self.non_empty("title", clean_title(&raw, self.limits.title))?;

        let raw = self
            .ask(
                image,
                self.prompts
                    .description_alternative_prompt(edit, &base.title, &base.description),
            )
            .await?;
        let description =
            self.non_empty("description", clean_description(&raw, self.limits.description))?;

        let count = self.keyword_cap();
        let raw = self
            .ask(
                image,
                self.prompts.keywords_alternative_prompt(
                    edit,
                    &base.title,
                    &base.description,
                    &base.keywords,
                    count,
                ),
            )
            .await?;
        let leading: &[&str] = if base.editorial { &[EDITORIAL_KEYWORD] } else { &[] };
        let keywords = parse_keywords(&raw, leading, count);

        Ok(GeneratedMetadata {
            title,
            description,
            keywords,
            categories: base.categories.clone(),
            editorial: base.editorial,
            edit_tag: Some(edit),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::AiResponse;
    use crate::provider::{BatchJob, ModelInfo, ProviderStats, TextStream};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    type Script = Box<dyn Fn(&str) -> Result<String, ProviderError> + Send + Sync>;

    /// Answers prompts from a closure and records what it was asked.
    struct ScriptedProvider {
        vision: bool,
        script: Script,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(vision: bool, script: impl Fn(&str) -> Result<String, ProviderError> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                vision,
                script: Box::new(script),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl AiProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }
        fn model(&self) -> &str {
            "scripted-1"
        }
        async fn generate_text(
            &self,
            messages: &[Message],
            _options: &GenerationOptions,
        ) -> Result<AiResponse, ProviderError> {
            let prompt = messages[0].text();
            self.prompts.lock().unwrap().push(prompt.clone());
            (self.script)(&prompt).map(|text| AiResponse::new(text, "scripted-1"))
        }
        async fn generate_text_stream(
            &self,
            _messages: &[Message],
            _options: &GenerationOptions,
        ) -> Result<TextStream, ProviderError> {
            Err(ProviderError::not_supported("scripted", "streaming"))
        }
        async fn create_batch_job(
            &self,
            _messages_list: &[Vec<Message>],
            _custom_ids: &[String],
            _options: &GenerationOptions,
        ) -> Result<BatchJob, ProviderError> {
            Err(ProviderError::not_supported("scripted", "batch"))
        }
        async fn get_batch_job(&self, _job_id: &str) -> Result<BatchJob, ProviderError> {
            Err(ProviderError::not_supported("scripted", "batch"))
        }
        async fn cancel_batch_job(&self, _job_id: &str) -> bool {
            false
        }
        fn supports_images(&self) -> bool {
            self.vision
        }
        fn supports_streaming(&self) -> bool {
            false
        }
        fn supports_batch(&self) -> bool {
            false
        }
        fn model_info(&self) -> ModelInfo {
            ModelInfo {
                provider: "scripted".into(),
                model: "scripted-1".into(),
                supports_images: self.vision,
                supports_streaming: false,
                supports_batch: false,
                context_window: None,
            }
        }
        fn usage_stats(&self) -> ProviderStats {
            ProviderStats::Local {
                total_generations: 0,
                total_tokens_generated: 0,
            }
        }
        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }
    }

    fn image() -> ContentBlock {
        ContentBlock::image_bytes(&[0xFF, 0xD8, 0xFF], "jpeg")
    }

    fn banks() -> BTreeMap<String, Vec<String>> {
        BTreeMap::from([
            (
                "shutterstock".to_string(),
                vec!["Nature".to_string(), "Abstract".to_string(), "Other".to_string()],
            ),
            ("emptybank".to_string(), Vec::new()),
        ])
    }

    fn happy_script(prompt: &str) -> Result<String, ProviderError> {
        let answer = if prompt.starts_with("Create a title") {
            "Title: Calm lake at sunrise"
        } else if prompt.starts_with("Create a description") {
            "Description: Mirror-still lake reflecting the pink sky at Sunrise."
        } else if prompt.starts_with("Generate") {
            "lake, sunrise, reflection"
        } else if prompt.starts_with("Select") {
            "Nature, Abstract"
        } else if prompt.starts_with("Is this image editorial") {
            "YES"
        } else {
            return Err(ProviderError::api("scripted", format!("unexpected prompt: {prompt}")));
        };
        Ok(answer.to_string())
    }

    fn generator(provider: Arc<ScriptedProvider>) -> MetadataGenerator {
        MetadataGenerator::new(provider, PromptManager::builtin()).with_photobank_categories(banks())
    }

    #[tokio::test]
    async fn test_end_to_end_generation() {
        let provider = ScriptedProvider::new(true, happy_script);
        let generator = generator(provider.clone());

        let metadata = generator.generate(&GenerationRequest::new(image())).await.unwrap();
        assert_eq!(metadata.title, "Calm lake at sunrise");
        assert!(metadata.description.to_lowercase().contains("sunrise"));
        assert_eq!(metadata.keywords, vec!["lake", "sunrise", "reflection"]);
        assert_eq!(metadata.categories["shutterstock"], vec!["Nature", "Abstract"]);
        assert!(!metadata.categories.contains_key("emptybank"));
        assert!(metadata.editorial);

        let prompts = provider.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 5);
        assert!(prompts[1].contains("Title: Calm lake at sunrise"));
        assert!(prompts[2].contains("Generate 50 relevant keywords"));
    }

    #[tokio::test]
    async fn test_text_only_provider_is_rejected() {
        let provider = ScriptedProvider::new(false, happy_script);
        let err = generator(provider.clone())
            .generate(&GenerationRequest::new(image()))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedInput { .. }));
        assert!(provider.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_category_and_editorial_failures_degrade() {
        let provider = ScriptedProvider::new(true, |prompt| {
            if prompt.starts_with("Select") || prompt.starts_with("Is this image editorial") {
                Err(ProviderError::api("scripted", "boom"))
            } else {
                happy_script(prompt)
            }
        });
        let metadata = generator(provider)
            .generate(&GenerationRequest::new(image()))
            .await
            .unwrap();
        assert_eq!(metadata.title, "Calm lake at sunrise");
        assert_eq!(metadata.categories["shutterstock"], vec!["Other"]);
        assert!(!metadata.editorial);
    }

    #[tokio::test]
    async fn test_unmatched_categories_use_fallback() {
        let provider = ScriptedProvider::new(true, |prompt| {
            if prompt.starts_with("Select") {
                Ok("Underwater basket weaving".to_string())
            } else {
                happy_script(prompt)
            }
        });
        let metadata = generator(provider)
            .generate(&GenerationRequest::new(image()))
            .await
            .unwrap();
        assert_eq!(metadata.categories["shutterstock"], vec!["Other"]);
    }

    #[tokio::test]
    async fn test_keyword_failure_propagates() {
        let provider = ScriptedProvider::new(true, |prompt| {
            if prompt.starts_with("Generate") {
                Err(ProviderError::Timeout {
                    provider: "scripted".into(),
                    timeout_ms: 10,
                })
            } else {
                happy_script(prompt)
            }
        });
        let err = generator(provider)
            .generate(&GenerationRequest::new(image()))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_editorial_context_prefix_and_keyword() {
        let provider = ScriptedProvider::new(true, happy_script);
        let request = GenerationRequest::new(image()).with_editorial(EditorialContext {
            city: "Prague".into(),
            country: "Czech Republic".into(),
            date: "05/01/2024".into(),
        });
        let metadata = generator(provider.clone()).generate(&request).await.unwrap();
        assert!(metadata
            .description
            .starts_with("PRAGUE, CZECH REPUBLIC - 05/01/2024: Mirror-still lake"));
        assert!(metadata.description.chars().count() <= 200);
        assert_eq!(metadata.keywords[0], EDITORIAL_KEYWORD);
        assert!(metadata.editorial);
        // Editorial is known, so it is not asked.
        assert_eq!(provider.prompts.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_editorial_prefix_too_long() {
        let provider = ScriptedProvider::new(true, happy_script);
        let request = GenerationRequest::new(image()).with_editorial(EditorialContext {
            city: "X".repeat(120),
            country: "Y".repeat(50),
            date: "2024".into(),
        });
        let err = generator(provider).generate(&request).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_generate_alternative() {
        let provider = ScriptedProvider::new(true, |prompt| {
            let answer = if prompt.starts_with("Create a title") {
                "Calm lake at sunrise in black and white"
            } else if prompt.starts_with("Create a description") {
                "Monochrome lake with strong tonal contrast."
            } else {
                "lake, monochrome, black and white, lake"
            };
            Ok(answer.to_string())
        });
        let base = GeneratedMetadata {
            title: "Calm lake at sunrise".into(),
            description: "A calm lake.".into(),
            keywords: vec!["lake".into(), "sunrise".into()],
            categories: BTreeMap::from([("shutterstock".into(), vec!["Nature".into()])]),
            editorial: false,
            edit_tag: None,
        };
        let alt = generator(provider.clone())
            .generate_alternative(EditTag::BlackAndWhite, &base, &image())
            .await
            .unwrap();
        assert_eq!(alt.title, "Calm lake at sunrise in black and white");
        assert_eq!(alt.keywords, vec!["lake", "monochrome", "black and white"]);
        assert_eq!(alt.categories, base.categories);
        assert_eq!(alt.edit_tag, Some(EditTag::BlackAndWhite));
        assert!(provider.prompts.lock().unwrap()[0].contains("black and white version"));
    }

    #[tokio::test]
    async fn test_keyword_count_capped_by_limits() {
        let provider = ScriptedProvider::new(true, happy_script);
        let generator = generator(provider.clone()).with_keyword_count(500);
        generator
            .generate_keywords(&image(), None, None, false)
            .await
            .unwrap();
        assert!(provider.prompts.lock().unwrap()[0].contains("Generate 50 relevant"));
    }
}
