//! Conversation value types shared by every provider.
//!
//! A [`Message`] is a role plus an ordered list of [`ContentBlock`]s. Blocks
//! are an enum, so a block is exactly one of text, inline image or image
//! reference. Messages are immutable once built.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ProviderError;

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One piece of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text { text: String },
    /// Base64-encoded image bytes with their MIME type.
    ImageBase64 { data: String, mime_type: String },
    /// Remote image reference. `detail` is forwarded to backends that accept it.
    ImageUrl { url: String, detail: Option<String> },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Encode raw image bytes. `format` is an extension-like identifier ("jpeg", "png").
    pub fn image_bytes(bytes: &[u8], format: &str) -> Self {
        Self::ImageBase64 {
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            mime_type: mime_for_format(format).to_string(),
        }
    }

    pub fn image_url(url: impl Into<String>, detail: Option<&str>) -> Self {
        Self::ImageUrl {
            url: url.into(),
            detail: detail.map(str::to_string),
        }
    }

    /// Read an image from disk and encode it inline.
    pub async fn image_file(path: &Path) -> Result<Self, ProviderError> {
        let bytes = tokio::fs::read(path).await?;
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_else(|| "jpeg".to_string());
        Ok(Self::image_bytes(&bytes, &format))
    }

    pub fn is_image(&self) -> bool {
        !matches!(self, Self::Text { .. })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }

    /// `data:` URL for inline images, the URL itself for references.
    pub fn image_data_url(&self) -> Option<String> {
        match self {
            Self::ImageBase64 { data, mime_type } => Some(format!("data:{mime_type};base64,{data}")),
            Self::ImageUrl { url, .. } => Some(url.clone()),
            Self::Text { .. } => None,
        }
    }

    /// Decode inline image bytes.
    pub fn decode_image(&self) -> Option<Result<Vec<u8>, base64::DecodeError>> {
        match self {
            Self::ImageBase64 { data, .. } => {
                Some(base64::engine::general_purpose::STANDARD.decode(data))
            }
            _ => None,
        }
    }
}

fn mime_for_format(format: &str) -> &'static str {
    match format {
        "jpeg" | "jpg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "tif" | "tiff" => "image/tiff",
        other => {
            tracing::warn!("Unknown image format '{other}', defaulting to image/jpeg");
            "image/jpeg"
        }
    }
}

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: Vec<ContentBlock>,
}

impl Message {
    pub fn new(role: Role, content: Vec<ContentBlock>) -> Self {
        Self { role, content }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![ContentBlock::text(text)])
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentBlock::text(text)])
    }

    /// User turn carrying an image followed by the prompt text.
    pub fn user_with_image(text: impl Into<String>, image: ContentBlock) -> Self {
        Self::new(Role::User, vec![image, ContentBlock::text(text)])
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![ContentBlock::text(text)])
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &[ContentBlock] {
        &self.content
    }

    pub fn has_images(&self) -> bool {
        self.content.iter().any(ContentBlock::is_image)
    }

    /// All text blocks joined with newlines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Token and timing counters reported for one response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    /// Cost in USD, filled in by cloud providers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    /// Forward-pass wall time for neural providers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inference_ms: Option<u64>,
}

impl Usage {
    pub fn from_tokens(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
            ..Default::default()
        }
    }
}

/// One completed generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiResponse {
    pub content: String,
    pub model: String,
    pub usage: Option<Usage>,
    pub finish_reason: Option<String>,
}

impl AiResponse {
    pub fn new(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            usage: None,
            finish_reason: None,
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_finish_reason(mut self, reason: impl Into<String>) -> Self {
        self.finish_reason = Some(reason.into());
        self
    }

    /// Error-content response used for failed batch items.
    pub fn error(model: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::new(format!("Error: {message}"), model).with_finish_reason("error")
    }

    pub fn is_error(&self) -> bool {
        self.finish_reason.as_deref() == Some("error")
    }

    pub fn total_tokens(&self) -> u64 {
        self.usage.map(|u| u.total_tokens).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_bytes_jpeg() {
        let block = ContentBlock::image_bytes(&[0xFF, 0xD8, 0xFF], "jpeg");
        match &block {
            ContentBlock::ImageBase64 { data, mime_type } => {
                assert_eq!(mime_type, "image/jpeg");
                assert!(!data.is_empty());
            }
            other => panic!("unexpected block {other:?}"),
        }
        assert!(block.is_image());
    }

    #[test]
    fn test_image_data_url() {
        let block = ContentBlock::image_bytes(&[1, 2, 3], "png");
        let url = block.image_data_url().unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
        assert_eq!(block.decode_image().unwrap().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_image_url_has_no_inline_bytes() {
        let block = ContentBlock::image_url("https://example.com/a.jpg", Some("high"));
        assert!(block.is_image());
        assert!(block.decode_image().is_none());
        assert_eq!(block.image_data_url().unwrap(), "https://example.com/a.jpg");
    }

    #[test]
    fn test_message_text_and_images() {
        let msg = Message::user_with_image("Describe", ContentBlock::image_bytes(&[1], "jpeg"));
        assert_eq!(msg.role(), Role::User);
        assert!(msg.has_images());
        assert_eq!(msg.text(), "Describe");
        assert!(!Message::system("be brief").has_images());
    }

    #[test]
    fn test_error_response() {
        let resp = AiResponse::error("m", "boom");
        assert_eq!(resp.content, "Error: boom");
        assert!(resp.is_error());
        assert_eq!(resp.total_tokens(), 0);
    }

    #[tokio::test]
    async fn test_image_file_reads_and_encodes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.PNG");
        std::fs::write(&path, [9u8, 8, 7]).unwrap();
        let block = ContentBlock::image_file(&path).await.unwrap();
        assert!(matches!(block, ContentBlock::ImageBase64 { ref mime_type, .. } if mime_type == "image/png"));
    }
}
