//! Ollama provider for models served by a local Ollama instance.
//!
//! Single-turn prompts without a system message go to `/api/generate`;
//! anything conversational goes to `/api/chat`. Both stream newline-delimited
//! JSON. No authentication is needed, only a reachable endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::local::{LocalAiProvider, LocalBackend};
use super::stream::{byte_stream, decode_lines, Frame};
use super::{error_from_response, transport_error, GenerationOptions, TextStream};
use crate::error::ProviderError;
use crate::message::{AiResponse, ContentBlock, Message, Role, Usage};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";
const PROVIDER: &str = "ollama";

/// Model families (name before the `:` tag) that accept images.
const VISION_MODELS: &[&str] = &[
    "llava",
    "bakllava",
    "cogvlm",
    "llama3.2-vision",
    "moondream",
    "minicpm-v",
    "llava-llama3",
    "llava-phi3",
];

/// Ollama provider with lifecycle and eager batching.
pub type OllamaProvider = LocalAiProvider<OllamaBackend>;

/// HTTP client for one model on an Ollama server.
pub struct OllamaBackend {
    endpoint: String,
    model: String,
    keep_alive: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl OllamaBackend {
    pub fn new(endpoint: &str, model: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            keep_alive: "5m".to_string(),
            client: reqwest::Client::new(),
            // Local models can be slow, especially on first load
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_keep_alive(mut self, keep_alive: &str) -> Self {
        self.keep_alive = keep_alive.to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Names of the models the server has pulled.
    pub async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let resp = self
            .client
            .get(format!("{}/api/tags", self.endpoint))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, Duration::from_secs(5), e))?;
        if !resp.status().is_success() {
            return Err(error_from_response(PROVIDER, resp).await);
        }
        let tags: TagsResponse = resp.json().await.map_err(|e| {
            ProviderError::invalid_response(PROVIDER, format!("Failed to parse model list: {e}"))
        })?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn post(&self, path: &str, body: &impl Serialize) -> Result<reqwest::Response, ProviderError> {
        let resp = self
            .client
            .post(format!("{}{path}", self.endpoint))
            .json(body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, self.timeout, e))?;
        if !resp.status().is_success() {
            return Err(error_from_response(PROVIDER, resp).await);
        }
        Ok(resp)
    }

    fn wire_options(options: &GenerationOptions) -> WireOptions {
        WireOptions {
            temperature: options.temperature,
            top_p: options.top_p,
            top_k: options.top_k,
            num_predict: options.max_tokens,
            stop: options.stop.clone(),
        }
    }

    fn format(options: &GenerationOptions) -> Option<&'static str> {
        options.json_mode.then_some("json")
    }

    /// Pick the endpoint and build its body.
    fn build_request(&self, messages: &[Message], options: &GenerationOptions, stream: bool) -> Request {
        if uses_chat(messages) {
            Request::Chat(ChatRequest {
                model: self.model.clone(),
                messages: messages.iter().map(chat_message).collect(),
                stream,
                keep_alive: self.keep_alive.clone(),
                format: Self::format(options),
                options: Self::wire_options(options),
            })
        } else {
            let (prompt, images) = messages
                .first()
                .map(|m| (m.text(), inline_images(m)))
                .unwrap_or_default();
            Request::Generate(GenerateRequest {
                model: self.model.clone(),
                prompt,
                images,
                stream,
                keep_alive: self.keep_alive.clone(),
                format: Self::format(options),
                options: Self::wire_options(options),
            })
        }
    }
}

/// Whether a model name (with optional `:tag`) belongs to a vision family.
pub fn supports_vision(model: &str) -> bool {
    let base = model.split(':').next().unwrap_or(model);
    VISION_MODELS.contains(&base)
}

fn uses_chat(messages: &[Message]) -> bool {
    messages.len() > 1 || messages.iter().any(|m| m.role() == Role::System)
}

/// Base64 payloads of inline images. URL images are skipped.
fn inline_images(message: &Message) -> Vec<String> {
    message
        .content()
        .iter()
        .filter_map(|block| match block {
            ContentBlock::ImageBase64 { data, .. } => Some(data.clone()),
            ContentBlock::ImageUrl { url, .. } => {
                tracing::warn!("Ollama only accepts inline images, skipping {url}");
                None
            }
            ContentBlock::Text { .. } => None,
        })
        .collect()
}

fn chat_message(message: &Message) -> ChatMessage {
    ChatMessage {
        role: message.role().as_str().to_string(),
        content: message.text(),
        images: inline_images(message),
    }
}

// --- Wire types ---

enum Request {
    Generate(GenerateRequest),
    Chat(ChatRequest),
}

#[derive(Serialize)]
struct WireOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

/// `/api/generate` request body.
#[derive(Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    stream: bool,
    keep_alive: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: WireOptions,
}

/// `/api/chat` request body.
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    keep_alive: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: WireOptions,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Serialize)]
struct UnloadRequest<'a> {
    model: &'a str,
    keep_alive: u32,
}

/// Shared shape of generate and chat responses (and their stream lines).
#[derive(Deserialize)]
struct ReplyChunk {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    message: Option<ReplyMessage>,
    #[serde(default)]
    done: bool,
    done_reason: Option<String>,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: String,
}

impl ReplyChunk {
    fn text(&self) -> &str {
        self.response
            .as_deref()
            .or(self.message.as_ref().map(|m| m.content.as_str()))
            .unwrap_or_default()
    }
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
}

fn parse_stream_line(line: &str) -> Frame {
    let line = line.trim();
    if line.is_empty() {
        return Frame::Skip;
    }
    match serde_json::from_str::<ReplyChunk>(line) {
        Ok(ReplyChunk {
            error: Some(error), ..
        }) => Frame::Error(ProviderError::api(PROVIDER, error)),
        Ok(chunk) if chunk.done => {
            // The final line can still carry a trailing fragment.
            if chunk.text().is_empty() {
                Frame::Done
            } else {
                Frame::Text(chunk.text().to_string())
            }
        }
        Ok(chunk) if chunk.text().is_empty() => Frame::Skip,
        Ok(chunk) => Frame::Text(chunk.text().to_string()),
        Err(e) => Frame::Error(ProviderError::invalid_response(
            PROVIDER,
            format!("bad stream line: {e}"),
        )),
    }
}

#[async_trait]
impl LocalBackend for OllamaBackend {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn load(&self) -> Result<(), ProviderError> {
        let models = self.list_models().await?;
        let wanted = &self.model;
        let found = models.iter().any(|name| {
            name == wanted || (!wanted.contains(':') && name.split(':').next() == Some(wanted.as_str()))
        });
        if !found {
            return Err(ProviderError::unavailable(
                PROVIDER,
                format!("model {wanted} is not pulled on {}", self.endpoint),
            ));
        }
        Ok(())
    }

    async fn unload(&self) -> Result<(), ProviderError> {
        self.post(
            "/api/generate",
            &UnloadRequest {
                model: &self.model,
                keep_alive: 0,
            },
        )
        .await?;
        Ok(())
    }

    async fn generate_response(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<AiResponse, ProviderError> {
        let resp = match self.build_request(messages, options, false) {
            Request::Generate(body) => self.post("/api/generate", &body).await?,
            Request::Chat(body) => self.post("/api/chat", &body).await?,
        };
        let reply: ReplyChunk = resp.json().await.map_err(|e| {
            ProviderError::invalid_response(PROVIDER, format!("Failed to parse response: {e}"))
        })?;
        if let Some(error) = reply.error {
            return Err(ProviderError::api(PROVIDER, error));
        }

        let text = reply.text().to_string();
        if text.trim().is_empty() {
            return Err(ProviderError::invalid_response(PROVIDER, "empty response"));
        }

        let mut response = AiResponse::new(text, self.model.clone());
        response.finish_reason = reply.done_reason.or_else(|| Some("stop".to_string()));
        if let (Some(input), Some(output)) = (reply.prompt_eval_count, reply.eval_count) {
            response.usage = Some(Usage::from_tokens(input, output));
        }
        Ok(response)
    }

    async fn stream_response(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<TextStream, ProviderError> {
        let resp = match self.build_request(messages, options, true) {
            Request::Generate(body) => self.post("/api/generate", &body).await?,
            Request::Chat(body) => self.post("/api/chat", &body).await?,
        };
        Ok(decode_lines(byte_stream(resp, PROVIDER), parse_stream_line))
    }

    fn supports_images(&self) -> bool {
        supports_vision(&self.model)
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
