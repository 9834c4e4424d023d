//! OpenAI provider using Chat Completions and the Batch API.
//!
//! Images go out as `image_url` parts (inline images as data URLs). Batches
//! are submitted by uploading a JSONL input file, and results are read back
//! from the output and error files once the batch is terminal.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::cloud::{BatchSnapshot, CloudBackend};
use super::stream::{byte_stream, decode_lines, sse_data, Frame};
use super::usage::{cost_from_table, ModelPricing};
use super::{error_from_response, transport_error, BatchStatus, CloudAiProvider, GenerationOptions, TextStream};
use crate::error::ProviderError;
use crate::message::{AiResponse, ContentBlock, Message, Usage};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const CHAT_ENDPOINT: &str = "/v1/chat/completions";
const PROVIDER: &str = "openai";

/// Per-million-token prices (USD).
const PRICING: &[(&str, ModelPricing)] = &[
    ("gpt-4o", ModelPricing::new(2.5, 10.0)),
    ("gpt-4o-mini", ModelPricing::new(0.15, 0.6)),
    ("gpt-4-turbo", ModelPricing::new(10.0, 30.0)),
    ("gpt-4.1", ModelPricing::new(2.0, 8.0)),
    ("gpt-4.1-mini", ModelPricing::new(0.4, 1.6)),
    ("gpt-4.1-nano", ModelPricing::new(0.1, 0.4)),
    ("gpt-5", ModelPricing::new(1.25, 10.0)),
    ("gpt-5-mini", ModelPricing::new(0.25, 2.0)),
    ("gpt-5-nano", ModelPricing::new(0.05, 0.4)),
    ("gpt-3.5-turbo", ModelPricing::new(0.5, 1.5)),
    ("o3", ModelPricing::new(2.0, 8.0)),
    ("o4-mini", ModelPricing::new(1.1, 4.4)),
];

/// Checked before the vision list so that e.g. `gpt-5-nano` is not caught by `gpt-5`.
const TEXT_ONLY_PREFIXES: &[&str] = &["gpt-5-nano", "gpt-4.1-nano", "o3", "o4-mini", "gpt-3.5"];

const VISION_PREFIXES: &[&str] = &["gpt-4o", "gpt-4-turbo", "gpt-4-vision", "gpt-4.1", "gpt-5"];

const CONTEXT_WINDOWS: &[(&str, u32)] = &[
    ("gpt-4", 8_192),
    ("gpt-4-turbo", 128_000),
    ("gpt-4-vision", 128_000),
    ("gpt-4o", 128_000),
    ("gpt-4.1", 1_047_576),
    ("gpt-5", 400_000),
    ("gpt-3.5-turbo", 16_385),
    ("o3", 200_000),
    ("o4-mini", 200_000),
];

const FALLBACK_CONTEXT_WINDOW: u32 = 8_192;

/// OpenAI provider with rate limiting, retry and usage tracking.
pub type OpenAiProvider = CloudAiProvider<OpenAiBackend>;

/// Wire-level half of the OpenAI provider.
pub struct OpenAiBackend {
    api_key: Option<String>,
    model: String,
    base_url: String,
    organization: Option<String>,
    project: Option<String>,
    client: reqwest::Client,
    timeout: Duration,
}

impl OpenAiBackend {
    pub fn new(api_key: Option<String>, model: &str) -> Self {
        Self {
            api_key,
            model: model.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            organization: None,
            project: None,
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(240),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_organization(mut self, organization: Option<String>, project: Option<String>) -> Self {
        self.organization = organization;
        self.project = project;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(self.api_key.as_deref().unwrap_or_default())
            .timeout(self.timeout);
        if let Some(org) = &self.organization {
            builder = builder.header("OpenAI-Organization", org);
        }
        if let Some(project) = &self.project {
            builder = builder.header("OpenAI-Project", project);
        }
        builder
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, ProviderError> {
        let resp = builder
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, self.timeout, e))?;
        if !resp.status().is_success() {
            return Err(error_from_response(PROVIDER, resp).await);
        }
        Ok(resp)
    }

    async fn read_json<T: for<'de> Deserialize<'de>>(resp: reqwest::Response) -> Result<T, ProviderError> {
        resp.json().await.map_err(|e| {
            ProviderError::invalid_response(PROVIDER, format!("Failed to parse response: {e}"))
        })
    }

    fn request_body(&self, messages: &[Message], options: &GenerationOptions, stream: bool) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: messages.iter().map(convert_message).collect(),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
            stop: options.stop.clone(),
            stream,
            response_format: options.json_mode.then(|| ResponseFormat {
                kind: "json_object".to_string(),
            }),
        }
    }

    async fn file_lines(&self, file_id: &str) -> Result<Vec<(String, AiResponse)>, ProviderError> {
        let resp = self
            .send(self.request(reqwest::Method::GET, &format!("/v1/files/{file_id}/content")))
            .await?;
        let body = resp
            .text()
            .await
            .map_err(|e| transport_error(PROVIDER, self.timeout, e))?;
        Ok(parse_result_file(&self.model, &body))
    }
}

/// Whether a model id accepts image input.
pub fn supports_vision(model: &str) -> bool {
    if TEXT_ONLY_PREFIXES.iter().any(|p| model.starts_with(p)) {
        return false;
    }
    VISION_PREFIXES.iter().any(|p| model.starts_with(p))
}

/// Context window by longest matching prefix, with a conservative fallback.
pub fn context_window(model: &str) -> u32 {
    CONTEXT_WINDOWS
        .iter()
        .filter(|(prefix, _)| model.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, window)| *window)
        .unwrap_or(FALLBACK_CONTEXT_WINDOW)
}

fn convert_message(message: &Message) -> ChatMessage {
    let content = match message.content() {
        [ContentBlock::Text { text }] => ChatContent::Text(text.clone()),
        blocks => ChatContent::Parts(
            blocks
                .iter()
                .map(|block| match block {
                    ContentBlock::Text { text } => ChatPart::Text { text: text.clone() },
                    ContentBlock::ImageBase64 { .. } => ChatPart::ImageUrl {
                        image_url: ImageUrl {
                            url: block.image_data_url().unwrap_or_default(),
                            detail: None,
                        },
                    },
                    ContentBlock::ImageUrl { url, detail } => ChatPart::ImageUrl {
                        image_url: ImageUrl {
                            url: url.clone(),
                            detail: detail.clone(),
                        },
                    },
                })
                .collect(),
        ),
    };
    ChatMessage {
        role: message.role().as_str().to_string(),
        content,
    }
}

// --- Request types ---

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: ChatContent,
}

#[derive(Serialize)]
#[serde(untagged)]
enum ChatContent {
    Text(String),
    Parts(Vec<ChatPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ChatPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

#[derive(Serialize)]
struct BatchInputLine<'a> {
    custom_id: &'a str,
    method: &'static str,
    url: &'static str,
    body: ChatRequest,
}

#[derive(Serialize)]
struct BatchCreateRequest<'a> {
    input_file_id: &'a str,
    endpoint: &'static str,
    completion_window: &'static str,
}

// --- Response types ---

#[derive(Deserialize)]
struct ChatResponse {
    model: String,
    choices: Vec<Choice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

impl ChatResponse {
    fn into_response(self) -> AiResponse {
        let (text, finish_reason) = self
            .choices
            .into_iter()
            .next()
            .map(|c| (c.message.content.unwrap_or_default(), c.finish_reason))
            .unwrap_or_default();
        let mut response = AiResponse::new(text, self.model);
        response.finish_reason = finish_reason;
        if let Some(usage) = self.usage {
            response.usage = Some(Usage::from_tokens(usage.prompt_tokens, usage.completion_tokens));
        }
        response
    }
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Deserialize)]
struct FileObject {
    id: String,
}

#[derive(Deserialize)]
struct BatchObject {
    id: String,
    status: String,
    output_file_id: Option<String>,
    error_file_id: Option<String>,
    created_at: Option<i64>,
    completed_at: Option<i64>,
}

impl BatchObject {
    fn status(&self) -> BatchStatus {
        match self.status.as_str() {
            "validating" => BatchStatus::Queued,
            "completed" => BatchStatus::Completed,
            "failed" | "expired" => BatchStatus::Failed,
            "cancelled" => BatchStatus::Cancelled,
            // in_progress, finalizing, cancelling
            _ => BatchStatus::InProgress,
        }
    }
}

#[derive(Deserialize)]
struct ResultLine {
    custom_id: String,
    response: Option<ResultResponse>,
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize)]
struct ResultResponse {
    status_code: u16,
    body: serde_json::Value,
}

fn parse_stream_line(line: &str) -> Frame {
    let Some(data) = sse_data(line) else {
        return Frame::Skip;
    };
    if data == "[DONE]" {
        return Frame::Done;
    }
    match serde_json::from_str::<ChatChunk>(data) {
        Ok(ChatChunk {
            error: Some(error), ..
        }) => Frame::Error(ProviderError::api(PROVIDER, error.message)),
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .map(Frame::Text)
            .unwrap_or(Frame::Skip),
        Err(e) => Frame::Error(ProviderError::invalid_response(
            PROVIDER,
            format!("bad stream chunk: {e}"),
        )),
    }
}

fn parse_result_file(model: &str, body: &str) -> Vec<(String, AiResponse)> {
    body.lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<ResultLine>(line) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!("Skipping unreadable OpenAI batch result line: {e}");
                None
            }
        })
        .map(|item| {
            let response = match (item.error, item.response) {
                (Some(error), _) => AiResponse::error(model, error.message),
                (None, Some(resp)) if resp.status_code == 200 => {
                    match serde_json::from_value::<ChatResponse>(resp.body) {
                        Ok(chat) => chat.into_response(),
                        Err(e) => AiResponse::error(model, format!("unreadable response body: {e}")),
                    }
                }
                (None, Some(resp)) => {
                    let message = resp.body["error"]["message"]
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("HTTP {}", resp.status_code));
                    AiResponse::error(model, message)
                }
                (None, None) => AiResponse::error(model, "empty result line"),
            };
            (item.custom_id, response)
        })
        .collect()
}

#[async_trait]
impl CloudBackend for OpenAiBackend {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn has_credentials(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    async fn make_request(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<AiResponse, ProviderError> {
        let body = self.request_body(messages, options, false);
        let resp = self
            .send(self.request(reqwest::Method::POST, CHAT_ENDPOINT).json(&body))
            .await?;
        let chat: ChatResponse = Self::read_json(resp).await?;
        if chat.choices.is_empty() {
            return Err(ProviderError::invalid_response(PROVIDER, "response has no choices"));
        }
        Ok(chat.into_response())
    }

    async fn make_stream_request(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<TextStream, ProviderError> {
        let body = self.request_body(messages, options, true);
        let resp = self
            .send(self.request(reqwest::Method::POST, CHAT_ENDPOINT).json(&body))
            .await?;
        Ok(decode_lines(byte_stream(resp, PROVIDER), parse_stream_line))
    }

    fn calculate_cost(&self, usage: &Usage) -> f64 {
        cost_from_table(PRICING, &self.model, usage)
    }

    async fn create_batch(
        &self,
        messages_list: &[Vec<Message>],
        custom_ids: &[String],
        options: &GenerationOptions,
    ) -> Result<String, ProviderError> {
        let mut jsonl = String::new();
        for (messages, id) in messages_list.iter().zip(custom_ids) {
            let line = BatchInputLine {
                custom_id: id,
                method: "POST",
                url: CHAT_ENDPOINT,
                body: self.request_body(messages, options, false),
            };
            let encoded = serde_json::to_string(&line).map_err(|e| {
                ProviderError::InvalidArgument(format!("could not encode batch item {id}: {e}"))
            })?;
            jsonl.push_str(&encoded);
            jsonl.push('\n');
        }

        let part = reqwest::multipart::Part::bytes(jsonl.into_bytes())
            .file_name("batch_input.jsonl")
            .mime_str("application/jsonl")
            .map_err(|e| ProviderError::api(PROVIDER, format!("bad upload part: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .text("purpose", "batch")
            .part("file", part);
        let resp = self
            .send(self.request(reqwest::Method::POST, "/v1/files").multipart(form))
            .await?;
        let file: FileObject = Self::read_json(resp).await?;

        let resp = self
            .send(
                self.request(reqwest::Method::POST, "/v1/batches")
                    .json(&BatchCreateRequest {
                        input_file_id: &file.id,
                        endpoint: CHAT_ENDPOINT,
                        completion_window: "24h",
                    }),
            )
            .await?;
        let batch: BatchObject = Self::read_json(resp).await?;
        Ok(batch.id)
    }

    async fn fetch_batch(&self, job_id: &str) -> Result<BatchSnapshot, ProviderError> {
        let resp = self
            .send(self.request(reqwest::Method::GET, &format!("/v1/batches/{job_id}")))
            .await?;
        let batch: BatchObject = Self::read_json(resp).await?;
        let status = batch.status();

        let mut items = Vec::new();
        if status.is_terminal() {
            for file_id in [&batch.output_file_id, &batch.error_file_id].into_iter().flatten() {
                items.extend(self.file_lines(file_id).await?);
            }
        }

        Ok(BatchSnapshot {
            status,
            items,
            created_at: batch.created_at.map(|t| t.to_string()),
            completed_at: batch.completed_at.map(|t| t.to_string()),
        })
    }

    async fn cancel_batch(&self, job_id: &str) -> Result<(), ProviderError> {
        self.send(self.request(reqwest::Method::POST, &format!("/v1/batches/{job_id}/cancel")))
            .await?;
        Ok(())
    }

    fn supports_images(&self) -> bool {
        supports_vision(&self.model)
    }

    fn context_window(&self) -> u32 {
        context_window(&self.model)
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}
