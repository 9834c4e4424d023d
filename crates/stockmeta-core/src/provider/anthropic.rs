//! Anthropic provider using the Messages and Message Batches APIs.
//!
//! System turns travel in the top-level `system` field. Images are sent as
//! base64 or URL sources. Streaming consumes server-sent events and yields
//! `content_block_delta` text until `message_stop`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::cloud::{BatchSnapshot, CloudBackend};
use super::stream::{byte_stream, decode_lines, sse_data, Frame};
use super::usage::{cost_from_table, ModelPricing};
use super::{error_from_response, transport_error, BatchStatus, CloudAiProvider, GenerationOptions, TextStream};
use crate::error::ProviderError;
use crate::message::{AiResponse, ContentBlock, Message, Role, Usage};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const PROVIDER: &str = "anthropic";

/// Per-million-token prices (USD).
const PRICING: &[(&str, ModelPricing)] = &[
    ("claude-3-haiku", ModelPricing::new(0.25, 1.25)),
    ("claude-3-5-haiku", ModelPricing::new(0.8, 4.0)),
    ("claude-haiku-4", ModelPricing::new(1.0, 5.0)),
    ("claude-3-sonnet", ModelPricing::new(3.0, 15.0)),
    ("claude-3-5-sonnet", ModelPricing::new(3.0, 15.0)),
    ("claude-3-7-sonnet", ModelPricing::new(3.0, 15.0)),
    ("claude-sonnet-4", ModelPricing::new(3.0, 15.0)),
    ("claude-3-opus", ModelPricing::new(15.0, 75.0)),
    ("claude-opus-4", ModelPricing::new(15.0, 75.0)),
];

/// Model families that accept image input.
const VISION_PREFIXES: &[&str] = &[
    "claude-3",
    "claude-sonnet-4",
    "claude-opus-4",
    "claude-haiku-4",
];

/// Anthropic provider with rate limiting, retry and usage tracking.
pub type AnthropicProvider = CloudAiProvider<AnthropicBackend>;

/// Wire-level half of the Anthropic provider.
pub struct AnthropicBackend {
    api_key: Option<String>,
    model: String,
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl AnthropicBackend {
    pub fn new(api_key: Option<String>, model: &str) -> Self {
        Self {
            api_key,
            model: model.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(240),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("x-api-key", self.api_key.as_deref().unwrap_or_default())
            .header("anthropic-version", API_VERSION)
            .timeout(self.timeout)
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

    fn request_body(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
        stream: bool,
    ) -> MessagesRequest {
        let (system, turns) = convert_messages(messages);
        MessagesRequest {
            model: self.model.clone(),
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system,
            messages: turns,
            temperature: options.temperature,
            top_p: options.top_p,
            top_k: options.top_k,
            stop_sequences: options.stop.clone(),
            stream,
        }
    }
}

/// Whether a model id belongs to a vision-capable family.
pub fn supports_vision(model: &str) -> bool {
    VISION_PREFIXES.iter().any(|p| model.starts_with(p))
}

/// Context window in tokens; 200k for unknown models.
pub fn context_window(model: &str) -> u32 {
    if model.starts_with("claude-sonnet-4") {
        1_000_000
    } else if model.starts_with("claude-2") {
        100_000
    } else {
        200_000
    }
}

/// Split out system turns and convert the rest to wire messages.
fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<WireMessage>) {
    let system: Vec<String> = messages
        .iter()
        .filter(|m| m.role() == Role::System)
        .map(Message::text)
        .collect();

    let turns = messages
        .iter()
        .filter(|m| m.role() != Role::System)
        .map(|m| WireMessage {
            role: m.role().as_str().to_string(),
            content: m.content().iter().map(convert_block).collect(),
        })
        .collect();

    let system = if system.is_empty() {
        None
    } else {
        Some(system.join("\n\n"))
    };
    (system, turns)
}

fn convert_block(block: &ContentBlock) -> WireBlock {
    match block {
        ContentBlock::Text { text } => WireBlock::Text { text: text.clone() },
        ContentBlock::ImageBase64 { data, mime_type } => WireBlock::Image {
            source: ImageSource::Base64 {
                media_type: mime_type.clone(),
                data: data.clone(),
            },
        },
        ContentBlock::ImageUrl { url, .. } => WireBlock::Image {
            source: ImageSource::Url { url: url.clone() },
        },
    }
}

// --- Request types ---

#[derive(Serialize, Clone)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop_sequences: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize, Clone)]
struct WireMessage {
    role: String,
    content: Vec<WireBlock>,
}

#[derive(Serialize, Clone)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WireBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Serialize, Clone)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ImageSource {
    Base64 { media_type: String, data: String },
    Url { url: String },
}

#[derive(Serialize)]
struct BatchCreateRequest {
    requests: Vec<BatchRequestItem>,
}

#[derive(Serialize)]
struct BatchRequestItem {
    custom_id: String,
    params: MessagesRequest,
}

// --- Response types ---

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseContent>,
    model: String,
    stop_reason: Option<String>,
    usage: WireUsage,
}

#[derive(Deserialize)]
struct ResponseContent {
    text: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    input_tokens: u64,
    output_tokens: u64,
}

impl MessagesResponse {
    fn into_response(self) -> AiResponse {
        let text = self
            .content
            .into_iter()
            .filter_map(|c| c.text)
            .collect::<Vec<_>>()
            .join("");
        let mut response = AiResponse::new(text, self.model).with_usage(Usage::from_tokens(
            self.usage.input_tokens,
            self.usage.output_tokens,
        ));
        response.finish_reason = self.stop_reason;
        response
    }
}

#[derive(Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    kind: String,
    delta: Option<StreamDelta>,
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize)]
struct StreamDelta {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Deserialize)]
struct BatchResource {
    id: String,
    processing_status: String,
    #[serde(default)]
    request_counts: RequestCounts,
    results_url: Option<String>,
    created_at: Option<String>,
    ended_at: Option<String>,
}

#[derive(Deserialize, Default)]
struct RequestCounts {
    #[serde(default)]
    succeeded: u64,
    #[serde(default)]
    errored: u64,
    #[serde(default)]
    canceled: u64,
}

impl BatchResource {
    fn status(&self) -> BatchStatus {
        match self.processing_status.as_str() {
            "ended" => {
                let c = &self.request_counts;
                if c.canceled > 0 && c.succeeded == 0 && c.errored == 0 {
                    BatchStatus::Cancelled
                } else {
                    BatchStatus::Completed
                }
            }
            // "canceling" is still draining on the backend
            _ => BatchStatus::InProgress,
        }
    }
}

#[derive(Deserialize)]
struct BatchResultLine {
    custom_id: String,
    result: BatchItemResult,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum BatchItemResult {
    Succeeded { message: MessagesResponse },
    Errored { error: serde_json::Value },
    Canceled,
    Expired,
}

fn parse_stream_line(line: &str) -> Frame {
    let Some(data) = sse_data(line) else {
        return Frame::Skip;
    };
    let event: StreamEvent = match serde_json::from_str(data) {
        Ok(event) => event,
        Err(e) => {
            return Frame::Error(ProviderError::invalid_response(
                PROVIDER,
                format!("bad stream event: {e}"),
            ))
        }
    };
    match event.kind.as_str() {
        "content_block_delta" => event
            .delta
            .and_then(|d| d.text)
            .map(Frame::Text)
            .unwrap_or(Frame::Skip),
        "message_stop" => Frame::Done,
        "error" => Frame::Error(ProviderError::api(
            PROVIDER,
            event
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "stream error".to_string()),
        )),
        _ => Frame::Skip,
    }
}

fn parse_results(model: &str, body: &str) -> Vec<(String, AiResponse)> {
    body.lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<BatchResultLine>(line) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!("Skipping unreadable Anthropic batch result line: {e}");
                None
            }
        })
        .map(|item| {
            let response = match item.result {
                BatchItemResult::Succeeded { message } => message.into_response(),
                BatchItemResult::Errored { error } => AiResponse::error(model, error),
                BatchItemResult::Canceled => AiResponse::error(model, "request was canceled"),
                BatchItemResult::Expired => AiResponse::error(model, "request expired"),
            };
            (item.custom_id, response)
        })
        .collect()
}

#[async_trait]
impl CloudBackend for AnthropicBackend {
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
        let url = format!("{}/v1/messages", self.base_url);
        let resp = self
            .send(self.request(reqwest::Method::POST, &url).json(&body))
            .await?;

        let parsed: MessagesResponse = resp.json().await.map_err(|e| {
            ProviderError::invalid_response(PROVIDER, format!("Failed to parse response: {e}"))
        })?;
        Ok(parsed.into_response())
    }

    async fn make_stream_request(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<TextStream, ProviderError> {
        let body = self.request_body(messages, options, true);
        let url = format!("{}/v1/messages", self.base_url);
        let resp = self
            .send(self.request(reqwest::Method::POST, &url).json(&body))
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
        let requests = messages_list
            .iter()
            .zip(custom_ids)
            .map(|(messages, id)| BatchRequestItem {
                custom_id: id.clone(),
                params: self.request_body(messages, options, false),
            })
            .collect();
        let url = format!("{}/v1/messages/batches", self.base_url);
        let resp = self
            .send(
                self.request(reqwest::Method::POST, &url)
                    .json(&BatchCreateRequest { requests }),
            )
            .await?;
        let batch: BatchResource = resp.json().await.map_err(|e| {
            ProviderError::invalid_response(PROVIDER, format!("Failed to parse batch: {e}"))
        })?;
        Ok(batch.id)
    }

    async fn fetch_batch(&self, job_id: &str) -> Result<BatchSnapshot, ProviderError> {
        let url = format!("{}/v1/messages/batches/{job_id}", self.base_url);
        let resp = self.send(self.request(reqwest::Method::GET, &url)).await?;
        let batch: BatchResource = resp.json().await.map_err(|e| {
            ProviderError::invalid_response(PROVIDER, format!("Failed to parse batch: {e}"))
        })?;

        let status = batch.status();
        let items = match (&batch.results_url, status.is_terminal()) {
            (Some(results_url), true) => {
                let resp = self
                    .send(self.request(reqwest::Method::GET, results_url))
                    .await?;
                let body = resp
                    .text()
                    .await
                    .map_err(|e| transport_error(PROVIDER, self.timeout, e))?;
                parse_results(&self.model, &body)
            }
            _ => Vec::new(),
        };

        Ok(BatchSnapshot {
            status,
            items,
            created_at: batch.created_at,
            completed_at: batch.ended_at,
        })
    }

    async fn cancel_batch(&self, job_id: &str) -> Result<(), ProviderError> {
        let url = format!("{}/v1/messages/batches/{job_id}/cancel", self.base_url);
        self.send(self.request(reqwest::Method::POST, &url)).await?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{AiProvider, RetryPolicy};
    use futures_util::StreamExt;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer, model: &str) -> AnthropicProvider {
        let backend =
            AnthropicBackend::new(Some("test-key".into()), model).with_base_url(&server.uri());
        CloudAiProvider::new(
            backend,
            0,
            RetryPolicy::new(1, Duration::from_millis(1), Default::default()),
        )
    }

    fn message_body(text: &str) -> serde_json::Value {
        json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "model": "claude-3-5-sonnet-20241022",
            "content": [{"type": "text", "text": text}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 1000, "output_tokens": 200}
        })
    }

    #[test]
    fn test_convert_messages_separates_system() {
        let (system, turns) = convert_messages(&[
            Message::system("You write stock titles."),
            Message::user_with_image("Title?", ContentBlock::image_url("https://x/y.jpg", None)),
        ]);
        assert_eq!(system.as_deref(), Some("You write stock titles."));
        assert_eq!(turns.len(), 1);
        let json = serde_json::to_value(&turns[0]).unwrap();
        assert_eq!(json["content"][0]["source"]["type"], "url");
        assert_eq!(json["content"][1]["type"], "text");
    }

    #[test]
    fn test_vision_and_context_lookup() {
        assert!(supports_vision("claude-3-haiku-20240307"));
        assert!(supports_vision("claude-sonnet-4-20250514"));
        assert!(!supports_vision("claude-2.1"));
        assert_eq!(context_window("claude-sonnet-4-20250514"), 1_000_000);
        assert_eq!(context_window("claude-unknown"), 200_000);
    }

    #[test]
    fn test_stream_line_parsing() {
        assert!(matches!(
            parse_stream_line(r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hi"}}"#),
            Frame::Text(t) if t == "Hi"
        ));
        assert!(matches!(parse_stream_line(r#"data: {"type":"message_stop"}"#), Frame::Done));
        assert!(matches!(parse_stream_line("event: ping"), Frame::Skip));
    }

    #[tokio::test]
    async fn test_generate_text_sends_system_field_and_tracks_cost() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", API_VERSION))
            .and(body_partial_json(json!({"system": "Be brief."})))
            .respond_with(ResponseTemplate::new(200).set_body_json(message_body("Calm lake")))
            .mount(&server)
            .await;

        let p = provider(&server, "claude-3-5-sonnet-20241022");
        let resp = p
            .generate_text(
                &[Message::system("Be brief."), Message::user("Title?")],
                &GenerationOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(resp.content, "Calm lake");
        assert_eq!(resp.finish_reason.as_deref(), Some("end_turn"));
        let usage = resp.usage.unwrap();
        assert_eq!(usage.total_tokens, 1200);
        // 1000 * 3/M + 200 * 15/M
        assert!((usage.cost.unwrap() - 0.006).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_auth_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid x-api-key"))
            .expect(1)
            .mount(&server)
            .await;

        let p = provider(&server, "claude-3-haiku-20240307");
        let err = p
            .generate_text(&[Message::user("hi")], &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Api { status_code: Some(401), .. }));
    }

    #[tokio::test]
    async fn test_stream_yields_deltas() {
        let server = MockServer::start().await;
        let sse = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Calm \"}}\n\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"lake\"}}\n\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .mount(&server)
            .await;

        let p = provider(&server, "claude-3-haiku-20240307");
        let stream = p
            .generate_text_stream(&[Message::user("hi")], &GenerationOptions::default())
            .await
            .unwrap();
        let text: String = stream.map(|r| r.unwrap()).collect::<Vec<_>>().await.concat();
        assert_eq!(text, "Calm lake");
    }

    #[tokio::test]
    async fn test_full_response_keeps_whitespace_like_stream() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\" Calm \"}}\n\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"lake\\n\"}}\n\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(message_body(" Calm lake\n")))
            .mount(&server)
            .await;

        let p = provider(&server, "claude-3-haiku-20240307");
        let opts = GenerationOptions::default();
        let streamed: String = p
            .generate_text_stream(&[Message::user("hi")], &opts)
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect::<Vec<_>>()
            .await
            .concat();
        let full = p.generate_text(&[Message::user("hi")], &opts).await.unwrap();
        assert_eq!(full.content, " Calm lake\n");
        assert_eq!(streamed, full.content);
    }

    #[tokio::test]
    async fn test_batch_lifecycle_orders_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages/batches"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msgbatch_1",
                "processing_status": "in_progress",
                "request_counts": {"processing": 2}
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/messages/batches/msgbatch_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msgbatch_1",
                "processing_status": "ended",
                "request_counts": {"succeeded": 1, "errored": 1},
                "results_url": format!("{}/v1/messages/batches/msgbatch_1/results", server.uri()),
                "created_at": "2024-09-24T18:37:24Z",
                "ended_at": "2024-09-24T18:40:01Z"
            })))
            .mount(&server)
            .await;
        let results = format!(
            "{}\n{}\n",
            json!({"custom_id": "id2", "result": {"type": "errored", "error": {"type": "invalid_request", "message": "bad"}}}),
            json!({"custom_id": "id1", "result": {"type": "succeeded", "message": message_body("first")}})
        );
        Mock::given(method("GET"))
            .and(path("/v1/messages/batches/msgbatch_1/results"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(results, "application/x-jsonl"))
            .mount(&server)
            .await;

        let p = provider(&server, "claude-3-haiku-20240307");
        let ids = vec!["id1".to_string(), "id2".to_string()];
        let job = p
            .create_batch_job(
                &[vec![Message::user("a")], vec![Message::user("b")]],
                &ids,
                &GenerationOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(job.job_id, "msgbatch_1");

        let done = p.get_batch_job("msgbatch_1").await.unwrap();
        assert_eq!(done.status, BatchStatus::Completed);
        assert_eq!(done.results.len(), 2);
        assert_eq!(done.results[0].custom_id, "id1");
        assert_eq!(done.results[0].response.content, "first");
        assert_eq!(done.results[1].custom_id, "id2");
        assert!(done.results[1].is_error());
    }

    #[tokio::test]
    async fn test_cancel_ended_batch_returns_false_twice() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/messages/batches/msgbatch_9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msgbatch_9",
                "processing_status": "ended",
                "request_counts": {"canceled": 2}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/messages/batches/msgbatch_9/cancel"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let p = provider(&server, "claude-3-haiku-20240307");
        assert!(!p.cancel_batch_job("msgbatch_9").await);
        assert!(!p.cancel_batch_job("msgbatch_9").await);
    }

    #[tokio::test]
    async fn test_cancel_rejected_by_backend_is_false() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/messages/batches/msgbatch_2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msgbatch_2",
                "processing_status": "in_progress"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/messages/batches/msgbatch_2/cancel"))
            .respond_with(ResponseTemplate::new(409).set_body_string("conflict"))
            .mount(&server)
            .await;

        let p = provider(&server, "claude-3-haiku-20240307");
        assert!(!p.cancel_batch_job("msgbatch_2").await);
    }
}
