//! OpenAI-compatible API backend
//!
//! Streams `/chat/completions` over server-sent events from any
//! OpenAI-compatible endpoint (Ollama, OpenAI, vLLM, LM Studio, etc.).

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::request::{ContentPart, InferenceRequest, MessageContent};
use super::stream::{StreamSender, TextStream, STREAM_BUFFER};
use super::traits::{BackendHealth, InferenceBackend};
use crate::error::{Error, Result};

// ─────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────

/// Configuration for OpenAI-compatible API backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    /// API base URL (e.g., "https://api.openai.com/v1", "http://localhost:11434/v1")
    pub base_url: String,

    /// API key (empty string for local servers like Ollama)
    pub api_key: String,

    /// Model used when the session does not pick one
    pub default_model: String,

    /// TCP connect timeout in seconds. The stream itself has no deadline.
    pub connect_timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            api_key: String::new(),
            default_model: "llama3".to_string(),
            connect_timeout_secs: 10,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// OpenAI API types (request/response)
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: WireContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Parts(Vec<WirePart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePart {
    Text { text: String },
    ImageUrl { image_url: WireImageUrl },
}

#[derive(Debug, Serialize)]
struct WireImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

fn to_wire(request: InferenceRequest) -> ChatCompletionRequest {
    let messages = request
        .messages
        .into_iter()
        .map(|m| WireMessage {
            role: m.role.as_str(),
            content: match m.content {
                MessageContent::Text(text) => WireContent::Text(text),
                MessageContent::Parts(parts) => WireContent::Parts(
                    parts
                        .into_iter()
                        .map(|p| match p {
                            ContentPart::Text { text } => WirePart::Text { text },
                            ContentPart::Image { url } => WirePart::ImageUrl {
                                image_url: WireImageUrl { url },
                            },
                        })
                        .collect(),
                ),
            },
        })
        .collect();

    ChatCompletionRequest {
        model: request.model,
        messages,
        stream: true,
        max_tokens: request.max_output_tokens,
    }
}

// ─────────────────────────────────────────────────────────────────
// SSE parsing
// ─────────────────────────────────────────────────────────────────

/// What one `data:` line of the event stream meant.
#[derive(Debug, PartialEq)]
enum SseEvent {
    Delta(String),
    Done,
    Error(String),
}

/// Incremental `text/event-stream` line splitter.
///
/// Bytes are buffered until a full line is available so multi-byte
/// characters split across network reads decode correctly.
#[derive(Debug, Default)]
struct SseParser {
    buffer: Vec<u8>,
}

impl SseParser {
    fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\r', '\n']);

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim_start();
            if data.is_empty() {
                continue;
            }
            if data == "[DONE]" {
                events.push(SseEvent::Done);
                continue;
            }
            events.extend(parse_data(data));
        }
        events
    }
}

fn parse_data(data: &str) -> Vec<SseEvent> {
    if let Ok(envelope) = serde_json::from_str::<ApiErrorEnvelope>(data) {
        return vec![SseEvent::Error(envelope.error.message)];
    }
    match serde_json::from_str::<ChatCompletionChunk>(data) {
        Ok(chunk) => {
            let mut events = Vec::new();
            for choice in chunk.choices {
                if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                    events.push(SseEvent::Delta(text));
                }
                if let Some(reason) = choice.finish_reason {
                    debug!(finish_reason = %reason, "Stream finished");
                }
            }
            events
        }
        Err(e) => {
            warn!(error = %e, "Ignoring unparseable stream event");
            Vec::new()
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// OpenAI Backend
// ─────────────────────────────────────────────────────────────────

/// OpenAI-compatible streaming backend
pub struct OpenAiBackend {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiBackend {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        info!(
            base_url = %config.base_url,
            model = %config.default_model,
            "OpenAI-compatible backend created"
        );

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    /// Build the authorization header value (if API key is set)
    fn auth_header(&self) -> Option<String> {
        if self.config.api_key.is_empty() {
            None
        } else {
            Some(format!("Bearer {}", self.config.api_key))
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

/// Forward the response body to the stream until it ends or is cancelled.
async fn pump(response: reqwest::Response, tx: StreamSender) {
    let mut body = response.bytes_stream();
    let mut parser = SseParser::default();
    let cancel = tx.cancel_token().clone();

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Stream cancelled by consumer");
                return;
            }
            next = body.next() => next,
        };

        match next {
            Some(Ok(bytes)) => {
                for event in parser.push(&bytes) {
                    let delivered = match event {
                        SseEvent::Delta(text) => tx.text(text).await,
                        SseEvent::Done => {
                            tx.done().await;
                            return;
                        }
                        SseEvent::Error(message) => {
                            tx.error(message).await;
                            return;
                        }
                    };
                    if !delivered {
                        return;
                    }
                }
            }
            Some(Err(e)) => {
                tx.error(format!("stream read failed: {}", e)).await;
                return;
            }
            None => {
                // Some servers close the connection without a [DONE] line.
                tx.done().await;
                return;
            }
        }
    }
}

#[async_trait]
impl InferenceBackend for OpenAiBackend {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn stream(
        &self,
        request: InferenceRequest,
        cancel: CancellationToken,
    ) -> Result<TextStream> {
        let body = to_wire(request);
        debug!(
            model = %body.model,
            messages = body.messages.len(),
            max_tokens = ?body.max_tokens,
            "Starting streamed completion"
        );

        let mut req = self
            .client
            .post(self.endpoint("chat/completions"))
            .json(&body);
        if let Some(ref auth) = self.auth_header() {
            req = req.header("Authorization", auth);
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::TurnCancelled),
            sent = req.send() => sent.map_err(|e| Error::inference(format!("request failed: {}", e)))?,
        };

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(Error::inference(format!("API error {}: {}", status, message)));
        }

        let (tx, stream) = TextStream::channel(STREAM_BUFFER, cancel);
        tokio::spawn(pump(response, tx));
        Ok(stream)
    }

    async fn health_check(&self) -> Result<BackendHealth> {
        let mut req = self.client.get(self.endpoint("models"));
        if let Some(ref auth) = self.auth_header() {
            req = req.header("Authorization", auth);
        }

        match req.send().await {
            Ok(resp) if resp.status().is_success() => Ok(BackendHealth {
                operational: true,
                error: None,
            }),
            Ok(resp) => Ok(BackendHealth {
                operational: false,
                error: Some(format!("API returned status {}", resp.status())),
            }),
            Err(e) => Ok(BackendHealth {
                operational: false,
                error: Some(format!("Connection failed: {}", e)),
            }),
        }
    }
}
