//! Mock backend for testing
//!
//! Replays scripted chunks and records every request it receives.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use super::request::InferenceRequest;
use super::stream::{TextStream, STREAM_BUFFER};
use super::traits::InferenceBackend;
use crate::error::{Error, Result};

/// Configuration for mock backend behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Text deltas emitted in order, followed by the end marker
    pub chunks: Vec<String>,

    /// Pause before each chunk (ms)
    pub chunk_latency_ms: u64,

    /// Reject the request before streaming starts
    pub fail_request: Option<String>,

    /// Emit an error chunk after the scripted text instead of `Done`
    pub fail_mid_stream: Option<String>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            chunks: vec!["Hello".to_string(), ", ".to_string(), "world.".to_string()],
            chunk_latency_ms: 0,
            fail_request: None,
            fail_mid_stream: None,
        }
    }
}

impl MockConfig {
    pub fn replying(text: &str) -> Self {
        Self {
            chunks: text.split_inclusive(' ').map(str::to_string).collect(),
            ..Default::default()
        }
    }
}

/// Scripted implementation of InferenceBackend for testing
#[derive(Default)]
pub struct MockBackend {
    config: RwLock<MockConfig>,
    requests: RwLock<Vec<InferenceRequest>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: MockConfig) -> Self {
        Self {
            config: RwLock::new(config),
            requests: RwLock::new(Vec::new()),
        }
    }

    /// Replace the script for subsequent calls.
    pub fn set_config(&self, config: MockConfig) {
        *self.config.write() = config;
    }

    /// Number of `stream` calls received
    pub fn call_count(&self) -> usize {
        self.requests.read().len()
    }

    pub fn requests(&self) -> Vec<InferenceRequest> {
        self.requests.read().clone()
    }

    pub fn last_request(&self) -> Option<InferenceRequest> {
        self.requests.read().last().cloned()
    }
}

#[async_trait]
impl InferenceBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn stream(
        &self,
        request: InferenceRequest,
        cancel: CancellationToken,
    ) -> Result<TextStream> {
        self.requests.write().push(request);
        let config = self.config.read().clone();

        if let Some(message) = config.fail_request {
            return Err(Error::inference(message));
        }

        let (tx, stream) = TextStream::channel(STREAM_BUFFER, cancel);
        tokio::spawn(async move {
            for chunk in config.chunks {
                if config.chunk_latency_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(config.chunk_latency_ms)).await;
                }
                if !tx.text(chunk).await {
                    return;
                }
            }
            match config.fail_mid_stream {
                Some(message) => tx.error(message).await,
                None => tx.done().await,
            };
        });
        Ok(stream)
    }
}
