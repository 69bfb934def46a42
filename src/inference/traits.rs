//! Backend trait definitions

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::request::InferenceRequest;
use super::stream::TextStream;
use crate::error::Result;

/// Health status of a backend
#[derive(Debug, Clone, Default)]
pub struct BackendHealth {
    pub operational: bool,
    pub error: Option<String>,
}

/// A streaming text generator.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Get the backend name
    fn name(&self) -> &'static str;

    /// Start a generation. Chunks are delivered as the provider produces
    /// them; cancelling the token stops the producer.
    async fn stream(&self, request: InferenceRequest, cancel: CancellationToken)
        -> Result<TextStream>;

    /// Check whether the provider is reachable.
    async fn health_check(&self) -> Result<BackendHealth> {
        Ok(BackendHealth {
            operational: true,
            error: None,
        })
    }
}
