//! Inference port
//!
//! The streaming text-generation abstraction the conditioning pipeline talks
//! to, plus an OpenAI-compatible client and a scripted mock.

mod mock;
mod openai;
mod request;
mod stream;
mod traits;

pub use mock::{MockBackend, MockConfig};
pub use openai::{OpenAiBackend, OpenAiConfig};
pub use request::{ContentPart, InferenceRequest, MessageContent, RequestMessage};
pub use stream::{StreamChunk, StreamSender, TextStream, STREAM_BUFFER};
pub use traits::{BackendHealth, InferenceBackend};
