//! Channel-backed token streams.
//!
//! A backend spawns a producer that pushes [`StreamChunk`]s through a
//! [`StreamSender`]; the consumer reads them from the paired [`TextStream`].
//! Cancelling the shared token ends both sides.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Default channel capacity for backend producers.
pub const STREAM_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    TextDelta { text: String },
    /// End marker. Nothing follows it.
    Done,
    Error { message: String },
}

/// Producer half.
#[derive(Debug, Clone)]
pub struct StreamSender {
    tx: mpsc::Sender<StreamChunk>,
    cancel: CancellationToken,
}

impl StreamSender {
    /// Push a chunk. Returns false once the consumer is gone or the stream
    /// was cancelled; the producer should stop then.
    pub async fn send(&self, chunk: StreamChunk) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            sent = self.tx.send(chunk) => sent.is_ok(),
        }
    }

    pub async fn text(&self, text: impl Into<String>) -> bool {
        self.send(StreamChunk::TextDelta { text: text.into() }).await
    }

    pub async fn done(&self) -> bool {
        self.send(StreamChunk::Done).await
    }

    pub async fn error(&self, message: impl Into<String>) -> bool {
        self.send(StreamChunk::Error {
            message: message.into(),
        })
        .await
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Consumer half: an async sequence of chunks ending after `Done` or `Error`.
#[derive(Debug)]
pub struct TextStream {
    rx: mpsc::Receiver<StreamChunk>,
    cancel: CancellationToken,
    finished: bool,
    cancelled: bool,
}

impl TextStream {
    pub fn channel(buffer: usize, cancel: CancellationToken) -> (StreamSender, TextStream) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            StreamSender {
                tx,
                cancel: cancel.clone(),
            },
            TextStream {
                rx,
                cancel,
                finished: false,
                cancelled: false,
            },
        )
    }

    /// Next chunk, or `None` after the end marker, on cancellation, or when
    /// the producer went away.
    pub async fn next(&mut self) -> Option<StreamChunk> {
        if self.finished {
            return None;
        }
        let chunk = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                self.cancelled = true;
                None
            }
            chunk = self.rx.recv() => chunk,
        };
        match &chunk {
            Some(StreamChunk::TextDelta { .. }) => {}
            Some(StreamChunk::Done) | Some(StreamChunk::Error { .. }) | None => {
                self.finished = true;
            }
        }
        chunk
    }

    /// Stop consuming and signal the producer.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.cancelled = true;
        self.finished = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Drain the stream into a single string.
    pub async fn collect_text(mut self) -> Result<String> {
        let mut text = String::new();
        loop {
            match self.next().await {
                Some(StreamChunk::TextDelta { text: delta }) => text.push_str(&delta),
                Some(StreamChunk::Done) => return Ok(text),
                Some(StreamChunk::Error { message }) => return Err(Error::inference(message)),
                None if self.cancelled => return Err(Error::TurnCancelled),
                None => return Err(Error::inference("stream ended without a completion marker")),
            }
        }
    }
}

impl Drop for TextStream {
    fn drop(&mut self) {
        if !self.finished {
            self.cancel.cancel();
        }
    }
}
