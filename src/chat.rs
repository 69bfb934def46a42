//! Chat turns
//!
//! The conversation surface used by front ends: one call per user message,
//! streaming the conditioned reply back chunk by chunk.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::assignment::{run_setup, AssignmentEngine, SetupOutcome, SetupRequest};
use crate::catalog::{Catalog, CatalogSnapshot};
use crate::error::{Error, Result};
use crate::inference::{InferenceBackend, StreamChunk, TextStream};
use crate::pipeline;
use crate::session::SessionManager;
use crate::types::{ChatMessage, ConditionSettings, ExperimentConfig, ExperimentSession, Persona, Role};

/// An in-flight assistant reply.
pub struct Turn {
    session_id: String,
    stream: TextStream,
    /// Transcript including this turn's user message.
    transcript: Vec<ChatMessage>,
    text: String,
    started_ms: i64,
    complete: bool,
}

impl Turn {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Next text chunk, `Ok(None)` once the reply is complete.
    pub async fn next(&mut self) -> Result<Option<String>> {
        if self.complete {
            return Ok(None);
        }
        match self.stream.next().await {
            Some(StreamChunk::TextDelta { text }) => {
                self.text.push_str(&text);
                Ok(Some(text))
            }
            Some(StreamChunk::Done) => {
                self.complete = true;
                Ok(None)
            }
            Some(StreamChunk::Error { message }) => Err(Error::inference(message)),
            None if self.stream.is_cancelled() => Err(Error::TurnCancelled),
            None => Err(Error::inference("reply stream ended unexpectedly")),
        }
    }

    /// Text received so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Abort the reply. Partial output is discarded.
    pub fn cancel(&mut self) {
        self.stream.cancel();
    }
}

pub struct ChatService {
    manager: SessionManager,
    backend: Arc<dyn InferenceBackend>,
    snapshot: CatalogSnapshot,
    engine: AssignmentEngine,
    model: String,
}

impl ChatService {
    pub fn new(
        manager: SessionManager,
        backend: Arc<dyn InferenceBackend>,
        snapshot: CatalogSnapshot,
        engine: AssignmentEngine,
        model: impl Into<String>,
    ) -> Self {
        Self {
            manager,
            backend,
            snapshot,
            engine,
            model: model.into(),
        }
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    pub fn snapshot(&self) -> &CatalogSnapshot {
        &self.snapshot
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn current_session(&self) -> Option<&ExperimentSession> {
        self.manager.current()
    }

    /// Settings of the current session's condition, for the display layer.
    pub fn current_settings(&self) -> Option<&ConditionSettings> {
        let session = self.manager.current()?;
        self.snapshot
            .condition(&session.condition_id)
            .map(|c| &c.settings)
    }

    /// Run participant setup and start a session under `experiment`.
    pub async fn start(
        &mut self,
        catalog: &Catalog,
        experiment: &ExperimentConfig,
        request: SetupRequest,
    ) -> Result<SetupOutcome> {
        run_setup(
            &mut self.engine,
            catalog,
            &self.snapshot,
            &mut self.manager,
            experiment,
            request,
        )
        .await
    }

    /// Send a user message and start streaming the reply.
    pub async fn submit_turn(
        &mut self,
        user_text: &str,
        attachments: Vec<String>,
        cancel: CancellationToken,
    ) -> Result<Turn> {
        let session = self.manager.current().cloned().ok_or(Error::NoActiveSession)?;

        if session.chat_id.is_none() {
            let chat_id = uuid::Uuid::new_v4().to_string();
            self.manager.bind_chat(&session.id, &chat_id).await;
        }

        let persona = self.resolve_persona(&session.persona_id)?.clone();
        let condition = self.snapshot.condition(&session.condition_id).cloned();
        if condition.is_none() {
            warn!(condition_id = %session.condition_id, "Condition not in catalog; replying unconditioned");
        }

        let conditioned = pipeline::build_request(
            &session.messages,
            user_text,
            &attachments,
            &persona,
            condition.as_ref(),
            &self.model,
            self.engine.rng_mut(),
        )?;

        let clock = self.manager.clock();
        let mut user = ChatMessage::user(user_text).with_attachments(attachments);
        user.created_at = Some(clock.now());

        let mut transcript = session.messages.clone();
        transcript.push(user);
        self.manager.record_turn(&session.id, transcript.clone()).await;

        let started_ms = clock.now_millis();
        debug!(
            session_id = %session.id,
            pre_delay_ms = conditioned.pre_delay.as_millis() as u64,
            "Submitting turn"
        );
        let stream = pipeline::run(self.backend.as_ref(), conditioned, cancel).await?;

        Ok(Turn {
            session_id: session.id,
            stream,
            transcript,
            text: String::new(),
            started_ms,
            complete: false,
        })
    }

    /// Drain the rest of the reply, append it to the transcript and record
    /// the response time.
    pub async fn complete_turn(&mut self, mut turn: Turn) -> Result<ChatMessage> {
        while turn.next().await?.is_some() {}

        let clock = self.manager.clock();
        let mut reply = ChatMessage::new(Role::Assistant, std::mem::take(&mut turn.text));
        reply.created_at = Some(clock.now());

        let elapsed_ms = (clock.now_millis() - turn.started_ms).max(0) as u64;
        let mut transcript = std::mem::take(&mut turn.transcript);
        transcript.push(reply.clone());

        self.manager.record_turn(&turn.session_id, transcript).await;
        self.manager.record_response_time(&turn.session_id, elapsed_ms);

        info!(
            session_id = %turn.session_id,
            reply_chars = reply.content.chars().count(),
            elapsed_ms,
            "Turn completed"
        );
        Ok(reply)
    }

    /// End the current session.
    pub async fn end_session(&mut self) -> Option<ExperimentSession> {
        self.manager.end(None).await
    }

    /// End the current session whatever `outcome` the conversation closed
    /// with, then pass a failure on.
    pub async fn finish(&mut self, outcome: Result<()>) -> Result<Option<ExperimentSession>> {
        let ended = self.end_session().await;
        if let Err(e) = outcome {
            warn!(error = %e, "Conversation aborted; session ended");
            return Err(e);
        }
        Ok(ended)
    }

    fn resolve_persona(&self, persona_id: &str) -> Result<&Persona> {
        if self.snapshot.personas.is_empty() {
            return Err(Error::CatalogNotLoaded);
        }
        self.snapshot
            .persona(persona_id)
            .ok_or_else(|| Error::PersonaNotFound {
                persona_id: persona_id.to_string(),
            })
    }
}
