//! Session lifecycle state machine
//!
//! Owns the current experiment session and the context it runs in. Every
//! transition is mirrored through the [`PersistenceGateway`].

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, info, warn};

use super::device::classify_device;
use super::persistence::{PersistMode, PersistOutcome, PersistenceGateway};
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::types::{
    record_id, ChatMessage, ExperimentConfig, ExperimentSession, Participant, Role,
    SessionMetadata, SessionStatus,
};

/// Where the manager is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Uninitialized,
    Active,
    Completed,
    Abandoned,
}

impl LifecycleState {
    pub fn can_start(&self) -> bool {
        !matches!(self, LifecycleState::Active)
    }
}

impl From<SessionStatus> for LifecycleState {
    fn from(status: SessionStatus) -> Self {
        match status {
            SessionStatus::Active => LifecycleState::Active,
            SessionStatus::Completed => LifecycleState::Completed,
            SessionStatus::Abandoned => LifecycleState::Abandoned,
        }
    }
}

/// The experiment, participant and session a conversation runs under.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub experiment: Option<ExperimentConfig>,
    pub participant: Option<Participant>,
    pub session: Option<ExperimentSession>,
}

impl SessionContext {
    fn clear(&mut self) {
        self.experiment = None;
        self.participant = None;
        self.session = None;
    }
}

pub struct SessionManager {
    context: SessionContext,
    state: LifecycleState,
    gateway: PersistenceGateway,
    clock: Arc<dyn Clock>,
    user_agent: String,
}

impl SessionManager {
    pub fn new(gateway: PersistenceGateway, clock: Arc<dyn Clock>, user_agent: impl Into<String>) -> Self {
        Self {
            context: SessionContext::default(),
            state: LifecycleState::Uninitialized,
            gateway,
            clock,
            user_agent: user_agent.into(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn current(&self) -> Option<&ExperimentSession> {
        self.context.session.as_ref()
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn gateway(&self) -> &PersistenceGateway {
        &self.gateway
    }

    /// Open a new active session and make it current.
    ///
    /// Allowed from the uninitialized state or after a terminal state.
    pub async fn start(
        &mut self,
        experiment: ExperimentConfig,
        participant: Participant,
        persona_id: &str,
        condition_id: &str,
        chat_id: Option<String>,
    ) -> Result<ExperimentSession> {
        if let Some(current) = self.context.session.as_ref().filter(|s| s.is_active()) {
            return Err(Error::SessionAlreadyActive {
                session_id: current.id.clone(),
            });
        }
        if !experiment.allows_persona(persona_id) {
            return Err(Error::invalid_assignment(
                &experiment.id,
                format!("persona '{}' is not part of this experiment", persona_id),
            ));
        }
        if !experiment.allows_condition(condition_id) {
            return Err(Error::invalid_assignment(
                &experiment.id,
                format!("condition '{}' is not part of this experiment", condition_id),
            ));
        }

        let now = self.clock.now();
        let session = ExperimentSession {
            id: record_id("session", now),
            participant_id: participant.id.clone(),
            persona_id: persona_id.to_string(),
            condition_id: condition_id.to_string(),
            chat_id,
            messages: Vec::new(),
            start_time: format_timestamp(now),
            end_time: None,
            metadata: SessionMetadata {
                user_agent: self.user_agent.clone(),
                device_type: classify_device(&self.user_agent),
                message_count: 0,
                average_response_time: 0.0,
                session_duration_ms: None,
            },
            status: SessionStatus::Active,
        };

        if let PersistOutcome::Failed(reason) = self.gateway.persist(&session, PersistMode::Unconditional).await {
            warn!(session_id = %session.id, reason = %reason, "Session started without a stored copy");
        }

        info!(
            session_id = %session.id,
            participant_id = %session.participant_id,
            experiment_id = %experiment.id,
            persona_id = %session.persona_id,
            condition_id = %session.condition_id,
            device_type = %session.metadata.device_type,
            "Session started"
        );

        self.context.experiment = Some(experiment);
        self.context.participant = Some(participant);
        self.state = session.status.into();
        self.context.session = Some(session.clone());
        Ok(session)
    }

    /// Replace the transcript of the current session. No-op on id mismatch.
    pub async fn record_turn(
        &mut self,
        session_id: &str,
        messages: Vec<ChatMessage>,
    ) -> Option<PersistOutcome> {
        let session = self.matching_session(session_id)?;
        session.metadata.message_count = messages.len();
        session.messages = messages;

        let snapshot = session.clone();
        let outcome = self.gateway.persist(&snapshot, PersistMode::Throttled).await;
        debug!(
            session_id = %snapshot.id,
            message_count = snapshot.metadata.message_count,
            written = outcome.is_written(),
            "Turn recorded"
        );
        Some(outcome)
    }

    /// Attach the conversation id. No-op on id mismatch.
    pub async fn bind_chat(&mut self, session_id: &str, chat_id: &str) -> Option<PersistOutcome> {
        let session = self.matching_session(session_id)?;
        session.chat_id = Some(chat_id.to_string());
        let snapshot = session.clone();

        debug!(session_id = %snapshot.id, chat_id = %chat_id, "Chat bound");
        Some(self.gateway.persist(&snapshot, PersistMode::Unconditional).await)
    }

    /// Complete the current session, flush it and clear the context.
    ///
    /// With `Some(id)` the call is ignored unless it names the current
    /// session. Returns the finalized record.
    pub async fn end(&mut self, session_id: Option<&str>) -> Option<ExperimentSession> {
        let current = self.context.session.as_ref()?;
        if session_id.is_some_and(|id| id != current.id) {
            return None;
        }

        let now = self.clock.now();
        let mut session = current.clone();
        let duration_ms = session
            .started_at()
            .map(|start| (now - start).num_milliseconds().max(0) as u64)
            .unwrap_or(0);

        session.metadata.session_duration_ms = Some(duration_ms);
        session.status = SessionStatus::Completed;
        session.end_time = Some(format_timestamp(now));

        if let PersistOutcome::Failed(reason) = self.gateway.persist(&session, PersistMode::Unconditional).await {
            warn!(session_id = %session.id, reason = %reason, "Final session flush failed");
        }

        info!(
            session_id = %session.id,
            duration_ms,
            message_count = session.metadata.message_count,
            "Session completed"
        );

        self.context.clear();
        self.state = session.status.into();
        Some(session)
    }

    /// Fold a reply latency into the running mean over assistant replies.
    ///
    /// In memory only; the value is stored with the next persist.
    pub fn record_response_time(&mut self, session_id: &str, elapsed_ms: u64) {
        let Some(session) = self.matching_session(session_id) else {
            return;
        };
        let replies = session
            .messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .count()
            .max(1);
        let mean = session.metadata.average_response_time;
        session.metadata.average_response_time = mean + (elapsed_ms as f64 - mean) / replies as f64;
    }

    /// Whether the current session has run longer than the experiment's
    /// advisory limit. Never ends the session.
    pub fn advisory_overrun(&self, now: DateTime<Utc>) -> bool {
        let (Some(experiment), Some(session)) = (&self.context.experiment, &self.context.session) else {
            return false;
        };
        if experiment.max_session_duration_minutes == 0 {
            return false;
        }
        let limit_ms = i64::from(experiment.max_session_duration_minutes) * 60_000;
        session
            .started_at()
            .is_some_and(|start| (now - start).num_milliseconds() > limit_ms)
    }

    fn matching_session(&mut self, session_id: &str) -> Option<&mut ExperimentSession> {
        match self.context.session.as_mut() {
            Some(session) if session.id == session_id => Some(session),
            Some(session) => {
                debug!(current = %session.id, requested = %session_id, "Ignoring update for another session");
                None
            }
            None => None,
        }
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
