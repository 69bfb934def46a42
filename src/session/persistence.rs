//! Persistence gateway for experiment sessions.
//!
//! Mirrors the in-memory session to the `sessions` collection. Writes are
//! either unconditional (lifecycle transitions) or throttled (turns). A
//! failed write is logged and swallowed; the in-memory record stays the
//! source of truth.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::catalog::{CatalogStore, Collection};
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::types::ExperimentSession;

pub const DEFAULT_SAVE_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_SAVE_EVERY_MESSAGES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistMode {
    /// Write only if the interval elapsed or the message count hits the batch size.
    Throttled,
    Unconditional,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    Written,
    /// Throttle declined the write; no I/O happened.
    Deferred,
    Failed(String),
}

impl PersistOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, PersistOutcome::Written)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottlePolicy {
    pub interval_ms: u64,
    pub every_messages: usize,
}

impl Default for ThrottlePolicy {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_SAVE_INTERVAL_MS,
            every_messages: DEFAULT_SAVE_EVERY_MESSAGES,
        }
    }
}

impl ThrottlePolicy {
    /// `elapsed > interval` or `message_count` is a multiple of the batch size.
    pub fn should_write(&self, elapsed_ms: i64, message_count: usize) -> bool {
        let interval_passed = elapsed_ms > self.interval_ms as i64;
        let batch_boundary = self.every_messages > 0 && message_count % self.every_messages == 0;
        interval_passed || batch_boundary
    }
}

/// Serialize a session into its stored document shape.
///
/// Absent optional fields become explicit `null`s at every depth.
pub fn to_document(session: &ExperimentSession) -> Result<Value> {
    Ok(serde_json::to_value(session)?)
}

pub struct PersistenceGateway {
    store: Arc<dyn CatalogStore>,
    clock: Arc<dyn Clock>,
    policy: ThrottlePolicy,
    /// Time of the last successful write, in Unix millis.
    last_save_ms: i64,
}

impl PersistenceGateway {
    pub fn new(store: Arc<dyn CatalogStore>, clock: Arc<dyn Clock>, policy: ThrottlePolicy) -> Self {
        Self {
            store,
            clock,
            policy,
            last_save_ms: 0,
        }
    }

    pub fn policy(&self) -> ThrottlePolicy {
        self.policy
    }

    pub fn last_save_ms(&self) -> i64 {
        self.last_save_ms
    }

    pub async fn persist(&mut self, session: &ExperimentSession, mode: PersistMode) -> PersistOutcome {
        let now = self.clock.now_millis();

        if mode == PersistMode::Throttled {
            let elapsed = now - self.last_save_ms;
            if !self.policy.should_write(elapsed, session.metadata.message_count) {
                debug!(
                    session_id = %session.id,
                    message_count = session.metadata.message_count,
                    elapsed_ms = elapsed,
                    "Persist deferred"
                );
                return PersistOutcome::Deferred;
            }
        }

        match self.write(session).await {
            Ok(()) => {
                self.last_save_ms = now;
                debug!(
                    session_id = %session.id,
                    mode = ?mode,
                    status = %session.status,
                    message_count = session.metadata.message_count,
                    "Session persisted"
                );
                PersistOutcome::Written
            }
            Err(e) => {
                let failure = Error::PersistenceFailure {
                    session_id: session.id.clone(),
                    message: e.to_string(),
                };
                warn!(error = %failure.format_for_log(), "Session write failed; continuing in memory");
                PersistOutcome::Failed(e.to_string())
            }
        }
    }

    async fn write(&self, session: &ExperimentSession) -> Result<()> {
        let document = to_document(session)?;
        self.store
            .upsert(Collection::Sessions, &session.id, document)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttle_rule() {
        let policy = ThrottlePolicy::default();
        assert!(!policy.should_write(10_000, 1));
        assert!(policy.should_write(10_000, 5));
        assert!(policy.should_write(10_000, 10));
        assert!(!policy.should_write(30_000, 3));
        assert!(policy.should_write(30_001, 3));
    }

    #[test]
    fn test_zero_batch_disables_count_rule() {
        let policy = ThrottlePolicy {
            interval_ms: 1_000,
            every_messages: 0,
        };
        assert!(!policy.should_write(500, 0));
        assert!(policy.should_write(1_001, 7));
    }

    #[test]
    fn test_only_written_counts_as_written() {
        assert!(PersistOutcome::Written.is_written());
        assert!(!PersistOutcome::Deferred.is_written());
        assert!(!PersistOutcome::Failed("disk full".into()).is_written());
    }
}
