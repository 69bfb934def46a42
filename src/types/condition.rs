//! Experimental conditions: declarative interaction-manipulation parameters.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest artificial response delay a condition may request.
pub const MAX_RESPONSE_DELAY_MS: u32 = 10_000;

/// Allowed range for `maxResponseLength` (characters).
pub const RESPONSE_LENGTH_RANGE: std::ops::RangeInclusive<u32> = 50..=2000;

/// How much of the conversation the AI side is meant to take into account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextAwareness {
    None,
    #[default]
    Session,
    Full,
}

impl fmt::Display for ContextAwareness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextAwareness::None => write!(f, "none"),
            ContextAwareness::Session => write!(f, "session"),
            ContextAwareness::Full => write!(f, "full"),
        }
    }
}

/// Fixed settings record of a condition.
///
/// Only `response_delay_ms`, `random_response_delay` and `max_response_length`
/// change how a reply is generated. The remaining flags are recorded with the
/// session and surfaced to the display layer unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionSettings {
    pub show_typing_indicator: bool,

    /// Milliseconds of "thinking time" before generation starts.
    #[serde(rename = "responseDelay", alias = "responseDelayMs")]
    pub response_delay_ms: u32,

    /// Reply length cap in characters.
    pub max_response_length: u32,

    pub enable_emotional_reactions: bool,
    pub simulate_user_typing: bool,

    /// Spread the delay uniformly over [0.5x, 1.5x).
    pub random_response_delay: bool,

    pub context_awareness: ContextAwareness,
    pub interruption_handling: bool,
}

impl Default for ConditionSettings {
    fn default() -> Self {
        Self {
            show_typing_indicator: true,
            response_delay_ms: 0,
            max_response_length: 500,
            enable_emotional_reactions: false,
            simulate_user_typing: false,
            random_response_delay: false,
            context_awareness: ContextAwareness::Session,
            interruption_handling: false,
        }
    }
}

/// A named bundle of settings applied to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub settings: ConditionSettings,
}

impl Condition {
    /// Check the numeric ranges of the settings.
    pub fn validate(&self) -> Result<()> {
        let s = &self.settings;
        if s.response_delay_ms > MAX_RESPONSE_DELAY_MS {
            return Err(Error::InvalidCondition {
                condition_id: self.id.clone(),
                reason: format!(
                    "responseDelay {}ms exceeds {}ms",
                    s.response_delay_ms, MAX_RESPONSE_DELAY_MS
                ),
            });
        }
        if !RESPONSE_LENGTH_RANGE.contains(&s.max_response_length) {
            return Err(Error::InvalidCondition {
                condition_id: self.id.clone(),
                reason: format!(
                    "maxResponseLength {} outside {}..={}",
                    s.max_response_length,
                    RESPONSE_LENGTH_RANGE.start(),
                    RESPONSE_LENGTH_RANGE.end()
                ),
            });
        }
        Ok(())
    }
}
