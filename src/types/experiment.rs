//! Experiment configuration: eligible personas/conditions plus assignment and consent policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentConfig {
    pub id: String,
    pub name: String,
    pub description: String,
    pub is_active: bool,

    /// Persona ids that may be assigned under this config.
    pub personas: Vec<String>,

    /// Condition ids that may be assigned under this config.
    pub conditions: Vec<String>,

    pub randomize_assignment: bool,
    pub collect_demographics: bool,
    pub require_consent: bool,

    /// Advisory session length in minutes. Never enforced.
    #[serde(rename = "maxSessionDuration", alias = "maxSessionDurationMinutes")]
    pub max_session_duration_minutes: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExperimentConfig {
    pub fn allows_persona(&self, persona_id: &str) -> bool {
        self.personas.iter().any(|p| p == persona_id)
    }

    pub fn allows_condition(&self, condition_id: &str) -> bool {
        self.conditions.iter().any(|c| c == condition_id)
    }

    /// True when the config lists both ids (used to attribute stored sessions).
    pub fn covers(&self, persona_id: &str, condition_id: &str) -> bool {
        self.allows_persona(persona_id) && self.allows_condition(condition_id)
    }
}
