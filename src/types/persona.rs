//! Persona records. A persona is the behavioral profile the AI side of a conversation adopts.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────
// Persona Category
// ─────────────────────────────────────────────────────────────────

/// Which side of a clinical conversation the persona plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonaCategory {
    Patient,
    Psychologist,
}

impl PersonaCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonaCategory::Patient => "patient",
            PersonaCategory::Psychologist => "psychologist",
        }
    }
}

impl fmt::Display for PersonaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PersonaCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "patient" => Ok(PersonaCategory::Patient),
            "psychologist" => Ok(PersonaCategory::Psychologist),
            _ => Err(format!(
                "Unknown persona category '{}'. Valid: patient, psychologist",
                s
            )),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Persona
// ─────────────────────────────────────────────────────────────────

/// A named behavioral profile. Sessions reference it by id only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub description: String,

    /// Behavioral prompt injected by the conditioning pipeline.
    pub system_prompt: String,

    pub category: PersonaCategory,

    #[serde(default)]
    pub tags: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Persona {
    /// Returns true if the persona carries the given tag (case-insensitive).
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}
