//! Participants: one per session-start attempt, never reused.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperienceLevel {
    Novice,
    Intermediate,
    Expert,
}

/// Optional demographic answers. Absent answers are stored as `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemographicData {
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub profession: Option<String>,
    #[serde(default)]
    pub experience_level: Option<ExperienceLevel>,
}

impl DemographicData {
    pub fn is_empty(&self) -> bool {
        self.age.is_none()
            && self.gender.is_none()
            && self.profession.is_none()
            && self.experience_level.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    #[serde(default)]
    pub demographic_data: DemographicData,
    pub consent_given: bool,
    #[serde(default)]
    pub assigned_condition: Option<String>,
    #[serde(default)]
    pub assigned_persona: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Participant {
    pub fn new(
        demographic_data: DemographicData,
        consent_given: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: super::record_id("participant", created_at),
            demographic_data,
            consent_given,
            assigned_condition: None,
            assigned_persona: None,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_participant_id() {
        let p = Participant::new(DemographicData::default(), true, Utc::now());
        assert!(p.id.starts_with("participant_"));
        assert!(p.assigned_persona.is_none());
    }

    #[test]
    fn test_absent_answers_are_null() {
        let data = DemographicData {
            age: Some(34),
            ..Default::default()
        };
        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["age"], 34);
        assert!(value["gender"].is_null());
        assert!(value.as_object().unwrap().contains_key("experienceLevel"));
    }
}
