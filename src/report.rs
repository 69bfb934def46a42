//! Read-only reporting over stored sessions: filtering, totals, CSV export.

use chrono::{DateTime, Utc};

use crate::types::{Condition, ExperimentConfig, ExperimentSession, Persona, SessionStatus};

pub const CSV_HEADER: &str = "sessionId,participantId,experiment,persona,condition,startTime,endTime,duration,messageCount,status,deviceType";

const UNKNOWN_EXPERIMENT: &str = "Unknown Experiment";

#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub status: Option<SessionStatus>,
    /// Case-insensitive substring of the participant id or session id.
    pub search: Option<String>,
}

impl SessionFilter {
    pub fn matches(&self, session: &ExperimentSession) -> bool {
        if self.status.is_some_and(|s| s != session.status) {
            return false;
        }
        match self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(term) => {
                let term = term.to_lowercase();
                session.participant_id.to_lowercase().contains(&term)
                    || session.id.to_lowercase().contains(&term)
            }
            None => true,
        }
    }

    pub fn apply<'a>(&self, sessions: &'a [ExperimentSession]) -> Vec<&'a ExperimentSession> {
        sessions.iter().filter(|s| self.matches(s)).collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub sessions: usize,
    pub messages: usize,
    pub completed: usize,
    pub active: usize,
}

impl SessionSummary {
    pub fn of(sessions: &[&ExperimentSession]) -> Self {
        sessions.iter().fold(Self::default(), |mut acc, s| {
            acc.sessions += 1;
            acc.messages += s.metadata.message_count;
            match s.status {
                SessionStatus::Completed => acc.completed += 1,
                SessionStatus::Active => acc.active += 1,
                SessionStatus::Abandoned => {}
            }
            acc
        })
    }
}

/// Catalog lookups used to label sessions.
pub struct Labels<'a> {
    pub personas: &'a [Persona],
    pub conditions: &'a [Condition],
    pub experiments: &'a [ExperimentConfig],
}

impl Labels<'_> {
    pub fn persona_name<'s>(&'s self, id: &'s str) -> &'s str {
        self.personas
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.name.as_str())
            .unwrap_or(id)
    }

    pub fn condition_name<'s>(&'s self, id: &'s str) -> &'s str {
        self.conditions
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name.as_str())
            .unwrap_or(id)
    }

    /// The first experiment listing both the session's persona and condition.
    pub fn experiment_name(&self, session: &ExperimentSession) -> &str {
        self.experiments
            .iter()
            .find(|e| e.covers(&session.persona_id, &session.condition_id))
            .map(|e| e.name.as_str())
            .unwrap_or(UNKNOWN_EXPERIMENT)
    }
}

/// Whole minutes between start and end (or `now` for unfinished sessions).
pub fn duration_minutes(session: &ExperimentSession, now: DateTime<Utc>) -> i64 {
    let Some(start) = session.started_at() else {
        return 0;
    };
    let end = session.ended_at().unwrap_or(now);
    (end - start).num_minutes()
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Render sessions as CSV: a header row, then one fully quoted row per session.
pub fn export_csv(sessions: &[&ExperimentSession], labels: &Labels<'_>, now: DateTime<Utc>) -> String {
    let mut lines = Vec::with_capacity(sessions.len() + 1);
    lines.push(CSV_HEADER.to_string());

    for session in sessions {
        let duration = format!("{}m", duration_minutes(session, now));
        let message_count = session.metadata.message_count.to_string();
        let device = session.metadata.device_type.to_string();
        let row = [
            session.id.as_str(),
            session.participant_id.as_str(),
            labels.experiment_name(session),
            labels.persona_name(&session.persona_id),
            labels.condition_name(&session.condition_id),
            session.start_time.as_str(),
            session.end_time.as_deref().unwrap_or(""),
            duration.as_str(),
            message_count.as_str(),
            session.status.as_str(),
            device.as_str(),
        ];
        lines.push(row.iter().map(|v| quote(v)).collect::<Vec<_>>().join(","));
    }

    lines.join("\n")
}
