//! Participant setup: consent, demographics, assignment, session start.

use tracing::{info, warn};

use super::engine::{Assignment, AssignmentEngine};
use crate::catalog::{Catalog, CatalogSnapshot};
use crate::error::{Error, Result};
use crate::session::SessionManager;
use crate::types::{DemographicData, ExperimentConfig, ExperimentSession, Participant};

/// Answers collected before a session starts.
#[derive(Debug, Clone, Default)]
pub struct SetupRequest {
    pub consent_given: bool,
    pub demographics: DemographicData,
    /// Explicit choice; both ids must be given together.
    pub persona_id: Option<String>,
    pub condition_id: Option<String>,
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SetupOutcome {
    pub participant: Participant,
    pub assignment: Assignment,
    pub session: ExperimentSession,
}

/// Pick the experiment to run: `preferred` if given, else the first active one.
pub fn select_active_experiment<'a>(
    experiments: &'a [ExperimentConfig],
    preferred: Option<&str>,
) -> Result<&'a ExperimentConfig> {
    match preferred {
        Some(id) => {
            let config = experiments
                .iter()
                .find(|e| e.id == id)
                .ok_or_else(|| Error::NoActiveExperiment {
                    message: format!("experiment '{}' does not exist", id),
                })?;
            if !config.is_active {
                return Err(Error::NoActiveExperiment {
                    message: format!("experiment '{}' is not active", id),
                });
            }
            Ok(config)
        }
        None => experiments
            .iter()
            .find(|e| e.is_active)
            .ok_or_else(|| Error::NoActiveExperiment {
                message: "no experiment is marked active".to_string(),
            }),
    }
}

/// Run the setup flow and start the session.
///
/// The participant record is written best-effort; a failed write does not
/// stop the session from starting.
pub async fn run_setup(
    engine: &mut AssignmentEngine,
    catalog: &Catalog,
    snapshot: &CatalogSnapshot,
    manager: &mut SessionManager,
    experiment: &ExperimentConfig,
    request: SetupRequest,
) -> Result<SetupOutcome> {
    if experiment.require_consent && !request.consent_given {
        return Err(Error::ConsentRequired {
            experiment_id: experiment.id.clone(),
        });
    }

    let assignment = match (&request.persona_id, &request.condition_id) {
        (Some(persona_id), Some(condition_id)) => AssignmentEngine::validate_choice(
            experiment,
            &snapshot.personas,
            &snapshot.conditions,
            persona_id,
            condition_id,
        )?,
        (None, None) => engine.assign(experiment, &snapshot.personas, &snapshot.conditions)?,
        _ => {
            return Err(Error::invalid_assignment(
                &experiment.id,
                "persona and condition must be chosen together",
            ))
        }
    };

    let demographics = if experiment.collect_demographics {
        request.demographics
    } else {
        DemographicData::default()
    };

    let mut participant = Participant::new(demographics, request.consent_given, manager.clock().now());
    participant.assigned_persona = Some(assignment.persona.id.clone());
    participant.assigned_condition = Some(assignment.condition.id.clone());

    if let Err(e) = catalog.save_participant(&participant).await {
        warn!(participant_id = %participant.id, error = %e, "Failed to store participant");
    }

    let session = manager
        .start(
            experiment.clone(),
            participant.clone(),
            &assignment.persona.id,
            &assignment.condition.id,
            request.chat_id,
        )
        .await?;

    info!(
        participant_id = %participant.id,
        session_id = %session.id,
        experiment_id = %experiment.id,
        "Participant set up"
    );

    Ok(SetupOutcome {
        participant,
        assignment,
        session,
    })
}
