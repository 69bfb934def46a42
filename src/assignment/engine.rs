//! Persona and condition assignment.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{Condition, ExperimentConfig, Persona};

/// The persona/condition pair a participant talks under.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub persona: Persona,
    pub condition: Condition,
}

/// Draws assignments from an injected, seedable random source.
#[derive(Debug)]
pub struct AssignmentEngine {
    rng: StdRng,
}

impl AssignmentEngine {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Seeded when a seed is configured, otherwise from OS entropy.
    pub fn new(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::from_seed)
    }

    /// The engine's random source, shared with delay sampling.
    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Draw a persona and a condition independently and uniformly from the
    /// loaded records the config allows.
    pub fn assign(
        &mut self,
        config: &ExperimentConfig,
        personas: &[Persona],
        conditions: &[Condition],
    ) -> Result<Assignment> {
        if !config.randomize_assignment {
            return Err(Error::invalid_assignment(
                &config.id,
                "assignment is not randomized; an explicit persona and condition are required",
            ));
        }

        let persona_pool = eligible_personas(config, personas);
        let condition_pool = eligible_conditions(config, conditions);

        let persona = persona_pool
            .choose(&mut self.rng)
            .copied()
            .ok_or_else(|| Error::NoEligibleOptions {
                experiment_id: config.id.clone(),
                kind: "personas".to_string(),
            })?;
        let condition = condition_pool
            .choose(&mut self.rng)
            .copied()
            .ok_or_else(|| Error::NoEligibleOptions {
                experiment_id: config.id.clone(),
                kind: "conditions".to_string(),
            })?;

        debug!(
            experiment_id = %config.id,
            persona_id = %persona.id,
            condition_id = %condition.id,
            eligible_personas = persona_pool.len(),
            eligible_conditions = condition_pool.len(),
            "Random assignment drawn"
        );

        Ok(Assignment {
            persona: persona.clone(),
            condition: condition.clone(),
        })
    }

    /// Accept an explicit choice if both ids are allowed by the config and
    /// present in the loaded catalog. An empty eligible set fails first,
    /// exactly as it does for a random draw.
    pub fn validate_choice(
        config: &ExperimentConfig,
        personas: &[Persona],
        conditions: &[Condition],
        persona_id: &str,
        condition_id: &str,
    ) -> Result<Assignment> {
        if eligible_personas(config, personas).is_empty() {
            return Err(Error::NoEligibleOptions {
                experiment_id: config.id.clone(),
                kind: "personas".to_string(),
            });
        }
        if eligible_conditions(config, conditions).is_empty() {
            return Err(Error::NoEligibleOptions {
                experiment_id: config.id.clone(),
                kind: "conditions".to_string(),
            });
        }

        if !config.allows_persona(persona_id) {
            return Err(Error::invalid_assignment(
                &config.id,
                format!("persona '{}' is not part of this experiment", persona_id),
            ));
        }
        if !config.allows_condition(condition_id) {
            return Err(Error::invalid_assignment(
                &config.id,
                format!("condition '{}' is not part of this experiment", condition_id),
            ));
        }

        let persona = personas.iter().find(|p| p.id == persona_id).ok_or_else(|| {
            Error::invalid_assignment(&config.id, format!("persona '{}' is not in the catalog", persona_id))
        })?;
        let condition = conditions
            .iter()
            .find(|c| c.id == condition_id)
            .ok_or_else(|| {
                Error::invalid_assignment(
                    &config.id,
                    format!("condition '{}' is not in the catalog", condition_id),
                )
            })?;

        Ok(Assignment {
            persona: persona.clone(),
            condition: condition.clone(),
        })
    }
}

fn eligible_personas<'a>(config: &ExperimentConfig, personas: &'a [Persona]) -> Vec<&'a Persona> {
    personas.iter().filter(|p| config.allows_persona(&p.id)).collect()
}

fn eligible_conditions<'a>(config: &ExperimentConfig, conditions: &'a [Condition]) -> Vec<&'a Condition> {
    conditions
        .iter()
        .filter(|c| config.allows_condition(&c.id))
        .collect()
}
