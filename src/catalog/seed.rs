//! Bundled default catalog.
//!
//! Written to the store the first time a catalog collection is found empty,
//! and returned as-is when the store cannot be read.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::types::{Condition, ExperimentConfig, Persona};

const PERSONAS_TOML: &str = include_str!("../../config/seed/personas.toml");
const CONDITIONS_TOML: &str = include_str!("../../config/seed/conditions.toml");
const EXPERIMENTS_TOML: &str = include_str!("../../config/seed/experiments.toml");

#[derive(Deserialize)]
struct PersonaFile {
    personas: Vec<Persona>,
}

#[derive(Deserialize)]
struct ConditionFile {
    conditions: Vec<Condition>,
}

#[derive(Deserialize)]
struct ExperimentFile {
    experiments: Vec<ExperimentConfig>,
}

fn parse<T: for<'de> Deserialize<'de>>(name: &str, raw: &str) -> Result<T> {
    toml::from_str(raw).map_err(|e| Error::Internal(format!("bundled {} are invalid: {}", name, e)))
}

pub fn default_personas() -> Result<Vec<Persona>> {
    parse::<PersonaFile>("personas", PERSONAS_TOML).map(|f| f.personas)
}

pub fn default_conditions() -> Result<Vec<Condition>> {
    parse::<ConditionFile>("conditions", CONDITIONS_TOML).map(|f| f.conditions)
}

pub fn default_experiments() -> Result<Vec<ExperimentConfig>> {
    parse::<ExperimentFile>("experiments", EXPERIMENTS_TOML).map(|f| f.experiments)
}
