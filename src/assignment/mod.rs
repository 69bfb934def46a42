//! Assignment of personas and conditions to participants.

mod engine;
mod setup;

pub use engine::{Assignment, AssignmentEngine};
pub use setup::{run_setup, select_active_experiment, SetupOutcome, SetupRequest};
