//! psylab - controlled human-AI conversation experiments
//!
//! Participants are assigned a persona (the behavioral profile the AI side
//! adopts) and an experimental condition (response timing, length and
//! presentation settings). Each conversation is recorded as an experiment
//! session in a pluggable catalog store.

pub mod assignment;
pub mod catalog;
pub mod chat;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod inference;
pub mod logging;
pub mod pipeline;
pub mod report;
pub mod session;
pub mod types;
pub mod version;

pub use error::{Error, Result};
