//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for psylab.

use clap::{Parser, Subcommand};

use crate::types::{ExperienceLevel, SessionStatus};

/// psylab - controlled human-AI conversation experiments
///
/// Assigns participants to a persona and an experimental condition, runs
/// the conditioned conversation against an OpenAI-compatible model service,
/// and records every session for later analysis.
#[derive(Parser, Debug)]
#[command(name = "psylab")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(short, long, env = "PSYLAB_CONFIG", global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Set up a participant and run an interactive chat session
    Chat(ChatArgs),

    /// Load the catalog (seeding defaults if empty) and list its contents
    Catalog,

    /// Inspect recorded sessions
    Sessions {
        #[command(subcommand)]
        subcommand: SessionsSubcommand,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },

    /// Display version and build information
    Version {
        /// Print build information as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct ChatArgs {
    /// Experiment to run (defaults to the configured or first active one)
    #[arg(short, long)]
    pub experiment: Option<String>,

    /// Persona to use instead of random assignment (requires --condition)
    #[arg(long, requires = "condition")]
    pub persona: Option<String>,

    /// Condition to use instead of random assignment (requires --persona)
    #[arg(long, requires = "persona")]
    pub condition: Option<String>,

    /// Record that the participant gave informed consent
    #[arg(long)]
    pub consent: bool,

    /// Seed for reproducible assignment and delay jitter
    #[arg(long)]
    pub seed: Option<u64>,

    /// Model to request from the inference service
    #[arg(short, long)]
    pub model: Option<String>,

    /// Participant age (demographics)
    #[arg(long)]
    pub age: Option<u32>,

    /// Participant gender (demographics)
    #[arg(long)]
    pub gender: Option<String>,

    /// Participant profession (demographics)
    #[arg(long)]
    pub profession: Option<String>,

    /// Participant experience level (demographics)
    #[arg(long, value_parser = parse_experience)]
    pub experience: Option<ExperienceLevel>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SessionsSubcommand {
    /// Print a summary table of sessions, newest first
    List(SessionQuery),

    /// Export sessions as CSV
    Export {
        #[command(flatten)]
        query: SessionQuery,

        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct SessionQuery {
    /// Only sessions with this status (active, completed, abandoned)
    #[arg(long, value_parser = parse_status)]
    pub status: Option<SessionStatus>,

    /// Case-insensitive match on participant or session id
    #[arg(short, long)]
    pub search: Option<String>,
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the effective configuration
    Show,

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the configuration
    Validate,
}

fn parse_status(s: &str) -> Result<SessionStatus, String> {
    s.parse::<SessionStatus>().map_err(|e| e.to_string())
}

fn parse_experience(s: &str) -> Result<ExperienceLevel, String> {
    match s.to_lowercase().as_str() {
        "novice" => Ok(ExperienceLevel::Novice),
        "intermediate" => Ok(ExperienceLevel::Intermediate),
        "expert" => Ok(ExperienceLevel::Expert),
        other => Err(format!(
            "unknown experience level '{}' (expected novice, intermediate or expert)",
            other
        )),
    }
}
