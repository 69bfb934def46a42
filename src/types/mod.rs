//! Core record types
//!
//! Defines the documents stored in the catalog: personas, conditions,
//! experiment configs, participants, and sessions.

mod condition;
mod experiment;
mod participant;
mod persona;
mod session;

pub use condition::*;
pub use experiment::*;
pub use participant::*;
pub use persona::*;
pub use session::*;

use chrono::{DateTime, Utc};

/// Build a record id of the form `<prefix>_<unix-millis>_<9 random chars>`.
pub fn record_id(prefix: &str, at: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", prefix, at.timestamp_millis(), &suffix[..9])
}
