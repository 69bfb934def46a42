//! Session lifecycle and persistence
//!
//! [`SessionManager`] drives a single experiment session from start to
//! completion; [`PersistenceGateway`] mirrors it to the catalog store.

mod device;
mod manager;
mod persistence;

pub use device::classify_device;
pub use manager::{LifecycleState, SessionContext, SessionManager};
pub use persistence::{
    to_document, PersistMode, PersistOutcome, PersistenceGateway, ThrottlePolicy,
    DEFAULT_SAVE_EVERY_MESSAGES, DEFAULT_SAVE_INTERVAL_MS,
};
