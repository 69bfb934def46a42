//! Catalog store port.
//!
//! A document store with one keyspace per [`Collection`]. Documents are raw
//! JSON values keyed by their `id`; the typed view lives in
//! [`super::Catalog`].

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// The named collections the orchestrator reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Personas,
    Conditions,
    Experiments,
    Participants,
    Sessions,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Personas,
        Collection::Conditions,
        Collection::Experiments,
        Collection::Participants,
        Collection::Sessions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Personas => "personas",
            Collection::Conditions => "conditions",
            Collection::Experiments => "experiments",
            Collection::Participants => "participants",
            Collection::Sessions => "sessions",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyed JSON document storage.
///
/// Implementations must be safe to share across tasks. `upsert` replaces the
/// whole document; there are no partial updates.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Returns every document in the collection. Order is unspecified.
    async fn list(&self, collection: Collection) -> Result<Vec<Value>>;

    /// Returns the document with the given id, if present.
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Value>>;

    /// Creates or replaces the document with the given id.
    async fn upsert(&self, collection: Collection, id: &str, document: Value) -> Result<()>;

    /// Removes the document. Deleting a missing id is not an error.
    async fn delete(&self, collection: Collection, id: &str) -> Result<()>;

    /// Short label for logs.
    fn name(&self) -> &str;
}
