//! Typed view over a [`CatalogStore`].

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use super::seed;
use super::store::{CatalogStore, Collection};
use crate::error::Result;
use crate::types::{Condition, ExperimentConfig, ExperimentSession, Participant, Persona};

/// In-memory snapshot of the catalog taken once per run.
///
/// Turns look personas and conditions up here; the store is not re-read.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    pub personas: Vec<Persona>,
    pub conditions: Vec<Condition>,
    pub experiments: Vec<ExperimentConfig>,
}

impl CatalogSnapshot {
    pub fn persona(&self, id: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.id == id)
    }

    pub fn condition(&self, id: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.id == id)
    }

    pub fn experiment(&self, id: &str) -> Option<&ExperimentConfig> {
        self.experiments.iter().find(|e| e.id == id)
    }
}

#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn CatalogStore>,
}

impl Catalog {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn CatalogStore> {
        Arc::clone(&self.store)
    }

    pub async fn load_personas(&self) -> Result<Vec<Persona>> {
        self.load_or_seed(Collection::Personas, seed::default_personas, |p| &p.id)
            .await
    }

    /// Conditions whose settings fall outside the allowed ranges are dropped.
    pub async fn load_conditions(&self) -> Result<Vec<Condition>> {
        let conditions = self
            .load_or_seed(Collection::Conditions, seed::default_conditions, |c| &c.id)
            .await?;
        Ok(conditions
            .into_iter()
            .filter(|c| match c.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(condition_id = %c.id, error = %e, "Skipping invalid condition");
                    false
                }
            })
            .collect())
    }

    pub async fn load_experiments(&self) -> Result<Vec<ExperimentConfig>> {
        self.load_or_seed(Collection::Experiments, seed::default_experiments, |e| &e.id)
            .await
    }

    /// Load all three catalog collections.
    pub async fn load_snapshot(&self) -> Result<CatalogSnapshot> {
        Ok(CatalogSnapshot {
            personas: self.load_personas().await?,
            conditions: self.load_conditions().await?,
            experiments: self.load_experiments().await?,
        })
    }

    pub async fn save_participant(&self, participant: &Participant) -> Result<()> {
        let doc = serde_json::to_value(participant)?;
        self.store
            .upsert(Collection::Participants, &participant.id, doc)
            .await
    }

    pub async fn load_session(&self, id: &str) -> Result<Option<ExperimentSession>> {
        match self.store.get(Collection::Sessions, id).await? {
            Some(doc) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    /// All stored sessions, newest first. Undecodable documents are skipped.
    pub async fn list_sessions(&self) -> Result<Vec<ExperimentSession>> {
        let docs = self.store.list(Collection::Sessions).await?;
        let mut sessions: Vec<ExperimentSession> = decode_all(Collection::Sessions, docs);
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(sessions)
    }

    /// Read a catalog collection, writing the bundled defaults if it is empty.
    ///
    /// A read failure returns the defaults without writing anything.
    async fn load_or_seed<T, F, I>(
        &self,
        collection: Collection,
        defaults: F,
        id_of: I,
    ) -> Result<Vec<T>>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Result<Vec<T>>,
        I: Fn(&T) -> &String,
    {
        let docs = match self.store.list(collection).await {
            Ok(docs) => docs,
            Err(e) => {
                warn!(collection = %collection, error = %e, "Catalog read failed, using bundled defaults");
                return defaults();
            }
        };

        if !docs.is_empty() {
            return Ok(decode_all(collection, docs));
        }

        let records = defaults()?;
        info!(
            collection = %collection,
            count = records.len(),
            store = self.store.name(),
            "Seeding empty collection"
        );
        for record in &records {
            let doc = serde_json::to_value(record)?;
            if let Err(e) = self.store.upsert(collection, id_of(record), doc).await {
                warn!(collection = %collection, error = %e, "Failed to seed document");
            }
        }
        Ok(records)
    }
}

fn decode_all<T: DeserializeOwned>(collection: Collection, docs: Vec<serde_json::Value>) -> Vec<T> {
    docs.into_iter()
        .filter_map(|doc| match serde_json::from_value(doc) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(collection = %collection, error = %e, "Skipping malformed document");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryStore;
    use crate::types::DemographicData;
    use chrono::Utc;
    use serde_json::json;

    fn catalog() -> (Arc<MemoryStore>, Catalog) {
        let store = Arc::new(MemoryStore::new());
        let catalog = Catalog::new(store.clone());
        (store, catalog)
    }

    #[tokio::test]
    async fn test_empty_store_is_seeded() {
        let (store, catalog) = catalog();
        let personas = catalog.load_personas().await.unwrap();
        assert!(!personas.is_empty());
        assert_eq!(store.len(Collection::Personas), personas.len());

        // Second load reads what was written instead of seeding again.
        let writes = store.write_count(Collection::Personas);
        let again = catalog.load_personas().await.unwrap();
        assert_eq!(again.len(), personas.len());
        assert_eq!(store.write_count(Collection::Personas), writes);
    }

    #[tokio::test]
    async fn test_read_failure_returns_defaults_without_writing() {
        let (store, catalog) = catalog();
        store.set_fail_reads(true);
        let conditions = catalog.load_conditions().await.unwrap();
        assert!(!conditions.is_empty());
        assert_eq!(store.write_count(Collection::Conditions), 0);
    }

    #[tokio::test]
    async fn test_existing_records_are_not_replaced() {
        let (store, catalog) = catalog();
        store
            .upsert(
                Collection::Experiments,
                "only",
                json!({
                    "id": "only", "name": "Only", "description": "",
                    "isActive": true, "personas": ["p"], "conditions": ["c"],
                    "randomizeAssignment": true, "collectDemographics": false,
                    "requireConsent": false, "maxSessionDuration": 10,
                    "createdAt": "2024-01-01T00:00:00Z", "updatedAt": "2024-01-01T00:00:00Z"
                }),
            )
            .await
            .unwrap();

        let experiments = catalog.load_experiments().await.unwrap();
        assert_eq!(experiments.len(), 1);
        assert_eq!(experiments[0].id, "only");
    }

    #[tokio::test]
    async fn test_out_of_range_conditions_are_skipped() {
        let (store, catalog) = catalog();
        for (id, delay) in [("ok", 1000), ("too-slow", 60_000)] {
            store
                .upsert(
                    Collection::Conditions,
                    id,
                    json!({
                        "id": id, "name": id, "description": "",
                        "settings": {
                            "showTypingIndicator": true, "responseDelay": delay,
                            "maxResponseLength": 500, "enableEmotionalReactions": false,
                            "simulateUserTyping": false, "randomResponseDelay": false,
                            "contextAwareness": "session", "interruptionHandling": false
                        }
                    }),
                )
                .await
                .unwrap();
        }

        let conditions = catalog.load_conditions().await.unwrap();
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].id, "ok");
    }

    #[tokio::test]
    async fn test_save_participant() {
        let (store, catalog) = catalog();
        let participant = Participant::new(DemographicData::default(), true, Utc::now());
        catalog.save_participant(&participant).await.unwrap();
        let doc = store
            .get(Collection::Participants, &participant.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc["consentGiven"], true);
        assert!(doc["assignedPersona"].is_null());
    }
}
