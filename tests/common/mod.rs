//! Common test utilities and fixtures
//!
//! Builds a chat service over the memory store, the scripted mock backend
//! and a manual clock so session flows run deterministically.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};

use psylab::assignment::AssignmentEngine;
use psylab::catalog::{Catalog, CatalogSnapshot, CatalogStore, Collection, MemoryStore};
use psylab::chat::ChatService;
use psylab::clock::{Clock, ManualClock};
use psylab::inference::{InferenceBackend, MockBackend};
use psylab::session::{PersistenceGateway, SessionManager, ThrottlePolicy};
use psylab::types::{
    Condition, ConditionSettings, ExperimentConfig, Persona, PersonaCategory,
};

pub const SYSTEM_PROMPT: &str = "You are a calm, attentive listener.";
pub const MOBILE_UA: &str =
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 Mobile/15E148";

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

pub fn persona(id: &str, prompt: &str) -> Persona {
    Persona {
        id: id.to_string(),
        name: format!("Persona {}", id),
        description: String::new(),
        system_prompt: prompt.to_string(),
        category: PersonaCategory::Patient,
        tags: vec![],
        created_at: epoch(),
        updated_at: epoch(),
    }
}

pub fn condition(id: &str, delay_ms: u32, max_length: u32) -> Condition {
    Condition {
        id: id.to_string(),
        name: format!("Condition {}", id),
        description: String::new(),
        settings: ConditionSettings {
            response_delay_ms: delay_ms,
            max_response_length: max_length,
            ..Default::default()
        },
    }
}

pub fn experiment(id: &str, personas: &[&str], conditions: &[&str]) -> ExperimentConfig {
    ExperimentConfig {
        id: id.to_string(),
        name: format!("Experiment {}", id),
        description: String::new(),
        is_active: true,
        personas: personas.iter().map(|s| s.to_string()).collect(),
        conditions: conditions.iter().map(|s| s.to_string()).collect(),
        randomize_assignment: true,
        collect_demographics: true,
        require_consent: false,
        max_session_duration_minutes: 30,
        created_at: epoch(),
        updated_at: epoch(),
    }
}

/// One persona, one instant condition, one randomized experiment.
pub fn single_pair_snapshot() -> CatalogSnapshot {
    CatalogSnapshot {
        personas: vec![persona("listener", SYSTEM_PROMPT)],
        conditions: vec![condition("instant", 0, 500)],
        experiments: vec![experiment("pilot", &["listener"], &["instant"])],
    }
}

/// Write a snapshot into the store so `Catalog::load_snapshot` finds it.
pub async fn store_snapshot(store: &dyn CatalogStore, snapshot: &CatalogSnapshot) {
    for p in &snapshot.personas {
        store
            .upsert(Collection::Personas, &p.id, serde_json::to_value(p).unwrap())
            .await
            .unwrap();
    }
    for c in &snapshot.conditions {
        store
            .upsert(Collection::Conditions, &c.id, serde_json::to_value(c).unwrap())
            .await
            .unwrap();
    }
    for e in &snapshot.experiments {
        store
            .upsert(Collection::Experiments, &e.id, serde_json::to_value(e).unwrap())
            .await
            .unwrap();
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub backend: Arc<MockBackend>,
    pub clock: ManualClock,
    pub catalog: Catalog,
    pub chat: ChatService,
}

impl Harness {
    /// A service whose store already holds `snapshot`.
    pub async fn new(snapshot: CatalogSnapshot, backend: MockBackend) -> Self {
        let store = Arc::new(MemoryStore::new());
        store_snapshot(store.as_ref(), &snapshot).await;
        Self::over(store, snapshot, backend)
    }

    /// A service over an existing store, using `snapshot` for turns.
    pub fn over(store: Arc<MemoryStore>, snapshot: CatalogSnapshot, backend: MockBackend) -> Self {
        let clock = ManualClock::at_epoch();
        let backend = Arc::new(backend);
        let catalog = Catalog::new(store.clone());
        let manager = manager(store.clone(), &clock);
        let chat = ChatService::new(
            manager,
            backend.clone() as Arc<dyn InferenceBackend>,
            snapshot,
            AssignmentEngine::from_seed(7),
            "mock-model",
        );
        Self {
            store,
            backend,
            clock,
            catalog,
            chat,
        }
    }

    pub fn session_writes(&self) -> usize {
        self.store.write_count(Collection::Sessions)
    }
}

pub fn manager(store: Arc<MemoryStore>, clock: &ManualClock) -> SessionManager {
    let clock: Arc<dyn Clock> = Arc::new(clock.clone());
    let gateway = PersistenceGateway::new(
        store,
        clock.clone(),
        ThrottlePolicy {
            interval_ms: 30_000,
            every_messages: 5,
        },
    );
    SessionManager::new(gateway, clock, MOBILE_UA)
}
