// lore-core/src/commands/api.rs
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::path::Path;

use crate::commands::init::{ensure_initialized_at, ensure_initialized_once};
use crate::config::CoreConfig;
use crate::model::{
    DriftSignal, EntityKind, ExpressionMode, MeaningSnapshot, MeaningTransition, Modifier, ToneProfile,
};
use crate::services::audit::Logbook;
use crate::services::drift::{self, DriftDetector};
use crate::services::entity_cache::{CachedDirectory, EntityResolver};
use crate::services::memory::Memory;
use crate::services::mentions::EntityNames;
use crate::services::shaping;

pub struct Commands {
    memory: Memory,           // one SQLite connection here
    resolver: EntityResolver, // no DB inside
    logbook: Logbook,
    config: CoreConfig,
}

impl Commands {
    /// Initialize `root` if needed, load its config and open the store.
    pub fn open(root: &Path) -> Result<Self> {
        let report = ensure_initialized_at(root)?;
        Self::with_config(CoreConfig::load(&report.root)?)
    }

    /// Same as [`Commands::open`] for the process root (`LORE_ROOT`).
    pub fn open_default() -> Result<Self> {
        let report = ensure_initialized_once()?;
        Self::with_config(CoreConfig::load(&report.root)?)
    }

    /// Use an already-resolved config (paths must be final).
    pub fn with_config(config: CoreConfig) -> Result<Self> {
        let memory = Memory::open(&config.memory.db_path)?;
        let resolver = EntityResolver::new(config.cache.entity_capacity);
        let logbook = Logbook::from_config(&config);
        Ok(Self {
            memory,
            resolver,
            logbook,
            config,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    // ---------- inputs ----------

    /// Create or update an entity; returns its id.
    pub fn register_entity(&self, user_id: &str, kind: EntityKind, name: &str, aliases: &[String]) -> Result<String> {
        let id = self.resolver.resolve_or_create(&self.memory, user_id, kind, name, aliases)?;
        self.logbook.record_action(
            "commands",
            "entity_registered",
            &json!({"user_id": user_id, "entity_id": id, "kind": kind, "aliases": aliases.len()}),
            "low",
        );
        Ok(id)
    }

    pub fn entities(&self, user_id: &str) -> Result<Vec<EntityNames>> {
        self.memory.list_entities(user_id)
    }

    /// Store a journal entry; `at` defaults to now.
    pub fn record_entry(
        &self,
        user_id: &str,
        content: &str,
        sentiment: Option<f64>,
        at: Option<DateTime<Utc>>,
    ) -> Result<String> {
        let id = self
            .memory
            .record_entry(user_id, content, sentiment, at.unwrap_or_else(Utc::now))?;
        self.logbook.record_action(
            "commands",
            "entry_recorded",
            &json!({"user_id": user_id, "entry_id": id, "preview": self.logbook.preview(content)}),
            "low",
        );
        Ok(id)
    }

    // ---------- drift ----------

    /// Fail-soft: `None` covers "no drift", "not enough data" and lookup errors.
    pub fn detect_drift(
        &self,
        user_id: &str,
        entity_id: &str,
        kind: EntityKind,
        now: DateTime<Utc>,
    ) -> Option<DriftSignal> {
        if !self.config.services.drift_enabled {
            return None;
        }
        let directory = CachedDirectory {
            inner: &self.memory,
            resolver: &self.resolver,
        };
        let detector = DriftDetector {
            directory: &directory,
            journal: &self.memory,
            snapshots: &self.memory,
            policy: &self.config.drift,
            table: &self.config.context,
        };
        detector.detect_meaning_drift(user_id, entity_id, kind, now)
    }

    /// Persist an unconfirmed transition. Write errors propagate.
    pub fn propose_transition(&self, signal: &DriftSignal) -> Result<MeaningTransition> {
        let transition = drift::propose_transition(&self.memory, signal)?;
        self.logbook.record_action(
            "drift",
            "transition_proposed",
            &json!({
                "transition_id": transition.id,
                "entity_id": transition.entity_id,
                "kind": transition.kind,
                "confidence": transition.confidence,
            }),
            "medium",
        );
        Ok(transition)
    }

    /// Detect and propose in one step. An entity that already has an
    /// unconfirmed transition is skipped so proposals do not pile up.
    pub fn scan_entity(
        &self,
        user_id: &str,
        entity_id: &str,
        kind: EntityKind,
        now: DateTime<Utc>,
    ) -> Result<Option<MeaningTransition>> {
        match self.memory.has_pending_transition(user_id, entity_id) {
            Ok(false) => {}
            Ok(true) => {
                tracing::debug!(entity_id, "pending transition exists; scan skipped");
                return Ok(None);
            }
            Err(e) => {
                tracing::warn!(entity_id, error = %e, "pending lookup failed; scan skipped");
                return Ok(None);
            }
        }
        match self.detect_drift(user_id, entity_id, kind, now) {
            Some(signal) => self.propose_transition(&signal).map(Some),
            None => Ok(None),
        }
    }

    /// [`Commands::scan_entity`] over every entity of the user.
    pub fn scan_user(&self, user_id: &str, now: DateTime<Utc>) -> Result<Vec<MeaningTransition>> {
        let mut proposed = Vec::new();
        for entity in self.memory.list_entities(user_id)? {
            if let Some(t) = self.scan_entity(user_id, &entity.entity_id, entity.kind, now)? {
                proposed.push(t);
            }
        }
        Ok(proposed)
    }

    pub fn confirm_transition(
        &self,
        transition_id: &str,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<MeaningSnapshot> {
        let snapshot = self.memory.confirm_transition(transition_id, note, now)?;
        tracing::info!(transition_id, snapshot_id = %snapshot.id, "transition confirmed");
        self.logbook.record_action(
            "commands",
            "transition_confirmed",
            &json!({
                "transition_id": transition_id,
                "snapshot_id": snapshot.id,
                "entity_id": snapshot.entity_id,
                "has_note": note.is_some(),
            }),
            "medium",
        );
        Ok(snapshot)
    }

    pub fn pending_transitions(&self, user_id: &str) -> Result<Vec<MeaningTransition>> {
        self.memory.pending_transitions(user_id)
    }

    /// Snapshot history of one entity, oldest first.
    pub fn snapshot_history(&self, user_id: &str, entity_id: &str) -> Result<Vec<MeaningSnapshot>> {
        self.memory.snapshots_for_entity(user_id, entity_id)
    }

    // ---------- shaping ----------

    pub fn directives(&self, profile: &ToneProfile, mode_label: &str) -> Vec<Modifier> {
        shaping::select_modifiers_for_label(profile, mode_label, &self.config.shaping)
    }

    pub fn shape_response(&self, text: &str, profile: &ToneProfile, mode: ExpressionMode) -> String {
        shaping::shape_response(text, profile, mode, &self.config.shaping)
    }

    /// Mode given as a label; an unknown label shapes by tone alone.
    pub fn shape_response_for_label(&self, text: &str, profile: &ToneProfile, mode_label: &str) -> String {
        shaping::shape_response_for_label(text, profile, mode_label, &self.config.shaping)
    }
}
