//! services/drift.rs
//! Drift scorer: turns shift descriptors into a single [0, 1] signal strength.
//!
//! This is a weighted heuristic, not a statistical model: no confidence
//! interval or significance test is computed. Fetching is fail-soft, so every
//! failure path ends in `None` ("no signal") rather than an error.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::config::{ContextTable, DriftPolicy, DriftWeights};
use crate::model::{DetectedShifts, DriftEvidence, DriftSignal, EntityKind, MeaningSnapshot, MeaningTransition};
use crate::services::memory::MeaningStore;
use crate::services::mentions::{mentions_in_window, EntityDirectory, JournalSource, MentionWindow};
use crate::services::signals::{detect_shifts, profile_window};

/// Read access to the currently open snapshot of an entity.
pub trait SnapshotSource {
    fn open_snapshot(&self, user_id: &str, entity_id: &str) -> Result<Option<MeaningSnapshot>>;
}

/// Sum of the weights of the categories present (absent ones add nothing),
/// times the multi-signal bonus when more than one is present, capped at 1.0.
pub fn signal_strength(shifts: &DetectedShifts, weights: &DriftWeights) -> f64 {
    let mut strength = 0.0;
    if shifts.context.is_some() {
        strength += weights.context;
    }
    if shifts.sentiment.is_some() {
        strength += weights.sentiment;
    }
    if shifts.importance.is_some() {
        strength += weights.importance;
    }
    if shifts.count() > 1 {
        strength *= weights.multi_signal_bonus;
    }
    strength.min(1.0)
}

pub fn passes_gate(strength: f64, recent_mentions: usize, historical_mentions: usize, policy: &DriftPolicy) -> bool {
    strength >= policy.threshold
        && recent_mentions >= policy.min_mentions
        && historical_mentions >= policy.min_mentions
}

/// Wires the fetcher, analyzer and scorer together for one entity at a time.
pub struct DriftDetector<'a> {
    pub directory: &'a dyn EntityDirectory,
    pub journal: &'a dyn JournalSource,
    pub snapshots: &'a dyn SnapshotSource,
    pub policy: &'a DriftPolicy,
    pub table: &'a ContextTable,
}

impl<'a> DriftDetector<'a> {
    /// Compare the trailing recent window against the historical window that
    /// precedes it. `None` when either window is too thin or the signal does
    /// not clear the threshold.
    pub fn detect_meaning_drift(
        &self,
        user_id: &str,
        entity_id: &str,
        kind: EntityKind,
        now: DateTime<Utc>,
    ) -> Option<DriftSignal> {
        let recent_window = MentionWindow::trailing(self.policy.recent_window_days, now);
        let historical_window = recent_window.preceding(self.policy.historical_window_days);

        let recent = mentions_in_window(self.directory, self.journal, user_id, entity_id, kind, &recent_window);
        let historical =
            mentions_in_window(self.directory, self.journal, user_id, entity_id, kind, &historical_window);
        if recent.len() < self.policy.min_mentions || historical.len() < self.policy.min_mentions {
            tracing::debug!(
                entity_id,
                recent = recent.len(),
                historical = historical.len(),
                "not enough mentions for drift"
            );
            return None;
        }

        let snapshot = match self.snapshots.open_snapshot(user_id, entity_id) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(entity_id, error = %e, "open snapshot lookup failed; using historical baseline");
                None
            }
        };

        let recent_profile = profile_window(&recent, &recent_window, self.table);
        let historical_profile = profile_window(&historical, &historical_window, self.table);
        let shifts = detect_shifts(&recent_profile, &historical_profile, snapshot.as_ref(), self.policy);
        let strength = signal_strength(&shifts, &self.policy.weights);
        tracing::debug!(entity_id, strength, shifts = shifts.count(), "drift scored");

        if !passes_gate(strength, recent.len(), historical.len(), self.policy) {
            return None;
        }

        Some(DriftSignal {
            user_id: user_id.to_string(),
            entity_id: entity_id.to_string(),
            entity_kind: kind,
            signal_strength: strength,
            shifts,
            evidence: DriftEvidence {
                recent: recent_profile,
                historical: historical_profile,
                baseline_snapshot: snapshot.map(|s| s.id),
            },
            detected_at: now,
        })
    }
}

/// Persist an unconfirmed transition for `signal`. The baseline snapshot, if
/// any, becomes `from_snapshot_id`; no snapshot is written until confirmation.
pub fn propose_transition(store: &dyn MeaningStore, signal: &DriftSignal) -> Result<MeaningTransition> {
    let transition = MeaningTransition::proposed(signal)?;
    store.insert_transition(&transition)?;
    tracing::info!(
        transition_id = %transition.id,
        entity_id = %transition.entity_id,
        kind = %transition.kind,
        confidence = transition.confidence,
        "transition proposed"
    );
    Ok(transition)
}
