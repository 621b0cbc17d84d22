//! model.rs
//! Records the meaning pipeline reads and writes, plus the tone vocabulary used by shaping.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::LoreError;

/// `SocialFocus`, `social-focus`, `Social Focus` and `SOCIAL_FOCUS` all read as `social_focus`.
fn normalize_label(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    let mut prev_lower = false;
    for c in s.trim().chars() {
        match c {
            '-' | ' ' | '_' => {
                out.push('_');
                prev_lower = false;
            }
            c if c.is_ascii_uppercase() => {
                if prev_lower {
                    out.push('_');
                }
                out.push(c.to_ascii_lowercase());
                prev_lower = false;
            }
            c => {
                out.push(c);
                prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
            }
        }
    }
    out
}

/// Closed label sets that round-trip through SQLite columns, TOML and JSON as snake_case strings.
macro_rules! labeled {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = LoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match normalize_label(s).as_str() {
                    $($label => Ok($name::$variant),)+
                    other => Err(LoreError::UnknownLabel {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

labeled!(
    /// What sort of thing an entity is.
    EntityKind, "entity kind" {
        Person => "person",
        Place => "place",
        Organization => "organization",
        Group => "group",
        Other => "other",
    }
);

labeled!(
    /// Topical frame an entity is usually mentioned in.
    ContextCategory, "context category" {
        Work => "work",
        Family => "family",
        Romantic => "romantic",
        Social => "social",
        Personal => "personal",
        Health => "health",
        Creative => "creative",
    }
);

labeled!(SentimentMode, "sentiment mode" {
    Positive => "positive",
    Mixed => "mixed",
    Negative => "negative",
    Neutral => "neutral",
});

labeled!(ImportanceTier, "importance tier" {
    High => "high",
    Moderate => "moderate",
    Low => "low",
    Background => "background",
});

labeled!(TransitionKind, "transition kind" {
    RoleShift => "role_shift",
    SentimentShift => "sentiment_shift",
    ImportanceShift => "importance_shift",
    ContextShift => "context_shift",
    Combination => "combination",
});

labeled!(Verbosity, "verbosity" {
    Low => "low",
    Medium => "medium",
    High => "high",
});

labeled!(EmotionalDistance, "emotional distance" {
    Close => "close",
    Neutral => "neutral",
    Distant => "distant",
});

labeled!(ReflectionDepth, "reflection depth" {
    Light => "light",
    Medium => "medium",
    Deep => "deep",
});

labeled!(InsightFrequency, "insight frequency" {
    Rare => "rare",
    Occasional => "occasional",
    Frequent => "frequent",
});

labeled!(
    /// Reply register picked by the host from the detected user intent.
    ExpressionMode, "expression mode" {
        Supportive => "supportive",
        SocialFocus => "social_focus",
        Factual => "factual",
        Analytical => "analytical",
        Strategic => "strategic",
        Minimal => "minimal",
    }
);

labeled!(
    /// Named directive attached to a reply. Some map to a text pass in
    /// `services::transform`; the rest are hints for prompt assembly.
    Modifier, "modifier" {
        NeutralLanguage => "neutral_language",
        WarmLanguage => "warm_language",
        Concise => "concise",
        Expanded => "expanded",
        ShortResponse => "short_response",
        NoExtraInsight => "no_extra_insight",
        ValidateEmotion => "validate_emotion",
        NoAdvice => "no_advice",
        NoInference => "no_inference",
        GentleQuestionsOptional => "gentle_questions_optional",
        PeopleCentered => "people_centered",
        Structured => "structured",
        ExplainReasoning => "explain_reasoning",
        ActionOriented => "action_oriented",
        Prioritize => "prioritize",
    }
);

/// Per-user reply preferences. Immutable for the duration of one shaping call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToneProfile {
    pub verbosity: Verbosity,
    pub emotional_distance: EmotionalDistance,
    pub reflection_depth: ReflectionDepth,
    pub insight_frequency: InsightFrequency,
}

impl Default for ToneProfile {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::Medium,
            emotional_distance: EmotionalDistance::Neutral,
            reflection_depth: ReflectionDepth::Medium,
            insight_frequency: InsightFrequency::Occasional,
        }
    }
}

/// A journal entry that mentions the entity under analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mention {
    pub entry_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub sentiment: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shift<T> {
    pub from: Option<T>,
    pub to: Option<T>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedShifts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Shift<ContextCategory>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Shift<SentimentMode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub importance: Option<Shift<ImportanceTier>>,
}

impl DetectedShifts {
    /// Number of categories that shifted.
    pub fn count(&self) -> usize {
        [
            self.context.is_some(),
            self.sentiment.is_some(),
            self.importance.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

/// Statistics for one mention window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowProfile {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub days: u32,
    pub mention_count: usize,
    pub context_counts: BTreeMap<ContextCategory, usize>,
    pub dominant_context: Option<ContextCategory>,
    pub sentiment_score: f64,
    pub sentiment_mode: SentimentMode,
    pub mention_frequency: f64,
    pub importance: ImportanceTier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftEvidence {
    pub recent: WindowProfile,
    pub historical: WindowProfile,
    /// Id of the open snapshot used as the baseline, if there was one.
    #[serde(default)]
    pub baseline_snapshot: Option<String>,
}

/// Transient output of the drift scorer. Never stored directly; it is
/// embedded as the evidence of a proposed [`MeaningTransition`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftSignal {
    pub user_id: String,
    pub entity_id: String,
    pub entity_kind: EntityKind,
    pub signal_strength: f64,
    pub shifts: DetectedShifts,
    pub evidence: DriftEvidence,
    pub detected_at: DateTime<Utc>,
}

impl DriftSignal {
    pub fn transition_kind(&self) -> TransitionKind {
        match (
            self.shifts.count(),
            &self.shifts.context,
            &self.shifts.sentiment,
            &self.shifts.importance,
        ) {
            (1, Some(_), _, _) => TransitionKind::ContextShift,
            (1, _, Some(_), _) => TransitionKind::SentimentShift,
            (1, _, _, Some(_)) => TransitionKind::ImportanceShift,
            _ => TransitionKind::Combination,
        }
    }
}

/// Time-boxed characterization of how an entity was perceived.
/// `window_end == None` marks the single open snapshot for an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeaningSnapshot {
    pub id: String,
    pub user_id: String,
    pub entity_id: String,
    pub entity_kind: EntityKind,
    pub window_start: DateTime<Utc>,
    pub window_end: Option<DateTime<Utc>>,
    pub dominant_context: Option<ContextCategory>,
    pub sentiment_mode: Option<SentimentMode>,
    pub importance: Option<ImportanceTier>,
    pub mention_frequency: Option<f64>,
    pub confidence: f64,
    pub evidence: Value,
    pub user_note: Option<String>,
}

impl MeaningSnapshot {
    /// Open snapshot describing the recent window of a confirmed signal.
    pub fn from_signal(
        signal: &DriftSignal,
        opened_at: DateTime<Utc>,
        user_note: Option<String>,
    ) -> serde_json::Result<Self> {
        let recent = &signal.evidence.recent;
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            user_id: signal.user_id.clone(),
            entity_id: signal.entity_id.clone(),
            entity_kind: signal.entity_kind,
            window_start: opened_at,
            window_end: None,
            dominant_context: recent.dominant_context,
            sentiment_mode: Some(recent.sentiment_mode),
            importance: Some(recent.importance),
            mention_frequency: Some(recent.mention_frequency),
            confidence: signal.signal_strength.clamp(0.0, 1.0),
            evidence: serde_json::to_value(&signal.evidence)?,
            user_note,
        })
    }

    pub fn is_open(&self) -> bool {
        self.window_end.is_none()
    }
}

/// Detected (and possibly user-confirmed) change between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeaningTransition {
    pub id: String,
    pub user_id: String,
    pub entity_id: String,
    pub entity_kind: EntityKind,
    pub from_snapshot_id: Option<String>,
    pub to_snapshot_id: Option<String>,
    pub kind: TransitionKind,
    pub detected_at: DateTime<Utc>,
    pub user_confirmed: bool,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
    pub confidence: f64,
    /// The full [`DriftSignal`] that proposed this transition.
    pub evidence: Value,
}

impl MeaningTransition {
    /// Unconfirmed transition for a signal that cleared the gate.
    pub fn proposed(signal: &DriftSignal) -> serde_json::Result<Self> {
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            user_id: signal.user_id.clone(),
            entity_id: signal.entity_id.clone(),
            entity_kind: signal.entity_kind,
            from_snapshot_id: signal.evidence.baseline_snapshot.clone(),
            to_snapshot_id: None,
            kind: signal.transition_kind(),
            detected_at: signal.detected_at,
            user_confirmed: false,
            confirmed_at: None,
            note: None,
            confidence: signal.signal_strength.clamp(0.0, 1.0),
            evidence: serde_json::to_value(signal)?,
        })
    }

    /// One-way: unconfirmed -> confirmed.
    pub fn confirm(&mut self, at: DateTime<Utc>, note: Option<String>) -> Result<(), LoreError> {
        if self.user_confirmed {
            return Err(LoreError::AlreadyConfirmed(self.id.clone()));
        }
        self.user_confirmed = true;
        self.confirmed_at = Some(at);
        if note.is_some() {
            self.note = note;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), LoreError> {
        if self.user_confirmed && self.confirmed_at.is_none() {
            return Err(LoreError::CorruptRecord(format!(
                "transition {} is confirmed without a confirmation timestamp",
                self.id
            )));
        }
        Ok(())
    }

    /// Recover the signal stored as evidence.
    pub fn signal(&self) -> Result<DriftSignal, LoreError> {
        serde_json::from_value(self.evidence.clone()).map_err(|e| {
            LoreError::CorruptRecord(format!("transition {} evidence: {e}", self.id))
        })
    }
}
