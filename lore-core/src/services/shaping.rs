//! services/shaping.rs
//! Modifier selector: tone profile + expression mode -> ordered directives.

use crate::config::ShapingTable;
use crate::model::{EmotionalDistance, ExpressionMode, Modifier, ToneProfile, Verbosity};
use crate::services::transform::apply_modifiers;

fn distance_modifiers(distance: EmotionalDistance) -> Option<Modifier> {
    match distance {
        EmotionalDistance::Distant => Some(Modifier::NeutralLanguage),
        EmotionalDistance::Close => Some(Modifier::WarmLanguage),
        EmotionalDistance::Neutral => None,
    }
}

fn verbosity_modifiers(verbosity: Verbosity) -> Option<Modifier> {
    match verbosity {
        Verbosity::Low => Some(Modifier::Concise),
        Verbosity::High => Some(Modifier::Expanded),
        Verbosity::Medium => None,
    }
}

/// Distance-derived, then verbosity-derived, then mode-derived. Not deduplicated.
pub fn select_modifiers(profile: &ToneProfile, mode: ExpressionMode, table: &ShapingTable) -> Vec<Modifier> {
    let mut out = Vec::new();
    out.extend(distance_modifiers(profile.emotional_distance));
    out.extend(verbosity_modifiers(profile.verbosity));
    out.extend_from_slice(table.for_mode(mode));
    out
}

/// Same as [`select_modifiers`] for a mode label coming from an intent
/// detector. An unrecognized label contributes no mode directives.
pub fn select_modifiers_for_label(profile: &ToneProfile, mode_label: &str, table: &ShapingTable) -> Vec<Modifier> {
    match mode_label.parse::<ExpressionMode>() {
        Ok(mode) => select_modifiers(profile, mode, table),
        Err(_) => {
            tracing::debug!(mode_label, "unrecognized expression mode; tone directives only");
            let mut out = Vec::new();
            out.extend(distance_modifiers(profile.emotional_distance));
            out.extend(verbosity_modifiers(profile.verbosity));
            out
        }
    }
}

/// Select directives and apply them to `text`.
pub fn shape_response(text: &str, profile: &ToneProfile, mode: ExpressionMode, table: &ShapingTable) -> String {
    let modifiers = select_modifiers(profile, mode, table);
    apply_modifiers(text, &modifiers, mode)
}

/// [`shape_response`] for a mode label. Tone-only directives contain no
/// mode-dependent pass, so the fallback mode passed on is never consulted.
pub fn shape_response_for_label(text: &str, profile: &ToneProfile, mode_label: &str, table: &ShapingTable) -> String {
    let mode = mode_label.parse::<ExpressionMode>().unwrap_or(ExpressionMode::Supportive);
    let modifiers = select_modifiers_for_label(profile, mode_label, table);
    apply_modifiers(text, &modifiers, mode)
}
