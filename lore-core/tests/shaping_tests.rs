use lore_core::config::ShapingTable;
use lore_core::model::{EmotionalDistance, ExpressionMode, Modifier, ToneProfile, Verbosity};
use lore_core::services::transform::{concise_trim, neutralize, strip_advice, validate_emotion};
use lore_core::services::{apply_modifiers, select_modifiers, select_modifiers_for_label, shape_response};

fn profile(verbosity: Verbosity, distance: EmotionalDistance) -> ToneProfile {
    ToneProfile {
        verbosity,
        emotional_distance: distance,
        ..ToneProfile::default()
    }
}

#[test]
fn low_verbosity_minimal_mode_directives() {
    let table = ShapingTable::default();
    let got = select_modifiers(
        &profile(Verbosity::Low, EmotionalDistance::Neutral),
        ExpressionMode::Minimal,
        &table,
    );
    assert_eq!(
        got,
        vec![Modifier::Concise, Modifier::ShortResponse, Modifier::NoExtraInsight]
    );
}

#[test]
fn distance_then_verbosity_then_mode() {
    let table = ShapingTable::default();
    let got = select_modifiers(
        &profile(Verbosity::High, EmotionalDistance::Distant),
        ExpressionMode::Supportive,
        &table,
    );
    assert_eq!(
        got,
        vec![
            Modifier::NeutralLanguage,
            Modifier::Expanded,
            Modifier::ValidateEmotion,
            Modifier::NoAdvice,
            Modifier::GentleQuestionsOptional,
        ]
    );

    // Distant + Factual lists neutral_language twice; nothing is deduplicated
    let factual = select_modifiers(
        &profile(Verbosity::Medium, EmotionalDistance::Distant),
        ExpressionMode::Factual,
        &table,
    );
    assert_eq!(
        factual.iter().filter(|m| **m == Modifier::NeutralLanguage).count(),
        2
    );
}

#[test]
fn unknown_mode_label_keeps_tone_directives_only() {
    let table = ShapingTable::default();
    let p = profile(Verbosity::Low, EmotionalDistance::Close);
    assert_eq!(
        select_modifiers_for_label(&p, "interpretive_dance", &table),
        vec![Modifier::WarmLanguage, Modifier::Concise]
    );
    assert_eq!(
        select_modifiers_for_label(&p, "social_focus", &table),
        vec![
            Modifier::WarmLanguage,
            Modifier::Concise,
            Modifier::PeopleCentered,
            Modifier::NoInference
        ]
    );
}

#[test]
fn no_directives_is_identity() {
    let text = "It seems like you should rest. I understand how you feel!";
    assert_eq!(apply_modifiers(text, &[], ExpressionMode::Factual), text);
    // directives without a text pass are identity too
    assert_eq!(
        apply_modifiers(
            text,
            &[Modifier::Structured, Modifier::WarmLanguage, Modifier::Expanded],
            ExpressionMode::Analytical
        ),
        text
    );
}

#[test]
fn concise_keeps_first_three_sentences() {
    assert_eq!(concise_trim("S1. S2. S3. S4. S5."), "S1. S2. S3.");
    assert_eq!(concise_trim("Only one."), "Only one.");
    assert_eq!(concise_trim("One! Two? Three."), "One! Two? Three.");
}

#[test]
fn strip_advice_is_idempotent_and_never_empties() {
    let text = "I hear you. You should call her tomorrow. It was a long day.";
    let once = strip_advice(text);
    assert!(!once.to_lowercase().contains("should"));
    assert!(once.starts_with("I hear you."));
    assert!(once.ends_with("It was a long day."));
    assert_eq!(strip_advice(&once), once);

    assert_eq!(strip_advice("You should rest."), "You should rest.");
    assert_eq!(strip_advice("No advice here."), "No advice here.");
}

#[test]
fn strip_advice_removes_matches_spliced_by_an_earlier_removal() {
    // dropping "consider it." joins "You " and "should go now." into a new match
    let text = "Hi there. You consider it.should go now. Bye.";
    let once = strip_advice(text);
    assert_eq!(once, "Hi there.  Bye.");
    assert_eq!(strip_advice(&once), once);
}

#[test]
fn neutral_phrases_are_replaced() {
    assert_eq!(
        neutralize("I understand how you feel, this week was heavy."),
        "based on the information, this week was heavy."
    );
    assert_eq!(neutralize("Plain text."), "Plain text.");
}

#[test]
fn validation_is_stripped_only_in_factual_mode() {
    let text = "That sounds really hard. The appointment is on Monday.";
    assert_eq!(
        validate_emotion(text, ExpressionMode::Factual),
        "The appointment is on Monday."
    );
    assert_eq!(validate_emotion(text, ExpressionMode::Supportive), text);
}

#[test]
fn passes_run_in_fixed_order_regardless_of_input_order() {
    let text = "It seems like you are tired. Rest now.";
    // short_response runs before no_extra_insight; stripping the only
    // remaining sentence would empty it, so it stays.
    let a = apply_modifiers(
        text,
        &[Modifier::NoExtraInsight, Modifier::ShortResponse],
        ExpressionMode::Minimal,
    );
    let b = apply_modifiers(
        text,
        &[Modifier::ShortResponse, Modifier::NoExtraInsight],
        ExpressionMode::Minimal,
    );
    assert_eq!(a, "It seems like you are tired.");
    assert_eq!(a, b);
}

#[test]
fn shape_response_end_to_end() {
    let table = ShapingTable::default();
    let text = "I understand how you feel. You probably feel ignored. The meeting moved to Friday. \
                Alex will send notes. Lunch is at noon.";
    let shaped = shape_response(
        text,
        &profile(Verbosity::Low, EmotionalDistance::Neutral),
        ExpressionMode::Factual,
        &table,
    );
    // concise -> 3 sentences, neutral phrasing, inference removed
    assert_eq!(shaped, "based on the information.  The meeting moved to Friday.");
}
