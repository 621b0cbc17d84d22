//! services/transform.rs
//! Directive -> text passes for response shaping.
//!
//! Passes run in a fixed order no matter how the directives are ordered.
//! Every pass is a pure `&str -> String`; a pattern that does not match leaves
//! the text alone, and strip passes never reduce a reply to nothing.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{ExpressionMode, Modifier};

/// Order in which text passes run.
pub const PASS_ORDER: [Modifier; 9] = [
    Modifier::Concise,
    Modifier::Expanded,
    Modifier::ShortResponse,
    Modifier::NoExtraInsight,
    Modifier::WarmLanguage,
    Modifier::NeutralLanguage,
    Modifier::ValidateEmotion,
    Modifier::NoAdvice,
    Modifier::NoInference,
];

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){p}")).expect("static shaping pattern"))
        .collect()
}

static SPECULATIVE: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"\bit seems like\b[^.!?]*[.!?]?",
        r"\bperhaps this (means|suggests)\b[^.!?]*[.!?]?",
        r"\bthis (might|may|could) (indicate|mean|suggest)\b[^.!?]*[.!?]?",
        r"\bi wonder if\b[^.!?]*[.!?]?",
    ])
});

static ADVICE: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"\byou should\b[^.!?]*[.!?]?",
        r"\byou could try\b[^.!?]*[.!?]?",
        r"\btry to\b[^.!?]*[.!?]?",
        r"\bi (would )?recommend\b[^.!?]*[.!?]?",
        r"\bconsider\b[^.!?]*[.!?]?",
        r"\bit might help to\b[^.!?]*[.!?]?",
    ])
});

static INFERENCE: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"\byou (probably|must) (feel|think|be|want)\b[^.!?]*[.!?]?",
        r"\bthis suggests that\b[^.!?]*[.!?]?",
        r"\bdeep down\b[^.!?]*[.!?]?",
        r"\bwhat you really\b[^.!?]*[.!?]?",
    ])
});

static VALIDATION: Lazy<Vec<Regex>> = Lazy::new(|| {
    compile(&[
        r"\bthat sounds (really |so )?(hard|difficult|tough|painful)\b[^.!?]*[.!?]?",
        r"\bit'?s (completely |totally )?(understandable|valid|okay) to feel\b[^.!?]*[.!?]?",
        r"\byour feelings are valid\b[^.!?]*[.!?]?",
    ])
});

static NEUTRAL_PHRASES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        ("I understand how you feel", "based on the information"),
        ("I'm so sorry to hear that", "that is noted"),
        ("that must be so hard", "that is a significant situation"),
        ("I'm here for you", "this is available for reference"),
        ("I'm proud of you", "that is a notable step"),
    ]
    .into_iter()
    .map(|(from, to)| {
        let re = Regex::new(&format!("(?i){}", regex::escape(from))).expect("escaped literal");
        (re, to)
    })
    .collect()
});

/// Sentences split on `.`, `!` or `?`, trimmed, empties dropped.
fn sentences(text: &str) -> Vec<&str> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Keep the first three sentences.
pub fn concise_trim(text: &str) -> String {
    let parts = sentences(text);
    if parts.len() <= 3 {
        return text.to_string();
    }
    format!("{}.", parts[..3].join(". "))
}

/// Keep the first sentence.
pub fn short_trim(text: &str) -> String {
    let parts = sentences(text);
    if parts.len() <= 1 {
        return text.to_string();
    }
    format!("{}.", parts[0])
}

/// Remove matches until none are left, trim, and hand back the original text
/// if nothing remains. A removal can splice a new match together, hence the loop.
fn strip_patterns(text: &str, patterns: &[Regex]) -> String {
    let mut out = text.to_string();
    loop {
        let before = out.len();
        for re in patterns {
            out = re.replace_all(&out, "").into_owned();
        }
        // every replacement removes at least one char, so this terminates
        if out.len() == before {
            break;
        }
    }
    let trimmed = out.trim();
    if trimmed.is_empty() {
        text.to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn strip_speculative_insight(text: &str) -> String {
    strip_patterns(text, &SPECULATIVE)
}

pub fn strip_advice(text: &str) -> String {
    strip_patterns(text, &ADVICE)
}

pub fn strip_inference(text: &str) -> String {
    strip_patterns(text, &INFERENCE)
}

pub fn neutralize(text: &str) -> String {
    let mut out = text.to_string();
    for (re, replacement) in NEUTRAL_PHRASES.iter() {
        out = re.replace_all(&out, regex::NoExpand(*replacement)).into_owned();
    }
    out
}

/// Supportive registers keep validation as written. In Factual mode the
/// validation phrases are stripped instead.
pub fn validate_emotion(text: &str, mode: ExpressionMode) -> String {
    match mode {
        ExpressionMode::Factual => strip_patterns(text, &VALIDATION),
        _ => text.to_string(),
    }
}

fn run_pass(pass: Modifier, text: &str, mode: ExpressionMode) -> String {
    match pass {
        Modifier::Concise => concise_trim(text),
        Modifier::ShortResponse => short_trim(text),
        Modifier::NoExtraInsight => strip_speculative_insight(text),
        Modifier::NeutralLanguage => neutralize(text),
        Modifier::ValidateEmotion => validate_emotion(text, mode),
        Modifier::NoAdvice => strip_advice(text),
        Modifier::NoInference => strip_inference(text),
        // expansion and warmth happen at generation time
        Modifier::Expanded | Modifier::WarmLanguage => text.to_string(),
        _ => text.to_string(),
    }
}

/// Apply every requested pass, in [`PASS_ORDER`].
pub fn apply_modifiers(text: &str, modifiers: &[Modifier], mode: ExpressionMode) -> String {
    let mut out = text.to_string();
    for pass in PASS_ORDER {
        if modifiers.contains(&pass) {
            out = run_pass(pass, &out, mode);
        }
    }
    out
}
