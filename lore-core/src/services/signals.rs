//! services/signals.rs
//! Per-window statistics and shift detection. Pure: no I/O, no clock.

use std::collections::BTreeMap;

use crate::config::{ContextTable, DriftPolicy};
use crate::model::{
    ContextCategory, DetectedShifts, ImportanceTier, MeaningSnapshot, Mention, SentimentMode,
    Shift, WindowProfile,
};
use crate::services::mentions::MentionWindow;

/// Bag-of-hits: each keyword present in a mention adds one to its category.
/// One mention can feed several categories, and several keywords of the same
/// category in one mention all count.
pub fn context_counts(mentions: &[Mention], table: &ContextTable) -> BTreeMap<ContextCategory, usize> {
    let mut counts: BTreeMap<ContextCategory, usize> = table
        .entries()
        .iter()
        .map(|row| (row.category, 0))
        .collect();
    for mention in mentions {
        let text = mention.content.to_lowercase();
        for row in table.entries() {
            let hits = row
                .keywords
                .iter()
                .map(|k| k.to_lowercase())
                .filter(|k| !k.is_empty() && text.contains(k.as_str()))
                .count();
            *counts.entry(row.category).or_default() += hits;
        }
    }
    counts
}

/// Category with the most hits. Ties go to the category listed first in `table`.
/// No hits at all means no dominant context.
pub fn dominant_context(
    counts: &BTreeMap<ContextCategory, usize>,
    table: &ContextTable,
) -> Option<ContextCategory> {
    let mut best: Option<(ContextCategory, usize)> = None;
    for row in table.entries() {
        let count = counts.get(&row.category).copied().unwrap_or(0);
        if count == 0 {
            continue;
        }
        match best {
            Some((_, top)) if count <= top => {}
            _ => best = Some((row.category, count)),
        }
    }
    best.map(|(category, _)| category)
}

/// Mean of the sentiment values that are present. Mentions without one are
/// skipped, not counted as zero. Nothing to average -> 0.0.
pub fn sentiment_score(mentions: &[Mention]) -> f64 {
    let values: Vec<f64> = mentions.iter().filter_map(|m| m.sentiment).collect();
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Checked in this exact order. Scores in (0.1, 0.3] and [-0.3, -0.1] are
/// not claimed by any earlier branch and land on Mixed.
pub fn sentiment_mode(score: f64) -> SentimentMode {
    if score > 0.3 {
        SentimentMode::Positive
    } else if score < -0.3 {
        SentimentMode::Negative
    } else if score.abs() < 0.1 {
        SentimentMode::Neutral
    } else {
        SentimentMode::Mixed
    }
}

/// Mentions per 30-day month.
pub fn mention_frequency(count: usize, window_days: u32) -> f64 {
    if window_days == 0 {
        return 0.0;
    }
    count as f64 / f64::from(window_days) * 30.0
}

pub fn importance_tier(frequency: f64) -> ImportanceTier {
    if frequency >= 10.0 {
        ImportanceTier::High
    } else if frequency >= 3.0 {
        ImportanceTier::Moderate
    } else if frequency >= 1.0 {
        ImportanceTier::Low
    } else {
        ImportanceTier::Background
    }
}

pub fn profile_window(mentions: &[Mention], window: &MentionWindow, table: &ContextTable) -> WindowProfile {
    let context_counts = context_counts(mentions, table);
    let dominant_context = dominant_context(&context_counts, table);
    let sentiment_score = sentiment_score(mentions);
    let mention_frequency = mention_frequency(mentions.len(), window.days);
    WindowProfile {
        start: window.start,
        end: window.end,
        days: window.days,
        mention_count: mentions.len(),
        context_counts,
        dominant_context,
        sentiment_score,
        sentiment_mode: sentiment_mode(sentiment_score),
        mention_frequency,
        importance: importance_tier(mention_frequency),
    }
}

/// Compare the recent window against a baseline.
///
/// Context and sentiment baselines come from the open snapshot when it has a
/// value, otherwise from the historical window. Importance always compares the
/// two windows' frequencies: it shifts only when the relative change exceeds
/// `policy.importance_change_ratio` and the tiers differ.
pub fn detect_shifts(
    recent: &WindowProfile,
    historical: &WindowProfile,
    snapshot: Option<&MeaningSnapshot>,
    policy: &DriftPolicy,
) -> DetectedShifts {
    let mut shifts = DetectedShifts::default();

    let context_baseline = snapshot
        .and_then(|s| s.dominant_context)
        .or(historical.dominant_context);
    if let Some(to) = recent.dominant_context {
        if Some(to) != context_baseline {
            shifts.context = Some(Shift {
                from: context_baseline,
                to: Some(to),
            });
        }
    }

    let sentiment_baseline = snapshot
        .and_then(|s| s.sentiment_mode)
        .unwrap_or(historical.sentiment_mode);
    if recent.sentiment_mode != sentiment_baseline {
        shifts.sentiment = Some(Shift {
            from: Some(sentiment_baseline),
            to: Some(recent.sentiment_mode),
        });
    }

    let r = recent.mention_frequency;
    let h = historical.mention_frequency;
    let relative_change = (r - h).abs() / h.max(1.0);
    if relative_change > policy.importance_change_ratio && recent.importance != historical.importance {
        shifts.importance = Some(Shift {
            from: Some(historical.importance),
            to: Some(recent.importance),
        });
    }

    shifts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn mention(content: &str, sentiment: Option<f64>) -> Mention {
        Mention {
            entry_id: content.to_string(),
            content: content.to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            sentiment,
        }
    }

    fn window(days: u32) -> MentionWindow {
        MentionWindow::trailing(days, Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap())
    }

    #[test]
    fn sentiment_mode_follows_the_ordered_chain() {
        assert_eq!(sentiment_mode(0.31), SentimentMode::Positive);
        assert_eq!(sentiment_mode(0.09), SentimentMode::Neutral);
        assert_eq!(sentiment_mode(0.2), SentimentMode::Mixed);
        assert_eq!(sentiment_mode(0.3), SentimentMode::Mixed);
        assert_eq!(sentiment_mode(-0.31), SentimentMode::Negative);
        assert_eq!(sentiment_mode(-0.2), SentimentMode::Mixed);
        assert_eq!(sentiment_mode(0.0), SentimentMode::Neutral);
    }

    #[test]
    fn sentiment_mean_skips_missing_values() {
        let ms = vec![
            mention("a", Some(0.5)),
            mention("b", None),
            mention("c", Some(-0.1)),
        ];
        assert!((sentiment_score(&ms) - 0.2).abs() < 1e-9);
        assert_eq!(sentiment_score(&[]), 0.0);
        assert_eq!(sentiment_score(&[mention("x", None)]), 0.0);
    }

    #[test]
    fn frequency_and_tiers() {
        assert_eq!(mention_frequency(5, 30), 5.0);
        assert!((mention_frequency(9, 90) - 3.0).abs() < 1e-9);
        assert_eq!(mention_frequency(4, 0), 0.0);
        assert_eq!(importance_tier(10.0), ImportanceTier::High);
        assert_eq!(importance_tier(9.99), ImportanceTier::Moderate);
        assert_eq!(importance_tier(3.0), ImportanceTier::Moderate);
        assert_eq!(importance_tier(1.0), ImportanceTier::Low);
        assert_eq!(importance_tier(0.99), ImportanceTier::Background);
    }

    #[test]
    fn bag_of_hits_compounds_within_one_mention() {
        let table = ContextTable::default();
        let counts = context_counts(&[mention("Boss moved the meeting to the office", None)], &table);
        assert_eq!(counts[&ContextCategory::Work], 3);
        assert_eq!(counts[&ContextCategory::Family], 0);
    }

    #[test]
    fn dominant_context_ties_break_by_table_order() {
        let table = ContextTable::default();
        // one Work keyword, one Family keyword
        let counts = context_counts(&[mention("dinner with mom after the project", None)], &table);
        assert_eq!(counts[&ContextCategory::Work], 1);
        assert_eq!(counts[&ContextCategory::Family], 1);
        assert_eq!(counts[&ContextCategory::Social], 1);
        assert_eq!(dominant_context(&counts, &table), Some(ContextCategory::Work));

        let none = context_counts(&[mention("nothing to see", None)], &table);
        assert_eq!(dominant_context(&none, &table), None);
    }

    #[test]
    fn snapshot_baseline_overrides_historical_context() {
        let table = ContextTable::default();
        let policy = DriftPolicy::default();
        let recent_ms: Vec<Mention> = (0..5)
            .map(|_| mention("Sam's boss called another meeting", None))
            .collect();
        let historical_ms: Vec<Mention> = (0..9)
            .map(|_| mention("Sam and I had drinks at a party", None))
            .collect();
        let recent = profile_window(&recent_ms, &window(30), &table);
        let historical = profile_window(&historical_ms, &window(90).preceding(90), &table);
        assert_eq!(recent.dominant_context, Some(ContextCategory::Work));
        assert_eq!(historical.dominant_context, Some(ContextCategory::Social));

        let snapshot = MeaningSnapshot {
            id: "snap".into(),
            user_id: "u".into(),
            entity_id: "sam".into(),
            entity_kind: crate::model::EntityKind::Person,
            window_start: Utc::now() - Duration::days(200),
            window_end: None,
            dominant_context: Some(ContextCategory::Personal),
            sentiment_mode: None,
            importance: None,
            mention_frequency: None,
            confidence: 0.8,
            evidence: serde_json::json!({}),
            user_note: None,
        };
        let shifts = detect_shifts(&recent, &historical, Some(&snapshot), &policy);
        assert_eq!(
            shifts.context,
            Some(Shift {
                from: Some(ContextCategory::Personal),
                to: Some(ContextCategory::Work)
            })
        );
        // no sentiment values anywhere: both windows are Neutral
        assert!(shifts.sentiment.is_none());

        let without = detect_shifts(&recent, &historical, None, &policy);
        assert_eq!(
            without.context.and_then(|s| s.from),
            Some(ContextCategory::Social)
        );
    }

    #[test]
    fn importance_needs_relative_change_and_tier_change() {
        let table = ContextTable::default();
        let policy = DriftPolicy::default();
        let five: Vec<Mention> = (0..5).map(|_| mention("x", None)).collect();
        let twelve: Vec<Mention> = (0..12).map(|_| mention("x", None)).collect();
        let nine: Vec<Mention> = (0..9).map(|_| mention("x", None)).collect();

        // 12/mo vs 3/mo: ratio 3.0, High vs Moderate
        let recent = profile_window(&twelve, &window(30), &table);
        let historical = profile_window(&nine, &window(90), &table);
        let shifts = detect_shifts(&recent, &historical, None, &policy);
        assert_eq!(
            shifts.importance,
            Some(Shift {
                from: Some(ImportanceTier::Moderate),
                to: Some(ImportanceTier::High)
            })
        );

        // 5/mo vs 3/mo: ratio 0.67 but both Moderate
        let recent = profile_window(&five, &window(30), &table);
        let shifts = detect_shifts(&recent, &historical, None, &policy);
        assert!(shifts.importance.is_none());
    }
}
