//! services/mentions.rs
//! Mention window fetcher: journal entries that name an entity within a time range.
//!
//! - Names and aliases come from an [`EntityDirectory`]; entries from a [`JournalSource`].
//! - Matching is a case-insensitive substring test against any name or alias.
//!   No tokenization: "Al" also matches "Albert" and "always".
//! - Never fails. Lookup errors are logged and produce an empty list, which the
//!   drift scorer reads as "no signal".

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{EntityKind, Mention};

/// Canonical display name plus aliases for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityNames {
    pub entity_id: String,
    pub kind: EntityKind,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl EntityNames {
    /// Lowercased, non-empty name and aliases.
    pub fn needles(&self) -> Vec<String> {
        std::iter::once(&self.name)
            .chain(self.aliases.iter())
            .map(|n| n.trim().to_lowercase())
            .filter(|n| !n.is_empty())
            .collect()
    }
}

pub trait EntityDirectory {
    fn entity_names(
        &self,
        user_id: &str,
        entity_id: &str,
        kind: EntityKind,
    ) -> Result<Option<EntityNames>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub entry_id: String,
    pub user_id: String,
    pub content: String,
    pub sentiment: Option<f64>,
    pub created_at: DateTime<Utc>,
}

pub trait JournalSource {
    /// Entries with `start <= created_at < end`, oldest first.
    fn entries_between(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<JournalEntry>>;
}

/// Half-open `[start, end)` range. `days` is the nominal length used to
/// normalize mention counts, even when explicit bounds were supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub days: u32,
}

impl MentionWindow {
    /// `end` defaults to `now`, `start` to `end - days`.
    pub fn resolve(
        days: u32,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let end = end.unwrap_or(now);
        let start = start.unwrap_or_else(|| end - Duration::days(i64::from(days)));
        Self { start, end, days }
    }

    pub fn trailing(days: u32, end: DateTime<Utc>) -> Self {
        Self::resolve(days, None, Some(end), end)
    }

    /// Window of `days` that ends where this one starts.
    pub fn preceding(&self, days: u32) -> Self {
        Self::trailing(days, self.start)
    }
}

/// Ordered (oldest first) mentions of an entity inside `window`.
pub fn mentions_in_window(
    directory: &dyn EntityDirectory,
    journal: &dyn JournalSource,
    user_id: &str,
    entity_id: &str,
    kind: EntityKind,
    window: &MentionWindow,
) -> Vec<Mention> {
    let names = match directory.entity_names(user_id, entity_id, kind) {
        Ok(Some(names)) => names,
        Ok(None) => {
            tracing::debug!(entity_id, "entity not in directory; no mentions");
            return Vec::new();
        }
        Err(e) => {
            tracing::warn!(entity_id, error = %e, "entity lookup failed; treating as no mentions");
            return Vec::new();
        }
    };
    let needles = names.needles();
    if needles.is_empty() {
        return Vec::new();
    }

    let entries = match journal.entries_between(user_id, window.start, window.end) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(entity_id, error = %e, "journal query failed; treating as no mentions");
            return Vec::new();
        }
    };

    let mut mentions: Vec<Mention> = entries
        .into_iter()
        .filter(|entry| {
            let haystack = entry.content.to_lowercase();
            needles.iter().any(|n| haystack.contains(n.as_str()))
        })
        .map(|entry| Mention {
            entry_id: entry.entry_id,
            content: entry.content,
            timestamp: entry.created_at,
            sentiment: entry.sentiment,
        })
        .collect();
    mentions.sort_by_key(|m| m.timestamp);
    mentions
}
