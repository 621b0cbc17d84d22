// src/services/memory.rs
//! Single-writer SQLite store for the meaning pipeline.
//!
//! - Owns one SQLite connection (WAL).
//! - Tables: `entities`, `journal_entries`, `meaning_snapshots`, `meaning_transitions`.
//! - Timestamps are RFC3339 UTC with millisecond precision, so text order is time order.
//! - A partial unique index keeps at most one open snapshot per (user, entity).
//! - Read helpers back the fetcher seams; write errors always propagate.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

use crate::error::LoreError;
use crate::model::{EntityKind, MeaningSnapshot, MeaningTransition};
use crate::services::drift::SnapshotSource;
use crate::services::mentions::{EntityDirectory, EntityNames, JournalEntry, JournalSource};

/// Write side of the meaning store.
pub trait MeaningStore: SnapshotSource {
    fn insert_transition(&self, transition: &MeaningTransition) -> Result<()>;

    /// Confirm a proposed transition and materialize its snapshot.
    fn confirm_transition(
        &self,
        transition_id: &str,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<MeaningSnapshot>;
}

/// Memory is the single authority for writing to SQLite.
pub struct Memory {
    pub(crate) db: Connection,
}

pub(crate) fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("bad timestamp {s:?}"))?
        .with_timezone(&Utc))
}

fn parse_opt_ts(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.as_deref().map(parse_ts).transpose()
}

fn parse_label<T: std::str::FromStr<Err = LoreError>>(s: Option<String>) -> Result<Option<T>> {
    Ok(s.as_deref().map(str::parse::<T>).transpose()?)
}

fn short_hash(parts: &[&str]) -> String {
    let hash = blake3::hash(parts.join("\u{1f}").as_bytes());
    hash.to_hex().as_str()[..24].to_string()
}

const SNAPSHOT_COLUMNS: &str = "snapshot_id, user_id, entity_id, entity_kind, window_start, window_end, \
     dominant_context, sentiment_mode, importance, mention_frequency, confidence, evidence_json, user_note";

const TRANSITION_COLUMNS: &str = "transition_id, user_id, entity_id, entity_kind, from_snapshot_id, to_snapshot_id, \
     kind, detected_at, user_confirmed, confirmed_at, note, confidence, evidence_json";

/// Raw column values; converted outside the rusqlite row closure so label and
/// timestamp errors surface as `anyhow` errors.
struct SnapshotRow {
    id: String,
    user_id: String,
    entity_id: String,
    entity_kind: String,
    window_start: String,
    window_end: Option<String>,
    dominant_context: Option<String>,
    sentiment_mode: Option<String>,
    importance: Option<String>,
    mention_frequency: Option<f64>,
    confidence: f64,
    evidence_json: String,
    user_note: Option<String>,
}

impl SnapshotRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            entity_id: row.get(2)?,
            entity_kind: row.get(3)?,
            window_start: row.get(4)?,
            window_end: row.get(5)?,
            dominant_context: row.get(6)?,
            sentiment_mode: row.get(7)?,
            importance: row.get(8)?,
            mention_frequency: row.get(9)?,
            confidence: row.get(10)?,
            evidence_json: row.get(11)?,
            user_note: row.get(12)?,
        })
    }

    fn into_snapshot(self) -> Result<MeaningSnapshot> {
        Ok(MeaningSnapshot {
            id: self.id,
            user_id: self.user_id,
            entity_id: self.entity_id,
            entity_kind: self.entity_kind.parse()?,
            window_start: parse_ts(&self.window_start)?,
            window_end: parse_opt_ts(self.window_end)?,
            dominant_context: parse_label(self.dominant_context)?,
            sentiment_mode: parse_label(self.sentiment_mode)?,
            importance: parse_label(self.importance)?,
            mention_frequency: self.mention_frequency,
            confidence: self.confidence,
            evidence: serde_json::from_str(&self.evidence_json)?,
            user_note: self.user_note,
        })
    }
}

struct TransitionRow {
    id: String,
    user_id: String,
    entity_id: String,
    entity_kind: String,
    from_snapshot_id: Option<String>,
    to_snapshot_id: Option<String>,
    kind: String,
    detected_at: String,
    user_confirmed: bool,
    confirmed_at: Option<String>,
    note: Option<String>,
    confidence: f64,
    evidence_json: String,
}

impl TransitionRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            entity_id: row.get(2)?,
            entity_kind: row.get(3)?,
            from_snapshot_id: row.get(4)?,
            to_snapshot_id: row.get(5)?,
            kind: row.get(6)?,
            detected_at: row.get(7)?,
            user_confirmed: row.get(8)?,
            confirmed_at: row.get(9)?,
            note: row.get(10)?,
            confidence: row.get(11)?,
            evidence_json: row.get(12)?,
        })
    }

    fn into_transition(self) -> Result<MeaningTransition> {
        let transition = MeaningTransition {
            id: self.id,
            user_id: self.user_id,
            entity_id: self.entity_id,
            entity_kind: self.entity_kind.parse()?,
            from_snapshot_id: self.from_snapshot_id,
            to_snapshot_id: self.to_snapshot_id,
            kind: self.kind.parse()?,
            detected_at: parse_ts(&self.detected_at)?,
            user_confirmed: self.user_confirmed,
            confirmed_at: parse_opt_ts(self.confirmed_at)?,
            note: self.note,
            confidence: self.confidence,
            evidence: serde_json::from_str(&self.evidence_json)?,
        };
        transition.validate()?;
        Ok(transition)
    }
}

fn load_open_snapshot(conn: &Connection, user_id: &str, entity_id: &str) -> Result<Option<MeaningSnapshot>> {
    let sql = format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM meaning_snapshots
         WHERE user_id=?1 AND entity_id=?2 AND window_end IS NULL"
    );
    conn.query_row(&sql, params![user_id, entity_id], SnapshotRow::read)
        .optional()?
        .map(SnapshotRow::into_snapshot)
        .transpose()
}

fn load_transition(conn: &Connection, transition_id: &str) -> Result<Option<MeaningTransition>> {
    let sql = format!("SELECT {TRANSITION_COLUMNS} FROM meaning_transitions WHERE transition_id=?1");
    conn.query_row(&sql, [transition_id], TransitionRow::read)
        .optional()?
        .map(TransitionRow::into_transition)
        .transpose()
}

fn write_snapshot(conn: &Connection, s: &MeaningSnapshot) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO meaning_snapshots ({SNAPSHOT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
        ),
        params![
            s.id,
            s.user_id,
            s.entity_id,
            s.entity_kind.as_str(),
            ts(s.window_start),
            s.window_end.map(ts),
            s.dominant_context.map(|c| c.as_str()),
            s.sentiment_mode.map(|m| m.as_str()),
            s.importance.map(|i| i.as_str()),
            s.mention_frequency,
            s.confidence,
            serde_json::to_string(&s.evidence)?,
            s.user_note,
        ],
    )
    .with_context(|| format!("insert snapshot {}", s.id))?;
    Ok(())
}

impl Memory {
    /// Open/create the SQLite DB and ensure schema.
    ///
    /// Behavior:
    /// - Creates the parent directory if missing.
    /// - Opens SQLite and enables WAL (good for 1 writer + many readers).
    /// - Creates tables and indexes if they don't exist.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Connection::open(db_path)
            .with_context(|| format!("open sqlite at {:?}", db_path))?;

        db.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS entities (
              entity_id     TEXT PRIMARY KEY,
              user_id       TEXT NOT NULL,
              kind          TEXT NOT NULL,
              name          TEXT NOT NULL,
              name_key      TEXT NOT NULL,     -- trimmed + lowercased name
              aliases_json  TEXT NOT NULL DEFAULT '[]',
              created_at    TEXT NOT NULL,
              updated_at    TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_entities_user_name ON entities(user_id, kind, name_key);

            CREATE TABLE IF NOT EXISTS journal_entries (
              entry_id      TEXT PRIMARY KEY,
              user_id       TEXT NOT NULL,
              content       TEXT NOT NULL,
              sentiment     REAL,              -- -1..1, NULL when unscored
              created_at    TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_journal_user_time ON journal_entries(user_id, created_at);

            CREATE TABLE IF NOT EXISTS meaning_snapshots (
              snapshot_id       TEXT PRIMARY KEY,
              user_id           TEXT NOT NULL,
              entity_id         TEXT NOT NULL,
              entity_kind       TEXT NOT NULL,
              window_start      TEXT NOT NULL,
              window_end        TEXT,          -- NULL = currently open
              dominant_context  TEXT,
              sentiment_mode    TEXT,
              importance        TEXT,
              mention_frequency REAL,
              confidence        REAL NOT NULL,
              evidence_json     TEXT NOT NULL,
              user_note         TEXT
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_snapshot_one_open
              ON meaning_snapshots(user_id, entity_id) WHERE window_end IS NULL;

            CREATE TABLE IF NOT EXISTS meaning_transitions (
              transition_id     TEXT PRIMARY KEY,
              user_id           TEXT NOT NULL,
              entity_id         TEXT NOT NULL,
              entity_kind       TEXT NOT NULL,
              from_snapshot_id  TEXT,
              to_snapshot_id    TEXT,
              kind              TEXT NOT NULL,
              detected_at       TEXT NOT NULL,
              user_confirmed    INTEGER NOT NULL DEFAULT 0,
              confirmed_at      TEXT,
              note              TEXT,
              confidence        REAL NOT NULL,
              evidence_json     TEXT NOT NULL,
              CHECK (user_confirmed = 0 OR confirmed_at IS NOT NULL)
            );
            CREATE INDEX IF NOT EXISTS idx_transitions_user_entity ON meaning_transitions(user_id, entity_id);
            "#,
        )?;

        Ok(Self { db })
    }

    // ---------- entities ----------

    /// Create or update an entity keyed by (user, kind, normalized name).
    /// Aliases are merged case-insensitively with the stored ones. Returns the entity id.
    pub fn upsert_entity(&self, user_id: &str, kind: EntityKind, name: &str, aliases: &[String]) -> Result<String> {
        let name = name.trim();
        let name_key = name.to_lowercase();
        anyhow::ensure!(!name_key.is_empty(), "entity name must not be empty");
        let entity_id = format!("{}_{}", kind.as_str(), short_hash(&[user_id, kind.as_str(), name_key.as_str()]));

        let stored: Option<String> = self
            .db
            .query_row(
                "SELECT aliases_json FROM entities WHERE entity_id=?1",
                [&entity_id],
                |row| row.get(0),
            )
            .optional()?;
        let mut merged: Vec<String> = match stored {
            Some(json) => serde_json::from_str(&json)
                .with_context(|| format!("aliases of entity {entity_id}"))?,
            None => Vec::new(),
        };
        for alias in aliases.iter().map(|a| a.trim()).filter(|a| !a.is_empty()) {
            if !merged.iter().any(|m| m.eq_ignore_ascii_case(alias)) {
                merged.push(alias.to_string());
            }
        }

        let now = ts(Utc::now());
        self.db.execute(
            r#"
            INSERT INTO entities(entity_id, user_id, kind, name, name_key, aliases_json, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            ON CONFLICT(entity_id) DO UPDATE SET
              name         = excluded.name,
              aliases_json = excluded.aliases_json,
              updated_at   = excluded.updated_at
            "#,
            params![entity_id, user_id, kind.as_str(), name, name_key, serde_json::to_string(&merged)?, now],
        )?;
        Ok(entity_id)
    }

    /// Entity id for a display name, if that entity exists.
    pub fn find_entity(&self, user_id: &str, kind: EntityKind, name: &str) -> Result<Option<String>> {
        Ok(self
            .db
            .query_row(
                "SELECT entity_id FROM entities WHERE user_id=?1 AND kind=?2 AND name_key=?3",
                params![user_id, kind.as_str(), name.trim().to_lowercase()],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// All entities of a user, by name.
    pub fn list_entities(&self, user_id: &str) -> Result<Vec<EntityNames>> {
        let mut stmt = self.db.prepare(
            "SELECT entity_id, kind, name, aliases_json FROM entities WHERE user_id=?1 ORDER BY name_key",
        )?;
        let rows = stmt.query_map([user_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (entity_id, kind, name, aliases_json) = row?;
            out.push(EntityNames {
                entity_id,
                kind: kind.parse()?,
                name,
                aliases: serde_json::from_str(&aliases_json)?,
            });
        }
        Ok(out)
    }

    // ---------- journal ----------

    /// Upsert a journal entry. The id is derived from (user, time, content),
    /// so recording the same entry twice only refreshes its sentiment.
    pub fn record_entry(
        &self,
        user_id: &str,
        content: &str,
        sentiment: Option<f64>,
        at: DateTime<Utc>,
    ) -> Result<String> {
        if let Some(s) = sentiment {
            anyhow::ensure!(s.is_finite(), "sentiment must be a finite number");
        }
        let at = ts(at);
        let entry_id = format!("entry_{}", short_hash(&[user_id, at.as_str(), content]));
        self.db.execute(
            r#"
            INSERT INTO journal_entries(entry_id, user_id, content, sentiment, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(entry_id) DO UPDATE SET sentiment = excluded.sentiment
            "#,
            params![entry_id, user_id, content, sentiment, at],
        )?;
        Ok(entry_id)
    }

    // ---------- snapshots ----------

    /// Insert a snapshot as-is. Fails if it is open and the entity already has an open one.
    pub fn insert_snapshot(&self, snapshot: &MeaningSnapshot) -> Result<()> {
        write_snapshot(&self.db, snapshot)
    }

    /// Snapshot history, oldest first.
    pub fn snapshots_for_entity(&self, user_id: &str, entity_id: &str) -> Result<Vec<MeaningSnapshot>> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM meaning_snapshots
             WHERE user_id=?1 AND entity_id=?2 ORDER BY window_start ASC"
        );
        let mut stmt = self.db.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id, entity_id], SnapshotRow::read)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_snapshot()?);
        }
        Ok(out)
    }

    pub fn set_snapshot_note(&self, snapshot_id: &str, note: &str) -> Result<bool> {
        let n = self.db.execute(
            "UPDATE meaning_snapshots SET user_note=?1 WHERE snapshot_id=?2",
            params![note, snapshot_id],
        )?;
        Ok(n > 0)
    }

    // ---------- transitions ----------

    pub fn insert_transition(&self, transition: &MeaningTransition) -> Result<()> {
        transition.validate()?;
        let t = transition;
        self.db
            .execute(
                &format!(
                    "INSERT INTO meaning_transitions ({TRANSITION_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
                ),
                params![
                    t.id,
                    t.user_id,
                    t.entity_id,
                    t.entity_kind.as_str(),
                    t.from_snapshot_id,
                    t.to_snapshot_id,
                    t.kind.as_str(),
                    ts(t.detected_at),
                    t.user_confirmed,
                    t.confirmed_at.map(ts),
                    t.note,
                    t.confidence,
                    serde_json::to_string(&t.evidence)?,
                ],
            )
            .with_context(|| format!("insert transition {}", t.id))?;
        Ok(())
    }

    pub fn transition(&self, transition_id: &str) -> Result<Option<MeaningTransition>> {
        load_transition(&self.db, transition_id)
    }

    fn query_transitions(&self, where_clause: &str, args: &[&str]) -> Result<Vec<MeaningTransition>> {
        let sql = format!(
            "SELECT {TRANSITION_COLUMNS} FROM meaning_transitions WHERE {where_clause} ORDER BY detected_at ASC"
        );
        let mut stmt = self.db.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), TransitionRow::read)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.into_transition()?);
        }
        Ok(out)
    }

    /// Unconfirmed transitions of a user, oldest first.
    pub fn pending_transitions(&self, user_id: &str) -> Result<Vec<MeaningTransition>> {
        self.query_transitions("user_id=?1 AND user_confirmed=0", &[user_id])
    }

    pub fn transitions_for_entity(&self, user_id: &str, entity_id: &str) -> Result<Vec<MeaningTransition>> {
        self.query_transitions("user_id=?1 AND entity_id=?2", &[user_id, entity_id])
    }

    pub fn has_pending_transition(&self, user_id: &str, entity_id: &str) -> Result<bool> {
        let n: i64 = self.db.query_row(
            "SELECT COUNT(*) FROM meaning_transitions WHERE user_id=?1 AND entity_id=?2 AND user_confirmed=0",
            params![user_id, entity_id],
            |row| row.get(0),
        )?;
        Ok(n > 0)
    }

    /// One transaction: mark the transition confirmed, close the open snapshot
    /// (if any) at `now`, open a new snapshot from the transition's recent
    /// window, and link both snapshot ids onto the transition.
    pub fn confirm_transition(
        &self,
        transition_id: &str,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<MeaningSnapshot> {
        let tx = self.db.unchecked_transaction()?;

        let mut transition = load_transition(&tx, transition_id)?
            .ok_or_else(|| LoreError::TransitionNotFound(transition_id.to_string()))?;
        transition.confirm(now, note.map(str::to_string))?;
        let signal = transition.signal()?;

        let previous = load_open_snapshot(&tx, &transition.user_id, &transition.entity_id)?;
        if let Some(prev) = &previous {
            tx.execute(
                "UPDATE meaning_snapshots SET window_end=?1 WHERE snapshot_id=?2",
                params![ts(now), prev.id],
            )?;
        }

        let snapshot = MeaningSnapshot::from_signal(&signal, now, None)?;
        write_snapshot(&tx, &snapshot)?;

        let from_snapshot = previous.map(|p| p.id).or(transition.from_snapshot_id.clone());
        tx.execute(
            "UPDATE meaning_transitions
             SET user_confirmed=1, confirmed_at=?1, note=?2, from_snapshot_id=?3, to_snapshot_id=?4
             WHERE transition_id=?5",
            params![
                ts(now),
                transition.note,
                from_snapshot,
                snapshot.id,
                transition.id
            ],
        )?;
        tx.commit()?;
        Ok(snapshot)
    }
}

impl SnapshotSource for Memory {
    fn open_snapshot(&self, user_id: &str, entity_id: &str) -> Result<Option<MeaningSnapshot>> {
        load_open_snapshot(&self.db, user_id, entity_id)
    }
}

impl MeaningStore for Memory {
    fn insert_transition(&self, transition: &MeaningTransition) -> Result<()> {
        Memory::insert_transition(self, transition)
    }

    fn confirm_transition(
        &self,
        transition_id: &str,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<MeaningSnapshot> {
        Memory::confirm_transition(self, transition_id, note, now)
    }
}

impl EntityDirectory for Memory {
    fn entity_names(&self, user_id: &str, entity_id: &str, _kind: EntityKind) -> Result<Option<EntityNames>> {
        let row: Option<(String, String, String)> = self
            .db
            .query_row(
                "SELECT kind, name, aliases_json FROM entities WHERE user_id=?1 AND entity_id=?2",
                params![user_id, entity_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        row.map(|(kind, name, aliases_json)| {
            Ok(EntityNames {
                entity_id: entity_id.to_string(),
                kind: kind.parse()?,
                name,
                aliases: serde_json::from_str(&aliases_json)?,
            })
        })
        .transpose()
    }
}

impl JournalSource for Memory {
    fn entries_between(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<JournalEntry>> {
        let mut stmt = self.db.prepare(
            "SELECT entry_id, content, sentiment, created_at FROM journal_entries
             WHERE user_id=?1 AND created_at >= ?2 AND created_at < ?3
             ORDER BY created_at ASC",
        )?;
        let rows = stmt.query_map(params![user_id, ts(start), ts(end)], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<f64>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (entry_id, content, sentiment, created_at) = row?;
            out.push(JournalEntry {
                entry_id,
                user_id: user_id.to_string(),
                content,
                sentiment,
                created_at: parse_ts(&created_at)?,
            });
        }
        Ok(out)
    }
}
