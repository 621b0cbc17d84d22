//! services/audit.rs
//! Append-only action logbook (`logbook/actions.jsonl`).
//!
//! Writes are best effort: a logbook failure is reported through `tracing`
//! and never fails the operation being recorded.

use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::CoreConfig;

#[derive(Debug, Clone)]
pub struct Logbook {
    actions: PathBuf,
    enabled: bool,
    preview_len: usize,
}

impl Logbook {
    pub fn from_config(cfg: &CoreConfig) -> Self {
        Self {
            actions: cfg.logbook.actions.clone(),
            enabled: cfg.services.audit_enabled,
            preview_len: cfg.logbook.preview_len,
        }
    }

    pub fn path(&self) -> &Path {
        &self.actions
    }

    /// Record a generic action event.
    ///
    /// # Arguments
    /// * `agent`: Logical component name (e.g., `"drift"`, `"commands"`).
    /// * `action`: Short verb label (e.g., `"transition_proposed"`).
    /// * `details`: Arbitrary JSON payload (ids, scores, etc.).
    /// * `severity`: `"low" | "medium" | "high"`, for quick triage.
    pub fn record_action(&self, agent: &str, action: &str, details: &Value, severity: &str) {
        if !self.enabled {
            return;
        }
        let entry = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "event": "action",
            "agent": agent,
            "action": action,
            "severity": severity,
            "details": details
        });
        append_jsonl(&self.actions, &entry);
    }

    /// Single-line preview of user text: newlines removed, truncated on a char
    /// boundary to the configured length with an ellipsis.
    pub fn preview(&self, s: &str) -> String {
        let flat = s.replace('\n', " ");
        if flat.chars().count() <= self.preview_len {
            return flat;
        }
        let mut t: String = flat.chars().take(self.preview_len).collect();
        t.push('…');
        t
    }
}

/// Append a single JSON value as a line to a JSONL file, creating parents as needed.
fn append_jsonl<S: Serialize>(path: &Path, val: &S) {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let line = match serde_json::to_string(val) {
        Ok(line) => line,
        Err(e) => {
            tracing::warn!(error = %e, "logbook entry not serializable");
            return;
        }
    };
    let written = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut f| writeln!(f, "{line}"));
    if let Err(e) = written {
        tracing::warn!(path = %path.display(), error = %e, "logbook append failed");
    }
}
