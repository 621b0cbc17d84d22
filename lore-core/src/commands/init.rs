// lore-core/src/commands/init.rs

use anyhow::{Context, Result};
use chrono::Utc;
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct InitReport {
    pub root: PathBuf,
    pub config: PathBuf,
    pub created: Vec<String>,
    pub existed: Vec<String>,
}

static INIT: OnceCell<InitReport> = OnceCell::new();

/// Process-wide initializer for the root named by `LORE_ROOT`.
/// Runs the layout check once; later calls return the first report.
pub fn ensure_initialized_once() -> Result<&'static InitReport> {
    INIT.get_or_try_init(|| ensure_initialized_at(&lore_root()))
}

/// `LORE_ROOT`, or `.lorekeeper` in the working directory.
pub fn lore_root() -> PathBuf {
    std::env::var_os("LORE_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".lorekeeper"))
}

/// Create the root layout under `root` if missing. Idempotent; existing
/// files are never overwritten.
pub fn ensure_initialized_at(root: &Path) -> Result<InitReport> {
    let mut created = Vec::new();
    let mut existed = Vec::new();

    ensure_dir(root, "", &mut created, &mut existed)?;
    ensure_dir(root, "cache", &mut created, &mut existed)?;
    ensure_dir(root, "logbook", &mut created, &mut existed)?;

    ensure_file(root, "config.toml", DEFAULT_CONFIG_TOML, &mut created, &mut existed)?;

    let init_event = serde_json::json!({
        "timestamp": Utc::now().to_rfc3339(),
        "event": "system_init",
        "agent": "system",
        "details": { "version": env!("CARGO_PKG_VERSION") }
    })
    .to_string();
    ensure_seeded_jsonl(&root.join("logbook"), "actions.jsonl", &init_event, &mut created, &mut existed)?;

    tracing::debug!(root = %root.display(), created = created.len(), "root initialized");
    Ok(InitReport {
        root: root.to_path_buf(),
        config: root.join("config.toml"),
        created,
        existed,
    })
}

fn ensure_dir(base: &Path, rel: &str, created: &mut Vec<String>, existed: &mut Vec<String>) -> Result<()> {
    let p = if rel.is_empty() { base.to_path_buf() } else { base.join(rel) };
    let label = if rel.is_empty() { ".".to_string() } else { rel.to_string() };
    if p.exists() {
        existed.push(label);
        return Ok(());
    }
    fs::create_dir_all(&p).with_context(|| format!("create_dir_all({:?})", p))?;
    created.push(label);
    Ok(())
}

fn ensure_file(
    base: &Path,
    rel_file: &str,
    content_if_absent: &str,
    created: &mut Vec<String>,
    existed: &mut Vec<String>,
) -> Result<()> {
    let p = base.join(rel_file);
    if p.exists() {
        existed.push(rel_file.to_string());
        return Ok(());
    }
    write_atomic(&p, content_if_absent.as_bytes())?;
    created.push(rel_file.to_string());
    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create_dir_all({:?})", parent))?;
    }
    let tmp = path.with_extension("tmp");
    {
        let mut f = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp)
            .with_context(|| format!("open temp file {:?}", tmp))?;
        f.write_all(bytes)?;
        f.flush()?;
    }
    fs::rename(&tmp, path).with_context(|| format!("rename {:?} -> {:?}", tmp, path))?;
    Ok(())
}

/// Seed an absent or empty JSONL file with one line.
fn ensure_seeded_jsonl(
    dir: &Path,
    file: &str,
    init_line: &str,
    created: &mut Vec<String>,
    existed: &mut Vec<String>,
) -> Result<()> {
    let rel = format!("logbook/{file}");
    let p = dir.join(file);
    if !p.exists() {
        write_atomic(&p, format!("{init_line}\n").as_bytes())?;
        created.push(rel);
        return Ok(());
    }
    existed.push(rel);
    if fs::metadata(&p)?.len() == 0 {
        let mut f = OpenOptions::new().append(true).open(&p)?;
        writeln!(f, "{init_line}")?;
    }
    Ok(())
}

// Every key here matches the built-in default; the file exists to be edited.
const DEFAULT_CONFIG_TOML: &str = r#"[system]
name = "lorekeeper"
version = "0.1.0"

[memory]
db_path = "cache/lore.db"

[logbook]
path = "logbook"
actions = "logbook/actions.jsonl"
preview_len = 160

[services]
audit_enabled = true
drift_enabled = true

[cache]
entity_capacity = 1000

[drift]
threshold = 0.65
min_mentions = 3
recent_window_days = 30
historical_window_days = 90
importance_change_ratio = 0.5

[drift.weights]
context = 0.4
sentiment = 0.3
importance = 0.3
multi_signal_bonus = 1.2

[shaping]
supportive = ["validate_emotion", "no_advice", "gentle_questions_optional"]
social_focus = ["people_centered", "no_inference"]
factual = ["neutral_language", "no_inference", "no_extra_insight"]
analytical = ["structured", "explain_reasoning"]
strategic = ["action_oriented", "prioritize"]
minimal = ["short_response", "no_extra_insight"]

# Keyword table; order breaks ties between categories.
# Omit every [[context]] block to use the built-in table.
"#;
