use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lore_core::commands::{ensure_initialized_at, Commands};
use lore_core::model::{EmotionalDistance, EntityKind, ToneProfile, Verbosity};

#[derive(Parser)]
#[command(
    name = "lore-admin",
    about = "Admin helpers for a Lore Keeper root: entities, journal, drift review"
)]
struct Cli {
    /// Root directory (defaults to $LORE_ROOT, then .lorekeeper)
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Create the root layout and default config
    Init,
    /// Create or update an entity
    EntityAdd {
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "person")]
        kind: EntityKind,
        #[arg(long)]
        name: String,
        #[arg(long = "alias")]
        aliases: Vec<String>,
    },
    /// List a user's entities
    Entities {
        #[arg(long)]
        user: String,
    },
    /// Record a journal entry
    JournalAdd {
        #[arg(long)]
        user: String,
        #[arg(long)]
        text: String,
        #[arg(long, allow_hyphen_values = true)]
        sentiment: Option<f64>,
        /// RFC3339 timestamp; defaults to now
        #[arg(long)]
        at: Option<String>,
    },
    /// Detect drift and propose transitions (one entity, or all of them)
    Scan {
        #[arg(long)]
        user: String,
        #[arg(long)]
        entity: Option<String>,
    },
    /// Unconfirmed transitions for a user
    Pending {
        #[arg(long)]
        user: String,
    },
    /// Confirm a proposed transition
    Confirm {
        #[arg(long)]
        id: String,
        #[arg(long)]
        note: Option<String>,
    },
    /// Snapshot history for an entity
    History {
        #[arg(long)]
        user: String,
        #[arg(long)]
        entity: String,
    },
    /// Apply tone + mode directives to a reply
    Shape {
        #[arg(long)]
        text: String,
        #[arg(long, default_value = "supportive")]
        mode: String,
        #[arg(long, default_value = "medium")]
        verbosity: Verbosity,
        #[arg(long, default_value = "neutral")]
        distance: EmotionalDistance,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let root = cli.root.unwrap_or_else(lore_core::commands::init::lore_root);
    match cli.cmd {
        Cmd::Init => print_json(&ensure_initialized_at(&root)?),
        cmd => {
            let cmds = Commands::open(&root).with_context(|| format!("open lore root {}", root.display()))?;
            run(&cmds, cmd)
        }
    }
}

fn run(cmds: &Commands, cmd: Cmd) -> Result<()> {
    match cmd {
        // handled before the store is opened
        Cmd::Init => Ok(()),
        Cmd::EntityAdd {
            user,
            kind,
            name,
            aliases,
        } => {
            let id = cmds.register_entity(&user, kind, &name, &aliases)?;
            print_json(&serde_json::json!({ "entity_id": id }))
        }
        Cmd::Entities { user } => print_json(&cmds.entities(&user)?),
        Cmd::JournalAdd {
            user,
            text,
            sentiment,
            at,
        } => {
            let at = at.as_deref().map(parse_time).transpose()?;
            let id = cmds.record_entry(&user, &text, sentiment, at)?;
            print_json(&serde_json::json!({ "entry_id": id }))
        }
        Cmd::Scan { user, entity } => {
            let now = Utc::now();
            let proposed = match entity {
                Some(entity_id) => {
                    let entity = cmds
                        .entities(&user)?
                        .into_iter()
                        .find(|e| e.entity_id == entity_id)
                        .with_context(|| format!("unknown entity {entity_id}"))?;
                    cmds.scan_entity(&user, &entity.entity_id, entity.kind, now)?
                        .into_iter()
                        .collect()
                }
                None => cmds.scan_user(&user, now)?,
            };
            tracing::info!(user = %user, proposed = proposed.len(), "scan finished");
            print_json(&proposed)
        }
        Cmd::Pending { user } => print_json(&cmds.pending_transitions(&user)?),
        Cmd::Confirm { id, note } => {
            let snapshot = cmds.confirm_transition(&id, note.as_deref(), Utc::now())?;
            tracing::info!(transition_id = %id, snapshot_id = %snapshot.id, "confirmed from admin");
            print_json(&snapshot)
        }
        Cmd::History { user, entity } => print_json(&cmds.snapshot_history(&user, &entity)?),
        Cmd::Shape {
            text,
            mode,
            verbosity,
            distance,
        } => {
            let profile = ToneProfile {
                verbosity,
                emotional_distance: distance,
                ..ToneProfile::default()
            };
            print_json(&serde_json::json!({
                "directives": cmds.directives(&profile, &mode),
                "text": cmds.shape_response_for_label(&text, &profile, &mode),
            }))
        }
    }
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("bad --at timestamp {s:?}"))?
        .with_timezone(&Utc))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
