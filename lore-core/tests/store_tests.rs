use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use lore_core::commands::Commands;
use lore_core::model::{ContextCategory, EntityKind, ImportanceTier, SentimentMode, TransitionKind};
use lore_core::services::{EntityDirectory, JournalSource, Memory, SnapshotSource};
use lore_core::LoreError;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap()
}

fn open_root() -> (TempDir, Commands) {
    let dir = tempfile::tempdir().expect("tempdir");
    let cmds = Commands::open(&dir.path().join("lore")).expect("open commands");
    (dir, cmds)
}

/// Personal/positive/rare a few months ago, work/negative/frequent lately.
fn seed_drifting_entity(cmds: &Commands) -> String {
    let sam = cmds
        .register_entity("u1", EntityKind::Person, "Sam", &["Sammy".to_string()])
        .expect("register");
    for i in 0..6 {
        cmds.record_entry(
            "u1",
            "Journaling alone about Sam, feeling private",
            Some(0.6),
            Some(now() - Duration::days(40 + i * 5)),
        )
        .expect("historical entry");
    }
    for i in 0..12 {
        cmds.record_entry(
            "u1",
            "Sammy's boss called a meeting at the office",
            Some(-0.5),
            Some(now() - Duration::days(1 + i)),
        )
        .expect("recent entry");
    }
    sam
}

#[test]
fn init_creates_root_layout() {
    let (dir, cmds) = open_root();
    let root = dir.path().join("lore");
    assert!(root.join("config.toml").exists());
    assert!(root.join("cache").is_dir());
    assert!(root.join("logbook/actions.jsonl").exists());
    assert_eq!(cmds.config().memory.db_path, root.join("cache/lore.db"));
    assert!(root.join("cache/lore.db").exists());
}

#[test]
fn entities_upsert_and_merge_aliases() {
    let dir = tempfile::tempdir().unwrap();
    let mem = Memory::open(&dir.path().join("lore.db")).expect("mem open");

    let a = mem
        .upsert_entity("u1", EntityKind::Person, "Sam", &["Sammy".into()])
        .unwrap();
    let b = mem
        .upsert_entity("u1", EntityKind::Person, "  sam ", &["SAMMY".into(), "S.".into()])
        .unwrap();
    assert_eq!(a, b);
    assert!(a.starts_with("person_"));

    // same name, other kind or user -> other entity
    let place = mem.upsert_entity("u1", EntityKind::Place, "Sam", &[]).unwrap();
    let other_user = mem.upsert_entity("u2", EntityKind::Person, "Sam", &[]).unwrap();
    assert_ne!(a, place);
    assert_ne!(a, other_user);

    let names = mem
        .entity_names("u1", &a, EntityKind::Person)
        .unwrap()
        .expect("entity exists");
    assert_eq!(names.aliases, vec!["Sammy".to_string(), "S.".to_string()]);
    assert_eq!(mem.find_entity("u1", EntityKind::Person, "SAM").unwrap(), Some(a.clone()));
    assert!(mem.entity_names("u2", &a, EntityKind::Person).unwrap().is_none());
    assert_eq!(mem.list_entities("u1").unwrap().len(), 2);

    assert!(mem.upsert_entity("u1", EntityKind::Person, "   ", &[]).is_err());
}

#[test]
fn journal_windows_are_half_open() {
    let dir = tempfile::tempdir().unwrap();
    let mem = Memory::open(&dir.path().join("lore.db")).unwrap();
    let start = now() - Duration::days(30);

    mem.record_entry("u1", "at start", None, start).unwrap();
    mem.record_entry("u1", "inside", Some(0.2), start + Duration::days(3)).unwrap();
    mem.record_entry("u1", "at end", None, now()).unwrap();
    mem.record_entry("u1", "before", None, start - Duration::milliseconds(1)).unwrap();
    mem.record_entry("u2", "other user", None, start + Duration::days(1)).unwrap();

    let got = mem.entries_between("u1", start, now()).unwrap();
    let contents: Vec<&str> = got.iter().map(|e| e.content.as_str()).collect();
    assert_eq!(contents, vec!["at start", "inside"]);
    assert_eq!(got[1].sentiment, Some(0.2));

    // same (user, time, content) is one entry
    let again = mem.record_entry("u1", "inside", Some(0.9), start + Duration::days(3)).unwrap();
    assert_eq!(again, got[1].entry_id);
    assert_eq!(mem.entries_between("u1", start, now()).unwrap()[1].sentiment, Some(0.9));

    assert!(mem.record_entry("u1", "nan", Some(f64::NAN), now()).is_err());
}

#[test]
fn scan_proposes_then_confirm_opens_snapshot() {
    let (_dir, cmds) = open_root();
    let sam = seed_drifting_entity(&cmds);

    let proposed = cmds
        .scan_entity("u1", &sam, EntityKind::Person, now())
        .unwrap()
        .expect("drift proposed");
    assert_eq!(proposed.kind, TransitionKind::Combination);
    assert!(!proposed.user_confirmed);
    assert_eq!(proposed.from_snapshot_id, None);
    assert_eq!(proposed.confidence, 1.0);

    // proposal writes no snapshot
    assert!(cmds.snapshot_history("u1", &sam).unwrap().is_empty());
    let pending = cmds.pending_transitions("u1").unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, proposed.id);
    let signal = pending[0].signal().unwrap();
    assert_eq!(signal.evidence.recent.mention_count, 12);

    // a pending proposal blocks another one
    assert!(cmds.scan_entity("u1", &sam, EntityKind::Person, now()).unwrap().is_none());

    let confirmed_at = now() + Duration::hours(1);
    let snapshot = cmds
        .confirm_transition(&proposed.id, Some("new job together"), confirmed_at)
        .unwrap();
    assert!(snapshot.is_open());
    assert_eq!(snapshot.window_start, confirmed_at);
    assert_eq!(snapshot.dominant_context, Some(ContextCategory::Work));
    assert_eq!(snapshot.sentiment_mode, Some(SentimentMode::Negative));
    assert_eq!(snapshot.importance, Some(ImportanceTier::High));

    assert!(cmds.pending_transitions("u1").unwrap().is_empty());
    let stored = cmds.memory().transition(&proposed.id).unwrap().unwrap();
    assert!(stored.user_confirmed);
    assert_eq!(stored.confirmed_at, Some(confirmed_at));
    assert_eq!(stored.note.as_deref(), Some("new job together"));
    assert_eq!(stored.to_snapshot_id.as_deref(), Some(snapshot.id.as_str()));

    // the new baseline matches the recent window, so the next scan is quiet
    let later = confirmed_at + Duration::minutes(5);
    assert!(cmds.scan_entity("u1", &sam, EntityKind::Person, later).unwrap().is_none());
    assert!(cmds.scan_user("u1", later).unwrap().is_empty());
}

#[test]
fn confirming_twice_is_an_error() {
    let (_dir, cmds) = open_root();
    let sam = seed_drifting_entity(&cmds);
    let t = cmds
        .scan_entity("u1", &sam, EntityKind::Person, now())
        .unwrap()
        .unwrap();

    cmds.confirm_transition(&t.id, None, now()).unwrap();
    let err = cmds
        .confirm_transition(&t.id, None, now() + Duration::hours(1))
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<LoreError>(),
        Some(LoreError::AlreadyConfirmed(id)) if *id == t.id
    ));
    // the failed confirm left the single snapshot alone
    assert_eq!(cmds.snapshot_history("u1", &sam).unwrap().len(), 1);

    let missing = cmds.confirm_transition("no-such-id", None, now()).unwrap_err();
    assert!(matches!(
        missing.downcast_ref::<LoreError>(),
        Some(LoreError::TransitionNotFound(_))
    ));
}

#[test]
fn at_most_one_open_snapshot_per_entity() {
    let (_dir, cmds) = open_root();
    let sam = seed_drifting_entity(&cmds);
    let signal = cmds
        .detect_drift("u1", &sam, EntityKind::Person, now())
        .expect("signal");

    let first = cmds.propose_transition(&signal).unwrap();
    let second = cmds.propose_transition(&signal).unwrap();
    let t1 = now() + Duration::hours(1);
    let t2 = now() + Duration::hours(2);
    let s1 = cmds.confirm_transition(&first.id, None, t1).unwrap();
    let s2 = cmds.confirm_transition(&second.id, None, t2).unwrap();

    let history = cmds.snapshot_history("u1", &sam).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history.iter().filter(|s| s.is_open()).count(), 1);
    assert_eq!(history[0].id, s1.id);
    assert_eq!(history[0].window_end, Some(t2));
    assert_eq!(history[1].id, s2.id);

    let open = cmds.memory().open_snapshot("u1", &sam).unwrap().unwrap();
    assert_eq!(open.id, s2.id);

    // the second transition now points from the first snapshot to the second
    let stored = cmds.memory().transition(&second.id).unwrap().unwrap();
    assert_eq!(stored.from_snapshot_id.as_deref(), Some(s1.id.as_str()));
    assert_eq!(stored.to_snapshot_id.as_deref(), Some(s2.id.as_str()));
    assert_eq!(cmds.memory().transitions_for_entity("u1", &sam).unwrap().len(), 2);

    assert!(cmds.memory().set_snapshot_note(&s2.id, "moved teams").unwrap());
    assert!(!cmds.memory().set_snapshot_note("no-such-snapshot", "x").unwrap());
    let history = cmds.snapshot_history("u1", &sam).unwrap();
    assert_eq!(history[1].user_note.as_deref(), Some("moved teams"));
}

#[test]
fn quiet_entity_and_disabled_drift_propose_nothing() {
    let (_dir, cmds) = open_root();
    let pat = cmds.register_entity("u1", EntityKind::Person, "Pat", &[]).unwrap();
    for i in 0..5 {
        cmds.record_entry("u1", "Dinner with Pat and friends", Some(0.5), Some(now() - Duration::days(2 + i)))
            .unwrap();
        cmds.record_entry("u1", "Pat threw a party", Some(0.5), Some(now() - Duration::days(40 + i)))
            .unwrap();
    }
    assert!(cmds.detect_drift("u1", &pat, EntityKind::Person, now()).is_none());
    assert!(cmds.scan_user("u1", now()).unwrap().is_empty());

    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("lore");
    lore_core::commands::ensure_initialized_at(&root).unwrap();
    std::fs::write(root.join("config.toml"), "[services]\ndrift_enabled = false\n").unwrap();
    let off = Commands::open(&root).unwrap();
    let sam = seed_drifting_entity(&off);
    assert!(off.detect_drift("u1", &sam, EntityKind::Person, now()).is_none());
}

#[test]
fn logbook_records_proposals() {
    let (dir, cmds) = open_root();
    let sam = seed_drifting_entity(&cmds);
    cmds.scan_entity("u1", &sam, EntityKind::Person, now()).unwrap().unwrap();

    let log = std::fs::read_to_string(dir.path().join("lore/logbook/actions.jsonl")).unwrap();
    let actions: Vec<String> = log
        .lines()
        .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap())
        .filter_map(|v| v["action"].as_str().map(str::to_string))
        .collect();
    assert!(actions.contains(&"entity_registered".to_string()));
    assert!(actions.contains(&"entry_recorded".to_string()));
    assert!(actions.contains(&"transition_proposed".to_string()));
}

#[test]
fn scan_degrades_when_pending_lookup_fails() {
    let (dir, cmds) = open_root();
    let sam = seed_drifting_entity(&cmds);

    let side = rusqlite::Connection::open(dir.path().join("lore/cache/lore.db")).unwrap();
    side.execute_batch("DROP TABLE meaning_transitions;").unwrap();

    assert!(cmds.scan_entity("u1", &sam, EntityKind::Person, now()).unwrap().is_none());
    assert!(cmds.scan_user("u1", now()).unwrap().is_empty());
}

#[test]
fn store_rejects_confirmed_transition_without_timestamp() {
    let (_dir, cmds) = open_root();
    let sam = seed_drifting_entity(&cmds);
    let signal = cmds
        .detect_drift("u1", &sam, EntityKind::Person, now())
        .expect("signal");

    let mut bad = lore_core::model::MeaningTransition::proposed(&signal).unwrap();
    bad.user_confirmed = true;
    let err = cmds.memory().insert_transition(&bad).unwrap_err();
    assert!(matches!(err.downcast_ref::<LoreError>(), Some(LoreError::CorruptRecord(_))));
    assert!(cmds.memory().transition(&bad.id).unwrap().is_none());
}
