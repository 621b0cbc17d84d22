// src/services/mod.rs

pub mod audit;          // JSONL action logbook
pub mod drift;          // drift scorer + detect_meaning_drift
pub mod entity_cache;   // FIFO-bounded entity resolution cache
pub mod memory;         // the ONLY SQLite writer
pub mod mentions;       // mention window fetcher (fails soft)
pub mod shaping;        // tone profile + mode -> directives
pub mod signals;        // pure per-window statistics and shift detection
pub mod transform;      // directive -> text passes
pub mod writer;         // background persistence queue

// Public API
pub use audit::Logbook;
pub use drift::{passes_gate, propose_transition, signal_strength, DriftDetector, SnapshotSource};
pub use entity_cache::{CachedDirectory, EntityCache, EntityResolver};
pub use memory::{MeaningStore, Memory};
pub use mentions::{EntityDirectory, EntityNames, JournalEntry, JournalSource, MentionWindow};
pub use shaping::{select_modifiers, select_modifiers_for_label, shape_response, shape_response_for_label};
pub use transform::apply_modifiers;
pub use writer::{PersistQueue, WriteOp, WriterReport};
