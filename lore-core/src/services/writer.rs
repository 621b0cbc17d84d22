//! services/writer.rs
//! Background persistence queue.
//!
//! Scoring stays synchronous and pure; a host that does not want to wait on
//! SQLite submits the resulting writes here instead. A dedicated thread owns
//! its own [`Memory`] and drains a `crossbeam-channel`. Failed writes are
//! logged and counted; `shutdown` drains the queue and reports the totals.

use std::path::Path;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender};

use crate::model::{MeaningSnapshot, MeaningTransition};
use crate::services::memory::Memory;

#[derive(Debug, Clone)]
pub enum WriteOp {
    Transition(MeaningTransition),
    Snapshot(MeaningSnapshot),
    Confirm {
        transition_id: String,
        note: Option<String>,
        at: DateTime<Utc>,
    },
    Entry {
        user_id: String,
        content: String,
        sentiment: Option<f64>,
        at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterReport {
    pub written: u64,
    pub failed: u64,
}

pub struct PersistQueue {
    tx: Option<Sender<WriteOp>>,
    handle: Option<JoinHandle<WriterReport>>,
}

impl PersistQueue {
    /// Open the database up front (so open errors surface here) and start the worker.
    pub fn spawn(db_path: &Path) -> Result<Self> {
        let memory = Memory::open(db_path)?;
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = thread::Builder::new()
            .name("lore-writer".into())
            .spawn(move || drain(memory, rx))?;
        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    /// Enqueue a write. Fails only if the worker is gone.
    pub fn submit(&self, op: WriteOp) -> Result<()> {
        let tx = self.tx.as_ref().ok_or_else(|| anyhow!("persistence queue is closed"))?;
        tx.send(op).map_err(|_| anyhow!("persistence worker has stopped"))
    }

    /// Close the queue, wait for every pending write, and report.
    pub fn shutdown(mut self) -> Result<WriterReport> {
        self.finish()
    }

    fn finish(&mut self) -> Result<WriterReport> {
        drop(self.tx.take());
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| anyhow!("persistence worker panicked")),
            None => Ok(WriterReport::default()),
        }
    }
}

impl Drop for PersistQueue {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            tracing::error!(error = %e, "persistence queue did not shut down cleanly");
        }
    }
}

fn apply(memory: &Memory, op: WriteOp) -> Result<()> {
    match op {
        WriteOp::Transition(t) => memory.insert_transition(&t),
        WriteOp::Snapshot(s) => memory.insert_snapshot(&s),
        WriteOp::Confirm {
            transition_id,
            note,
            at,
        } => memory
            .confirm_transition(&transition_id, note.as_deref(), at)
            .map(|_| ()),
        WriteOp::Entry {
            user_id,
            content,
            sentiment,
            at,
        } => memory.record_entry(&user_id, &content, sentiment, at).map(|_| ()),
    }
}

fn drain(memory: Memory, rx: Receiver<WriteOp>) -> WriterReport {
    let mut report = WriterReport::default();
    for op in rx.iter() {
        match apply(&memory, op) {
            Ok(()) => report.written += 1,
            Err(e) => {
                report.failed += 1;
                tracing::warn!(error = %e, "queued write failed");
            }
        }
    }
    tracing::debug!(written = report.written, failed = report.failed, "persistence worker drained");
    report
}
