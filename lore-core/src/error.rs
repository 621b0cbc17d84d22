use thiserror::Error;

/// Typed domain failures. Services return `anyhow::Result` and wrap these,
/// so callers can `downcast_ref::<LoreError>()` when they need to branch.
#[derive(Debug, Error)]
pub enum LoreError {
    #[error("unknown {kind} label: {value:?}")]
    UnknownLabel { kind: &'static str, value: String },

    #[error("meaning transition {0} not found")]
    TransitionNotFound(String),

    #[error("meaning transition {0} is already confirmed")]
    AlreadyConfirmed(String),

    #[error("corrupt record: {0}")]
    CorruptRecord(String),
}
