// lore-core/src/commands/mod.rs
pub mod api;
pub mod init;

pub use api::Commands;
pub use init::{ensure_initialized_at, ensure_initialized_once, InitReport};
