//! Lore-Core: how the people and places in a journal are perceived over time,
//! and how replies are shaped for the person reading them.
//!
//! - `services::mentions` / `services::signals` / `services::drift`: meaning-drift detection.
//! - `services::shaping` / `services::transform`: tone-driven response shaping.
//! - `services::memory`: the SQLite store behind both.
//! - `commands`: the facade a host chat layer calls into.

pub mod commands;
pub mod config;
pub mod error;
pub mod model;
pub mod services;

pub use error::LoreError;
