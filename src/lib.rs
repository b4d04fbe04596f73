//! goalrunner - goal-oriented controller for a game character
//!
//! Drives one character of a remote, cooldown- and rate-limited game world
//! toward progression milestones.
//!
//! # Architecture
//!
//! - **state**: authoritative snapshot, key-value view and durable cache
//! - **planning**: goal selection and plan search
//! - **executor**: cooldown-aware execution, verification, sub-goals
//! - **agent**: the plan-execute loop and its lifecycle

pub mod actions;
pub mod agent;
pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod errors;
pub mod executor;
pub mod planning;
pub mod recovery;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use errors::{BotError, Result};
