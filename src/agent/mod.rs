//! Control loop
//!
//! Lifecycle state machine and the orchestrator that drives one actor.

pub mod orchestrator;
pub mod state;

// Re-export commonly used types
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorHandle, OrchestratorStatus};
pub use state::{LifecycleEvent, OrchestratorState};
