//! Orchestrator lifecycle state machine
//!
//! Deterministic transitions:
//! - Stopped → Starting → Running
//! - Running ⇄ Replanning
//! - Starting, Running, Replanning → Stopped on stop

use crate::errors::{BotError, Result};
use serde::{Deserialize, Serialize};

/// Orchestrator lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    /// Not running; initial and final state
    Stopped,

    /// Loading state before the first cycle
    Starting,

    /// Executing the current plan
    Running,

    /// Selecting a goal and planning
    Replanning,
}

/// Events that trigger lifecycle transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    /// Loop requested
    Start,

    /// Initial state loaded, cycles begin
    Started,

    /// No plan, goal satisfied, or an emergency
    ReplanNeeded,

    /// A plan was produced (or the cycle decided to idle)
    PlanReady,

    /// Stop flag observed or start failed
    Stop,
}

impl OrchestratorState {
    /// Attempt a transition, rejecting any edge not in the lifecycle
    pub fn transition(&self, event: LifecycleEvent) -> Result<OrchestratorState> {
        use LifecycleEvent::*;
        use OrchestratorState::*;

        let next = match (self, event) {
            (Stopped, Start) => Starting,
            (Starting, Started) => Running,
            (Running, ReplanNeeded) => Replanning,
            (Replanning, PlanReady) => Running,
            (Starting | Running | Replanning, Stop) => Stopped,
            (from, event) => {
                return Err(BotError::InvalidTransition {
                    from: format!("{:?}", from),
                    to: format!("(via {:?})", event),
                    reason: format!("No valid transition from {:?} on {:?}", from, event),
                });
            }
        };

        Ok(next)
    }

    /// Events accepted from this state
    pub fn valid_events(&self) -> Vec<LifecycleEvent> {
        use LifecycleEvent::*;
        use OrchestratorState::*;

        match self {
            Stopped => vec![Start],
            Starting => vec![Started, Stop],
            Running => vec![ReplanNeeded, Stop],
            Replanning => vec![PlanReady, Stop],
        }
    }

    /// Loop is live in this state
    pub fn is_active(&self) -> bool {
        !matches!(self, OrchestratorState::Stopped)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            OrchestratorState::Stopped => "Stopped",
            OrchestratorState::Starting => "Starting",
            OrchestratorState::Running => "Running",
            OrchestratorState::Replanning => "Replanning",
        }
    }
}
