//! Error types for goalrunner
//!
//! Action-level faults that callers are expected to inspect travel as
//! `ActionResult` values. Everything in this module is raised instead, with
//! enough context for the nearest caller to decide between abort and recover.

use crate::api::ApiError;
use thiserror::Error;

/// Main error type for the controller
#[derive(Error, Debug)]
pub enum BotError {
    /// Remote world API errors that were not turned into an action result
    #[error("World API error: {0}")]
    Api(#[from] ApiError),

    /// Sub-goal recursion went deeper than allowed
    #[error("Sub-goal recursion depth {depth} exceeds maximum {max_depth}")]
    MaxDepthExceeded { depth: usize, max_depth: usize },

    /// State moved in a way a single nested plan cannot explain
    #[error("State consistency violation at depth {depth}: {reason}")]
    StateConsistency { depth: usize, reason: String },

    /// A nested goal needs a cached snapshot and none exists yet
    #[error("No cached world state available for {0}")]
    NoCachedState(String),

    /// Network-class failure while expanding a sub-goal
    #[error("Sub-goal {goal_type} for action '{parent_action}' failed at depth {depth}: {source}")]
    SubGoalFailed {
        parent_action: String,
        goal_type: String,
        depth: usize,
        #[source]
        source: Box<BotError>,
    },

    /// Recoverable planning errors (unknown goal, unreachable target, ...)
    #[error("Planning error: {0}")]
    Planning(String),

    /// Action name not produced by the catalog
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// Orchestrator lifecycle transition errors
    #[error("Invalid state transition from {from:?} to {to:?}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic errors with context
    #[error("Controller error: {0}")]
    Generic(String),
}

impl BotError {
    /// Errors that must propagate out of sub-goal expansion instead of being
    /// logged and skipped.
    pub fn is_network_class(&self) -> bool {
        match self {
            BotError::Api(e) => e.is_network_class(),
            BotError::SubGoalFailed { .. } => true,
            _ => false,
        }
    }

    /// Errors that end a sub-goal chain regardless of where they occur
    pub fn is_fatal_for_chain(&self) -> bool {
        matches!(
            self,
            BotError::MaxDepthExceeded { .. } | BotError::StateConsistency { .. }
        )
    }
}

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, BotError>;

/// Convert anyhow errors to BotError
impl From<anyhow::Error> for BotError {
    fn from(err: anyhow::Error) -> Self {
        BotError::Generic(err.to_string())
    }
}
