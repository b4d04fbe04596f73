//! Action execution
//!
//! Cooldown waits, bounded retries, effect verification, emergency recovery
//! and recursive sub-goal expansion for one actor.

pub mod action_executor;
pub mod cooldown;
pub mod retry;
pub mod subgoals;

pub use action_executor::{verify_effects, ActionExecutor, ExecutorConfig, SubGoalExecutionResult};
pub use cooldown::{CooldownRecord, CooldownTracker, RateLimitWindow};
pub use retry::RetryPolicy;
