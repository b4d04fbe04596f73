//! Goal selection and plan search
//!
//! The goal manager picks what to pursue and hands a solver the action set
//! that is eligible under the current cooldown; the solver returns an
//! ordered plan or nothing.

pub mod goal;
pub mod manager;
pub mod plan;
pub mod solver;

// Re-export commonly used types
pub use goal::{Goal, GoalCategory, GoalType, MAX_PRIORITY, MIN_PRIORITY};
pub use manager::{CooldownPolicy, GoalConfig, GoalManager};
pub use plan::Plan;
pub use solver::{BestFirstSolver, Change, Requirement, Solver, SolverAction, SolverState};
