//! Immutable context for constructing nested goals

use crate::api::GameData;
use crate::state::world::WorldState;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Everything a goal factory may look at while building a sub-goal
#[derive(Debug, Clone)]
pub struct GoalFactoryContext {
    /// Snapshot the sub-goal is planned from
    pub state: WorldState,

    /// Shared static game data
    pub game_data: Arc<GameData>,

    /// Goal type or action name that spawned this request
    pub parent_goal_type: String,

    /// Depth the nested plan will execute at
    pub depth: usize,

    pub max_depth: usize,

    pub created_at: DateTime<Utc>,
}

impl GoalFactoryContext {
    /// Levels of nesting still available below this one
    pub fn remaining_depth(&self) -> usize {
        self.max_depth.saturating_sub(self.depth)
    }

    pub fn is_at_limit(&self) -> bool {
        self.depth >= self.max_depth
    }
}
