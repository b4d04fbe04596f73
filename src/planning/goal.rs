//! Goals: typed targets with a priority
//!
//! A goal's target is a condition map over the same key vocabulary actions
//! use, so "is this goal done" is just a condition check against a snapshot.

use crate::state::conditions::{conditions_met, unmet_conditions, ConditionMap};
use crate::state::{Skill, StateKey, WorldState};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lowest allowed goal priority
pub const MIN_PRIORITY: f64 = 0.0;

/// Highest allowed goal priority
pub const MAX_PRIORITY: f64 = 10.0;

/// What a goal is trying to achieve
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GoalType {
    /// Nothing left to do
    None,
    /// Full HP at the safe coordinate
    Survive,
    /// Full HP wherever the actor is
    RecoverHp,
    /// Empty the inventory into the bank
    ManageInventory,
    ReachLevel { level: u32 },
    LevelSkill { skill: Skill, level: u32 },
    /// Hold at least `quantity` of `item`
    GatherMaterials { item: String, quantity: u32 },
    EquipWeapon,
    ReachLocation { x: i32, y: i32 },
}

impl GoalType {
    /// Stable short name, used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            GoalType::None => "none",
            GoalType::Survive => "survive",
            GoalType::RecoverHp => "recover_hp",
            GoalType::ManageInventory => "manage_inventory",
            GoalType::ReachLevel { .. } => "reach_level",
            GoalType::LevelSkill { .. } => "level_skill",
            GoalType::GatherMaterials { .. } => "gather_materials",
            GoalType::EquipWeapon => "equip_weapon",
            GoalType::ReachLocation { .. } => "reach_location",
        }
    }

    pub fn category(&self) -> GoalCategory {
        match self {
            GoalType::None => GoalCategory::Idle,
            GoalType::Survive | GoalType::RecoverHp => GoalCategory::Survival,
            GoalType::ManageInventory | GoalType::GatherMaterials { .. } => GoalCategory::Economic,
            GoalType::ReachLevel { .. } | GoalType::LevelSkill { .. } => GoalCategory::Progression,
            GoalType::EquipWeapon => GoalCategory::Equipment,
            GoalType::ReachLocation { .. } => GoalCategory::Utility,
        }
    }
}

impl fmt::Display for GoalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoalType::ReachLevel { level } => write!(f, "reach_level({})", level),
            GoalType::LevelSkill { skill, level } => {
                write!(f, "level_skill({}, {})", skill.as_str(), level)
            }
            GoalType::GatherMaterials { item, quantity } => {
                write!(f, "gather_materials({} x{})", item, quantity)
            }
            GoalType::ReachLocation { x, y } => write!(f, "reach_location({}, {})", x, y),
            other => f.write_str(other.name()),
        }
    }
}

/// Buckets used by the selection balancer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalCategory {
    Survival,
    Economic,
    Progression,
    Equipment,
    Utility,
    Idle,
}

/// A target state with a priority
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub name: String,
    pub goal_type: GoalType,
    /// Clamped to [`MIN_PRIORITY`, `MAX_PRIORITY`]
    pub priority: f64,
    pub target: ConditionMap,
}

impl Goal {
    pub fn new(goal_type: GoalType, priority: f64, target: ConditionMap) -> Self {
        Self {
            name: goal_type.to_string(),
            goal_type,
            priority: clamp_priority(priority),
            target,
        }
    }

    /// The goal returned once the terminal milestone is reached
    pub fn empty() -> Self {
        Self::new(GoalType::None, MIN_PRIORITY, ConditionMap::new())
    }

    pub fn is_empty(&self) -> bool {
        self.goal_type == GoalType::None
    }

    pub fn category(&self) -> GoalCategory {
        self.goal_type.category()
    }

    pub fn is_satisfied_by(&self, state: &WorldState) -> bool {
        conditions_met(&state.to_state_map(), &self.target)
    }

    pub fn unmet_keys(&self, state: &WorldState) -> Vec<StateKey> {
        unmet_conditions(&state.to_state_map(), &self.target)
    }
}

pub fn clamp_priority(priority: f64) -> f64 {
    if priority.is_nan() {
        return MIN_PRIORITY;
    }
    priority.clamp(MIN_PRIORITY, MAX_PRIORITY)
}
