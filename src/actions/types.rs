//! Action, result and sub-goal request types
//!
//! Core types for action execution, results, and the deltas they carry.

use crate::api::{ActionResponse, ApiResult, WorldApi};
use crate::planning::GoalType;
use crate::state::conditions::{unmet_conditions, Condition, ConditionMap, Effect, EffectMap};
use crate::state::{Skill, StateKey, StateMap, StateValue, WorldState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Equipment slot used by weapon actions
pub const WEAPON_SLOT: &str = "weapon";

/// Remote endpoint an action maps to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum RemoteCall {
    Move { x: i32, y: i32 },
    Fight,
    Gather,
    Craft { code: String, quantity: u32 },
    Rest,
    Equip { code: String, slot: String },
    Unequip { slot: String },
    DepositAll,
}

impl RemoteCall {
    /// Perform the call for `actor`; `state` supplies inventory for deposits
    pub async fn invoke(
        &self,
        api: &dyn WorldApi,
        actor: &str,
        state: &WorldState,
    ) -> ApiResult<ActionResponse> {
        match self {
            RemoteCall::Move { x, y } => api.move_character(actor, *x, *y).await,
            RemoteCall::Fight => api.fight(actor).await,
            RemoteCall::Gather => api.gather(actor).await,
            RemoteCall::Craft { code, quantity } => api.craft(actor, code, *quantity).await,
            RemoteCall::Rest => api.rest(actor).await,
            RemoteCall::Equip { code, slot } => api.equip(actor, code, slot).await,
            RemoteCall::Unequip { slot } => api.unequip(actor, slot).await,
            RemoteCall::DepositAll => {
                let items: Vec<(String, u32)> = state
                    .inventory
                    .iter()
                    .filter(|(_, qty)| **qty > 0)
                    .map(|(code, qty)| (code.clone(), *qty))
                    .collect();
                api.deposit_items(actor, &items).await
            }
        }
    }
}

/// How an action is carried out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// One call against the world API
    Remote(RemoteCall),
    /// Local wait until the server cooldown expires; never calls the API
    WaitForCooldown,
}

/// One executable operation with planner-visible conditions and effects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    pub kind: ActionKind,
    pub cost: u32,
    pub preconditions: ConditionMap,
    pub effects: EffectMap,
    /// Effect keys whose declared change is a planner estimate, not a promise
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub estimated: BTreeSet<StateKey>,
}

impl Action {
    pub fn new(name: impl Into<String>, kind: ActionKind, cost: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            cost,
            preconditions: ConditionMap::new(),
            effects: EffectMap::new(),
            estimated: BTreeSet::new(),
        }
    }

    pub fn remote(name: impl Into<String>, call: RemoteCall, cost: u32) -> Self {
        Self::new(name, ActionKind::Remote(call), cost).requires_ready()
    }

    pub fn with_precondition(mut self, key: StateKey, condition: Condition) -> Self {
        self.preconditions.insert(key, condition);
        self
    }

    pub fn with_effect(mut self, key: StateKey, effect: Effect) -> Self {
        self.effects.insert(key, effect);
        self
    }

    /// Declare an effect the world may or may not deliver in one call
    pub fn with_estimated_effect(mut self, key: StateKey, effect: Effect) -> Self {
        self.estimated.insert(key.clone());
        self.with_effect(key, effect)
    }

    /// Require standing exactly on a tile
    pub fn at(self, x: i32, y: i32) -> Self {
        self.with_precondition(StateKey::X, Condition::Equals(x.into()))
            .with_precondition(StateKey::Y, Condition::Equals(y.into()))
    }

    fn requires_ready(self) -> Self {
        self.with_precondition(StateKey::CooldownReady, Condition::is_true())
    }

    /// Whether the server cooldown must have expired before this can run
    pub fn requires_cooldown_ready(&self) -> bool {
        matches!(
            self.preconditions.get(&StateKey::CooldownReady),
            Some(Condition::Equals(v)) if v.as_bool()
        )
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.kind, ActionKind::Remote(_))
    }

    /// Preconditions not met by `state`
    pub fn unmet_preconditions(&self, state: &WorldState) -> Vec<StateKey> {
        unmet_conditions(&state.to_state_map(), &self.preconditions)
    }

    /// Goals that would satisfy the given unmet preconditions
    pub fn subgoals_for(&self, unmet: &[StateKey]) -> Vec<SubGoalRequest> {
        let mut requests: Vec<SubGoalRequest> = Vec::new();
        let mut push = |goal_type: GoalType, reason: String| {
            if !requests.iter().any(|r| r.goal_type == goal_type) {
                requests.push(SubGoalRequest { goal_type, reason });
            }
        };

        for key in unmet {
            let condition = self.preconditions.get(key);
            match (key, condition) {
                (StateKey::Item(code), Some(Condition::AtLeast(n))) => push(
                    GoalType::GatherMaterials {
                        item: code.clone(),
                        quantity: (*n).max(0) as u32,
                    },
                    format!("{} needs {} x{}", self.name, code, n),
                ),
                (StateKey::Hp, Some(Condition::AtLeast(_))) => push(
                    GoalType::RecoverHp,
                    format!("{} needs more hp", self.name),
                ),
                (StateKey::SkillLevel(skill), Some(Condition::AtLeast(n))) => push(
                    GoalType::LevelSkill {
                        skill: *skill,
                        level: (*n).max(0) as u32,
                    },
                    format!("{} needs {} level {}", self.name, skill.as_str(), n),
                ),
                (StateKey::X | StateKey::Y, _) => {
                    if let Some((x, y)) = self.required_position() {
                        push(
                            GoalType::ReachLocation { x, y },
                            format!("{} must run at ({}, {})", self.name, x, y),
                        );
                    }
                }
                (StateKey::InventoryFull, _) => push(
                    GoalType::ManageInventory,
                    format!("{} needs inventory space", self.name),
                ),
                _ => {}
            }
        }

        // Travel last so earlier sub-goals cannot walk the actor away again
        requests.sort_by_key(|r| matches!(r.goal_type, GoalType::ReachLocation { .. }));
        requests
    }

    /// Tile this action must run on, if it declares one
    pub fn required_position(&self) -> Option<(i32, i32)> {
        let coord = |key: &StateKey| match self.preconditions.get(key) {
            Some(Condition::Equals(v)) => Some(v.as_i64() as i32),
            _ => None,
        };
        Some((coord(&StateKey::X)?, coord(&StateKey::Y)?))
    }
}

/// Why an action attempt did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Not executed: the snapshot did not satisfy the preconditions
    PreconditionNotMet,
    /// Executed, but the declared effects are not in the result
    VerificationFailed,
    /// Server rejected the action because the actor was still locked
    CooldownViolation,
    /// Rate limit persisted until retries ran out
    RateLimited,
    /// Server rejected the action with a client fault
    Remote { status: u16 },
    /// The actor lost a fight or HP is critically low
    CriticalHp,
}

/// Goal an action delegates because it cannot satisfy itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubGoalRequest {
    pub goal_type: GoalType,
    pub reason: String,
}

/// Outcome of one action execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    /// Action that was executed
    pub action_name: String,

    pub success: bool,

    pub message: String,

    /// Set on failures only
    pub failure: Option<FailureKind>,

    /// New values reported by the server, keyed like the world state
    pub state_changes: StateMap,

    /// Cooldown the action imposed
    pub cooldown_seconds: f64,

    pub subgoal_requests: Vec<SubGoalRequest>,

    /// Attempts made, including the successful one
    pub attempts: u32,
}

impl ActionResult {
    /// Create successful result
    pub fn success(action: &str, message: impl Into<String>, changes: StateMap, cooldown_seconds: f64) -> Self {
        Self {
            action_name: action.to_string(),
            success: true,
            message: message.into(),
            failure: None,
            state_changes: changes,
            cooldown_seconds,
            subgoal_requests: Vec::new(),
            attempts: 1,
        }
    }

    /// Create failed result
    pub fn failure(action: &str, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            action_name: action.to_string(),
            success: false,
            message: message.into(),
            failure: Some(kind),
            state_changes: StateMap::new(),
            cooldown_seconds: 0.0,
            subgoal_requests: Vec::new(),
            attempts: 1,
        }
    }

    pub fn with_subgoals(mut self, requests: Vec<SubGoalRequest>) -> Self {
        self.subgoal_requests = requests;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_changes(mut self, changes: StateMap, cooldown_seconds: f64) -> Self {
        self.state_changes = changes;
        self.cooldown_seconds = cooldown_seconds;
        self
    }

    pub fn is_cooldown_violation(&self) -> bool {
        self.failure == Some(FailureKind::CooldownViolation)
    }

    /// Failure that calls for emergency recovery
    pub fn is_critical(&self) -> bool {
        self.failure == Some(FailureKind::CriticalHp)
    }

    pub fn has_subgoals(&self) -> bool {
        !self.subgoal_requests.is_empty()
    }
}

/// Delta reported by an action response, relative to the pre-action state
///
/// Items held before the action but missing afterwards are reported as 0.
/// Location flags are only included when the response names a destination.
pub fn response_delta(response: &ActionResponse, pre: &WorldState) -> StateMap {
    let c = &response.character;
    let mut delta = StateMap::new();

    delta.insert(StateKey::Level, c.level.into());
    delta.insert(StateKey::Xp, c.xp.into());
    delta.insert(StateKey::MaxXp, c.max_xp.into());
    delta.insert(StateKey::Gold, c.gold.into());
    delta.insert(StateKey::Hp, c.hp.min(c.max_hp).into());
    delta.insert(StateKey::MaxHp, c.max_hp.into());
    delta.insert(StateKey::X, c.x.into());
    delta.insert(StateKey::Y, c.y.into());
    delta.insert(
        StateKey::CooldownReady,
        StateValue::Bool(response.cooldown.remaining_seconds == 0),
    );
    delta.insert(StateKey::WeaponEquipped, (!c.weapon_slot.is_empty()).into());
    delta.insert(StateKey::InventoryMax, c.inventory_max_items.into());

    for skill in Skill::ALL {
        delta.insert(StateKey::SkillLevel(skill), c.skill_level(skill).into());
    }

    let counts = c.item_counts();
    for code in pre.inventory.keys().chain(counts.keys()) {
        let quantity = counts.get(code).copied().unwrap_or(0);
        delta.insert(StateKey::item(code), quantity.into());
    }
    let total: u32 = counts.values().sum();
    delta.insert(StateKey::InventoryCount, total.into());
    delta.insert(
        StateKey::InventoryFull,
        (c.inventory_max_items > 0 && total >= c.inventory_max_items).into(),
    );

    if let Some(tile) = &response.destination {
        use crate::api::ContentKind;
        delta.insert(StateKey::AtMonsterLocation, tile.has_kind(ContentKind::Monster).into());
        delta.insert(StateKey::AtResourceLocation, tile.has_kind(ContentKind::Resource).into());
        delta.insert(StateKey::AtWorkshop, tile.has_kind(ContentKind::Workshop).into());
        delta.insert(StateKey::AtBank, tile.has_kind(ContentKind::Bank).into());
    }

    delta
}
