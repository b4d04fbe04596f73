//! Goal arbitration and cooldown-aware planning
//!
//! Selection runs in a strict order: terminal milestone, hard survival,
//! inventory pressure, then phase candidates ranked by scaled priority.
//! A short history of chosen categories feeds a balancing pass so one goal
//! type cannot starve the others across cycles.

use crate::actions::{Action, ActionCatalog, CatalogInput, SubGoalRequest};
use crate::api::GameData;
use crate::errors::{BotError, Result};
use crate::planning::goal::{clamp_priority, Goal, GoalCategory, GoalType};
use crate::planning::plan::Plan;
use crate::planning::solver::{Requirement, Solver, SolverAction, SolverState};
use crate::state::conditions::{Condition, ConditionMap};
use crate::state::{GoalFactoryContext, Skill, StateKey, StateMap, WorldState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

/// Priorities closer than this are ties
const PRIORITY_EPSILON: f64 = 1e-9;

/// Priority given to nested goals built from sub-goal requests
const SUBGOAL_PRIORITY: f64 = 6.0;

/// Priority of the inventory-full banking goal
const INVENTORY_FULL_PRIORITY: f64 = 8.5;

/// What to do with cooldown-requiring actions while the actor is locked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownPolicy {
    /// Drop them; only cooldown-agnostic actions stay plannable
    #[default]
    Filter,
    /// Keep them and plan as if ready; the executor waits before running
    Defer,
}

/// Goal selection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoalConfig {
    /// Character level at which the controller stops selecting goals
    pub max_level: u32,

    /// HP fraction below which survival overrides everything
    pub critical_hp_fraction: f64,

    /// HP fraction below which a soft survival candidate competes
    pub low_hp_fraction: f64,

    pub cooldown_policy: CooldownPolicy,

    /// Number of past selections the balancer looks at
    pub history_window: usize,

    /// Added to categories absent from the history window
    pub neglect_boost: f64,

    /// Share of the window above which a category is discounted
    pub overselect_share: f64,

    /// Multiplier applied to over-selected categories
    pub overselect_discount: f64,

    /// Cost reported when a goal cannot be planned
    pub default_goal_cost: u32,

    /// Free-slot fraction under which banking becomes a candidate
    pub inventory_pressure_slack: f64,
}

impl Default for GoalConfig {
    fn default() -> Self {
        Self {
            max_level: 40,
            critical_hp_fraction: 0.3,
            low_hp_fraction: 0.6,
            cooldown_policy: CooldownPolicy::Filter,
            history_window: 12,
            neglect_boost: 0.75,
            overselect_share: 0.5,
            overselect_discount: 0.85,
            default_goal_cost: 100,
            inventory_pressure_slack: 0.2,
        }
    }
}

/// Progression phase, bracketed by character level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Early,
    Mid,
    Late,
}

impl Phase {
    fn for_level(level: u32) -> Self {
        match level {
            0..=9 => Phase::Early,
            10..=29 => Phase::Mid,
            _ => Phase::Late,
        }
    }

    /// Base priorities: (progression, skill, gathering, equipment)
    fn weights(self) -> (f64, f64, f64, f64) {
        match self {
            Phase::Early => (6.0, 4.0, 3.0, 7.0),
            Phase::Mid => (5.0, 5.0, 4.0, 6.0),
            Phase::Late => (4.0, 6.0, 5.0, 5.0),
        }
    }
}

/// Selects goals and turns them into plans
pub struct GoalManager {
    catalog: ActionCatalog,
    solver: Arc<dyn Solver>,
    game_data: Arc<GameData>,
    safe_location: (i32, i32),
    config: GoalConfig,
    history: VecDeque<GoalCategory>,
}

impl GoalManager {
    pub fn new(
        catalog: ActionCatalog,
        solver: Arc<dyn Solver>,
        game_data: Arc<GameData>,
        safe_location: (i32, i32),
        config: GoalConfig,
    ) -> Self {
        Self {
            catalog,
            solver,
            game_data,
            safe_location,
            config,
            history: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &GoalConfig {
        &self.config
    }

    /// Categories chosen recently, oldest first
    pub fn history(&self) -> Vec<GoalCategory> {
        self.history.iter().copied().collect()
    }

    fn catalog_input<'a>(&'a self, state: &'a WorldState) -> CatalogInput<'a> {
        CatalogInput {
            state,
            game_data: &self.game_data,
            safe_location: self.safe_location,
        }
    }

    /// Every action instance valid for `state`
    pub fn available_actions(&self, state: &WorldState) -> Vec<Action> {
        self.catalog.actions_for(&self.catalog_input(state))
    }

    /// Action set the solver sees for `state` at `now`
    pub fn cooldown_eligible_actions(&self, state: &WorldState, now: DateTime<Utc>) -> Vec<Action> {
        let actions = self.available_actions(state);
        if !state.is_on_cooldown(now) || self.config.cooldown_policy == CooldownPolicy::Defer {
            return actions;
        }

        let before = actions.len();
        let eligible: Vec<Action> = actions
            .into_iter()
            .filter(|a| !a.requires_cooldown_ready())
            .collect();
        debug!(
            actor = %state.name,
            dropped = before - eligible.len(),
            kept = eligible.len(),
            "Actor on cooldown, filtered cooldown-requiring actions"
        );
        eligible
    }

    /// Pick the goal to pursue from `state`
    pub fn select_next_goal(&mut self, state: &WorldState) -> Goal {
        if state.level >= self.config.max_level {
            info!(actor = %state.name, level = state.level, "Terminal level reached, idling");
            return Goal::empty();
        }

        let hp_fraction = state.hp_fraction();
        if hp_fraction < self.config.critical_hp_fraction {
            let severity = 1.0 - hp_fraction / self.config.critical_hp_fraction;
            let goal = self.build_goal(GoalType::Survive, 9.0 + severity, state);
            return self.record(goal, state);
        }

        if state.inventory_full() {
            let goal = self.build_goal(GoalType::ManageInventory, INVENTORY_FULL_PRIORITY, state);
            if self.is_goal_achievable(state, &goal) {
                return self.record(goal, state);
            }
        }

        let mut candidates: Vec<Goal> = self
            .phase_candidates(state)
            .into_iter()
            .filter(|g| !g.is_satisfied_by(state) && self.is_goal_achievable(state, g))
            .collect();

        if candidates.is_empty() {
            debug!(actor = %state.name, "No achievable goal candidates");
            return Goal::empty();
        }

        self.balance(&mut candidates);
        let goal = self.pick(state, candidates);
        self.record(goal, state)
    }

    fn phase_candidates(&self, state: &WorldState) -> Vec<Goal> {
        let (w_progress, w_skill, w_gather, w_equip) = Phase::for_level(state.level).weights();
        let mut candidates = Vec::new();

        // Progression scales with level and with how close the next level is
        let xp_progress = if state.max_xp == 0 {
            0.0
        } else {
            (state.xp as f64 / state.max_xp as f64).min(1.0)
        };
        let level_share = f64::from(state.level) / f64::from(self.config.max_level.max(1));
        candidates.push(self.build_goal(
            GoalType::ReachLevel { level: state.level + 1 },
            w_progress + xp_progress + level_share,
            state,
        ));

        if let Some(skill) = self.weakest_gathering_skill(state) {
            let level = state.skill_level(skill);
            let lag = 1.0 - (f64::from(level) / f64::from(state.level.max(1))).min(1.0);
            candidates.push(self.build_goal(
                GoalType::LevelSkill { skill, level: level + 1 },
                w_skill + lag,
                state,
            ));
        }

        // Economic goals scale inversely with gold and free inventory
        let gold_factor = 1.0 / (1.0 + state.gold as f64 / 1000.0);
        let economic = gold_factor + (1.0 - state.inventory_slack()) * 0.5;
        if let Some((item, quantity)) = self.missing_material(state) {
            candidates.push(self.build_goal(
                GoalType::GatherMaterials { item, quantity },
                w_gather + economic,
                state,
            ));
        }
        if state.inventory_count() > 0 && state.inventory_slack() < self.config.inventory_pressure_slack {
            candidates.push(self.build_goal(GoalType::ManageInventory, w_gather + economic, state));
        }

        if state.weapon.is_none() {
            candidates.push(self.build_goal(GoalType::EquipWeapon, w_equip, state));
        }

        let hp_fraction = state.hp_fraction();
        if hp_fraction < self.config.low_hp_fraction {
            let severity = 1.0 - hp_fraction / self.config.low_hp_fraction;
            candidates.push(self.build_goal(GoalType::Survive, 5.0 + 3.0 * severity, state));
        }

        candidates
    }

    /// Lowest gathering skill that has at least one resource to train on
    fn weakest_gathering_skill(&self, state: &WorldState) -> Option<Skill> {
        Skill::ALL
            .iter()
            .copied()
            .filter(|s| s.is_gathering())
            .filter(|s| self.game_data.resources.values().any(|r| r.skill == *s))
            .min_by_key(|s| (state.skill_level(*s), *s))
    }

    /// First material short for a recipe the actor can already craft
    fn missing_material(&self, state: &WorldState) -> Option<(String, u32)> {
        let mut items: Vec<_> = self
            .game_data
            .items
            .values()
            .filter_map(|item| item.craft.as_ref().map(|r| (item.code.as_str(), r)))
            .filter(|(_, recipe)| recipe.level <= state.skill_level(recipe.skill))
            .collect();
        items.sort_by_key(|(code, _)| *code);

        items.into_iter().find_map(|(_, recipe)| {
            recipe
                .items
                .iter()
                .find(|m| state.item_count(&m.code) < m.quantity && self.has_source(&m.code))
                .map(|m| (m.code.clone(), m.quantity))
        })
    }

    fn has_source(&self, item: &str) -> bool {
        self.game_data
            .resources
            .values()
            .any(|r| r.primary_drop() == Some(item))
            || self
                .game_data
                .items
                .get(item)
                .map(|i| i.craft.is_some())
                .unwrap_or(false)
    }

    fn balance(&self, candidates: &mut [Goal]) {
        let window = self.history.len();
        if window == 0 || window < self.config.history_window / 2 {
            return;
        }

        for goal in candidates.iter_mut() {
            let chosen = self.history.iter().filter(|c| **c == goal.category()).count();
            if chosen == 0 {
                goal.priority = clamp_priority(goal.priority + self.config.neglect_boost);
            } else if chosen as f64 / window as f64 > self.config.overselect_share {
                goal.priority = clamp_priority(goal.priority * self.config.overselect_discount);
            }
        }
    }

    /// Highest priority wins; ties go to the cheaper plan
    fn pick(&self, state: &WorldState, mut candidates: Vec<Goal>) -> Goal {
        candidates.sort_by(|a, b| b.priority.total_cmp(&a.priority));
        let best = candidates[0].priority;
        let tied: Vec<Goal> = candidates
            .into_iter()
            .take_while(|g| (best - g.priority).abs() < PRIORITY_EPSILON)
            .collect();

        if tied.len() == 1 {
            return tied.into_iter().next().unwrap_or_else(Goal::empty);
        }
        tied.into_iter()
            .min_by_key(|g| self.estimate_goal_cost(state, g))
            .unwrap_or_else(Goal::empty)
    }

    fn record(&mut self, goal: Goal, state: &WorldState) -> Goal {
        self.history.push_back(goal.category());
        while self.history.len() > self.config.history_window {
            self.history.pop_front();
        }
        info!(
            actor = %state.name,
            goal = %goal.name,
            priority = goal.priority,
            "Selected goal"
        );
        goal
    }

    /// Goal of a given type with its target derived from `state`
    pub fn build_goal(&self, goal_type: GoalType, priority: f64, state: &WorldState) -> Goal {
        let mut target = ConditionMap::new();
        match &goal_type {
            GoalType::None => {}
            GoalType::Survive => {
                target.insert(StateKey::Hp, Condition::AtLeast(i64::from(state.max_hp)));
                target.insert(StateKey::X, Condition::Equals(self.safe_location.0.into()));
                target.insert(StateKey::Y, Condition::Equals(self.safe_location.1.into()));
            }
            GoalType::RecoverHp => {
                target.insert(StateKey::Hp, Condition::AtLeast(i64::from(state.max_hp)));
            }
            GoalType::ManageInventory => {
                target.insert(StateKey::InventoryCount, Condition::AtMost(0));
            }
            GoalType::ReachLevel { level } => {
                target.insert(StateKey::Level, Condition::AtLeast(i64::from(*level)));
            }
            GoalType::LevelSkill { skill, level } => {
                target.insert(StateKey::SkillLevel(*skill), Condition::AtLeast(i64::from(*level)));
            }
            GoalType::GatherMaterials { item, quantity } => {
                target.insert(StateKey::item(item), Condition::AtLeast(i64::from(*quantity)));
            }
            GoalType::EquipWeapon => {
                target.insert(StateKey::WeaponEquipped, Condition::is_true());
            }
            GoalType::ReachLocation { x, y } => {
                target.insert(StateKey::X, Condition::Equals((*x).into()));
                target.insert(StateKey::Y, Condition::Equals((*y).into()));
            }
        }
        Goal::new(goal_type, priority, target)
    }

    /// Nested goal for a sub-goal request
    pub fn goal_from_request(&self, request: &SubGoalRequest, context: &GoalFactoryContext) -> Result<Goal> {
        let data = &context.game_data;
        match &request.goal_type {
            GoalType::None => {
                return Err(BotError::Planning("empty goal cannot be delegated".to_string()));
            }
            GoalType::GatherMaterials { item, .. } => {
                let gatherable = data.resources.values().any(|r| r.primary_drop() == Some(item.as_str()));
                let craftable = data.items.get(item).map(|i| i.craft.is_some()).unwrap_or(false);
                if !gatherable && !craftable {
                    return Err(BotError::Planning(format!("no known source for {}", item)));
                }
            }
            GoalType::LevelSkill { skill, .. } => {
                let trainable = data.resources.values().any(|r| r.skill == *skill)
                    || data
                        .items
                        .values()
                        .any(|i| i.craft.as_ref().map(|r| r.skill == *skill).unwrap_or(false));
                if !trainable {
                    return Err(BotError::Planning(format!(
                        "nothing trains {}",
                        skill.as_str()
                    )));
                }
            }
            _ => {}
        }

        debug!(
            parent = %context.parent_goal_type,
            goal = %request.goal_type,
            depth = context.depth,
            reason = %request.reason,
            "Building nested goal"
        );
        Ok(self.build_goal(request.goal_type.clone(), SUBGOAL_PRIORITY, &context.state))
    }

    /// Plan `goal` from `state`, honoring the cooldown policy
    pub fn plan_with_cooldown_awareness(&self, actor: &str, state: &WorldState, goal: &Goal) -> Result<Plan> {
        if goal.is_empty() || goal.is_satisfied_by(state) {
            return Ok(Plan::empty(goal.name.clone()));
        }

        let now = Utc::now();
        let actions = self.cooldown_eligible_actions(state, now);

        let untouched = goal
            .unmet_keys(state)
            .into_iter()
            .find(|key| !actions.iter().any(|a| a.effects.contains_key(key)));
        if let Some(key) = untouched {
            debug!(actor, goal = %goal.name, key = %key, "No action affects goal key");
            return Ok(Plan::empty(goal.name.clone()));
        }

        let mut start = to_solver_state(&state.to_state_map());
        if state.is_on_cooldown(now) && self.config.cooldown_policy == CooldownPolicy::Defer {
            start.insert(StateKey::CooldownReady.name(), 1);
        }

        let solver_actions: Vec<SolverAction> = actions.iter().map(to_solver_action).collect();
        let requirements: BTreeMap<String, Requirement> = goal
            .target
            .iter()
            .map(|(key, condition)| (key.name(), Requirement::from(condition)))
            .collect();

        let names = self.solver.solve(&start, &requirements, &solver_actions);

        let by_name: HashMap<&str, &Action> = actions.iter().map(|a| (a.name.as_str(), a)).collect();
        let steps = names
            .iter()
            .map(|name| {
                by_name
                    .get(name.as_str())
                    .map(|a| (*a).clone())
                    .ok_or_else(|| BotError::UnknownAction(name.clone()))
            })
            .collect::<Result<Vec<Action>>>()?;

        let plan = Plan::new(goal.name.clone(), steps);
        if plan.is_empty() {
            debug!(actor, goal = %goal.name, candidates = actions.len(), "No plan found");
        } else {
            debug!(
                actor,
                goal = %goal.name,
                steps = plan.len(),
                cost = plan.total_cost,
                actions = ?plan.action_names(),
                "Planned"
            );
        }
        Ok(plan)
    }

    /// Cheap reachability check: every unmet target key is touched by some action
    pub fn is_goal_achievable(&self, state: &WorldState, goal: &Goal) -> bool {
        let unmet = goal.unmet_keys(state);
        if unmet.is_empty() {
            return true;
        }
        let actions = self.available_actions(state);
        unmet
            .iter()
            .all(|key| actions.iter().any(|a| a.effects.contains_key(key)))
    }

    /// Plan cost for ranking; failures degrade to the configured default
    pub fn estimate_goal_cost(&self, state: &WorldState, goal: &Goal) -> u32 {
        if goal.is_satisfied_by(state) {
            return 0;
        }
        if !self.is_goal_achievable(state, goal) {
            return self.config.default_goal_cost;
        }
        match self.plan_with_cooldown_awareness(&state.name, state, goal) {
            Ok(plan) if !plan.is_empty() => plan.total_cost,
            _ => self.config.default_goal_cost,
        }
    }
}

fn to_solver_state(view: &StateMap) -> SolverState {
    view.iter().map(|(key, value)| (key.name(), value.as_i64())).collect()
}

fn to_solver_action(action: &Action) -> SolverAction {
    SolverAction {
        name: action.name.clone(),
        cost: action.cost,
        preconditions: action
            .preconditions
            .iter()
            .map(|(key, condition)| (key.name(), condition.into()))
            .collect(),
        effects: action
            .effects
            .iter()
            .map(|(key, effect)| (key.name(), effect.into()))
            .collect(),
    }
}
