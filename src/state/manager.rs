//! Authoritative world state for one actor
//!
//! The manager owns the only cached snapshot. Readers get clones; every
//! update replaces the snapshot wholesale.

use crate::actions::ActionResult;
use crate::api::{ApiError, GameData, MapTile, WorldApi};
use crate::errors::{BotError, Result};
use crate::state::cache::StateStore;
use crate::state::context::GoalFactoryContext;
use crate::state::world::{Skill, StateKey, WorldState, CRITICAL_KEYS};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// State manager configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// How far a skill level may run ahead of the character level
    pub skill_skew_allowance: u32,

    /// Largest Manhattan displacement one nested plan may explain
    ///
    /// Never tighter than the span of the loaded map, so any walk between
    /// known tiles passes; set it higher for worlds whose map is not loaded.
    pub max_subgoal_displacement: u32,

    /// Explicit safe coordinate; game data decides when unset
    pub safe_location: Option<(i32, i32)>,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            skill_skew_allowance: 10,
            max_subgoal_displacement: 20,
            safe_location: None,
        }
    }
}

/// Outcome of a consistency check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub consistent: bool,
    pub issues: Vec<String>,
}

impl ConsistencyReport {
    fn from_issues(issues: Vec<String>) -> Self {
        Self {
            consistent: issues.is_empty(),
            issues,
        }
    }
}

/// Owner of the cached [`WorldState`]
pub struct StateManager {
    actor: String,
    api: Arc<dyn WorldApi>,
    store: Arc<dyn StateStore>,
    game_data: Arc<GameData>,
    config: StateConfig,
    safe_location: (i32, i32),
    cached: Option<WorldState>,
}

impl StateManager {
    pub fn new(
        actor: impl Into<String>,
        api: Arc<dyn WorldApi>,
        store: Arc<dyn StateStore>,
        game_data: Arc<GameData>,
        config: StateConfig,
    ) -> Self {
        let safe_location = config
            .safe_location
            .or_else(|| game_data.nearest_bank(0, 0).map(|t| (t.x, t.y)))
            .unwrap_or((0, 0));

        Self {
            actor: actor.into(),
            api,
            store,
            game_data,
            config,
            safe_location,
            cached: None,
        }
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn game_data(&self) -> Arc<GameData> {
        Arc::clone(&self.game_data)
    }

    pub fn config(&self) -> &StateConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn StateStore> {
        Arc::clone(&self.store)
    }

    /// Coordinate used for emergency retreat and HP recovery
    pub fn safe_location(&self) -> (i32, i32) {
        self.safe_location
    }

    /// Build a snapshot from the remote API without touching the cache
    async fn fetch(&self) -> Result<WorldState> {
        let character = self.api.get_character(&self.actor).await?;

        let tile = match self.game_data.tile_at(character.x, character.y) {
            Some(tile) => Some(tile.clone()),
            None => self.fetch_tile(character.x, character.y).await?,
        };

        Ok(WorldState::from_character(
            &character,
            tile.as_ref(),
            self.safe_location,
            Utc::now(),
        ))
    }

    async fn fetch_tile(&self, x: i32, y: i32) -> Result<Option<MapTile>> {
        match self.api.get_map_tile(x, y).await {
            Ok(tile) => Ok(Some(tile)),
            Err(ApiError::Client { status, .. }) => {
                debug!(x, y, status, "No map tile at position");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch from the remote API and replace the cache
    pub async fn get_current_state(&mut self) -> Result<WorldState> {
        let state = self.fetch().await?;
        self.cached = Some(state.clone());
        Ok(state)
    }

    /// Last snapshot, never touching the network
    pub fn get_cached_state(&self) -> Option<&WorldState> {
        self.cached.as_ref()
    }

    /// Merge an action result into the cache
    ///
    /// A result that reports a cooldown triggers a full remote refresh since
    /// the server's cooldown timing cannot be extrapolated locally.
    pub async fn apply_result(&mut self, result: &ActionResult) -> Result<WorldState> {
        if result.cooldown_seconds > 0.0 {
            debug!(
                actor = %self.actor,
                action = %result.action_name,
                cooldown = result.cooldown_seconds,
                "Result carries cooldown, refreshing from remote"
            );
            return self.get_current_state().await;
        }

        match &self.cached {
            Some(current) => {
                let next = current.with_delta(&result.state_changes);
                self.cached = Some(next.clone());
                Ok(next)
            }
            None => self.get_current_state().await,
        }
    }

    /// Static invariants of an explicit snapshot, or a cache-vs-remote diff
    pub async fn validate_consistency(&self, state: Option<&WorldState>) -> Result<ConsistencyReport> {
        if let Some(state) = state {
            return Ok(ConsistencyReport::from_issues(self.static_issues(state)));
        }

        let Some(cached) = &self.cached else {
            return Ok(ConsistencyReport::from_issues(vec![
                "no cached state to compare against".to_string(),
            ]));
        };

        let fresh = self.fetch().await?;
        let issues: Vec<String> = CRITICAL_KEYS
            .iter()
            .filter_map(|key| {
                let local = cached.get(key);
                let remote = fresh.get(key);
                (local != remote).then(|| {
                    format!(
                        "{}: cached {} vs remote {}",
                        key,
                        display_value(local),
                        display_value(remote)
                    )
                })
            })
            .collect();

        if !issues.is_empty() {
            warn!(actor = %self.actor, issues = issues.len(), "Cached state diverged from remote");
        }
        Ok(ConsistencyReport::from_issues(issues))
    }

    fn static_issues(&self, state: &WorldState) -> Vec<String> {
        let mut issues = Vec::new();
        let view = state.to_state_map();
        let negative = |key: &StateKey| view.get(key).map(|v| v.as_i64() < 0).unwrap_or(false);

        if state.hp > state.max_hp {
            issues.push(format!("hp {} exceeds max_hp {}", state.hp, state.max_hp));
        }
        if negative(&StateKey::Hp) || negative(&StateKey::Level) {
            issues.push("negative hp or level".to_string());
        }

        for skill in Skill::ALL {
            let level = state.skill_level(skill);
            if negative(&StateKey::SkillLevel(skill)) {
                issues.push(format!("{} level is negative", skill.as_str()));
            }
            if level > state.level.saturating_add(self.config.skill_skew_allowance) {
                issues.push(format!(
                    "{} level {} is more than {} ahead of character level {}",
                    skill.as_str(),
                    level,
                    self.config.skill_skew_allowance,
                    state.level
                ));
            }
        }

        for (key, value) in view.iter().filter(|(k, _)| matches!(k, StateKey::Item(_))) {
            if value.as_i64() < 0 {
                issues.push(format!("{} has negative count {}", key, value));
            }
        }

        issues
    }

    /// Drop the cache, re-fetch, persist, return the fresh snapshot
    pub async fn force_refresh(&mut self) -> Result<WorldState> {
        self.cached = None;
        let state = self.get_current_state().await?;
        if let Err(e) = self.store.save(&self.actor, &state) {
            warn!(actor = %self.actor, error = %e, "Failed to persist refreshed state");
        }
        Ok(state)
    }

    /// Write the cached snapshot to the durable store
    pub fn persist(&self) -> Result<()> {
        match &self.cached {
            Some(state) => {
                self.store.save(&self.actor, state)?;
                info!(actor = %self.actor, "Persisted world state");
                Ok(())
            }
            None => Err(BotError::NoCachedState(self.actor.clone())),
        }
    }

    /// Snapshot from a previous session, informational only
    pub fn load_persisted(&self) -> Result<Option<WorldState>> {
        self.store.load(&self.actor)
    }

    /// Context for building a nested goal one level below `parent_type`
    pub fn create_goal_factory_context(
        &self,
        parent_type: &str,
        depth: usize,
        max_depth: usize,
    ) -> Result<GoalFactoryContext> {
        let state = self
            .cached
            .clone()
            .ok_or_else(|| BotError::NoCachedState(self.actor.clone()))?;

        Ok(GoalFactoryContext {
            state,
            game_data: self.game_data(),
            parent_goal_type: parent_type.to_string(),
            depth,
            max_depth,
            created_at: Utc::now(),
        })
    }

    /// Displacement bound for one nested plan
    pub fn displacement_limit(&self) -> u32 {
        self.config.max_subgoal_displacement.max(self.game_data.span())
    }

    /// Reject post-states a single nested plan could not have produced
    pub fn validate_recursive_state_transition(
        &self,
        pre: &WorldState,
        post: &WorldState,
        depth: usize,
    ) -> Result<()> {
        let violation = |reason: String| BotError::StateConsistency { depth, reason };

        if post.hp > post.max_hp {
            return Err(violation(format!(
                "hp {} exceeds max_hp {}",
                post.hp, post.max_hp
            )));
        }
        if post.level < pre.level {
            return Err(violation(format!(
                "level decreased from {} to {}",
                pre.level, post.level
            )));
        }

        let limit = self.displacement_limit();
        let displacement = pre.x.abs_diff(post.x) + pre.y.abs_diff(post.y);
        if displacement > limit {
            return Err(violation(format!(
                "moved {} tiles from ({}, {}) to ({}, {}), limit {}",
                displacement,
                pre.x,
                pre.y,
                post.x,
                post.y,
                limit
            )));
        }

        Ok(())
    }
}

fn display_value(value: Option<crate::state::StateValue>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}
