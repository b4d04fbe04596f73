//! Bootstrap for goalrunner
//!
//! Checks that the world API is reachable and the character exists, then
//! wires the state, goal and execution layers into an [`Orchestrator`].

use crate::agent::Orchestrator;
use crate::api::{ApiError, GameData, WorldApi};
use crate::cli::Config;
use crate::errors::Result;
use crate::executor::ActionExecutor;
use crate::planning::{BestFirstSolver, GoalManager};
use crate::actions::ActionCatalog;
use crate::recovery::EmergencyDetector;
use crate::state::{StateManager, StateStore};
use std::sync::Arc;
use tracing::{debug, info};

/// Bootstrap check result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapStatus {
    Ready,
    ApiUnreachable(String),
    CharacterNotFound(String),
}

/// Wires components for one actor from a configuration
pub struct Bootstrap {
    config: Config,
    api: Arc<dyn WorldApi>,
}

impl Bootstrap {
    pub fn new(config: Config, api: Arc<dyn WorldApi>) -> Self {
        Self { config, api }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Probe the API with the configured character
    ///
    /// Client faults mean the character is unknown; anything network-class
    /// means the API itself is not usable.
    pub async fn check(&self) -> BootstrapStatus {
        let name = &self.config.actor.name;
        match self.api.get_character(name).await {
            Ok(character) => {
                debug!(actor = %name, level = character.level, "Character found");
                BootstrapStatus::Ready
            }
            Err(ApiError::Client { .. }) => BootstrapStatus::CharacterNotFound(name.clone()),
            Err(e) => BootstrapStatus::ApiUnreachable(e.to_string()),
        }
    }

    /// Load static game data once for the session
    pub async fn load_game_data(&self) -> Result<Arc<GameData>> {
        let data = self.api.load_game_data().await?;
        info!(
            tiles = data.maps.len(),
            monsters = data.monsters.len(),
            resources = data.resources.len(),
            items = data.items.len(),
            "Loaded game data"
        );
        Ok(Arc::new(data))
    }

    /// State and goal managers sharing one copy of the game data
    pub fn managers(&self, game_data: Arc<GameData>, store: Arc<dyn StateStore>) -> (StateManager, GoalManager) {
        let states = StateManager::new(
            self.config.actor.name.clone(),
            Arc::clone(&self.api),
            store,
            Arc::clone(&game_data),
            self.config.state.clone(),
        );
        let goals = GoalManager::new(
            ActionCatalog::new(),
            Arc::new(BestFirstSolver::default()),
            game_data,
            states.safe_location(),
            self.config.goals.clone(),
        );
        (states, goals)
    }

    pub fn executor(&self) -> ActionExecutor {
        ActionExecutor::new(Arc::clone(&self.api), self.config.executor.clone())
    }

    /// Fully wired orchestrator
    pub async fn build_orchestrator(&self, store: Arc<dyn StateStore>) -> Result<Orchestrator> {
        let game_data = self.load_game_data().await?;
        let (states, goals) = self.managers(game_data, store);
        info!(
            actor = %self.config.actor.name,
            safe_location = ?states.safe_location(),
            policy = ?self.config.goals.cooldown_policy,
            "Orchestrator ready"
        );

        Ok(Orchestrator::new(
            states,
            goals,
            self.executor(),
            EmergencyDetector::new(self.config.recovery()),
            self.config.orchestrator.clone(),
        ))
    }
}
