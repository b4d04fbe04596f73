//! Shared fixtures for integration tests
//!
//! `FakeWorld` is an in-memory world API with the same map the unit tests
//! use. Action endpoints mutate one character and answer without cooldown;
//! failures can be queued ahead of time.

#![allow(dead_code)]

use async_trait::async_trait;
use goalrunner::actions::ActionCatalog;
use goalrunner::api::*;
use goalrunner::errors::Result;
use goalrunner::executor::{ActionExecutor, ExecutorConfig};
use goalrunner::planning::{BestFirstSolver, GoalConfig, GoalManager};
use goalrunner::state::{Skill, StateConfig, StateManager, StateStore, WorldState};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

pub const ACTOR: &str = "ada";

/// Small world: chickens and cows, copper and ash, a forge and a bank
pub fn game_data() -> GameData {
    let mut data = GameData::default();
    data.maps = vec![
        MapTile::with_content(0, 1, ContentKind::Monster, "chicken"),
        MapTile::with_content(3, 1, ContentKind::Monster, "cow"),
        MapTile::with_content(2, 0, ContentKind::Resource, "copper_rocks"),
        MapTile::with_content(-1, 0, ContentKind::Resource, "ash_tree"),
        MapTile::with_content(4, 1, ContentKind::Bank, "bank"),
        MapTile::with_content(1, 5, ContentKind::Workshop, "weaponcrafting"),
    ];
    for (code, level) in [("chicken", 1), ("cow", 8)] {
        data.monsters.insert(
            code.to_string(),
            MonsterInfo { code: code.to_string(), level, hp: 60 },
        );
    }
    for (code, skill, drop) in [
        ("copper_rocks", Skill::Mining, "copper_ore"),
        ("ash_tree", Skill::Woodcutting, "ash_wood"),
    ] {
        data.resources.insert(
            code.to_string(),
            ResourceInfo {
                code: code.to_string(),
                skill,
                level: 1,
                drops: vec![DropInfo { code: drop.to_string(), rate: 1 }],
            },
        );
    }
    data.items.insert(
        "copper_dagger".to_string(),
        ItemInfo {
            code: "copper_dagger".to_string(),
            level: 1,
            kind: "weapon".to_string(),
            craft: Some(CraftRecipe {
                skill: Skill::Weaponcrafting,
                level: 1,
                items: vec![RecipeItem { code: "copper_ore".to_string(), quantity: 6 }],
                quantity: 1,
            }),
        },
    );
    data
}

/// Character at the origin with every skill at 1 and nothing held
pub fn character(level: u32, hp: u32, max_hp: u32) -> CharacterData {
    CharacterData {
        name: ACTOR.to_string(),
        level,
        xp: 0,
        max_xp: 100,
        gold: 0,
        hp,
        max_hp,
        x: 0,
        y: 0,
        cooldown: 0,
        cooldown_expiration: None,
        mining_level: 1,
        woodcutting_level: 1,
        fishing_level: 1,
        weaponcrafting_level: 1,
        gearcrafting_level: 1,
        jewelrycrafting_level: 1,
        cooking_level: 1,
        alchemy_level: 1,
        inventory: Vec::new(),
        inventory_max_items: 100,
        weapon_slot: String::new(),
    }
}

struct World {
    character: CharacterData,
    data: GameData,
    failures: VecDeque<ApiError>,
    calls: Vec<String>,
    reads: usize,
    move_drift: i32,
    fight_result: FightResult,
    hp_after_loss: u32,
    empty_gathers: bool,
}

/// In-memory world API for a single character
pub struct FakeWorld {
    world: Mutex<World>,
}

impl FakeWorld {
    pub fn new(character: CharacterData) -> Self {
        Self {
            world: Mutex::new(World {
                character,
                data: game_data(),
                failures: VecDeque::new(),
                calls: Vec::new(),
                reads: 0,
                move_drift: 0,
                fight_result: FightResult::Win,
                hp_after_loss: 0,
                empty_gathers: false,
            }),
        }
    }

    /// Answer the next action call with `error` instead of performing it
    pub fn fail_next(&self, error: ApiError) {
        self.lock().failures.push_back(error);
    }

    /// Moves land `drift` tiles east of the requested target
    pub fn set_move_drift(&self, drift: i32) {
        self.lock().move_drift = drift;
    }

    /// Make fights end in a loss that leaves `hp` behind
    pub fn lose_fights(&self, hp: u32) {
        let mut world = self.lock();
        world.fight_result = FightResult::Loss;
        world.hp_after_loss = hp;
    }

    /// Gathers succeed but drop nothing
    pub fn empty_gathers(&self) {
        self.lock().empty_gathers = true;
    }

    /// Action endpoints hit so far, failed attempts included
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn action_calls(&self) -> usize {
        self.lock().calls.len()
    }

    /// Calls of any kind, reads included
    pub fn total_calls(&self) -> usize {
        let world = self.lock();
        world.calls.len() + world.reads
    }

    pub fn character(&self) -> CharacterData {
        self.lock().character.clone()
    }

    pub fn item_count(&self, code: &str) -> u32 {
        self.lock().character.item_counts().get(code).copied().unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, World> {
        self.world.lock().unwrap()
    }

    fn act<F>(&self, call: String, apply: F) -> ApiResult<ActionResponse>
    where
        F: FnOnce(&mut World) -> ApiResult<(Option<MapTile>, Option<FightOutcome>)>,
    {
        let mut world = self.lock();
        world.calls.push(call);
        if let Some(error) = world.failures.pop_front() {
            return Err(error);
        }
        let (destination, fight) = apply(&mut *world)?;
        Ok(ActionResponse {
            cooldown: CooldownInfo::none(),
            character: world.character.clone(),
            destination,
            fight,
        })
    }
}

fn missing(message: &str) -> ApiError {
    ApiError::Client { status: 478, message: message.to_string() }
}

fn nothing_here() -> ApiError {
    ApiError::from_status(
        goalrunner::api::error::status::NOTHING_ON_MAP,
        None,
        "nothing on this tile".to_string(),
    )
}

fn add_item(character: &mut CharacterData, code: &str, quantity: u32) {
    match character.inventory.iter_mut().find(|s| s.code == code) {
        Some(slot) => slot.quantity += quantity,
        None => {
            let slot = character.inventory.len() as u32 + 1;
            character.inventory.push(InventorySlot { slot, code: code.to_string(), quantity });
        }
    }
}

fn remove_item(character: &mut CharacterData, code: &str, quantity: u32) -> ApiResult<()> {
    let held = character.item_counts().get(code).copied().unwrap_or(0);
    if held < quantity {
        return Err(missing(code));
    }
    if let Some(slot) = character.inventory.iter_mut().find(|s| s.code == code) {
        slot.quantity -= quantity;
    }
    character.inventory.retain(|s| s.quantity > 0);
    Ok(())
}

fn current_tile(world: &World) -> Option<MapTile> {
    world
        .data
        .tile_at(world.character.x, world.character.y)
        .cloned()
}

#[async_trait]
impl WorldApi for FakeWorld {
    async fn get_character(&self, _name: &str) -> ApiResult<CharacterData> {
        let mut world = self.lock();
        world.reads += 1;
        Ok(world.character.clone())
    }

    async fn get_map_tile(&self, x: i32, y: i32) -> ApiResult<MapTile> {
        let mut world = self.lock();
        world.reads += 1;
        world.data.tile_at(x, y).cloned().ok_or(ApiError::Client {
            status: 404,
            message: "map not found".to_string(),
        })
    }

    async fn load_game_data(&self) -> ApiResult<GameData> {
        let mut world = self.lock();
        world.reads += 1;
        Ok(world.data.clone())
    }

    async fn move_character(&self, _name: &str, x: i32, y: i32) -> ApiResult<ActionResponse> {
        self.act(format!("move({}, {})", x, y), |world| {
            if world.character.x == x && world.character.y == y {
                return Err(ApiError::AlreadyAtDestination);
            }
            world.character.x = x + world.move_drift;
            world.character.y = y;
            let tile = world.data.tile_at(x, y).cloned().unwrap_or_else(|| MapTile::empty(x, y));
            Ok((Some(tile), None))
        })
    }

    async fn fight(&self, _name: &str) -> ApiResult<ActionResponse> {
        self.act("fight".to_string(), |world| {
            let on_monster = current_tile(world)
                .map(|t| t.has_kind(ContentKind::Monster))
                .unwrap_or(false);
            if !on_monster {
                return Err(nothing_here());
            }

            let result = world.fight_result;
            let hp_after_loss = world.hp_after_loss;
            let c = &mut world.character;
            let xp = match result {
                FightResult::Win => {
                    c.xp += 60;
                    if c.xp >= c.max_xp {
                        c.level += 1;
                        c.xp -= c.max_xp;
                    }
                    60
                }
                FightResult::Loss => {
                    c.hp = hp_after_loss;
                    0
                }
            };
            Ok((None, Some(FightOutcome { result, xp, gold: 0 })))
        })
    }

    async fn gather(&self, _name: &str) -> ApiResult<ActionResponse> {
        self.act("gather".to_string(), |world| {
            let resource = current_tile(world)
                .filter(|t| t.has_kind(ContentKind::Resource))
                .and_then(|t| t.content_code().map(str::to_string))
                .and_then(|code| world.data.resources.get(&code).cloned())
                .ok_or_else(nothing_here)?;

            if world.empty_gathers {
                return Ok((None, None));
            }
            if let Some(drop) = resource.primary_drop() {
                add_item(&mut world.character, drop, 1);
            }
            if resource.skill == Skill::Mining {
                world.character.mining_level += 1;
            } else if resource.skill == Skill::Woodcutting {
                world.character.woodcutting_level += 1;
            }
            Ok((None, None))
        })
    }

    async fn craft(&self, _name: &str, code: &str, quantity: u32) -> ApiResult<ActionResponse> {
        self.act(format!("craft({})", code), |world| {
            let on_workshop = current_tile(world)
                .map(|t| t.has_kind(ContentKind::Workshop))
                .unwrap_or(false);
            if !on_workshop {
                return Err(nothing_here());
            }
            let recipe = world
                .data
                .items
                .get(code)
                .and_then(|item| item.craft.clone())
                .ok_or_else(|| ApiError::Client { status: 404, message: "unknown item".to_string() })?;

            for material in &recipe.items {
                remove_item(&mut world.character, &material.code, material.quantity * quantity)?;
            }
            add_item(&mut world.character, code, recipe.quantity * quantity);
            world.character.weaponcrafting_level += 1;
            Ok((None, None))
        })
    }

    async fn rest(&self, _name: &str) -> ApiResult<ActionResponse> {
        self.act("rest".to_string(), |world| {
            world.character.hp = world.character.max_hp;
            Ok((None, None))
        })
    }

    async fn equip(&self, _name: &str, code: &str, _slot: &str) -> ApiResult<ActionResponse> {
        self.act(format!("equip({})", code), |world| {
            remove_item(&mut world.character, code, 1)?;
            world.character.weapon_slot = code.to_string();
            Ok((None, None))
        })
    }

    async fn unequip(&self, _name: &str, _slot: &str) -> ApiResult<ActionResponse> {
        self.act("unequip".to_string(), |world| {
            let weapon = std::mem::take(&mut world.character.weapon_slot);
            if weapon.is_empty() {
                return Err(missing("weapon"));
            }
            add_item(&mut world.character, &weapon, 1);
            Ok((None, None))
        })
    }

    async fn deposit_items(&self, _name: &str, items: &[(String, u32)]) -> ApiResult<ActionResponse> {
        self.act("deposit".to_string(), |world| {
            for (code, quantity) in items {
                remove_item(&mut world.character, code, *quantity)?;
            }
            Ok((None, None))
        })
    }
}

/// Snapshot store kept in memory
#[derive(Default)]
pub struct MemoryStore {
    saved: Mutex<HashMap<String, WorldState>>,
}

impl MemoryStore {
    pub fn saved(&self, actor: &str) -> Option<WorldState> {
        self.saved.lock().unwrap().get(actor).cloned()
    }
}

impl StateStore for MemoryStore {
    fn save(&self, actor: &str, state: &WorldState) -> Result<()> {
        self.saved
            .lock()
            .unwrap()
            .insert(actor.to_string(), state.clone());
        Ok(())
    }

    fn load(&self, actor: &str) -> Result<Option<WorldState>> {
        Ok(self.saved(actor))
    }
}

/// Executor settings that keep retries and pauses in the millisecond range
pub fn fast_executor_config() -> ExecutorConfig {
    ExecutorConfig {
        base_backoff_ms: 1,
        max_backoff_ms: 5,
        backoff_jitter: false,
        max_cooldown_wait_ms: 50,
        rate_limit_cap_ms: 20,
        rate_limit_max_jitter_ms: 5,
        emergency_pause_ms: 1,
        ..ExecutorConfig::default()
    }
}

/// Everything one actor needs, wired over a shared fake world
pub struct Harness {
    pub world: Arc<FakeWorld>,
    pub store: Arc<MemoryStore>,
    pub states: StateManager,
    pub goals: GoalManager,
    pub executor: ActionExecutor,
}

impl Harness {
    pub fn new(character: CharacterData) -> Self {
        Self::with_configs(character, StateConfig::default(), fast_executor_config())
    }

    pub fn with_configs(
        character: CharacterData,
        state_config: StateConfig,
        executor_config: ExecutorConfig,
    ) -> Self {
        Self::with_store(character, state_config, executor_config, Arc::new(MemoryStore::default()))
    }

    pub fn with_store(
        character: CharacterData,
        state_config: StateConfig,
        executor_config: ExecutorConfig,
        store: Arc<MemoryStore>,
    ) -> Self {
        let world = Arc::new(FakeWorld::new(character));
        let api: Arc<dyn WorldApi> = world.clone();
        let data = Arc::new(game_data());

        let states = StateManager::new(ACTOR, Arc::clone(&api), store.clone(), Arc::clone(&data), state_config);
        let goals = GoalManager::new(
            ActionCatalog::new(),
            Arc::new(BestFirstSolver::default()),
            data,
            states.safe_location(),
            GoalConfig::default(),
        );
        let executor = ActionExecutor::new(api, executor_config);

        Self { world, store, states, goals, executor }
    }
}
