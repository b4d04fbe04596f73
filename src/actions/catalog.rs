//! Action catalog
//!
//! Actions are parameterized per snapshot: every factory in
//! [`ACTION_REGISTRY`] looks at the current state and the static game data
//! and yields the concrete instances valid right now.

use crate::actions::types::{Action, ActionKind, RemoteCall, WEAPON_SLOT};
use crate::api::{ContentKind, GameData, ItemInfo, MapTile};
use crate::state::conditions::{Condition, Effect};
use crate::state::{Skill, StateKey, StateValue, WorldState};
use std::collections::{BTreeMap, BTreeSet};

/// Minimum share of max HP required before starting a fight
const FIGHT_MIN_HP_FRACTION: f64 = 0.3;

/// Recipes this many levels above the current skill are still offered
const CRAFT_LOOKAHEAD: u32 = 5;

const FIGHT_COST: u32 = 3;
const GATHER_COST: u32 = 2;
const CRAFT_COST: u32 = 3;
const REST_COST: u32 = 2;
const BANK_COST: u32 = 2;
const EQUIP_COST: u32 = 1;
const WAIT_COST: u32 = 1;

/// What a factory sees when building actions
#[derive(Debug, Clone, Copy)]
pub struct CatalogInput<'a> {
    pub state: &'a WorldState,
    pub game_data: &'a GameData,
    pub safe_location: (i32, i32),
}

/// Builds the instances of one action family
pub type ActionFactory = fn(&CatalogInput<'_>) -> Vec<Action>;

/// One entry in the registration table
#[derive(Debug, Clone, Copy)]
pub struct ActionRegistration {
    pub id: &'static str,
    pub factory: ActionFactory,
}

/// Every action family known to the controller
pub const ACTION_REGISTRY: &[ActionRegistration] = &[
    ActionRegistration { id: "move", factory: movement_actions },
    ActionRegistration { id: "fight", factory: fight_actions },
    ActionRegistration { id: "gather", factory: gather_actions },
    ActionRegistration { id: "craft", factory: craft_actions },
    ActionRegistration { id: "rest", factory: rest_actions },
    ActionRegistration { id: "bank", factory: bank_actions },
    ActionRegistration { id: "equipment", factory: equipment_actions },
    ActionRegistration { id: "wait", factory: wait_actions },
];

/// Registry of action factories keyed by family id
#[derive(Debug, Clone)]
pub struct ActionCatalog {
    factories: BTreeMap<&'static str, ActionFactory>,
}

impl Default for ActionCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionCatalog {
    /// Catalog over the full registration table
    pub fn new() -> Self {
        Self::with_registrations(ACTION_REGISTRY)
    }

    pub fn with_registrations(registrations: &[ActionRegistration]) -> Self {
        let factories = registrations.iter().map(|r| (r.id, r.factory)).collect();
        Self { factories }
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// All action instances valid for the input; names are unique
    pub fn actions_for(&self, input: &CatalogInput<'_>) -> Vec<Action> {
        let mut seen = BTreeSet::new();
        self.factories
            .values()
            .flat_map(|factory| factory(input))
            .filter(|action| seen.insert(action.name.clone()))
            .collect()
    }

    /// Look up one instance by name
    pub fn find(&self, name: &str, input: &CatalogInput<'_>) -> Option<Action> {
        self.actions_for(input).into_iter().find(|a| a.name == name)
    }
}

/// Name of the move action targeting a coordinate
pub fn move_action_name(x: i32, y: i32) -> String {
    format!("move_{}_{}", x, y)
}

fn move_action(input: &CatalogInput<'_>, x: i32, y: i32) -> Action {
    let state = input.state;
    let distance = state.x.abs_diff(x) + state.y.abs_diff(y);
    let tile = input.game_data.tile_at(x, y);
    let has = |kind: ContentKind| tile.map(|t| t.has_kind(kind)).unwrap_or(false);

    Action::remote(move_action_name(x, y), RemoteCall::Move { x, y }, 1 + distance)
        .with_effect(StateKey::X, Effect::Set(x.into()))
        .with_effect(StateKey::Y, Effect::Set(y.into()))
        .with_effect(StateKey::AtMonsterLocation, Effect::Set(has(ContentKind::Monster).into()))
        .with_effect(StateKey::AtResourceLocation, Effect::Set(has(ContentKind::Resource).into()))
        .with_effect(StateKey::AtWorkshop, Effect::Set(has(ContentKind::Workshop).into()))
        .with_effect(StateKey::AtBank, Effect::Set(has(ContentKind::Bank).into()))
}

/// Tile hosting `code`: the current one if it does, else the nearest
fn tile_for<'a>(input: &CatalogInput<'a>, kind: ContentKind, code: &str) -> Option<&'a MapTile> {
    let state = input.state;
    input
        .game_data
        .nearest(kind, state.x, state.y, |t| t.content_code() == Some(code))
}

/// Monsters worth fighting: the strongest beatable one, plus whatever
/// beatable monster the actor is standing on
fn fight_targets<'a>(input: &CatalogInput<'a>) -> Vec<(&'a MapTile, String)> {
    let state = input.state;
    let data = input.game_data;
    let mut codes = BTreeSet::new();

    if let Some(code) = data
        .nearest_monster_for_level(state.level, state.x, state.y)
        .and_then(|t| t.content_code())
    {
        codes.insert(code.to_string());
    }
    if let Some(monster) = data
        .tile_at(state.x, state.y)
        .and_then(|t| data.monster_for_tile(t))
        .filter(|m| m.level <= state.level)
    {
        codes.insert(monster.code.clone());
    }

    codes
        .into_iter()
        .filter_map(|code| tile_for(input, ContentKind::Monster, &code).map(|t| (t, code)))
        .collect()
}

/// Resource codes the actor can gather, each with its nearest tile
fn gather_targets<'a>(input: &CatalogInput<'a>) -> Vec<(&'a MapTile, Skill, String, String)> {
    let state = input.state;
    let mut resources: Vec<_> = input
        .game_data
        .resources
        .values()
        .filter(|r| r.level <= state.skill_level(r.skill))
        .collect();
    resources.sort_by(|a, b| a.code.cmp(&b.code));

    resources
        .into_iter()
        .filter_map(|r| {
            let drop = r.primary_drop()?.to_string();
            let tile = tile_for(input, ContentKind::Resource, &r.code)?;
            Some((tile, r.skill, r.code.clone(), drop))
        })
        .collect()
}

/// Craftable items within reach of the current skill levels
fn craft_targets<'a>(input: &CatalogInput<'a>) -> Vec<(&'a MapTile, &'a ItemInfo)> {
    let state = input.state;
    let data = input.game_data;
    let mut items: Vec<&ItemInfo> = data
        .items
        .values()
        .filter(|item| {
            item.craft
                .as_ref()
                .map(|r| r.level <= state.skill_level(r.skill) + CRAFT_LOOKAHEAD)
                .unwrap_or(false)
        })
        .collect();
    items.sort_by(|a, b| a.code.cmp(&b.code));

    items
        .into_iter()
        .filter_map(|item| {
            let recipe = item.craft.as_ref()?;
            let tile = data.nearest_workshop(recipe.skill, state.x, state.y)?;
            Some((tile, item))
        })
        .collect()
}

fn movement_actions(input: &CatalogInput<'_>) -> Vec<Action> {
    let state = input.state;
    let data = input.game_data;
    let mut targets: BTreeSet<(i32, i32)> = BTreeSet::new();

    targets.extend(fight_targets(input).into_iter().map(|(t, _)| (t.x, t.y)));
    targets.extend(gather_targets(input).into_iter().map(|(t, ..)| (t.x, t.y)));
    targets.extend(craft_targets(input).into_iter().map(|(t, _)| (t.x, t.y)));
    if let Some(bank) = data.nearest_bank(state.x, state.y) {
        targets.insert((bank.x, bank.y));
    }
    targets.insert(input.safe_location);
    targets.remove(&state.position());

    targets
        .into_iter()
        .map(|(x, y)| move_action(input, x, y))
        .collect()
}

fn fight_actions(input: &CatalogInput<'_>) -> Vec<Action> {
    let state = input.state;
    let min_hp = ((f64::from(state.max_hp) * FIGHT_MIN_HP_FRACTION).ceil() as i64).max(1);

    fight_targets(input)
        .into_iter()
        .map(|(tile, code)| {
            Action::remote(format!("fight_{}", code), RemoteCall::Fight, FIGHT_COST)
                .at(tile.x, tile.y)
                .with_precondition(StateKey::Hp, Condition::AtLeast(min_hp))
                // One won fight is assumed to be worth a level
                .with_estimated_effect(StateKey::Level, Effect::Add(1))
        })
        .collect()
}

fn gather_actions(input: &CatalogInput<'_>) -> Vec<Action> {
    gather_targets(input)
        .into_iter()
        .map(|(tile, skill, code, drop)| {
            Action::remote(format!("gather_{}", code), RemoteCall::Gather, GATHER_COST)
                .at(tile.x, tile.y)
                .with_precondition(StateKey::InventoryFull, Condition::is_false())
                .with_effect(StateKey::item(&drop), Effect::Add(1))
                .with_estimated_effect(StateKey::SkillLevel(skill), Effect::Add(1))
        })
        .collect()
}

fn craft_actions(input: &CatalogInput<'_>) -> Vec<Action> {
    craft_targets(input)
        .into_iter()
        .filter_map(|(tile, item)| {
            let recipe = item.craft.as_ref()?;
            let call = RemoteCall::Craft { code: item.code.clone(), quantity: 1 };
            let mut action = Action::remote(format!("craft_{}", item.code), call, CRAFT_COST)
                .at(tile.x, tile.y)
                .with_precondition(
                    StateKey::SkillLevel(recipe.skill),
                    Condition::AtLeast(i64::from(recipe.level)),
                )
                .with_effect(StateKey::item(&item.code), Effect::Add(i64::from(recipe.quantity)))
                .with_estimated_effect(StateKey::SkillLevel(recipe.skill), Effect::Add(1));

            for material in &recipe.items {
                let quantity = i64::from(material.quantity);
                action = action
                    .with_precondition(StateKey::item(&material.code), Condition::AtLeast(quantity))
                    .with_effect(StateKey::item(&material.code), Effect::Add(-quantity));
            }
            Some(action)
        })
        .collect()
}

fn rest_actions(input: &CatalogInput<'_>) -> Vec<Action> {
    let state = input.state;
    if state.max_hp == 0 {
        return Vec::new();
    }
    vec![Action::remote("rest", RemoteCall::Rest, REST_COST)
        .with_precondition(StateKey::Hp, Condition::AtMost(i64::from(state.max_hp) - 1))
        .with_effect(StateKey::Hp, Effect::Set(state.max_hp.into()))]
}

fn bank_actions(input: &CatalogInput<'_>) -> Vec<Action> {
    let state = input.state;
    if state.inventory_count() == 0 {
        return Vec::new();
    }
    let Some(bank) = input.game_data.nearest_bank(state.x, state.y) else {
        return Vec::new();
    };

    let mut action = Action::remote("deposit_all", RemoteCall::DepositAll, BANK_COST)
        .at(bank.x, bank.y)
        .with_effect(StateKey::InventoryCount, Effect::Set(StateValue::Int(0)))
        .with_effect(StateKey::InventoryFull, Effect::Set(StateValue::Bool(false)));
    for code in state.inventory.keys() {
        action = action.with_effect(StateKey::item(code), Effect::Set(StateValue::Int(0)));
    }
    vec![action]
}

fn equipment_actions(input: &CatalogInput<'_>) -> Vec<Action> {
    let state = input.state;
    let data = input.game_data;

    let held = state.inventory.keys().cloned();
    let craftable = craft_targets(input).into_iter().map(|(_, item)| item.code.clone());
    let candidates: BTreeSet<String> = held
        .chain(craftable)
        .filter(|code| {
            data.items
                .get(code)
                .map(|item| item.is_weapon() && item.level <= state.level)
                .unwrap_or(false)
        })
        .filter(|code| state.weapon.as_deref() != Some(code.as_str()))
        .collect();

    let mut actions: Vec<Action> = candidates
        .into_iter()
        .map(|code| {
            let call = RemoteCall::Equip { code: code.clone(), slot: WEAPON_SLOT.to_string() };
            Action::remote(format!("equip_{}", code), call, EQUIP_COST)
                .with_precondition(StateKey::item(&code), Condition::AtLeast(1))
                .with_effect(StateKey::WeaponEquipped, Effect::Set(StateValue::Bool(true)))
                .with_effect(StateKey::item(&code), Effect::Add(-1))
        })
        .collect();

    if state.weapon.is_some() {
        let call = RemoteCall::Unequip { slot: WEAPON_SLOT.to_string() };
        actions.push(
            Action::remote("unequip_weapon", call, EQUIP_COST)
                .with_precondition(StateKey::WeaponEquipped, Condition::is_true())
                .with_precondition(StateKey::InventoryFull, Condition::is_false())
                .with_effect(StateKey::WeaponEquipped, Effect::Set(StateValue::Bool(false))),
        );
    }
    actions
}

fn wait_actions(input: &CatalogInput<'_>) -> Vec<Action> {
    if input.state.cooldown_ready {
        return Vec::new();
    }
    vec![Action::new("wait_for_cooldown", ActionKind::WaitForCooldown, WAIT_COST)
        .with_precondition(StateKey::CooldownReady, Condition::is_false())
        .with_effect(StateKey::CooldownReady, Effect::Set(StateValue::Bool(true)))]
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::api::*;
    use crate::state::Skill;

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
}

#[cfg(test)]
mod tests {
    use super::test_support::game_data;
    use super::*;
    use crate::state::world::test_support::state;

    fn names(actions: &[Action]) -> Vec<String> {
        actions.iter().map(|a| a.name.clone()).collect()
    }

    #[test]
    fn test_registry_ids_are_unique() {
        let catalog = ActionCatalog::new();
        assert_eq!(catalog.ids().len(), ACTION_REGISTRY.len());
        assert!(catalog.contains("fight"));
        assert!(!catalog.contains("teleport"));
    }

    #[test]
    fn test_actions_for_level_five() {
        let data = game_data();
        let snapshot = state(5, 80, 100);
        let input = CatalogInput { state: &snapshot, game_data: &data, safe_location: (4, 1) };
        let actions = ActionCatalog::new().actions_for(&input);
        let names = names(&actions);

        assert!(names.contains(&"fight_chicken".to_string()));
        assert!(!names.contains(&"fight_cow".to_string()));
        assert!(names.contains(&"move_0_1".to_string()));
        assert!(names.contains(&"gather_copper_rocks".to_string()));
        assert!(names.contains(&"craft_copper_dagger".to_string()));
        assert!(names.contains(&"rest".to_string()));
        assert!(names.contains(&"deposit_all".to_string()));
        assert!(names.contains(&"unequip_weapon".to_string()));
        assert!(!names.contains(&"wait_for_cooldown".to_string()));
        // No move to the tile the actor already stands on
        assert!(!names.contains(&"move_0_0".to_string()));
    }

    #[test]
    fn test_fight_requires_monster_tile() {
        let data = game_data();
        let snapshot = state(5, 80, 100);
        let input = CatalogInput { state: &snapshot, game_data: &data, safe_location: (4, 1) };
        let fight = ActionCatalog::new().find("fight_chicken", &input).unwrap();
        assert_eq!(fight.required_position(), Some((0, 1)));
        assert!(fight.requires_cooldown_ready());
    }

    #[test]
    fn test_craft_consumes_materials() {
        let data = game_data();
        let snapshot = state(5, 80, 100);
        let input = CatalogInput { state: &snapshot, game_data: &data, safe_location: (0, 0) };
        let craft = ActionCatalog::new().find("craft_copper_dagger", &input).unwrap();
        assert_eq!(
            craft.preconditions.get(&StateKey::item("copper_ore")),
            Some(&Condition::AtLeast(6))
        );
        assert_eq!(
            craft.effects.get(&StateKey::item("copper_ore")),
            Some(&Effect::Add(-6))
        );
    }

    #[test]
    fn test_wait_action_only_while_locked() {
        let data = game_data();
        let mut snapshot = state(5, 80, 100);
        snapshot.cooldown_ready = false;
        let input = CatalogInput { state: &snapshot, game_data: &data, safe_location: (0, 0) };
        let wait = ActionCatalog::new().find("wait_for_cooldown", &input).unwrap();
        assert!(!wait.is_remote());
        assert!(!wait.requires_cooldown_ready());
    }
}
