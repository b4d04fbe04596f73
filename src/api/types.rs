//! Wire-level data returned by the world API
//!
//! These mirror the JSON payloads closely; the typed [`WorldState`] is built
//! from them by the state manager.
//!
//! [`WorldState`]: crate::state::WorldState

use crate::state::Skill;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One inventory slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySlot {
    #[serde(default)]
    pub slot: u32,
    pub code: String,
    pub quantity: u32,
}

/// Character payload from `/characters/{name}` and every action response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterData {
    pub name: String,
    pub level: u32,
    #[serde(default)]
    pub xp: u64,
    #[serde(default)]
    pub max_xp: u64,
    #[serde(default)]
    pub gold: u64,
    pub hp: u32,
    pub max_hp: u32,
    pub x: i32,
    pub y: i32,

    /// Seconds of cooldown remaining when the payload was produced
    #[serde(default)]
    pub cooldown: u64,
    #[serde(default)]
    pub cooldown_expiration: Option<DateTime<Utc>>,

    #[serde(default)]
    pub mining_level: u32,
    #[serde(default)]
    pub woodcutting_level: u32,
    #[serde(default)]
    pub fishing_level: u32,
    #[serde(default)]
    pub weaponcrafting_level: u32,
    #[serde(default)]
    pub gearcrafting_level: u32,
    #[serde(default)]
    pub jewelrycrafting_level: u32,
    #[serde(default)]
    pub cooking_level: u32,
    #[serde(default)]
    pub alchemy_level: u32,

    #[serde(default)]
    pub inventory: Vec<InventorySlot>,
    #[serde(default = "default_inventory_max_items")]
    pub inventory_max_items: u32,

    /// Code of the equipped weapon, empty when nothing is equipped
    #[serde(default)]
    pub weapon_slot: String,
}

fn default_inventory_max_items() -> u32 {
    100
}

impl CharacterData {
    /// Level of one gathering or crafting skill
    pub fn skill_level(&self, skill: Skill) -> u32 {
        match skill {
            Skill::Mining => self.mining_level,
            Skill::Woodcutting => self.woodcutting_level,
            Skill::Fishing => self.fishing_level,
            Skill::Weaponcrafting => self.weaponcrafting_level,
            Skill::Gearcrafting => self.gearcrafting_level,
            Skill::Jewelrycrafting => self.jewelrycrafting_level,
            Skill::Cooking => self.cooking_level,
            Skill::Alchemy => self.alchemy_level,
        }
    }

    /// Non-empty slots folded into item counts
    pub fn item_counts(&self) -> HashMap<String, u32> {
        let mut counts = HashMap::new();
        for slot in self.inventory.iter().filter(|s| !s.code.is_empty() && s.quantity > 0) {
            *counts.entry(slot.code.clone()).or_insert(0) += slot.quantity;
        }
        counts
    }
}

/// Kind of content a map tile holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Monster,
    Resource,
    Workshop,
    Bank,
    GrandExchange,
    TasksMaster,
    #[serde(other)]
    Other,
}

/// Content placed on a map tile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapContent {
    #[serde(rename = "type")]
    pub kind: ContentKind,
    pub code: String,
}

/// One map tile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapTile {
    #[serde(default)]
    pub name: String,
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub content: Option<MapContent>,
}

impl MapTile {
    pub fn empty(x: i32, y: i32) -> Self {
        Self {
            name: String::new(),
            x,
            y,
            content: None,
        }
    }

    pub fn with_content(x: i32, y: i32, kind: ContentKind, code: &str) -> Self {
        Self {
            name: String::new(),
            x,
            y,
            content: Some(MapContent {
                kind,
                code: code.to_string(),
            }),
        }
    }

    pub fn has_kind(&self, kind: ContentKind) -> bool {
        self.content.as_ref().map(|c| c.kind == kind).unwrap_or(false)
    }

    pub fn content_code(&self) -> Option<&str> {
        self.content.as_ref().map(|c| c.code.as_str())
    }

    /// Manhattan distance to a coordinate
    pub fn distance_to(&self, x: i32, y: i32) -> u32 {
        self.x.abs_diff(x) + self.y.abs_diff(y)
    }
}

/// Cooldown block attached to every action response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CooldownInfo {
    #[serde(default)]
    pub total_seconds: u64,
    #[serde(default)]
    pub remaining_seconds: u64,
    #[serde(default)]
    pub expiration: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reason: String,
}

impl CooldownInfo {
    pub fn none() -> Self {
        Self {
            total_seconds: 0,
            remaining_seconds: 0,
            expiration: None,
            reason: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FightResult {
    Win,
    Loss,
}

/// Fight summary attached to fight responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FightOutcome {
    pub result: FightResult,
    #[serde(default)]
    pub xp: u64,
    #[serde(default)]
    pub gold: u64,
}

/// Payload of every action endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub cooldown: CooldownInfo,
    pub character: CharacterData,
    #[serde(default)]
    pub destination: Option<MapTile>,
    #[serde(default)]
    pub fight: Option<FightOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonsterInfo {
    pub code: String,
    pub level: u32,
    #[serde(default)]
    pub hp: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropInfo {
    pub code: String,
    #[serde(default)]
    pub rate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub code: String,
    pub skill: Skill,
    pub level: u32,
    #[serde(default)]
    pub drops: Vec<DropInfo>,
}

impl ResourceInfo {
    /// Main drop; the first listed drop is the guaranteed one
    pub fn primary_drop(&self) -> Option<&str> {
        self.drops.first().map(|d| d.code.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeItem {
    pub code: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CraftRecipe {
    pub skill: Skill,
    pub level: u32,
    #[serde(default)]
    pub items: Vec<RecipeItem>,
    #[serde(default = "default_craft_quantity")]
    pub quantity: u32,
}

fn default_craft_quantity() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemInfo {
    pub code: String,
    pub level: u32,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub craft: Option<CraftRecipe>,
}

impl ItemInfo {
    pub fn is_weapon(&self) -> bool {
        self.kind == "weapon"
    }
}

/// Static game data loaded once at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameData {
    pub maps: Vec<MapTile>,
    pub monsters: HashMap<String, MonsterInfo>,
    pub resources: HashMap<String, ResourceInfo>,
    pub items: HashMap<String, ItemInfo>,
}

impl GameData {
    /// Manhattan distance across the bounding box of all known tiles
    pub fn span(&self) -> u32 {
        let (Some(min_x), Some(max_x)) = (
            self.maps.iter().map(|t| t.x).min(),
            self.maps.iter().map(|t| t.x).max(),
        ) else {
            return 0;
        };
        let min_y = self.maps.iter().map(|t| t.y).min().unwrap_or(0);
        let max_y = self.maps.iter().map(|t| t.y).max().unwrap_or(0);
        min_x.abs_diff(max_x) + min_y.abs_diff(max_y)
    }

    pub fn tile_at(&self, x: i32, y: i32) -> Option<&MapTile> {
        self.maps.iter().find(|t| t.x == x && t.y == y)
    }

    /// Closest tile of a kind that also passes `filter`; ties go to the
    /// lexicographically smaller coordinate so results are stable.
    pub fn nearest<F>(&self, kind: ContentKind, x: i32, y: i32, filter: F) -> Option<&MapTile>
    where
        F: Fn(&MapTile) -> bool,
    {
        self.maps
            .iter()
            .filter(|t| t.has_kind(kind) && filter(t))
            .min_by_key(|t| (t.distance_to(x, y), t.x, t.y))
    }

    /// Closest monster whose level does not exceed `max_level`, preferring
    /// the strongest such monster.
    pub fn nearest_monster_for_level(&self, max_level: u32, x: i32, y: i32) -> Option<&MapTile> {
        let best_level = self
            .monsters
            .values()
            .filter(|m| m.level <= max_level)
            .map(|m| m.level)
            .max()?;
        self.nearest(ContentKind::Monster, x, y, |tile| {
            tile.content_code()
                .and_then(|code| self.monsters.get(code))
                .map(|m| m.level == best_level)
                .unwrap_or(false)
        })
    }

    /// Closest resource tile of a skill the actor can gather
    pub fn nearest_resource_for_skill(
        &self,
        skill: Skill,
        skill_level: u32,
        x: i32,
        y: i32,
    ) -> Option<&MapTile> {
        self.nearest(ContentKind::Resource, x, y, |tile| {
            tile.content_code()
                .and_then(|code| self.resources.get(code))
                .map(|r| r.skill == skill && r.level <= skill_level)
                .unwrap_or(false)
        })
    }

    /// Closest resource tile that drops `item`
    pub fn nearest_resource_dropping(&self, item: &str, x: i32, y: i32) -> Option<&MapTile> {
        self.nearest(ContentKind::Resource, x, y, |tile| {
            tile.content_code()
                .and_then(|code| self.resources.get(code))
                .map(|r| r.primary_drop() == Some(item))
                .unwrap_or(false)
        })
    }

    pub fn nearest_workshop(&self, skill: Skill, x: i32, y: i32) -> Option<&MapTile> {
        self.nearest(ContentKind::Workshop, x, y, |tile| {
            tile.content_code() == Some(skill.as_str())
        })
    }

    pub fn nearest_bank(&self, x: i32, y: i32) -> Option<&MapTile> {
        self.nearest(ContentKind::Bank, x, y, |_| true)
    }

    pub fn resource_for_tile(&self, tile: &MapTile) -> Option<&ResourceInfo> {
        tile.content_code().and_then(|code| self.resources.get(code))
    }

    pub fn monster_for_tile(&self, tile: &MapTile) -> Option<&MonsterInfo> {
        tile.content_code().and_then(|code| self.monsters.get(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_data() -> GameData {
        let mut data = GameData::default();
        data.maps = vec![
            MapTile::with_content(0, 1, ContentKind::Monster, "chicken"),
            MapTile::with_content(3, 1, ContentKind::Monster, "cow"),
            MapTile::with_content(2, 0, ContentKind::Resource, "copper_rocks"),
            MapTile::with_content(4, 1, ContentKind::Bank, "bank"),
            MapTile::with_content(1, 5, ContentKind::Workshop, "weaponcrafting"),
        ];
        data.monsters.insert(
            "chicken".to_string(),
            MonsterInfo { code: "chicken".to_string(), level: 1, hp: 60 },
        );
        data.monsters.insert(
            "cow".to_string(),
            MonsterInfo { code: "cow".to_string(), level: 8, hp: 150 },
        );
        data.resources.insert(
            "copper_rocks".to_string(),
            ResourceInfo {
                code: "copper_rocks".to_string(),
                skill: Skill::Mining,
                level: 1,
                drops: vec![DropInfo { code: "copper_ore".to_string(), rate: 1 }],
            },
        );
        data
    }

    #[test]
    fn test_span_covers_bounding_box() {
        assert_eq!(sample_data().span(), 4 + 5);
        assert_eq!(GameData::default().span(), 0);
    }

    #[test]
    fn test_character_payload_defaults() {
        let json = r#"{"name":"ada","level":3,"hp":90,"max_hp":120,"x":0,"y":0,
            "inventory":[{"slot":1,"code":"copper_ore","quantity":4},{"slot":2,"code":"","quantity":0}]}"#;
        let character: CharacterData = serde_json::from_str(json).unwrap();
        assert_eq!(character.inventory_max_items, 100);
        assert_eq!(character.item_counts().get("copper_ore"), Some(&4));
        assert_eq!(character.item_counts().len(), 1);
    }

    #[test]
    fn test_unknown_content_kind() {
        let json = r#"{"x":1,"y":1,"content":{"type":"npc","code":"merchant"}}"#;
        let tile: MapTile = serde_json::from_str(json).unwrap();
        assert!(tile.has_kind(ContentKind::Other));
    }

    #[test]
    fn test_monster_selection_respects_level() {
        let data = sample_data();
        let tile = data.nearest_monster_for_level(5, 0, 0).unwrap();
        assert_eq!(tile.content_code(), Some("chicken"));

        let tile = data.nearest_monster_for_level(10, 0, 0).unwrap();
        assert_eq!(tile.content_code(), Some("cow"));

        assert!(data.nearest_monster_for_level(0, 0, 0).is_none());
    }

    #[test]
    fn test_resource_and_workshop_lookup() {
        let data = sample_data();
        assert!(data.nearest_resource_for_skill(Skill::Mining, 1, 0, 0).is_some());
        assert!(data.nearest_resource_for_skill(Skill::Fishing, 10, 0, 0).is_none());
        assert_eq!(
            data.nearest_resource_dropping("copper_ore", 0, 0).map(|t| (t.x, t.y)),
            Some((2, 0))
        );
        assert!(data.nearest_workshop(Skill::Weaponcrafting, 0, 0).is_some());
        assert_eq!(data.nearest_bank(0, 0).map(|t| (t.x, t.y)), Some((4, 1)));
    }
}
