//! World state snapshot and its key-value view
//!
//! [`WorldState`] is the typed snapshot the rest of the crate reads. The
//! planner, the effect verifier and persistence see it through a generic
//! [`StateMap`] keyed by the closed [`StateKey`] vocabulary; the mapping
//! between the two lives in this file only.

use crate::api::{CharacterData, ContentKind, MapTile};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Gathering and crafting skills
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Skill {
    Mining,
    Woodcutting,
    Fishing,
    Weaponcrafting,
    Gearcrafting,
    Jewelrycrafting,
    Cooking,
    Alchemy,
}

impl Skill {
    pub const ALL: [Skill; 8] = [
        Skill::Mining,
        Skill::Woodcutting,
        Skill::Fishing,
        Skill::Weaponcrafting,
        Skill::Gearcrafting,
        Skill::Jewelrycrafting,
        Skill::Cooking,
        Skill::Alchemy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Skill::Mining => "mining",
            Skill::Woodcutting => "woodcutting",
            Skill::Fishing => "fishing",
            Skill::Weaponcrafting => "weaponcrafting",
            Skill::Gearcrafting => "gearcrafting",
            Skill::Jewelrycrafting => "jewelrycrafting",
            Skill::Cooking => "cooking",
            Skill::Alchemy => "alchemy",
        }
    }

    pub fn parse(name: &str) -> Option<Skill> {
        Skill::ALL.iter().copied().find(|s| s.as_str() == name)
    }

    /// Skills levelled by gathering on a resource tile
    pub fn is_gathering(&self) -> bool {
        matches!(
            self,
            Skill::Mining | Skill::Woodcutting | Skill::Fishing | Skill::Alchemy
        )
    }
}

/// Closed vocabulary of planner-visible state keys
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StateKey {
    Level,
    Xp,
    MaxXp,
    Gold,
    Hp,
    MaxHp,
    X,
    Y,
    CooldownReady,
    InventoryCount,
    InventoryMax,
    InventoryFull,
    AtMonsterLocation,
    AtResourceLocation,
    AtWorkshop,
    AtBank,
    AtSafeLocation,
    CanFight,
    CanGather,
    CanCraft,
    CanRest,
    CanBank,
    WeaponEquipped,
    SkillLevel(Skill),
    Item(String),
}

/// Keys diffed between cache and a fresh fetch
pub const CRITICAL_KEYS: [StateKey; 6] = [
    StateKey::Level,
    StateKey::Hp,
    StateKey::X,
    StateKey::Y,
    StateKey::Gold,
    StateKey::CooldownReady,
];

const ITEM_PREFIX: &str = "item:";
const SKILL_SUFFIX: &str = "_level";

impl StateKey {
    /// Every key that is not parameterized by a skill or an item
    pub fn scalar_keys() -> Vec<StateKey> {
        use StateKey::*;
        vec![
            Level,
            Xp,
            MaxXp,
            Gold,
            Hp,
            MaxHp,
            X,
            Y,
            CooldownReady,
            InventoryCount,
            InventoryMax,
            InventoryFull,
            AtMonsterLocation,
            AtResourceLocation,
            AtWorkshop,
            AtBank,
            AtSafeLocation,
            CanFight,
            CanGather,
            CanCraft,
            CanRest,
            CanBank,
            WeaponEquipped,
        ]
    }

    /// String form used by the solver and persistence
    pub fn name(&self) -> String {
        use StateKey::*;
        let scalar = match self {
            Level => "level",
            Xp => "xp",
            MaxXp => "max_xp",
            Gold => "gold",
            Hp => "hp",
            MaxHp => "max_hp",
            X => "x",
            Y => "y",
            CooldownReady => "cooldown_ready",
            InventoryCount => "inventory_count",
            InventoryMax => "inventory_max",
            InventoryFull => "inventory_full",
            AtMonsterLocation => "at_monster_location",
            AtResourceLocation => "at_resource_location",
            AtWorkshop => "at_workshop",
            AtBank => "at_bank",
            AtSafeLocation => "at_safe_location",
            CanFight => "can_fight",
            CanGather => "can_gather",
            CanCraft => "can_craft",
            CanRest => "can_rest",
            CanBank => "can_bank",
            WeaponEquipped => "weapon_equipped",
            SkillLevel(skill) => return format!("{}{}", skill.as_str(), SKILL_SUFFIX),
            Item(code) => return format!("{}{}", ITEM_PREFIX, code),
        };
        scalar.to_string()
    }

    /// Inverse of [`StateKey::name`]
    pub fn parse(name: &str) -> Option<StateKey> {
        if let Some(code) = name.strip_prefix(ITEM_PREFIX) {
            return (!code.is_empty()).then(|| StateKey::Item(code.to_string()));
        }
        if let Some(skill) = name.strip_suffix(SKILL_SUFFIX).and_then(Skill::parse) {
            return Some(StateKey::SkillLevel(skill));
        }
        StateKey::scalar_keys().into_iter().find(|k| k.name() == name)
    }

    pub fn item(code: &str) -> StateKey {
        StateKey::Item(code.to_string())
    }

    /// Coordinates tolerate rounding from path-finding
    pub fn is_positional(&self) -> bool {
        matches!(self, StateKey::X | StateKey::Y)
    }

    /// Value assumed when a key is absent from a delta or view
    pub fn implicit_value(&self) -> Option<StateValue> {
        match self {
            StateKey::Item(_) => Some(StateValue::Int(0)),
            _ => None,
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for StateKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StateKey::parse(s).ok_or_else(|| format!("unknown state key '{}'", s))
    }
}

impl Serialize for StateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name())
    }
}

impl<'de> Deserialize<'de> for StateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        StateKey::parse(&name).ok_or_else(|| serde::de::Error::custom(format!("unknown state key '{}'", name)))
    }
}

/// Generic value in the key-value view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Bool(bool),
    Int(i64),
}

impl StateValue {
    /// Integer form used by the solver; booleans become 0/1
    pub fn as_i64(&self) -> i64 {
        match self {
            StateValue::Bool(b) => i64::from(*b),
            StateValue::Int(n) => *n,
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            StateValue::Bool(b) => *b,
            StateValue::Int(n) => *n != 0,
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Bool(b) => write!(f, "{}", b),
            StateValue::Int(n) => write!(f, "{}", n),
        }
    }
}

impl From<bool> for StateValue {
    fn from(value: bool) -> Self {
        StateValue::Bool(value)
    }
}

impl From<i64> for StateValue {
    fn from(value: i64) -> Self {
        StateValue::Int(value)
    }
}

impl From<i32> for StateValue {
    fn from(value: i32) -> Self {
        StateValue::Int(i64::from(value))
    }
}

impl From<u32> for StateValue {
    fn from(value: u32) -> Self {
        StateValue::Int(i64::from(value))
    }
}

impl From<u64> for StateValue {
    fn from(value: u64) -> Self {
        StateValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

/// Key-value view of a snapshot, and the shape of result deltas
pub type StateMap = BTreeMap<StateKey, StateValue>;

/// Flags derived from the content of the tile under the actor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationFlags {
    pub at_monster: bool,
    pub at_resource: bool,
    pub at_workshop: bool,
    pub at_bank: bool,
    pub at_safe: bool,
}

impl LocationFlags {
    pub fn from_tile(tile: Option<&MapTile>, x: i32, y: i32, safe: (i32, i32)) -> Self {
        let has = |kind: ContentKind| tile.map(|t| t.has_kind(kind)).unwrap_or(false);
        Self {
            at_monster: has(ContentKind::Monster),
            at_resource: has(ContentKind::Resource),
            at_workshop: has(ContentKind::Workshop),
            at_bank: has(ContentKind::Bank),
            at_safe: (x, y) == safe,
        }
    }
}

/// What the actor can do right now without moving
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub can_fight: bool,
    pub can_gather: bool,
    pub can_craft: bool,
    pub can_rest: bool,
    pub can_bank: bool,
}

impl Capabilities {
    /// No flag set at all usually means the snapshot is stale
    pub fn any(&self) -> bool {
        self.can_fight || self.can_gather || self.can_craft || self.can_rest || self.can_bank
    }
}

/// Point-in-time snapshot of one actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    pub name: String,
    pub level: u32,
    pub xp: u64,
    pub max_xp: u64,
    pub gold: u64,
    pub hp: u32,
    pub max_hp: u32,
    pub x: i32,
    pub y: i32,
    pub cooldown_ready: bool,
    pub cooldown_expiration: Option<DateTime<Utc>>,
    pub skills: BTreeMap<Skill, u32>,
    pub inventory: BTreeMap<String, u32>,
    pub inventory_max_items: u32,
    pub weapon: Option<String>,
    pub location: LocationFlags,
    pub capabilities: Capabilities,
    /// Content code of the tile under the actor
    pub location_content: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl WorldState {
    /// Build a snapshot from a character payload and the tile it stands on
    pub fn from_character(
        character: &CharacterData,
        tile: Option<&MapTile>,
        safe_location: (i32, i32),
        now: DateTime<Utc>,
    ) -> Self {
        let cooldown_ready = match character.cooldown_expiration {
            Some(expiration) => expiration <= now,
            None => character.cooldown == 0,
        };

        let skills = Skill::ALL
            .iter()
            .map(|s| (*s, character.skill_level(*s)))
            .collect();

        let inventory = character.item_counts().into_iter().collect();

        let mut state = Self {
            name: character.name.clone(),
            level: character.level,
            xp: character.xp,
            max_xp: character.max_xp,
            gold: character.gold,
            max_hp: character.max_hp,
            hp: character.hp.min(character.max_hp),
            x: character.x,
            y: character.y,
            cooldown_ready,
            cooldown_expiration: character.cooldown_expiration,
            skills,
            inventory,
            inventory_max_items: character.inventory_max_items,
            weapon: Some(character.weapon_slot.clone()).filter(|w| !w.is_empty()),
            location: LocationFlags::from_tile(tile, character.x, character.y, safe_location),
            capabilities: Capabilities::default(),
            location_content: tile.and_then(|t| t.content_code()).map(str::to_string),
            fetched_at: now,
        };
        state.capabilities = state.derive_capabilities();
        state
    }

    fn derive_capabilities(&self) -> Capabilities {
        Capabilities {
            can_fight: self.location.at_monster && self.hp > 0,
            can_gather: self.location.at_resource && !self.inventory_full(),
            can_craft: self.location.at_workshop,
            can_rest: self.hp < self.max_hp,
            can_bank: self.location.at_bank,
        }
    }

    pub fn position(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    /// hp / max_hp, 0.0 for a zero max
    pub fn hp_fraction(&self) -> f64 {
        if self.max_hp == 0 {
            0.0
        } else {
            f64::from(self.hp) / f64::from(self.max_hp)
        }
    }

    pub fn skill_level(&self, skill: Skill) -> u32 {
        self.skills.get(&skill).copied().unwrap_or(0)
    }

    pub fn item_count(&self, code: &str) -> u32 {
        self.inventory.get(code).copied().unwrap_or(0)
    }

    pub fn inventory_count(&self) -> u32 {
        self.inventory.values().sum()
    }

    pub fn inventory_full(&self) -> bool {
        self.inventory_max_items > 0 && self.inventory_count() >= self.inventory_max_items
    }

    /// Free inventory capacity as a fraction of the maximum
    pub fn inventory_slack(&self) -> f64 {
        if self.inventory_max_items == 0 {
            return 0.0;
        }
        let free = self.inventory_max_items.saturating_sub(self.inventory_count());
        f64::from(free) / f64::from(self.inventory_max_items)
    }

    /// Time left until the server accepts the next action
    pub fn cooldown_remaining(&self, now: DateTime<Utc>) -> Duration {
        match self.cooldown_expiration {
            Some(expiration) if expiration > now => (expiration - now).to_std().unwrap_or_default(),
            _ => Duration::ZERO,
        }
    }

    /// Whether the actor is locked at `now`
    pub fn is_on_cooldown(&self, now: DateTime<Utc>) -> bool {
        !self.cooldown_remaining(now).is_zero() || (!self.cooldown_ready && self.cooldown_expiration.is_none())
    }

    /// Value of a single key
    pub fn get(&self, key: &StateKey) -> Option<StateValue> {
        use StateKey::*;
        let value: StateValue = match key {
            Level => self.level.into(),
            Xp => self.xp.into(),
            MaxXp => self.max_xp.into(),
            Gold => self.gold.into(),
            Hp => self.hp.into(),
            MaxHp => self.max_hp.into(),
            X => self.x.into(),
            Y => self.y.into(),
            CooldownReady => self.cooldown_ready.into(),
            InventoryCount => self.inventory_count().into(),
            InventoryMax => self.inventory_max_items.into(),
            InventoryFull => self.inventory_full().into(),
            AtMonsterLocation => self.location.at_monster.into(),
            AtResourceLocation => self.location.at_resource.into(),
            AtWorkshop => self.location.at_workshop.into(),
            AtBank => self.location.at_bank.into(),
            AtSafeLocation => self.location.at_safe.into(),
            CanFight => self.capabilities.can_fight.into(),
            CanGather => self.capabilities.can_gather.into(),
            CanCraft => self.capabilities.can_craft.into(),
            CanRest => self.capabilities.can_rest.into(),
            CanBank => self.capabilities.can_bank.into(),
            WeaponEquipped => self.weapon.is_some().into(),
            SkillLevel(skill) => self.skill_level(*skill).into(),
            Item(code) => self.item_count(code).into(),
        };
        Some(value)
    }

    /// Full key-value view: every scalar key, every skill, every held item
    pub fn to_state_map(&self) -> StateMap {
        let mut map = StateMap::new();
        let keys = StateKey::scalar_keys()
            .into_iter()
            .chain(Skill::ALL.iter().map(|s| StateKey::SkillLevel(*s)))
            .chain(self.inventory.keys().map(|code| StateKey::item(code)));
        for key in keys {
            if let Some(value) = self.get(&key) {
                map.insert(key, value);
            }
        }
        map
    }

    /// New snapshot with a delta merged in by key
    ///
    /// Derived keys (inventory count/full, capability flags) are recomputed
    /// from the merged fields rather than taken from the delta.
    pub fn with_delta(&self, delta: &StateMap) -> WorldState {
        use StateKey::*;
        let mut next = self.clone();

        for (key, value) in delta {
            let n = value.as_i64();
            match key {
                Level => next.level = clamp_u32(n),
                Xp => next.xp = n.max(0) as u64,
                MaxXp => next.max_xp = n.max(0) as u64,
                Gold => next.gold = n.max(0) as u64,
                Hp => next.hp = clamp_u32(n),
                MaxHp => next.max_hp = clamp_u32(n),
                X => next.x = n.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
                Y => next.y = n.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
                CooldownReady => next.cooldown_ready = value.as_bool(),
                InventoryMax => next.inventory_max_items = clamp_u32(n),
                AtMonsterLocation => next.location.at_monster = value.as_bool(),
                AtResourceLocation => next.location.at_resource = value.as_bool(),
                AtWorkshop => next.location.at_workshop = value.as_bool(),
                AtBank => next.location.at_bank = value.as_bool(),
                AtSafeLocation => next.location.at_safe = value.as_bool(),
                SkillLevel(skill) => {
                    next.skills.insert(*skill, clamp_u32(n));
                }
                Item(code) => {
                    if n > 0 {
                        next.inventory.insert(code.clone(), clamp_u32(n));
                    } else {
                        next.inventory.remove(code);
                    }
                }
                WeaponEquipped => {
                    if !value.as_bool() {
                        next.weapon = None;
                    }
                }
                InventoryCount | InventoryFull | CanFight | CanGather | CanCraft | CanRest
                | CanBank => {}
            }
        }

        next.hp = next.hp.min(next.max_hp);
        next.capabilities = next.derive_capabilities();
        next
    }
}

fn clamp_u32(n: i64) -> u32 {
    n.clamp(0, i64::from(u32::MAX)) as u32
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::api::InventorySlot;

    /// Character payload used across unit tests
    pub fn character(level: u32, hp: u32, max_hp: u32) -> CharacterData {
        CharacterData {
            name: "ada".to_string(),
            level,
            xp: 0,
            max_xp: 150,
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
            inventory: vec![InventorySlot {
                slot: 1,
                code: "copper_ore".to_string(),
                quantity: 3,
            }],
            inventory_max_items: 100,
            weapon_slot: "wooden_stick".to_string(),
        }
    }

    pub fn state(level: u32, hp: u32, max_hp: u32) -> WorldState {
        WorldState::from_character(&character(level, hp, max_hp), None, (0, 0), Utc::now())
    }
}
