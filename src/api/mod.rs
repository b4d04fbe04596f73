//! Remote world API
//!
//! The controller talks to the game only through [`WorldApi`]. Every action
//! endpoint answers with an [`ActionResponse`] carrying the new character
//! payload and the cooldown it imposed.

pub mod client;
pub mod error;
pub mod types;

pub use client::HttpWorldApi;
pub use error::ApiError;
pub use types::{
    ActionResponse, CharacterData, ContentKind, CooldownInfo, CraftRecipe, DropInfo,
    FightOutcome, FightResult, GameData, InventorySlot, ItemInfo, MapContent, MapTile,
    MonsterInfo, RecipeItem, ResourceInfo,
};

use async_trait::async_trait;

/// Result alias for world API calls
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Operations the remote world exposes for one character
#[async_trait]
pub trait WorldApi: Send + Sync {
    /// Fetch the full character payload
    async fn get_character(&self, name: &str) -> ApiResult<CharacterData>;

    /// Fetch the tile at a coordinate
    async fn get_map_tile(&self, x: i32, y: i32) -> ApiResult<MapTile>;

    /// Fetch maps, monsters, resources and items in one go
    async fn load_game_data(&self) -> ApiResult<GameData>;

    async fn move_character(&self, name: &str, x: i32, y: i32) -> ApiResult<ActionResponse>;

    async fn fight(&self, name: &str) -> ApiResult<ActionResponse>;

    async fn gather(&self, name: &str) -> ApiResult<ActionResponse>;

    async fn craft(&self, name: &str, code: &str, quantity: u32) -> ApiResult<ActionResponse>;

    async fn rest(&self, name: &str) -> ApiResult<ActionResponse>;

    async fn equip(&self, name: &str, code: &str, slot: &str) -> ApiResult<ActionResponse>;

    async fn unequip(&self, name: &str, slot: &str) -> ApiResult<ActionResponse>;

    /// Deposit several stacks into the bank in a single action
    async fn deposit_items(&self, name: &str, items: &[(String, u32)]) -> ApiResult<ActionResponse>;
}
