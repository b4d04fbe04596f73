//! World state: typed snapshot, key-value view, manager and durable cache

pub mod cache;
pub mod conditions;
pub mod context;
pub mod manager;
pub mod world;

pub use cache::{JsonStateStore, StateStore};
pub use conditions::{Condition, ConditionMap, Effect, EffectMap};
pub use context::GoalFactoryContext;
pub use manager::{ConsistencyReport, StateConfig, StateManager};
pub use world::{Capabilities, LocationFlags, Skill, StateKey, StateMap, StateValue, WorldState, CRITICAL_KEYS};
