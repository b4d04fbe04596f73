//! Actions: catalog, types, and result deltas

pub mod catalog;
pub mod types;

pub use catalog::{
    move_action_name, ActionCatalog, ActionFactory, ActionRegistration, CatalogInput,
    ACTION_REGISTRY,
};
pub use types::{
    response_delta, Action, ActionKind, ActionResult, FailureKind, RemoteCall, SubGoalRequest,
    WEAPON_SLOT,
};
