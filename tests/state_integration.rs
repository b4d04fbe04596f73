//! State manager integration tests over a JSON snapshot store

mod common;

use common::{character, game_data, FakeWorld, ACTOR};
use goalrunner::actions::ActionResult;
use goalrunner::api::WorldApi;
use goalrunner::state::{
    JsonStateStore, StateConfig, StateKey, StateManager, StateMap, StateStore, StateValue,
};
use goalrunner::BotError;
use std::sync::Arc;
use tempfile::TempDir;

fn manager(world: Arc<FakeWorld>, dir: &TempDir) -> (StateManager, Arc<JsonStateStore>) {
    let store = Arc::new(JsonStateStore::new(dir.path().join("state")).unwrap());
    let api: Arc<dyn WorldApi> = world;
    let states = StateManager::new(
        ACTOR,
        api,
        store.clone(),
        Arc::new(game_data()),
        StateConfig::default(),
    );
    (states, store)
}

#[tokio::test]
async fn test_force_refresh_persists_to_disk() {
    let dir = TempDir::new().unwrap();
    let (mut states, store) = manager(Arc::new(FakeWorld::new(character(4, 70, 100))), &dir);

    assert!(states.load_persisted().unwrap().is_none());
    let fresh = states.force_refresh().await.unwrap();

    assert_eq!(store.load(ACTOR).unwrap(), Some(fresh.clone()));
    assert_eq!(states.load_persisted().unwrap(), Some(fresh));
}

#[tokio::test]
async fn test_persisted_snapshot_survives_a_new_manager() {
    let dir = TempDir::new().unwrap();
    let world = Arc::new(FakeWorld::new(character(4, 70, 100)));

    let (mut first, _) = manager(world.clone(), &dir);
    first.get_current_state().await.unwrap();
    first.persist().unwrap();

    let (second, _) = manager(world, &dir);
    let previous = second.load_persisted().unwrap().unwrap();
    assert_eq!(previous.level, 4);
    assert_eq!(previous.hp, 70);
    assert!(second.get_cached_state().is_none());
}

#[tokio::test]
async fn test_result_without_cooldown_merges_into_cache() {
    let dir = TempDir::new().unwrap();
    let world = Arc::new(FakeWorld::new(character(2, 50, 100)));
    let (mut states, _) = manager(world.clone(), &dir);
    states.get_current_state().await.unwrap();
    let reads = world.total_calls();

    let mut changes = StateMap::new();
    changes.insert(StateKey::Hp, StateValue::Int(100));
    let result = ActionResult::success("rest", "ok", changes, 0.0);
    let merged = states.apply_result(&result).await.unwrap();

    assert_eq!(merged.hp, 100);
    assert_eq!(states.get_cached_state().unwrap().hp, 100);
    assert_eq!(world.total_calls(), reads);
}

#[tokio::test]
async fn test_result_with_cooldown_refetches() {
    let dir = TempDir::new().unwrap();
    let world = Arc::new(FakeWorld::new(character(2, 50, 100)));
    let (mut states, _) = manager(world.clone(), &dir);
    states.get_current_state().await.unwrap();
    let reads = world.total_calls();

    let mut changes = StateMap::new();
    changes.insert(StateKey::Hp, StateValue::Int(100));
    let result = ActionResult::success("rest", "ok", changes, 3.0);
    let refreshed = states.apply_result(&result).await.unwrap();

    // The server still reports 50, and the refetch wins over the delta
    assert_eq!(refreshed.hp, 50);
    assert!(world.total_calls() > reads);
}

#[tokio::test]
async fn test_cache_divergence_is_reported() {
    let dir = TempDir::new().unwrap();
    let world = Arc::new(FakeWorld::new(character(2, 50, 100)));
    let (mut states, _) = manager(world.clone(), &dir);
    states.get_current_state().await.unwrap();

    let report = states.validate_consistency(None).await.unwrap();
    assert!(report.consistent);

    let mut changes = StateMap::new();
    changes.insert(StateKey::Hp, StateValue::Int(90));
    states
        .apply_result(&ActionResult::success("rest", "ok", changes, 0.0))
        .await
        .unwrap();

    let report = states.validate_consistency(None).await.unwrap();
    assert!(!report.consistent);
    assert!(report.issues.iter().any(|i| i.starts_with("hp")));
}

#[test]
fn test_goal_context_requires_cached_state() {
    let dir = TempDir::new().unwrap();
    let (mut states, _) = manager(Arc::new(FakeWorld::new(character(2, 50, 100))), &dir);

    let err = states.create_goal_factory_context("craft_copper_dagger", 1, 3).unwrap_err();
    assert!(matches!(err, BotError::NoCachedState(_)));

    tokio_test::block_on(states.get_current_state()).unwrap();
    let context = states.create_goal_factory_context("craft_copper_dagger", 1, 3).unwrap();
    assert_eq!(context.parent_goal_type, "craft_copper_dagger");
    assert_eq!(context.remaining_depth(), 2);
    assert!(!context.is_at_limit());
}
