//! Recursive sub-goal expansion integration tests

mod common;

use common::{character, fast_executor_config, Harness};
use goalrunner::actions::{Action, FailureKind, RemoteCall};
use goalrunner::api::ApiError;
use goalrunner::state::{Condition, StateConfig, StateKey};
use goalrunner::BotError;

fn dagger_recipe(h: &Harness, state: &goalrunner::state::WorldState) -> Action {
    h.goals
        .available_actions(state)
        .into_iter()
        .find(|a| a.name == "craft_copper_dagger")
        .expect("craft action offered")
}

#[tokio::test]
async fn test_craft_expands_gather_and_travel() {
    let mut h = Harness::new(character(1, 100, 100));
    let state = h.states.get_current_state().await.unwrap();
    let craft = dagger_recipe(&h, &state);

    let result = h
        .executor
        .execute_action_with_subgoals(&craft, &state, &h.goals, &mut h.states, 0)
        .await
        .unwrap();

    assert!(result.success, "{}", result.message);

    let mut expected = vec!["move(2, 0)".to_string()];
    expected.extend(std::iter::repeat("gather".to_string()).take(6));
    expected.push("move(1, 5)".to_string());
    expected.push("craft(copper_dagger)".to_string());
    assert_eq!(h.world.calls(), expected);

    assert_eq!(h.world.item_count("copper_dagger"), 1);
    assert_eq!(h.world.item_count("copper_ore"), 0);
    assert_eq!(h.executor.telemetry().stats().subgoals_spawned, 2);

    // Nested plans refresh and persist the snapshot they end on
    let persisted = h.store.saved("ada").unwrap();
    assert_eq!(persisted.position(), (1, 5));
}

#[tokio::test]
async fn test_depth_beyond_maximum_fails_before_any_call() {
    let mut h = Harness::new(character(1, 100, 100));
    let state = h.states.get_current_state().await.unwrap();
    let craft = dagger_recipe(&h, &state);
    let max = h.executor.config().max_subgoal_depth;
    let calls_before = h.world.total_calls();

    let err = h
        .executor
        .execute_action_with_subgoals(&craft, &state, &h.goals, &mut h.states, max + 1)
        .await
        .unwrap_err();

    match &err {
        BotError::MaxDepthExceeded { depth, max_depth } => {
            assert_eq!(*depth, max + 1);
            assert_eq!(*max_depth, max);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(err.is_fatal_for_chain());
    assert_eq!(h.world.total_calls(), calls_before);
}

#[tokio::test]
async fn test_failure_at_depth_limit_is_returned_unexpanded() {
    let mut config = fast_executor_config();
    config.max_subgoal_depth = 0;
    let mut h = Harness::with_configs(character(1, 100, 100), StateConfig::default(), config);
    let state = h.states.get_current_state().await.unwrap();
    let craft = dagger_recipe(&h, &state);

    let result = h
        .executor
        .execute_action_with_subgoals(&craft, &state, &h.goals, &mut h.states, 0)
        .await
        .unwrap();

    assert_eq!(result.failure, Some(FailureKind::PreconditionNotMet));
    assert!(result.has_subgoals());
    assert_eq!(h.world.action_calls(), 0);
    assert_eq!(h.executor.telemetry().stats().subgoals_spawned, 0);
}

#[tokio::test]
async fn test_unplannable_subgoal_is_skipped() {
    let mut h = Harness::new(character(1, 100, 100));
    let state = h.states.get_current_state().await.unwrap();
    let forge = Action::remote(
        "craft_mythril_sword",
        RemoteCall::Craft { code: "mythril_sword".to_string(), quantity: 1 },
        3,
    )
    .with_precondition(StateKey::item("mythril_bar"), Condition::AtLeast(2));

    let result = h
        .executor
        .execute_action_with_subgoals(&forge, &state, &h.goals, &mut h.states, 0)
        .await
        .unwrap();

    assert_eq!(result.failure, Some(FailureKind::PreconditionNotMet));
    assert_eq!(result.attempts, 0);
    assert_eq!(h.world.action_calls(), 0);
}

#[tokio::test]
async fn test_network_fault_in_subgoal_is_wrapped() {
    let mut h = Harness::new(character(1, 100, 100));
    let state = h.states.get_current_state().await.unwrap();
    let craft = dagger_recipe(&h, &state);

    h.world.fail_next(ApiError::Transport("connection reset".to_string()));
    let err = h
        .executor
        .execute_action_with_subgoals(&craft, &state, &h.goals, &mut h.states, 0)
        .await
        .unwrap_err();

    match &err {
        BotError::SubGoalFailed { parent_action, goal_type, depth, .. } => {
            assert_eq!(parent_action, "craft_copper_dagger");
            assert_eq!(goal_type, "gather_materials(copper_ore x6)");
            assert_eq!(*depth, 1);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(err.is_network_class());
    assert_eq!(h.world.calls(), vec!["move(2, 0)"]);
}

#[tokio::test]
async fn test_transition_check_bounds_displacement() {
    let config = StateConfig {
        max_subgoal_displacement: 10,
        ..StateConfig::default()
    };
    let mut h = Harness::with_configs(character(1, 100, 100), config, fast_executor_config());
    let pre = h.states.get_current_state().await.unwrap();

    let mut far = pre.clone();
    far.x = 20;
    far.y = 20;
    let err = h
        .states
        .validate_recursive_state_transition(&pre, &far, 1)
        .unwrap_err();
    assert!(matches!(err, BotError::StateConsistency { depth: 1, .. }));
    assert!(err.is_fatal_for_chain());

    let mut near = pre.clone();
    near.x = 3;
    near.y = 4;
    assert!(h.states.validate_recursive_state_transition(&pre, &near, 1).is_ok());
}

#[tokio::test]
async fn test_walk_across_known_map_passes_tight_bound() {
    let config = StateConfig {
        max_subgoal_displacement: 1,
        ..StateConfig::default()
    };
    let mut h = Harness::with_configs(character(1, 100, 100), config, fast_executor_config());
    let pre = h.states.get_current_state().await.unwrap();
    assert_eq!(h.states.displacement_limit(), 10);

    // Ash tree at (-1, 0) to the workshop at (1, 5)
    let mut start = pre.clone();
    start.x = -1;
    let mut workshop = pre.clone();
    workshop.x = 1;
    workshop.y = 5;
    assert!(h.states.validate_recursive_state_transition(&start, &workshop, 1).is_ok());

    let mut off_map = pre.clone();
    off_map.x = 11;
    assert!(h.states.validate_recursive_state_transition(&pre, &off_map, 1).is_err());
}

#[tokio::test]
async fn test_transition_check_rejects_level_loss_and_overheal() {
    let mut h = Harness::new(character(5, 100, 100));
    let before = h.states.get_current_state().await.unwrap();

    let mut lower = before.clone();
    lower.level = 4;
    assert!(h.states.validate_recursive_state_transition(&before, &lower, 2).is_err());

    let mut overheal = before.clone();
    overheal.hp = overheal.max_hp + 1;
    assert!(h.states.validate_recursive_state_transition(&before, &overheal, 2).is_err());
}
