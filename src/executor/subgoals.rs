//! Recursive sub-goal expansion
//!
//! An action that fails on unmet preconditions names the goals that would
//! satisfy them. Each one is turned into a nested goal, planned from the
//! cached snapshot and executed one level deeper; after at least one nested
//! plan succeeds the original action is retried once on the refreshed state.

use crate::actions::{Action, ActionResult, SubGoalRequest};
use crate::errors::{BotError, Result};
use crate::executor::action_executor::{ActionExecutor, SubGoalExecutionResult};
use crate::planning::{GoalManager, Plan};
use crate::state::{StateManager, WorldState};
use crate::telemetry::ExecutionEvent;
use chrono::Utc;
use futures_util::future::{BoxFuture, FutureExt};
use std::time::Instant;
use tracing::{debug, info, warn};

impl ActionExecutor {
    /// Execute `action`, expanding its sub-goal requests on failure
    ///
    /// Depth 0 is the top-level plan. Entering deeper than the configured
    /// maximum is an error raised before any remote call; a failure at the
    /// maximum depth is returned as-is instead of expanding further.
    pub fn execute_action_with_subgoals<'a>(
        &'a mut self,
        action: &'a Action,
        state: &'a WorldState,
        goals: &'a GoalManager,
        states: &'a mut StateManager,
        depth: usize,
    ) -> BoxFuture<'a, Result<ActionResult>> {
        async move {
            let max_depth = self.config().max_subgoal_depth;
            if depth > max_depth {
                return Err(BotError::MaxDepthExceeded { depth, max_depth });
            }

            let actor = states.actor().to_string();
            let result = self.execute_action(&actor, action, state).await?;
            if result.success || !result.has_subgoals() || !self.config().enable_subgoals {
                return Ok(result);
            }

            let nested_depth = depth + 1;
            if nested_depth > max_depth {
                warn!(
                    actor = %actor,
                    action = %action.name,
                    depth,
                    max_depth,
                    "Sub-goal depth limit reached, not expanding"
                );
                return Ok(result);
            }

            let mut any_succeeded = false;
            for request in &result.subgoal_requests {
                match self.expand_request(action, request, goals, states, nested_depth).await {
                    Ok(true) => any_succeeded = true,
                    Ok(false) => {}
                    Err(e) if e.is_fatal_for_chain() => return Err(e),
                    Err(e) if e.is_network_class() => {
                        return Err(BotError::SubGoalFailed {
                            parent_action: action.name.clone(),
                            goal_type: request.goal_type.to_string(),
                            depth: nested_depth,
                            source: Box::new(e),
                        });
                    }
                    Err(e) => {
                        warn!(
                            action = %action.name,
                            goal = %request.goal_type,
                            depth = nested_depth,
                            error = %e,
                            "Sub-goal skipped"
                        );
                    }
                }
            }

            if !any_succeeded {
                return Ok(result);
            }

            let refreshed = match states.get_cached_state() {
                Some(cached) => cached.clone(),
                None => states.get_current_state().await?,
            };
            debug!(action = %action.name, depth, "Retrying after sub-goals");
            self.execute_action(&actor, action, &refreshed).await
        }
        .boxed()
    }

    /// Plan and run one nested goal; `Ok(false)` means the plan ran and failed
    async fn expand_request(
        &mut self,
        action: &Action,
        request: &SubGoalRequest,
        goals: &GoalManager,
        states: &mut StateManager,
        depth: usize,
    ) -> Result<bool> {
        let max_depth = self.config().max_subgoal_depth;
        let context = states.create_goal_factory_context(&action.name, depth, max_depth)?;
        let goal = goals.goal_from_request(request, &context)?;

        self.telemetry().record(ExecutionEvent::SubGoalSpawned {
            parent_action: action.name.clone(),
            goal: goal.name.clone(),
            depth,
            timestamp: Utc::now(),
        });
        info!(parent = %action.name, goal = %goal.name, depth, reason = %request.reason, "Spawning sub-goal");

        let pre = context.state;
        let plan = goals.plan_with_cooldown_awareness(states.actor(), &pre, &goal)?;
        if plan.is_empty() {
            if goal.is_satisfied_by(&pre) {
                return Ok(true);
            }
            return Err(BotError::Planning(format!("no plan for {}", goal.name)));
        }

        let outcome = self.execute_plan_recursive(&plan, &pre, goals, states, depth).await?;
        if !outcome.success {
            debug!(
                goal = %goal.name,
                depth,
                executed = outcome.actions_executed,
                error = ?outcome.error,
                "Sub-goal plan failed"
            );
            return Ok(false);
        }

        let post = states.force_refresh().await?;
        states.validate_recursive_state_transition(&pre, &post, depth)?;
        Ok(true)
    }

    /// Run a plan whose actions may themselves expand sub-goals
    ///
    /// At depth 0 a critical failure triggers emergency recovery and the plan
    /// resumes if it succeeded; nested plans just report the failure.
    pub fn execute_plan_recursive<'a>(
        &'a mut self,
        plan: &'a Plan,
        state: &'a WorldState,
        goals: &'a GoalManager,
        states: &'a mut StateManager,
        depth: usize,
    ) -> BoxFuture<'a, Result<SubGoalExecutionResult>> {
        async move {
            let started = Instant::now();
            let mut current = state.clone();
            let mut executed = 0;

            debug!(goal = %plan.goal_name, steps = plan.len(), depth, "Executing plan");

            for action in &plan.actions {
                let result = self
                    .execute_action_with_subgoals(action, &current, goals, states, depth)
                    .await?;
                executed += 1;

                if result.success {
                    current = states.apply_result(&result).await?;
                    self.sleep_cooldown(result.cooldown_seconds).await;
                    continue;
                }

                if depth == 0 && result.is_critical() && self.emergency_recovery(states).await? {
                    current = states.get_current_state().await?;
                    continue;
                }

                return Ok(SubGoalExecutionResult::finished(
                    false,
                    depth,
                    executed,
                    started,
                    Some(current),
                    Some(format!("{}: {}", result.action_name, result.message)),
                ));
            }

            Ok(SubGoalExecutionResult::finished(
                true,
                depth,
                executed,
                started,
                Some(current),
                None,
            ))
        }
        .boxed()
    }
}
