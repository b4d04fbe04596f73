//! Action execution against the world API
//!
//! One action at a time: wait out the cooldown, check preconditions on the
//! snapshot, invoke the remote call with bounded retries, then verify that the
//! declared effects showed up in the response.

use crate::actions::{response_delta, Action, ActionKind, ActionResult, FailureKind, RemoteCall};
use crate::api::{ActionResponse, ApiError, FightResult, WorldApi};
use crate::errors::Result;
use crate::executor::cooldown::{CooldownRecord, CooldownTracker, RateLimitWindow};
use crate::executor::retry::RetryPolicy;
use crate::planning::Plan;
use crate::state::conditions::{lookup, Effect, EffectMap};
use crate::state::{StateKey, StateManager, StateMap, StateValue, WorldState};
use crate::telemetry::{ExecutionEvent, ExecutionTelemetry};
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Positional effects may land one tile off
const POSITION_TOLERANCE: i64 = 1;

/// Executor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Retries after the first attempt for rate limits and client faults
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_jitter: bool,

    /// Longest single cooldown wait
    pub max_cooldown_wait_ms: u64,

    /// Cap on the server's retry-after
    pub rate_limit_cap_ms: u64,
    pub rate_limit_max_jitter_ms: u64,

    /// Deepest nested sub-goal plan
    pub max_subgoal_depth: usize,
    pub enable_subgoals: bool,

    /// Below this hp fraction recovery retreats and rests
    pub survival_hp_fraction: f64,
    /// Resting stops once this hp fraction is reached
    pub recovery_hp_fraction: f64,
    pub max_rest_attempts: u32,
    pub emergency_pause_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff_ms: 500,
            max_backoff_ms: 8000,
            backoff_jitter: true,
            max_cooldown_wait_ms: 60_000,
            rate_limit_cap_ms: 30_000,
            rate_limit_max_jitter_ms: 1000,
            max_subgoal_depth: 3,
            enable_subgoals: true,
            survival_hp_fraction: 0.3,
            recovery_hp_fraction: 0.8,
            max_rest_attempts: 5,
            emergency_pause_ms: 1000,
        }
    }
}

/// Outcome of running a plan, top-level or nested
#[derive(Debug, Clone)]
pub struct SubGoalExecutionResult {
    pub success: bool,
    pub depth: usize,
    pub actions_executed: usize,
    pub elapsed: Duration,
    pub final_state: Option<WorldState>,
    pub error: Option<String>,
}

impl SubGoalExecutionResult {
    pub(crate) fn finished(
        success: bool,
        depth: usize,
        actions_executed: usize,
        started: Instant,
        final_state: Option<WorldState>,
        error: Option<String>,
    ) -> Self {
        Self {
            success,
            depth,
            actions_executed,
            elapsed: started.elapsed(),
            final_state,
            error,
        }
    }
}

/// Runs actions for one actor and keeps its cooldown bookkeeping
pub struct ActionExecutor {
    api: Arc<dyn WorldApi>,
    config: ExecutorConfig,
    retry: RetryPolicy,
    cooldowns: CooldownTracker,
    telemetry: ExecutionTelemetry,
}

impl ActionExecutor {
    pub fn new(api: Arc<dyn WorldApi>, config: ExecutorConfig) -> Self {
        let retry = RetryPolicy::with_config(
            config.max_retries,
            config.base_backoff_ms,
            config.max_backoff_ms,
        )
        .with_jitter(config.backoff_jitter);

        Self {
            api,
            config,
            retry,
            cooldowns: CooldownTracker::new(),
            telemetry: ExecutionTelemetry::new(),
        }
    }

    /// Share an existing telemetry collector
    pub fn with_telemetry(mut self, telemetry: ExecutionTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn telemetry(&self) -> &ExecutionTelemetry {
        &self.telemetry
    }

    pub fn cooldowns(&self) -> &CooldownTracker {
        &self.cooldowns
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub(crate) fn api(&self) -> &dyn WorldApi {
        self.api.as_ref()
    }

    /// Execute one action from the given snapshot
    ///
    /// Action-level faults come back as a failed [`ActionResult`]; only
    /// server, transport and decode faults are raised.
    pub async fn execute_action(
        &mut self,
        actor: &str,
        action: &Action,
        state: &WorldState,
    ) -> Result<ActionResult> {
        let started = Instant::now();
        self.telemetry.record(ExecutionEvent::ActionStarted {
            action: action.name.clone(),
            timestamp: Utc::now(),
        });

        let result = self.run_action(actor, action, state).await;

        if let Ok(outcome) = &result {
            self.telemetry.record(ExecutionEvent::ActionCompleted {
                action: action.name.clone(),
                success: outcome.success,
                attempts: outcome.attempts,
                duration_ms: started.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
            });
            if outcome.success {
                info!(actor, action = %action.name, attempts = outcome.attempts, "Action succeeded");
            } else {
                warn!(
                    actor,
                    action = %action.name,
                    failure = ?outcome.failure,
                    message = %outcome.message,
                    "Action failed"
                );
            }
        }
        result
    }

    async fn run_action(
        &mut self,
        actor: &str,
        action: &Action,
        state: &WorldState,
    ) -> Result<ActionResult> {
        self.wait_for_cooldown(actor, &action.name, state).await;

        let call = match &action.kind {
            ActionKind::WaitForCooldown => {
                let mut changes = StateMap::new();
                changes.insert(StateKey::CooldownReady, StateValue::Bool(true));
                return Ok(ActionResult::success(&action.name, "cooldown expired", changes, 0.0)
                    .with_attempts(0));
            }
            ActionKind::Remote(call) => call,
        };

        // The wait above has cleared the lockout
        let mut snapshot = state.clone();
        snapshot.cooldown_ready = true;

        let unmet = action.unmet_preconditions(&snapshot);
        if !unmet.is_empty() {
            let keys = unmet.iter().map(|k| k.to_string()).collect::<Vec<_>>().join(", ");
            debug!(actor, action = %action.name, unmet = %keys, "Preconditions not met");
            return Ok(ActionResult::failure(
                &action.name,
                FailureKind::PreconditionNotMet,
                format!("preconditions not met: {}", keys),
            )
            .with_subgoals(action.subgoals_for(&unmet))
            .with_attempts(0));
        }

        let before = snapshot.to_state_map();
        let max_attempts = self.retry.max_attempts();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!(actor, action = %action.name, attempt, "Invoking remote call");

            match call.invoke(self.api.as_ref(), actor, &snapshot).await {
                Ok(response) => {
                    let result = self.evaluate_response(actor, action, &snapshot, &before, response);
                    return Ok(result.with_attempts(attempt));
                }
                Err(ApiError::CooldownActive { remaining_seconds }) => {
                    self.cooldowns.record(
                        actor,
                        CooldownRecord::from_remaining(remaining_seconds, &action.name, Utc::now()),
                    );
                    return Ok(ActionResult::failure(
                        &action.name,
                        FailureKind::CooldownViolation,
                        format!("rejected, cooldown has {:.1}s left", remaining_seconds),
                    )
                    .with_attempts(attempt));
                }
                Err(ApiError::AlreadyAtDestination) => {
                    let (x, y) = match call {
                        RemoteCall::Move { x, y } => (*x, *y),
                        _ => snapshot.position(),
                    };
                    let mut changes = StateMap::new();
                    changes.insert(StateKey::X, x.into());
                    changes.insert(StateKey::Y, y.into());
                    return Ok(
                        ActionResult::success(&action.name, "already at destination", changes, 0.0)
                            .with_attempts(attempt),
                    );
                }
                Err(ApiError::RateLimited { retry_after }) => {
                    let wait = self.handle_rate_limit(retry_after);
                    if attempt >= max_attempts {
                        return Ok(ActionResult::failure(
                            &action.name,
                            FailureKind::RateLimited,
                            format!("still rate limited after {} attempts", attempt),
                        )
                        .with_attempts(attempt));
                    }
                    self.record_retry(&action.name, attempt, wait);
                    sleep(wait).await;
                }
                Err(ApiError::Client { status, message }) => {
                    if attempt >= max_attempts {
                        return Ok(ActionResult::failure(
                            &action.name,
                            FailureKind::Remote { status },
                            message,
                        )
                        .with_attempts(attempt));
                    }
                    let delay = self.retry.calculate_delay(attempt - 1);
                    debug!(actor, action = %action.name, status, delay_ms = delay.as_millis() as u64, "Retrying after client error");
                    self.record_retry(&action.name, attempt, delay);
                    sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn evaluate_response(
        &mut self,
        actor: &str,
        action: &Action,
        snapshot: &WorldState,
        before: &StateMap,
        response: ActionResponse,
    ) -> ActionResult {
        self.cooldowns
            .record(actor, CooldownRecord::from_info(&response.cooldown, Utc::now()));

        let changes = response_delta(&response, snapshot);
        let cooldown = response.cooldown.remaining_seconds as f64;

        if matches!(&response.fight, Some(fight) if fight.result == FightResult::Loss) {
            warn!(actor, action = %action.name, hp = response.character.hp, "Fight lost");
            return ActionResult::failure(&action.name, FailureKind::CriticalHp, "fight lost")
                .with_changes(changes, cooldown);
        }

        let mismatches = verify_effects(&action.effects, &action.estimated, before, &changes);
        if !mismatches.is_empty() {
            warn!(actor, action = %action.name, mismatches = ?mismatches, "Effects not observed");
            self.telemetry.record(ExecutionEvent::VerificationFailed {
                action: action.name.clone(),
                mismatches: mismatches.clone(),
                timestamp: Utc::now(),
            });
            return ActionResult::failure(
                &action.name,
                FailureKind::VerificationFailed,
                mismatches.join("; "),
            )
            .with_changes(changes, cooldown);
        }

        ActionResult::success(&action.name, "ok", changes, cooldown)
    }

    fn record_retry(&self, action: &str, attempt: u32, delay: Duration) {
        self.telemetry.record(ExecutionEvent::RetryAttempt {
            action: action.to_string(),
            attempt,
            delay_ms: delay.as_millis() as u64,
            timestamp: Utc::now(),
        });
    }

    /// Wait computed for a rate-limit response: the server's retry-after,
    /// capped, plus random jitter. The caller sleeps.
    pub fn handle_rate_limit(&mut self, retry_after: Duration) -> Duration {
        let capped = retry_after.min(Duration::from_millis(self.config.rate_limit_cap_ms));
        let jitter_ms = match self.config.rate_limit_max_jitter_ms {
            0 => 0,
            max => rand::thread_rng().gen_range(0..=max),
        };
        let applied = capped + Duration::from_millis(jitter_ms);

        self.cooldowns.record_rate_limit(RateLimitWindow {
            server_wait: retry_after,
            applied_wait: applied,
            observed_at: Utc::now(),
        });
        self.telemetry.record(ExecutionEvent::RateLimitWait {
            server_wait_ms: retry_after.as_millis() as u64,
            applied_wait_ms: applied.as_millis() as u64,
            timestamp: Utc::now(),
        });
        warn!(
            server_wait_ms = retry_after.as_millis() as u64,
            applied_wait_ms = applied.as_millis() as u64,
            "Rate limited"
        );
        applied
    }

    /// Sleep until both the snapshot and our own records say the actor is free
    pub(crate) async fn wait_for_cooldown(&self, actor: &str, action: &str, state: &WorldState) {
        let now = Utc::now();
        let remaining = state
            .cooldown_remaining(now)
            .max(self.cooldowns.remaining(actor, now));
        if remaining.is_zero() {
            return;
        }

        let cap = Duration::from_millis(self.config.max_cooldown_wait_ms);
        if remaining > cap {
            warn!(actor, action, remaining_ms = remaining.as_millis() as u64, "Cooldown exceeds wait cap");
        }
        let wait = remaining.min(cap);
        debug!(actor, action, wait_ms = wait.as_millis() as u64, "Waiting for cooldown");
        self.telemetry.record(ExecutionEvent::CooldownWait {
            action: action.to_string(),
            wait_ms: wait.as_millis() as u64,
            timestamp: Utc::now(),
        });
        sleep(wait).await;
    }

    /// Sleep out a cooldown reported by a result, capped
    pub(crate) async fn sleep_cooldown(&self, seconds: f64) {
        if !(seconds > 0.0) {
            return;
        }
        let cap_secs = self.config.max_cooldown_wait_ms as f64 / 1000.0;
        sleep(Duration::from_secs_f64(seconds.min(cap_secs))).await;
    }

    /// Run a plan step by step against the state manager
    ///
    /// A critical failure triggers emergency recovery; the plan resumes only
    /// if recovery succeeded. Any other failure aborts.
    pub async fn execute_plan(
        &mut self,
        plan: &Plan,
        states: &mut StateManager,
    ) -> Result<SubGoalExecutionResult> {
        let started = Instant::now();
        let actor = states.actor().to_string();
        let mut state = match states.get_cached_state() {
            Some(state) => state.clone(),
            None => states.get_current_state().await?,
        };
        let mut executed = 0;

        info!(actor = %actor, goal = %plan.goal_name, steps = plan.len(), "Executing plan");

        for action in &plan.actions {
            let result = self.execute_action(&actor, action, &state).await?;
            executed += 1;

            if result.success {
                state = states.apply_result(&result).await?;
                self.sleep_cooldown(result.cooldown_seconds).await;
                continue;
            }

            if result.is_critical() {
                if !result.state_changes.is_empty() {
                    states.apply_result(&result).await?;
                }
                if self.emergency_recovery(states).await? {
                    state = states.get_current_state().await?;
                    continue;
                }
            }

            return Ok(SubGoalExecutionResult::finished(
                false,
                0,
                executed,
                started,
                states.get_cached_state().cloned(),
                Some(format!("{}: {}", result.action_name, result.message)),
            ));
        }

        Ok(SubGoalExecutionResult::finished(
            true,
            0,
            executed,
            started,
            Some(state),
            None,
        ))
    }

    /// Retreat to the safe tile and rest until HP is acceptable
    ///
    /// Returns whether the actor ended at or above the recovery fraction
    /// (or was not in survival danger to begin with). Remote faults raise.
    pub async fn emergency_recovery(&mut self, states: &mut StateManager) -> Result<bool> {
        let actor = states.actor().to_string();
        let safe = states.safe_location();
        let mut state = states.get_current_state().await?;
        let initial_fraction = state.hp_fraction();

        warn!(
            actor = %actor,
            hp = state.hp,
            max_hp = state.max_hp,
            position = ?state.position(),
            "Emergency recovery"
        );

        let recovered = if initial_fraction < self.config.survival_hp_fraction {
            if state.position() != safe {
                let retreat = RemoteCall::Move { x: safe.0, y: safe.1 };
                state = self.recovery_step(&actor, &retreat, &state, states).await?;
            }

            let mut rests = 0;
            while state.hp_fraction() < self.config.recovery_hp_fraction
                && rests < self.config.max_rest_attempts
            {
                rests += 1;
                state = self.recovery_step(&actor, &RemoteCall::Rest, &state, states).await?;
            }
            state.hp_fraction() >= self.config.recovery_hp_fraction
        } else {
            if state.position() != safe {
                let retreat = RemoteCall::Move { x: safe.0, y: safe.1 };
                self.recovery_step(&actor, &retreat, &state, states).await?;
            } else {
                sleep(Duration::from_millis(self.config.emergency_pause_ms)).await;
            }
            true
        };

        let final_state = states.force_refresh().await?;
        self.telemetry.record(ExecutionEvent::EmergencyRecovery {
            hp_fraction: initial_fraction,
            recovered,
            timestamp: Utc::now(),
        });

        if recovered {
            info!(actor = %actor, hp = final_state.hp, "Recovered");
        } else {
            warn!(actor = %actor, hp = final_state.hp, rests = self.config.max_rest_attempts, "Recovery incomplete");
        }
        Ok(recovered)
    }

    async fn recovery_step(
        &mut self,
        actor: &str,
        call: &RemoteCall,
        state: &WorldState,
        states: &mut StateManager,
    ) -> Result<WorldState> {
        self.wait_for_cooldown(actor, "recovery", state).await;

        match call.invoke(self.api.as_ref(), actor, state).await {
            Ok(response) => {
                self.cooldowns
                    .record(actor, CooldownRecord::from_info(&response.cooldown, Utc::now()));
            }
            Err(ApiError::AlreadyAtDestination) => {}
            Err(ApiError::CooldownActive { remaining_seconds }) => {
                self.cooldowns.record(
                    actor,
                    CooldownRecord::from_remaining(remaining_seconds, "recovery", Utc::now()),
                );
            }
            Err(e) => return Err(e.into()),
        }

        states.get_current_state().await
    }
}

/// Declared effects missing from a result delta, one description each
///
/// `Set` effects must match exactly, within one tile for coordinates. `Add`
/// effects must move the key in the declared direction. Keys in `estimated`
/// may also stay where they were, but never move the other way.
pub fn verify_effects(
    effects: &EffectMap,
    estimated: &BTreeSet<StateKey>,
    before: &StateMap,
    delta: &StateMap,
) -> Vec<String> {
    let mut mismatches = Vec::new();

    for (key, effect) in effects {
        let Some(actual) = lookup(delta, key) else {
            mismatches.push(format!("{} missing from result", key));
            continue;
        };
        let actual = actual.as_i64();

        match effect {
            Effect::Set(expected) => {
                let expected = expected.as_i64();
                let tolerance = if key.is_positional() { POSITION_TOLERANCE } else { 0 };
                if (actual - expected).abs() > tolerance {
                    mismatches.push(format!("{}: expected {}, got {}", key, expected, actual));
                }
            }
            Effect::Add(change) => {
                let previous = lookup(before, key).map(|v| v.as_i64()).unwrap_or(0);
                let moved = match (change.signum(), estimated.contains(key)) {
                    (1, false) => actual > previous,
                    (1, true) => actual >= previous,
                    (-1, false) => actual < previous,
                    (-1, true) => actual <= previous,
                    _ => true,
                };
                if !moved {
                    mismatches.push(format!(
                        "{}: expected change {:+} from {}, got {}",
                        key, change, previous, actual
                    ));
                }
            }
        }
    }

    mismatches
}
