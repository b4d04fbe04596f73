//! Orchestrator - main control loop
//!
//! Coordinates one actor through repeated cycles:
//! - Perceive: fetch the live snapshot
//! - Detect emergencies (critical HP, low HP, stuck)
//! - Replan when there is no plan, the goal is met or the situation changed
//! - Execute the plan, then clear it whatever the outcome
//!
//! Stopping is cooperative through an [`OrchestratorHandle`].

use crate::agent::state::{LifecycleEvent, OrchestratorState};
use crate::errors::Result;
use crate::executor::ActionExecutor;
use crate::planning::{Goal, GoalManager, Plan};
use crate::recovery::{EmergencyDetector, EmergencyLevel};
use crate::state::{StateManager, StateStore, WorldState};
use crate::telemetry::ExecutionStats;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Granularity of interruptible pauses
const STOP_POLL_MS: u64 = 25;

/// Orchestrator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Pause after every executed plan
    pub cycle_pause_ms: u64,

    /// Pause when no plan could be found
    pub empty_plan_backoff_ms: u64,

    /// Pause while the terminal milestone is reached
    pub idle_pause_ms: u64,

    /// First back-off after a failed cycle; doubles per consecutive failure
    pub error_backoff_base_ms: u64,
    pub error_backoff_max_ms: u64,

    /// Stop after this many cycles
    pub max_cycles: Option<usize>,

    /// Execute through recursive sub-goal expansion
    pub enable_subgoals: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            cycle_pause_ms: 500,
            empty_plan_backoff_ms: 2000,
            idle_pause_ms: 10_000,
            error_backoff_base_ms: 1000,
            error_backoff_max_ms: 60_000,
            max_cycles: None,
            enable_subgoals: true,
        }
    }
}

/// Summary for operator tooling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    pub actor: String,
    pub state: OrchestratorState,
    pub running: bool,
    pub current_goal: Option<String>,
    pub plan_length: usize,
    pub cycles: usize,
    pub plans_completed: usize,
    pub plans_failed: usize,
    pub consecutive_errors: u32,
    pub last_error: Option<String>,
    pub last_emergency: Option<EmergencyLevel>,
    pub stats: ExecutionStats,
}

impl OrchestratorStatus {
    fn stopped(actor: &str) -> Self {
        Self {
            actor: actor.to_string(),
            state: OrchestratorState::Stopped,
            running: false,
            current_goal: None,
            plan_length: 0,
            cycles: 0,
            plans_completed: 0,
            plans_failed: 0,
            consecutive_errors: 0,
            last_error: None,
            last_emergency: None,
            stats: ExecutionStats::default(),
        }
    }
}

/// Cloneable control surface for a running orchestrator
#[derive(Clone)]
pub struct OrchestratorHandle {
    actor: String,
    stop_requested: Arc<AtomicBool>,
    loop_active: Arc<AtomicBool>,
    /// Flips to true when `run` returns; closed once the orchestrator is dropped
    exited: watch::Receiver<bool>,
    status: Arc<RwLock<OrchestratorStatus>>,
    snapshot: Arc<RwLock<Option<WorldState>>>,
    store: Arc<dyn StateStore>,
}

impl OrchestratorHandle {
    fn new(actor: &str, store: Arc<dyn StateStore>, exited: watch::Receiver<bool>) -> Self {
        Self {
            actor: actor.to_string(),
            stop_requested: Arc::new(AtomicBool::new(false)),
            loop_active: Arc::new(AtomicBool::new(false)),
            exited,
            status: Arc::new(RwLock::new(OrchestratorStatus::stopped(actor))),
            snapshot: Arc::new(RwLock::new(None)),
            store,
        }
    }

    /// Ask the loop to exit after the current cycle, without waiting
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Whether the control loop is currently executing
    pub fn is_running(&self) -> bool {
        self.loop_active.load(Ordering::SeqCst)
    }

    /// Stop the loop, wait for `run` to return, then persist the last snapshot
    ///
    /// A loop that has not started yet is waited for too; a dropped
    /// orchestrator counts as exited.
    pub async fn stop(&self) -> Result<()> {
        self.request_stop();
        info!(actor = %self.actor, "Stop requested");

        let mut exited = self.exited.clone();
        loop {
            let done = *exited.borrow_and_update();
            if done || exited.changed().await.is_err() {
                break;
            }
        }

        match self.snapshot.read().await.clone() {
            Some(state) => {
                self.store.save(&self.actor, &state)?;
                info!(actor = %self.actor, "Persisted final snapshot");
            }
            None => debug!(actor = %self.actor, "No snapshot to persist"),
        }
        Ok(())
    }

    pub async fn status(&self) -> OrchestratorStatus {
        self.status.read().await.clone()
    }

    /// Last snapshot the loop observed
    pub async fn last_snapshot(&self) -> Option<WorldState> {
        self.snapshot.read().await.clone()
    }
}

/// What a cycle ended with, deciding the pause before the next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CycleOutcome {
    Executed { success: bool },
    NoPlan,
    Idle,
}

/// Plan-execute loop for one actor
pub struct Orchestrator {
    config: OrchestratorConfig,
    states: StateManager,
    goals: GoalManager,
    executor: ActionExecutor,
    detector: EmergencyDetector,
    lifecycle: OrchestratorState,
    current_goal: Option<Goal>,
    current_plan: Option<Plan>,
    handle: OrchestratorHandle,
    exited: watch::Sender<bool>,
    cycles: usize,
    plans_completed: usize,
    plans_failed: usize,
    consecutive_errors: u32,
    last_error: Option<String>,
    last_emergency: Option<EmergencyLevel>,
}

impl Orchestrator {
    pub fn new(
        states: StateManager,
        goals: GoalManager,
        executor: ActionExecutor,
        detector: EmergencyDetector,
        config: OrchestratorConfig,
    ) -> Self {
        let (exited, exited_rx) = watch::channel(false);
        let handle = OrchestratorHandle::new(states.actor(), states.store(), exited_rx);
        Self {
            config,
            states,
            goals,
            executor,
            detector,
            lifecycle: OrchestratorState::Stopped,
            current_goal: None,
            current_plan: None,
            handle,
            exited,
            cycles: 0,
            plans_completed: 0,
            plans_failed: 0,
            consecutive_errors: 0,
            last_error: None,
            last_emergency: None,
        }
    }

    pub fn handle(&self) -> OrchestratorHandle {
        self.handle.clone()
    }

    pub fn lifecycle(&self) -> OrchestratorState {
        self.lifecycle
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn executor(&self) -> &ActionExecutor {
        &self.executor
    }

    pub fn state_manager(&self) -> &StateManager {
        &self.states
    }

    /// Current status, built from the loop's own fields
    pub fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            actor: self.states.actor().to_string(),
            state: self.lifecycle,
            running: self.lifecycle.is_active(),
            current_goal: self.current_goal.as_ref().map(|g| g.name.clone()),
            plan_length: self.current_plan.as_ref().map(Plan::len).unwrap_or(0),
            cycles: self.cycles,
            plans_completed: self.plans_completed,
            plans_failed: self.plans_failed,
            consecutive_errors: self.consecutive_errors,
            last_error: self.last_error.clone(),
            last_emergency: self.last_emergency,
            stats: self.executor.telemetry().stats(),
        }
    }

    fn transition(&mut self, event: LifecycleEvent) -> Result<()> {
        let next = self.lifecycle.transition(event)?;
        debug!(from = ?self.lifecycle, to = ?next, "Lifecycle transition");
        self.lifecycle = next;
        Ok(())
    }

    async fn publish(&self) {
        *self.handle.status.write().await = self.status();
        if let Some(state) = self.states.get_cached_state() {
            *self.handle.snapshot.write().await = Some(state.clone());
        }
    }

    /// Run until stopped or the cycle limit is reached
    ///
    /// Only a failure to load the initial state ends the loop with an error;
    /// failures inside a cycle are logged and backed off.
    pub async fn run(&mut self) -> Result<()> {
        self.exited.send_replace(false);
        if let Err(e) = self.transition(LifecycleEvent::Start) {
            self.exited.send_replace(true);
            return Err(e);
        }
        self.handle.loop_active.store(true, Ordering::SeqCst);
        self.publish().await;

        let result = self.run_loop().await;

        let stopped = if self.lifecycle.is_active() {
            self.transition(LifecycleEvent::Stop)
        } else {
            Ok(())
        };
        self.publish().await;
        self.handle.loop_active.store(false, Ordering::SeqCst);
        self.exited.send_replace(true);
        stopped?;

        info!(
            actor = %self.states.actor(),
            cycles = self.cycles,
            completed = self.plans_completed,
            failed = self.plans_failed,
            "Orchestrator stopped"
        );
        result
    }

    async fn run_loop(&mut self) -> Result<()> {
        let actor = self.states.actor().to_string();
        let initial = self.states.get_current_state().await?;

        match self.states.load_persisted() {
            Ok(Some(previous)) => debug!(
                actor = %actor,
                level = previous.level,
                saved_at = %previous.fetched_at,
                "Previous session snapshot found"
            ),
            Ok(None) => {}
            Err(e) => warn!(actor = %actor, error = %e, "Could not read previous snapshot"),
        }

        info!(
            actor = %actor,
            level = initial.level,
            hp = initial.hp,
            position = ?initial.position(),
            "Orchestrator started"
        );
        self.transition(LifecycleEvent::Started)?;
        self.publish().await;

        loop {
            if self.handle.is_stop_requested() {
                debug!(actor = %actor, "Stop flag observed");
                break;
            }
            if let Some(max) = self.config.max_cycles {
                if self.cycles >= max {
                    info!(actor = %actor, cycles = self.cycles, "Cycle limit reached");
                    break;
                }
            }

            self.cycles += 1;
            let pause = match self.run_cycle().await {
                Ok(outcome) => {
                    self.consecutive_errors = 0;
                    match outcome {
                        CycleOutcome::Executed { .. } => self.config.cycle_pause_ms,
                        CycleOutcome::NoPlan => self.config.empty_plan_backoff_ms,
                        CycleOutcome::Idle => self.config.idle_pause_ms,
                    }
                }
                Err(e) => {
                    self.consecutive_errors += 1;
                    self.last_error = Some(e.to_string());
                    self.current_plan = None;
                    if self.lifecycle == OrchestratorState::Replanning {
                        self.transition(LifecycleEvent::PlanReady)?;
                    }
                    let backoff = self.error_backoff();
                    error!(
                        actor = %actor,
                        cycle = self.cycles,
                        consecutive = self.consecutive_errors,
                        backoff_ms = backoff,
                        error = %e,
                        "Cycle failed"
                    );
                    backoff
                }
            };

            self.publish().await;
            self.pause(Duration::from_millis(pause)).await;
        }

        Ok(())
    }

    /// base × 2^(n-1), capped
    fn error_backoff(&self) -> u64 {
        let exponent = self.consecutive_errors.saturating_sub(1).min(32);
        self.config
            .error_backoff_base_ms
            .saturating_mul(2u64.saturating_pow(exponent))
            .min(self.config.error_backoff_max_ms)
    }

    /// Sleep that returns early once a stop is requested
    async fn pause(&self, duration: Duration) {
        let step = Duration::from_millis(STOP_POLL_MS);
        let mut remaining = duration;
        while !remaining.is_zero() && !self.handle.is_stop_requested() {
            let slice = remaining.min(step);
            sleep(slice).await;
            remaining = remaining.saturating_sub(slice);
        }
    }

    async fn run_cycle(&mut self) -> Result<CycleOutcome> {
        let actor = self.states.actor().to_string();
        let mut state = self.states.get_current_state().await?;

        let emergency = self.detector.assess(&state);
        self.last_emergency = Some(emergency);
        match emergency {
            EmergencyLevel::CriticalHp => {
                warn!(actor = %actor, hp = state.hp, max_hp = state.max_hp, "Critical HP, replanning");
            }
            EmergencyLevel::LowHp => {
                debug!(actor = %actor, hp = state.hp, max_hp = state.max_hp, "Low HP");
            }
            EmergencyLevel::Stuck => {
                info!(actor = %actor, position = ?state.position(), "No capability at position, refreshing");
                state = self.states.force_refresh().await?;
            }
            EmergencyLevel::None => {}
        }

        if self.needs_replan(&state, emergency) {
            self.transition(LifecycleEvent::ReplanNeeded)?;

            let goal = self.goals.select_next_goal(&state);
            if goal.is_empty() {
                self.current_goal = None;
                self.current_plan = None;
                self.transition(LifecycleEvent::PlanReady)?;
                info!(actor = %actor, level = state.level, "Terminal milestone reached, idling");
                return Ok(CycleOutcome::Idle);
            }

            let plan = self.goals.plan_with_cooldown_awareness(&actor, &state, &goal)?;
            self.transition(LifecycleEvent::PlanReady)?;

            info!(
                actor = %actor,
                goal = %goal.name,
                priority = goal.priority,
                steps = plan.len(),
                "Goal selected"
            );
            self.current_goal = Some(goal);
            if plan.is_empty() {
                if state.is_on_cooldown(Utc::now()) {
                    debug!(actor = %actor, "Actor locked, no cooldown-free plan");
                } else {
                    warn!(actor = %actor, "No plan for selected goal, backing off");
                }
                self.current_plan = None;
                return Ok(CycleOutcome::NoPlan);
            }
            self.current_plan = Some(plan);
        }

        let Some(plan) = self.current_plan.take() else {
            return Ok(CycleOutcome::NoPlan);
        };
        self.publish().await;

        let use_subgoals = self.config.enable_subgoals && self.executor.config().enable_subgoals;
        let outcome = if use_subgoals {
            self.executor
                .execute_plan_recursive(&plan, &state, &self.goals, &mut self.states, 0)
                .await?
        } else {
            self.executor.execute_plan(&plan, &mut self.states).await?
        };

        if outcome.success {
            self.plans_completed += 1;
            info!(
                actor = %actor,
                goal = %plan.goal_name,
                actions = outcome.actions_executed,
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                "Plan completed"
            );
        } else {
            self.plans_failed += 1;
            warn!(
                actor = %actor,
                goal = %plan.goal_name,
                actions = outcome.actions_executed,
                error = ?outcome.error,
                "Plan failed"
            );
        }

        Ok(CycleOutcome::Executed { success: outcome.success })
    }

    fn needs_replan(&self, state: &WorldState, emergency: EmergencyLevel) -> bool {
        let goal_met = self
            .current_goal
            .as_ref()
            .map(|g| g.is_satisfied_by(state))
            .unwrap_or(true);

        self.current_plan.is_none()
            || goal_met
            || emergency == EmergencyLevel::CriticalHp
            || state.inventory_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert!(config.max_cycles.is_none());
        assert!(config.enable_subgoals);
    }

    #[test]
    fn test_stopped_status() {
        let status = OrchestratorStatus::stopped("ada");
        assert_eq!(status.state, OrchestratorState::Stopped);
        assert!(!status.running);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "stopped");
        assert_eq!(json["actor"], "ada");
    }
}
