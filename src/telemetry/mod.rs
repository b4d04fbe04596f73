//! Execution telemetry
//!
//! Counters and a bounded log of recent events, shared between the executor
//! and whoever renders status. Cloning the collector shares its storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Default number of events kept
const DEFAULT_MAX_EVENTS: usize = 256;

/// Telemetry event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    ActionStarted {
        action: String,
        timestamp: DateTime<Utc>,
    },
    ActionCompleted {
        action: String,
        success: bool,
        attempts: u32,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    RetryAttempt {
        action: String,
        attempt: u32,
        delay_ms: u64,
        timestamp: DateTime<Utc>,
    },
    VerificationFailed {
        action: String,
        mismatches: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    SubGoalSpawned {
        parent_action: String,
        goal: String,
        depth: usize,
        timestamp: DateTime<Utc>,
    },
    EmergencyRecovery {
        hp_fraction: f64,
        recovered: bool,
        timestamp: DateTime<Utc>,
    },
    RateLimitWait {
        server_wait_ms: u64,
        applied_wait_ms: u64,
        timestamp: DateTime<Utc>,
    },
    CooldownWait {
        action: String,
        wait_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

/// Telemetry statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub actions_started: usize,
    pub actions_succeeded: usize,
    pub actions_failed: usize,
    pub retries: usize,
    pub verification_failures: usize,
    pub subgoals_spawned: usize,
    pub emergency_recoveries: usize,
    pub rate_limit_waits: usize,
    pub cooldown_waits: usize,
    pub total_cooldown_wait_ms: u64,
}

/// Telemetry collector
#[derive(Debug, Clone)]
pub struct ExecutionTelemetry {
    events: Arc<Mutex<VecDeque<ExecutionEvent>>>,
    stats: Arc<Mutex<ExecutionStats>>,
    max_events: usize,
    start_time: Instant,
}

/// Telemetry is never worth a panic: take the data even if poisoned
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ExecutionTelemetry {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_EVENTS)
    }

    /// Collector keeping at most `max_events` recent events
    pub fn with_capacity(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            stats: Arc::new(Mutex::new(ExecutionStats::default())),
            max_events: max_events.max(1),
            start_time: Instant::now(),
        }
    }

    /// Record an event
    pub fn record(&self, event: ExecutionEvent) {
        {
            let mut stats = lock(&self.stats);
            match &event {
                ExecutionEvent::ActionStarted { .. } => stats.actions_started += 1,
                ExecutionEvent::ActionCompleted { success, .. } => {
                    if *success {
                        stats.actions_succeeded += 1;
                    } else {
                        stats.actions_failed += 1;
                    }
                }
                ExecutionEvent::RetryAttempt { .. } => stats.retries += 1,
                ExecutionEvent::VerificationFailed { .. } => stats.verification_failures += 1,
                ExecutionEvent::SubGoalSpawned { .. } => stats.subgoals_spawned += 1,
                ExecutionEvent::EmergencyRecovery { .. } => stats.emergency_recoveries += 1,
                ExecutionEvent::RateLimitWait { .. } => stats.rate_limit_waits += 1,
                ExecutionEvent::CooldownWait { wait_ms, .. } => {
                    stats.cooldown_waits += 1;
                    stats.total_cooldown_wait_ms += wait_ms;
                }
            }
        }

        let mut events = lock(&self.events);
        events.push_back(event);
        while events.len() > self.max_events {
            events.pop_front();
        }
    }

    /// Get current statistics
    pub fn stats(&self) -> ExecutionStats {
        lock(&self.stats).clone()
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    pub fn event_count(&self) -> usize {
        lock(&self.events).len()
    }

    /// Get recent events (last n)
    pub fn recent_events(&self, n: usize) -> Vec<ExecutionEvent> {
        let events = lock(&self.events);
        let start = events.len().saturating_sub(n);
        events.iter().skip(start).cloned().collect()
    }

    /// Share of completed actions that succeeded, 1.0 before any
    pub fn success_rate(&self) -> f64 {
        let stats = lock(&self.stats);
        let total = stats.actions_succeeded + stats.actions_failed;
        if total == 0 {
            1.0
        } else {
            stats.actions_succeeded as f64 / total as f64
        }
    }
}

impl Default for ExecutionTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(action: &str, success: bool) -> ExecutionEvent {
        ExecutionEvent::ActionCompleted {
            action: action.to_string(),
            success,
            attempts: 1,
            duration_ms: 10,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_collector_creation() {
        let telemetry = ExecutionTelemetry::new();
        assert_eq!(telemetry.event_count(), 0);
        assert_eq!(telemetry.stats(), ExecutionStats::default());
        assert_eq!(telemetry.success_rate(), 1.0);
    }

    #[test]
    fn test_success_rate() {
        let telemetry = ExecutionTelemetry::new();
        telemetry.record(completed("rest", true));
        telemetry.record(completed("rest", true));
        telemetry.record(completed("fight_chicken", false));

        let stats = telemetry.stats();
        assert_eq!(stats.actions_succeeded, 2);
        assert_eq!(stats.actions_failed, 1);
        assert!((telemetry.success_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_event_log_is_bounded() {
        let telemetry = ExecutionTelemetry::with_capacity(3);
        for _ in 0..10 {
            telemetry.record(completed("rest", true));
        }
        assert_eq!(telemetry.event_count(), 3);
        assert_eq!(telemetry.stats().actions_succeeded, 10);
        assert_eq!(telemetry.recent_events(2).len(), 2);
    }

    #[test]
    fn test_clones_share_storage() {
        let telemetry = ExecutionTelemetry::new();
        let shared = telemetry.clone();
        shared.record(ExecutionEvent::CooldownWait {
            action: "rest".to_string(),
            wait_ms: 1500,
            timestamp: Utc::now(),
        });
        assert_eq!(telemetry.stats().total_cooldown_wait_ms, 1500);
    }
}
