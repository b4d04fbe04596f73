//! Cooldown and rate-limit bookkeeping

use crate::api::CooldownInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Lockout window imposed by the last action of an actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CooldownRecord {
    pub expiration: DateTime<Utc>,
    pub total_seconds: f64,
    /// Remaining when recorded; never negative
    pub remaining_seconds: f64,
    pub reason: String,
}

impl CooldownRecord {
    /// Record measured from our own clock so server skew cannot stretch it
    pub fn from_info(info: &CooldownInfo, now: DateTime<Utc>) -> Self {
        let remaining_seconds = info.remaining_seconds as f64;
        let expiration = now + chrono::Duration::milliseconds((remaining_seconds * 1000.0) as i64);
        Self {
            expiration,
            total_seconds: info.total_seconds as f64,
            remaining_seconds,
            reason: info.reason.clone(),
        }
    }

    /// Record for a server rejection that only reported the remaining time
    pub fn from_remaining(remaining_seconds: f64, reason: &str, now: DateTime<Utc>) -> Self {
        let remaining_seconds = remaining_seconds.max(0.0);
        Self {
            expiration: now + chrono::Duration::milliseconds((remaining_seconds * 1000.0) as i64),
            total_seconds: remaining_seconds,
            remaining_seconds,
            reason: reason.to_string(),
        }
    }

    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.expiration - now).to_std().unwrap_or_default()
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expiration > now
    }
}

/// Last rate-limit wait computed for the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitWindow {
    /// Wait the server asked for
    pub server_wait: Duration,
    /// Capped wait plus jitter
    pub applied_wait: Duration,
    pub observed_at: DateTime<Utc>,
}

/// Per-actor cooldown records and the most recent rate-limit window
#[derive(Debug, Clone, Default)]
pub struct CooldownTracker {
    records: HashMap<String, CooldownRecord>,
    last_rate_limit: Option<RateLimitWindow>,
    rate_limit_count: usize,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, actor: &str, record: CooldownRecord) {
        self.records.insert(actor.to_string(), record);
    }

    pub fn get(&self, actor: &str) -> Option<&CooldownRecord> {
        self.records.get(actor)
    }

    /// Time until `actor` may act again, zero if unknown
    pub fn remaining(&self, actor: &str, now: DateTime<Utc>) -> Duration {
        self.records
            .get(actor)
            .map(|r| r.remaining_at(now))
            .unwrap_or_default()
    }

    pub fn record_rate_limit(&mut self, window: RateLimitWindow) {
        self.rate_limit_count += 1;
        self.last_rate_limit = Some(window);
    }

    pub fn last_rate_limit(&self) -> Option<&RateLimitWindow> {
        self.last_rate_limit.as_ref()
    }

    pub fn rate_limit_count(&self) -> usize {
        self.rate_limit_count
    }
}
