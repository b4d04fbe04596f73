//! Emergency detection
//!
//! Classifies a snapshot before each cycle. Critical HP wins over low HP,
//! and both win over a stuck snapshot.

use crate::recovery::types::EmergencyLevel;
use crate::state::WorldState;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Detection thresholds, as fractions of max HP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub critical_hp_fraction: f64,
    pub low_hp_fraction: f64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            critical_hp_fraction: 0.3,
            low_hp_fraction: 0.6,
        }
    }
}

/// Snapshot classifier
#[derive(Debug, Clone, Default)]
pub struct EmergencyDetector {
    config: RecoveryConfig,
}

impl EmergencyDetector {
    pub fn new(config: RecoveryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    pub fn assess(&self, state: &WorldState) -> EmergencyLevel {
        let fraction = state.hp_fraction();
        let level = if fraction <= self.config.critical_hp_fraction {
            EmergencyLevel::CriticalHp
        } else if fraction <= self.config.low_hp_fraction {
            EmergencyLevel::LowHp
        } else if !state.capabilities.any() {
            EmergencyLevel::Stuck
        } else {
            EmergencyLevel::None
        };

        if level.is_emergency() {
            debug!(actor = %state.name, hp = state.hp, max_hp = state.max_hp, level = ?level, "Emergency detected");
        }
        level
    }
}
