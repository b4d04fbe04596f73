//! Emergency type definitions

use serde::{Deserialize, Serialize};

/// Conditions that interrupt the normal plan cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyLevel {
    /// Nothing to react to
    None,

    /// HP is low but fighting could continue
    LowHp,

    /// HP is at or below the survival threshold
    CriticalHp,

    /// No capability flag set; the snapshot is probably stale
    Stuck,
}

impl EmergencyLevel {
    /// Severity (0-10)
    pub fn severity(&self) -> u8 {
        match self {
            EmergencyLevel::CriticalHp => 10,
            EmergencyLevel::LowHp => 6,
            EmergencyLevel::Stuck => 4,
            EmergencyLevel::None => 0,
        }
    }

    pub fn is_emergency(&self) -> bool {
        !matches!(self, EmergencyLevel::None)
    }

    /// Whether the executor's emergency recovery should run
    pub fn needs_recovery(&self) -> bool {
        matches!(self, EmergencyLevel::CriticalHp)
    }

    pub fn description(&self) -> &'static str {
        match self {
            EmergencyLevel::None => "no emergency",
            EmergencyLevel::LowHp => "hp is low",
            EmergencyLevel::CriticalHp => "hp is critical",
            EmergencyLevel::Stuck => "no action is possible at this position",
        }
    }
}

impl std::fmt::Display for EmergencyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_order() {
        assert!(EmergencyLevel::CriticalHp.severity() > EmergencyLevel::LowHp.severity());
        assert!(EmergencyLevel::LowHp.severity() > EmergencyLevel::Stuck.severity());
        assert!(!EmergencyLevel::None.is_emergency());
    }

    #[test]
    fn test_only_critical_needs_recovery() {
        assert!(EmergencyLevel::CriticalHp.needs_recovery());
        assert!(!EmergencyLevel::LowHp.needs_recovery());
        assert!(!EmergencyLevel::Stuck.needs_recovery());
    }
}
