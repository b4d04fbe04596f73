//! Emergency detection between plan cycles

pub mod detector;
pub mod types;

pub use detector::{EmergencyDetector, RecoveryConfig};
pub use types::EmergencyLevel;
