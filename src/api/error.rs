//! Remote world API error classes

use std::time::Duration;
use thiserror::Error;

/// Status codes the world API uses for game-level faults
pub mod status {
    pub const RATE_LIMITED: u16 = 429;
    pub const NOT_FOUND: u16 = 404;
    pub const MISSING_ITEM: u16 = 478;
    pub const ACTION_IN_PROGRESS: u16 = 486;
    pub const ALREADY_AT_DESTINATION: u16 = 490;
    pub const SKILL_TOO_LOW: u16 = 493;
    pub const INVENTORY_FULL: u16 = 497;
    pub const COOLDOWN_ACTIVE: u16 = 499;
    pub const NOTHING_ON_MAP: u16 = 598;
}

/// Errors returned by a [`WorldApi`](super::WorldApi) implementation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    /// The actor is still locked by a previous action
    #[error("Character is in cooldown ({remaining_seconds:.1}s remaining)")]
    CooldownActive { remaining_seconds: f64 },

    /// Move target equals the current position
    #[error("Character is already at the destination")]
    AlreadyAtDestination,

    /// Too many requests; the server asked us to wait
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// Any other 4xx fault, plus game faults the API reports in the 5xx range
    #[error("Client error {status}: {message}")]
    Client { status: u16, message: String },

    /// 5xx fault
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Connection, TLS or timeout failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response body did not match the expected shape
    #[error("Decode error: {0}")]
    Decode(String),
}

impl ApiError {
    /// Build the error class for a non-success HTTP status
    pub fn from_status(code: u16, retry_after: Option<Duration>, message: String) -> Self {
        match code {
            status::COOLDOWN_ACTIVE => ApiError::CooldownActive {
                remaining_seconds: parse_remaining_seconds(&message).unwrap_or(0.0),
            },
            status::ALREADY_AT_DESTINATION => ApiError::AlreadyAtDestination,
            status::RATE_LIMITED => ApiError::RateLimited {
                retry_after: retry_after.unwrap_or(Duration::from_secs(1)),
            },
            400..=499 | status::NOTHING_ON_MAP => ApiError::Client {
                status: code,
                message,
            },
            _ => ApiError::Server {
                status: code,
                message,
            },
        }
    }

    /// Errors that indicate the remote side or the link is unhealthy
    pub fn is_network_class(&self) -> bool {
        matches!(
            self,
            ApiError::Server { .. } | ApiError::Transport(_) | ApiError::Decode(_)
        )
    }

    /// Status code for client faults, if any
    pub fn client_status(&self) -> Option<u16> {
        match self {
            ApiError::Client { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

/// Cooldown messages look like "Character in cooldown: 12.5 seconds left."
fn parse_remaining_seconds(message: &str) -> Option<f64> {
    message
        .split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .filter(|part| !part.is_empty() && *part != ".")
        .find_map(|part| part.parse::<f64>().ok())
}
