//! Durable snapshot cache for cross-session continuity
//!
//! A persisted snapshot is only ever informational: the state manager always
//! prefers a fresh remote fetch over anything read back from disk.

use crate::errors::{BotError, Result};
use crate::state::world::WorldState;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Storage for one snapshot per actor
pub trait StateStore: Send + Sync {
    /// Persist the latest snapshot of `actor`
    fn save(&self, actor: &str, state: &WorldState) -> Result<()>;

    /// Last persisted snapshot, if any
    fn load(&self, actor: &str) -> Result<Option<WorldState>>;
}

/// On-disk record wrapping a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotRecord {
    actor: String,
    saved_at: chrono::DateTime<chrono::Utc>,
    state: WorldState,
}

/// One pretty-printed JSON file per actor
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    storage_dir: PathBuf,
}

impl JsonStateStore {
    /// Create the store, creating the directory if needed
    pub fn new(storage_dir: PathBuf) -> Result<Self> {
        if !storage_dir.exists() {
            fs::create_dir_all(&storage_dir)?;
        }
        Ok(Self { storage_dir })
    }

    /// Default location under the user's home directory
    pub fn default_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".goalrunner")
            .join("state")
    }

    fn path_for(&self, actor: &str) -> PathBuf {
        let safe: String = actor
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.storage_dir.join(format!("{}.json", safe))
    }
}

impl StateStore for JsonStateStore {
    fn save(&self, actor: &str, state: &WorldState) -> Result<()> {
        let record = SnapshotRecord {
            actor: actor.to_string(),
            saved_at: chrono::Utc::now(),
            state: state.clone(),
        };
        let json = serde_json::to_string_pretty(&record)?;

        // Atomic replace
        let path = self.path_for(actor);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn load(&self, actor: &str) -> Result<Option<WorldState>> {
        let path = self.path_for(actor);
        if !path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&path)?;
        let record: SnapshotRecord = serde_json::from_str(&json)?;
        if record.actor != actor {
            return Err(BotError::Generic(format!(
                "snapshot at {} belongs to '{}'",
                path.display(),
                record.actor
            )));
        }
        Ok(Some(record.state))
    }
}
