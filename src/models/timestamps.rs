use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of the persisted timestamps the policy engine reads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedTimestamps {
    /// Set right before we reload, cleared once the resulting start has settled
    pub was_refreshed_at: Option<DateTime<Utc>>,

    /// Last time the application started (absent on a first launch ever)
    pub last_start_at: Option<DateTime<Utc>>,

    /// Last time the application went to the background
    pub last_pause_at: Option<DateTime<Utc>>,
}

impl PersistedTimestamps {
    pub fn is_cold_start(&self) -> bool {
        self.was_refreshed_at.is_none()
    }

    pub fn is_first_launch(&self) -> bool {
        self.last_start_at.is_none()
    }
}

/// Storage keys used in the persistent key-value store
pub mod keys {
    pub const WAS_REFRESHED: &str = "reloaderWasRefreshed";
    pub const LAST_START: &str = "reloaderLastStart";
    pub const LAST_PAUSE: &str = "reloaderLastPause";
}
