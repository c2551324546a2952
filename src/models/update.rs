use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Answer handed back to the update-delivery channel when it asks to migrate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationResponse {
    pub apply_now: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl MigrationResponse {
    /// The channel may complete the reload itself
    pub fn apply_now() -> Self {
        Self {
            apply_now: true,
            metadata: Some(Value::Object(Default::default())),
        }
    }

    /// Hold the build; the controller will reload later
    pub fn not_yet() -> Self {
        Self {
            apply_now: false,
            metadata: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReloadState {
    Idle,
    Checking,
    Reloading,
    Settled,
}

/// How a start or resume cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// A reload was triggered; the process is about to be replaced
    Reloading,
    /// The check timer elapsed without a reload
    Settled,
    /// Policy said no check was needed; the hold was released after the launch delay
    NoCheck,
}

/// What a resume event led to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeAction {
    /// Idle long enough: a new check cycle was started
    Checking,
    /// A pending update was applied
    Reloading,
    /// A pending update is waiting for confirmation
    Blocked,
    Nothing,
}
