use crate::models::{CheckPolicy, RefreshPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Key under which reloader settings live in a settings document
const SETTINGS_KEY: &str = "reloader";

/// Prefix for environment variable overrides
const ENV_PREFIX: &str = "RELOADER_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse settings: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Settings must be a JSON object, got: {0}")]
    NotAnObject(String),
}

/// Effective reloader configuration, fixed once the controller is initialized
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloaderConfig {
    pub check: CheckPolicy,

    /// Grace period to wait for an update notification before giving up
    #[serde(with = "duration_ms")]
    pub check_timer: Duration,

    pub refresh: RefreshPolicy,

    /// Minimum background time before a resume counts as a fresh start
    #[serde(with = "duration_ms")]
    pub idle_cutoff: Duration,

    /// Delay before releasing the startup hold when no check is needed
    #[serde(with = "duration_ms")]
    pub launch_screen_delay: Duration,

    pub require_confirmation_before_reload: bool,

    pub automatic_initialization: bool,

    /// Verbose decision logging
    pub debug: bool,
}

impl Default for ReloaderConfig {
    fn default() -> Self {
        Self {
            check: CheckPolicy::EveryStart,
            check_timer: Duration::ZERO,
            refresh: RefreshPolicy::OnStartAndResume,
            idle_cutoff: Duration::from_secs(5 * 60),
            launch_screen_delay: Duration::from_millis(500),
            require_confirmation_before_reload: true,
            automatic_initialization: true,
            debug: false,
        }
    }
}

impl ReloaderConfig {
    /// Apply overrides on top of this configuration, returning the merged result
    pub fn merge(&self, overrides: &ConfigOverrides) -> Self {
        let ms = Duration::from_millis;
        Self {
            check: overrides.check.unwrap_or(self.check),
            check_timer: overrides.check_timer.map(ms).unwrap_or(self.check_timer),
            refresh: overrides.refresh.unwrap_or(self.refresh),
            idle_cutoff: overrides.idle_cutoff.map(ms).unwrap_or(self.idle_cutoff),
            launch_screen_delay: overrides
                .launch_screen_delay
                .map(ms)
                .unwrap_or(self.launch_screen_delay),
            require_confirmation_before_reload: overrides
                .require_confirmation_before_reload
                .unwrap_or(self.require_confirmation_before_reload),
            automatic_initialization: overrides
                .automatic_initialization
                .unwrap_or(self.automatic_initialization),
            debug: overrides.debug.unwrap_or(self.debug),
        }
    }

    /// Defaults, then the settings file (if any), then environment variables
    pub fn load(settings_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut overrides = ConfigOverrides::default();

        if let Some(path) = settings_path {
            let content = std::fs::read_to_string(path)?;
            overrides = overrides.layer(ConfigOverrides::from_settings(&content)?);
        }

        overrides = overrides.layer(ConfigOverrides::from_env());

        let config = Self::default().merge(&overrides);
        debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }
}

/// The optional, typed configuration surface accepted from settings and `initialize`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<CheckPolicy>,

    /// Milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_timer: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<RefreshPolicy>,

    /// Milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_cutoff: Option<u64>,

    /// Milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_screen_delay: Option<u64>,

    #[serde(
        default,
        alias = "alwaysCheckBeforeReload",
        skip_serializing_if = "Option::is_none"
    )]
    pub require_confirmation_before_reload: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automatic_initialization: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,
}

impl ConfigOverrides {
    /// Parse a settings document. Accepts either `{"reloader": {...}}` or the bare object.
    pub fn from_settings(content: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value = serde_json::from_str(content)?;
        let section = match value.get(SETTINGS_KEY) {
            Some(section) => section.clone(),
            None => value,
        };

        if !section.is_object() {
            return Err(ConfigError::NotAnObject(section.to_string()));
        }

        Ok(serde_json::from_value(section)?)
    }

    /// Load overrides from `RELOADER_*` environment variables
    pub fn from_env() -> Self {
        let vars: BTreeMap<String, String> = std::env::vars()
            .filter(|(k, _)| k.starts_with(ENV_PREFIX))
            .collect();
        Self::from_vars(&vars)
    }

    fn from_vars(vars: &BTreeMap<String, String>) -> Self {
        Self {
            check: parse_policy(vars, "RELOADER_CHECK"),
            check_timer: parse_u64(vars, "RELOADER_CHECK_TIMER_MS"),
            refresh: parse_policy(vars, "RELOADER_REFRESH"),
            idle_cutoff: parse_u64(vars, "RELOADER_IDLE_CUTOFF_MS"),
            launch_screen_delay: parse_u64(vars, "RELOADER_LAUNCH_SCREEN_DELAY_MS"),
            require_confirmation_before_reload: parse_bool(vars, "RELOADER_REQUIRE_CONFIRMATION"),
            automatic_initialization: parse_bool(vars, "RELOADER_AUTOMATIC_INITIALIZATION"),
            debug: parse_bool(vars, "RELOADER_DEBUG"),
        }
    }

    /// Stack `other` on top of `self`; values set in `other` win
    pub fn layer(self, other: ConfigOverrides) -> Self {
        Self {
            check: other.check.or(self.check),
            check_timer: other.check_timer.or(self.check_timer),
            refresh: other.refresh.or(self.refresh),
            idle_cutoff: other.idle_cutoff.or(self.idle_cutoff),
            launch_screen_delay: other.launch_screen_delay.or(self.launch_screen_delay),
            require_confirmation_before_reload: other
                .require_confirmation_before_reload
                .or(self.require_confirmation_before_reload),
            automatic_initialization: other
                .automatic_initialization
                .or(self.automatic_initialization),
            debug: other.debug.or(self.debug),
        }
    }
}

// Helper functions for parsing environment values
fn parse_bool(data: &BTreeMap<String, String>, key: &str) -> Option<bool> {
    let raw = data.get(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring {}={}: not a boolean", key, raw);
            None
        },
    }
}

fn parse_u64(data: &BTreeMap<String, String>, key: &str) -> Option<u64> {
    let raw = data.get(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring {}={}: not a number of milliseconds", key, raw);
            None
        },
    }
}

fn parse_policy<T>(data: &BTreeMap<String, String>, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = data.get(key).filter(|v| !v.is_empty())?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("Ignoring {}: {}", key, e);
            None
        },
    }
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}
