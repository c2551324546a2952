use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// When to actively wait for an update notification on (re)start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CheckPolicy {
    /// Never hold the start waiting for an update
    Never,
    /// Check on every cold start and on resume after the idle cutoff
    #[default]
    EveryStart,
    /// Check only on the very first launch
    FirstStart,
}

/// When a pending update is actually applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum RefreshPolicy {
    /// Let the delivery channel reload as soon as the build is ready
    #[serde(rename = "instantly")]
    Instantly,
    /// Only apply on the next start
    #[serde(rename = "start")]
    OnStart,
    /// Apply on the next start or the next resume
    #[default]
    #[serde(rename = "startAndResume")]
    OnStartAndResume,
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Invalid check policy: {0}")]
    InvalidCheckPolicy(String),

    #[error("Invalid refresh policy: {0}")]
    InvalidRefreshPolicy(String),
}

fn normalize(s: &str) -> String {
    s.trim()
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .collect::<String>()
        .to_lowercase()
}

impl FromStr for CheckPolicy {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "never" | "false" | "none" => Ok(CheckPolicy::Never),
            "everystart" => Ok(CheckPolicy::EveryStart),
            "firststart" => Ok(CheckPolicy::FirstStart),
            _ => Err(PolicyError::InvalidCheckPolicy(s.to_string())),
        }
    }
}

impl FromStr for RefreshPolicy {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "instantly" => Ok(RefreshPolicy::Instantly),
            "start" | "onstart" => Ok(RefreshPolicy::OnStart),
            "startandresume" | "onstartandresume" => Ok(RefreshPolicy::OnStartAndResume),
            _ => Err(PolicyError::InvalidRefreshPolicy(s.to_string())),
        }
    }
}

// Settings historically allowed `check: false` to disable checking.
impl<'de> Deserialize<'de> for CheckPolicy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Name(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Flag(false) => Ok(CheckPolicy::Never),
            Raw::Flag(true) => Ok(CheckPolicy::EveryStart),
            Raw::Name(name) => name.parse().map_err(serde::de::Error::custom),
        }
    }
}

impl<'de> Deserialize<'de> for RefreshPolicy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_policy_from_str() {
        assert_eq!("everyStart".parse::<CheckPolicy>().unwrap(), CheckPolicy::EveryStart);
        assert_eq!("first_start".parse::<CheckPolicy>().unwrap(), CheckPolicy::FirstStart);
        assert_eq!("NEVER".parse::<CheckPolicy>().unwrap(), CheckPolicy::Never);
        assert_eq!("false".parse::<CheckPolicy>().unwrap(), CheckPolicy::Never);
        assert!("sometimes".parse::<CheckPolicy>().is_err());
    }

    #[test]
    fn test_refresh_policy_from_str() {
        assert_eq!("instantly".parse::<RefreshPolicy>().unwrap(), RefreshPolicy::Instantly);
        assert_eq!("start".parse::<RefreshPolicy>().unwrap(), RefreshPolicy::OnStart);
        assert_eq!(
            "startAndResume".parse::<RefreshPolicy>().unwrap(),
            RefreshPolicy::OnStartAndResume
        );
        assert_eq!(
            "ON_START_AND_RESUME".parse::<RefreshPolicy>().unwrap(),
            RefreshPolicy::OnStartAndResume
        );
        assert!("later".parse::<RefreshPolicy>().is_err());
    }

    #[test]
    fn test_check_policy_accepts_boolean_false() {
        let policy: CheckPolicy = serde_json::from_str("false").unwrap();
        assert_eq!(policy, CheckPolicy::Never);

        let policy: CheckPolicy = serde_json::from_str("\"firstStart\"").unwrap();
        assert_eq!(policy, CheckPolicy::FirstStart);
    }

    #[test]
    fn test_serialized_names_match_settings() {
        assert_eq!(
            serde_json::to_string(&CheckPolicy::EveryStart).unwrap(),
            "\"everyStart\""
        );
        assert_eq!(
            serde_json::to_string(&RefreshPolicy::OnStartAndResume).unwrap(),
            "\"startAndResume\""
        );
    }
}
