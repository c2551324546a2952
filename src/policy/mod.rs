use crate::config::ReloaderConfig;
use crate::models::CheckPolicy;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Pure decision functions over configuration and persisted timestamps
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyEngine;

impl PolicyEngine {
    /// Should this start wait for an update before releasing the hold?
    ///
    /// Only cold starts check. A start caused by our own reload carries
    /// `was_refreshed_at` and never re-checks.
    pub fn should_check_on_start(
        &self,
        config: &ReloaderConfig,
        was_refreshed_at: Option<DateTime<Utc>>,
        last_start_at: Option<DateTime<Utc>>,
    ) -> bool {
        if config.check == CheckPolicy::Never {
            debug!("Check policy is 'never', skipping start check");
            return false;
        }

        let is_cold_start = was_refreshed_at.is_none();
        let should = is_cold_start
            && match config.check {
                CheckPolicy::EveryStart => true,
                CheckPolicy::FirstStart => last_start_at.is_none(),
                CheckPolicy::Never => false,
            };

        debug!(
            "Start check: policy={:?}, cold_start={}, last_start={:?}, should={}",
            config.check, is_cold_start, last_start_at, should
        );
        should
    }

    /// Should this resume be treated as a fresh start and check for updates?
    pub fn should_check_on_resume(
        &self,
        config: &ReloaderConfig,
        now: DateTime<Utc>,
        last_pause_at: Option<DateTime<Utc>>,
    ) -> bool {
        if config.check == CheckPolicy::Never {
            debug!("Check policy is 'never', skipping resume check");
            return false;
        }

        // A missed pause event is assumed not to have made the cutoff
        let Some(last_pause_at) = last_pause_at else {
            debug!("No pause recorded, skipping resume check");
            return false;
        };

        let idle = match (now - last_pause_at).to_std() {
            Ok(idle) => idle,
            Err(_) => {
                debug!("Pause timestamp {} is in the future", last_pause_at);
                return false;
            },
        };

        let should = idle >= config.idle_cutoff && config.check == CheckPolicy::EveryStart;
        debug!(
            "Resume check: policy={:?}, idle={:?}, cutoff={:?}, should={}",
            config.check, idle, config.idle_cutoff, should
        );
        should
    }

    /// A confirmation gate only matters when configured and actually supplied
    pub fn is_confirmation_required(&self, config: &ReloaderConfig, gate_present: bool) -> bool {
        config.require_confirmation_before_reload && gate_present
    }
}
