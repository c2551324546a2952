use super::reloader::Inner;
use crate::metrics::{CONFIRMATIONS_APPROVED, CONFIRMATIONS_DEFERRED};
use std::fmt;
use std::sync::Weak;
use tracing::{debug, warn};

/// Handle given to the confirmation gate.
///
/// Either method may be called any number of times; the most recent call
/// decides whether a reload is allowed.
#[derive(Clone)]
pub struct Approval {
    inner: Weak<Inner>,
}

impl Approval {
    pub(super) fn new(inner: Weak<Inner>) -> Self {
        Self { inner }
    }

    /// Allow the pending update and ask the delivery channel to retry it
    pub fn approve(&self) {
        let Some(inner) = self.inner.upgrade() else {
            warn!("Approval received after the reloader was dropped");
            return;
        };

        debug!("Confirmation gate approved the update");
        CONFIRMATIONS_APPROVED.inc();
        inner.set_checked(true);
        inner.retry();
    }

    /// Keep holding the pending update
    pub fn defer(&self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };

        debug!("Confirmation gate deferred the update");
        CONFIRMATIONS_DEFERRED.inc();
        inner.set_checked(false);
    }
}

impl fmt::Debug for Approval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Approval")
            .field("live", &(self.inner.strong_count() > 0))
            .finish()
    }
}
