// Interfaces to the host application shell
//
// The controller never talks to the platform directly. Everything it needs
// from the outside world goes through these traits, so a host can plug in a
// real launch screen, webview navigation and update channel.

use crate::controller::Approval;
use crate::models::MigrationResponse;
use crate::storage::KeyValueStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub mod headless;

pub use headless::{HeadlessNavigator, LocalDelivery, LoggingHold, ManualGate, TracingSplash};

/// Callback that asks the delivery channel to try the migration again
pub type RetryFn = Arc<dyn Fn() + Send + Sync>;

/// Handler the delivery channel invokes whenever a new build is ready
pub type MigrationHandler = Box<dyn Fn(Option<RetryFn>) -> MigrationResponse + Send + Sync>;

/// Token that keeps the application UI hidden until released
pub trait HoldHandle: Send {
    fn release(self: Box<Self>);
}

pub trait StartupHold: Send + Sync {
    fn acquire(&self) -> Box<dyn HoldHandle>;
}

/// Native splash overlay
pub trait SplashScreen: Send + Sync {
    fn show(&self);
    fn hide(&self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUrl {
    pub full: String,
    pub has_fragment: bool,
}

impl CurrentUrl {
    /// A trailing bare `#` counts as a fragment too
    pub fn parse(full: impl Into<String>) -> Self {
        let full = full.into();
        let has_fragment = full.contains('#');
        Self { full, has_fragment }
    }
}

pub trait Navigator: Send + Sync {
    fn current_url(&self) -> CurrentUrl;

    /// Full reload of the current document
    fn reload_in_place(&self);

    /// Navigate to `url`, replacing the current history entry
    fn replace_location(&self, url: &str);
}

/// Application-supplied gate that may delay applying a pending update
pub trait ConfirmationGate: Send + Sync {
    fn before_reload(&self, approval: Approval);
}

impl<F> ConfirmationGate for F
where
    F: Fn(Approval) + Send + Sync,
{
    fn before_reload(&self, approval: Approval) {
        self(approval)
    }
}

/// External channel that delivers new builds
pub trait UpdateDelivery: Send + Sync {
    /// Register the single migration handler under `name`
    fn on_migrate(&self, name: &str, handler: MigrationHandler);
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Everything the controller needs from the host
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn KeyValueStore>,
    pub hold: Arc<dyn StartupHold>,
    pub splash: Option<Arc<dyn SplashScreen>>,
    pub navigator: Arc<dyn Navigator>,
    pub gate: Option<Arc<dyn ConfirmationGate>>,
    pub clock: Arc<dyn Clock>,
}
