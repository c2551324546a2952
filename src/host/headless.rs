// Headless collaborators
//
// Stand-ins for a real application shell: every action is logged through
// tracing and recorded so a driver (the binary, or a test) can inspect it.

use super::{
    ConfirmationGate, CurrentUrl, HoldHandle, MigrationHandler, Navigator, RetryFn, SplashScreen,
    StartupHold, UpdateDelivery,
};
use crate::controller::Approval;
use crate::models::MigrationResponse;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct LoggingHold {
    released: Arc<AtomicBool>,
}

impl LoggingHold {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

struct LoggingHoldHandle {
    released: Arc<AtomicBool>,
}

impl HoldHandle for LoggingHoldHandle {
    fn release(self: Box<Self>) {
        info!("Launch screen hold released");
        self.released.store(true, Ordering::SeqCst);
    }
}

impl StartupHold for LoggingHold {
    fn acquire(&self) -> Box<dyn HoldHandle> {
        debug!("Launch screen hold acquired");
        self.released.store(false, Ordering::SeqCst);
        Box::new(LoggingHoldHandle {
            released: self.released.clone(),
        })
    }
}

#[derive(Debug, Default)]
pub struct TracingSplash {
    visible: AtomicBool,
}

impl TracingSplash {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }
}

impl SplashScreen for TracingSplash {
    fn show(&self) {
        info!("Splash screen shown");
        self.visible.store(true, Ordering::SeqCst);
    }

    fn hide(&self) {
        info!("Splash screen hidden");
        self.visible.store(false, Ordering::SeqCst);
    }
}

/// Navigator that only records where it was told to go
#[derive(Debug)]
pub struct HeadlessNavigator {
    url: RwLock<String>,
    navigations: AtomicUsize,
    navigated: Notify,
}

impl HeadlessNavigator {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: RwLock::new(url.into()),
            navigations: AtomicUsize::new(0),
            navigated: Notify::new(),
        }
    }

    pub fn navigations(&self) -> usize {
        self.navigations.load(Ordering::SeqCst)
    }

    /// Resolves once a reload or replace navigation has happened
    pub async fn wait_for_navigation(&self) {
        self.navigated.notified().await
    }

    fn record(&self) {
        self.navigations.fetch_add(1, Ordering::SeqCst);
        self.navigated.notify_one();
    }
}

impl Navigator for HeadlessNavigator {
    fn current_url(&self) -> CurrentUrl {
        let url = match self.url.read() {
            Ok(url) => url.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        CurrentUrl::parse(url)
    }

    fn reload_in_place(&self) {
        info!("Reloading {} in place", self.current_url().full);
        self.record();
    }

    fn replace_location(&self, url: &str) {
        info!("Replacing location with {}", url);
        if let Ok(mut current) = self.url.write() {
            *current = url.to_string();
        }
        self.record();
    }
}

type SharedHandler = Arc<dyn Fn(Option<RetryFn>) -> MigrationResponse + Send + Sync>;

/// In-process update channel: `announce` plays the part of a freshly built bundle
#[derive(Default)]
pub struct LocalDelivery {
    handler: RwLock<Option<(String, SharedHandler)>>,
    applied: AtomicBool,
}

impl LocalDelivery {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Offer a new build to the registered handler. Returns `None` if nobody listens.
    pub fn announce(self: &Arc<Self>) -> Option<MigrationResponse> {
        let (name, handler) = self.handler.read().ok()?.clone()?;
        debug!("Offering new build to {}", name);

        let weak: Weak<Self> = Arc::downgrade(self);
        let retry: RetryFn = Arc::new(move || {
            if let Some(delivery) = weak.upgrade() {
                delivery.announce();
            }
        });

        let response = handler(Some(retry));
        if response.apply_now {
            info!("{} allowed the new build to be applied now", name);
            self.applied.store(true, Ordering::SeqCst);
        }
        Some(response)
    }

    /// Whether a handler ever answered `apply_now`
    pub fn was_applied(&self) -> bool {
        self.applied.load(Ordering::SeqCst)
    }
}

impl UpdateDelivery for LocalDelivery {
    fn on_migrate(&self, name: &str, handler: MigrationHandler) {
        match self.handler.write() {
            Ok(mut slot) => {
                if slot.is_some() {
                    warn!("Replacing existing migration handler with {}", name);
                }
                *slot = Some((name.to_string(), Arc::from(handler)));
            },
            Err(_) => warn!("Migration handler registry poisoned, {} not registered", name),
        }
    }
}

/// Gate that parks the approval until someone decides
#[derive(Default)]
pub struct ManualGate {
    pending: Mutex<Option<Approval>>,
    requests: AtomicUsize,
}

impl ManualGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn latest(&self) -> Option<Approval> {
        self.pending.lock().ok()?.clone()
    }

    /// Approve the latest pending request. Returns false if none is pending.
    pub fn approve(&self) -> bool {
        match self.latest() {
            Some(approval) => {
                approval.approve();
                true
            },
            None => false,
        }
    }

    pub fn defer(&self) -> bool {
        match self.latest() {
            Some(approval) => {
                approval.defer();
                true
            },
            None => false,
        }
    }
}

impl ConfirmationGate for ManualGate {
    fn before_reload(&self, approval: Approval) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        info!("Update ready, waiting for confirmation");
        if let Ok(mut pending) = self.pending.lock() {
            *pending = Some(approval);
        }
    }
}
