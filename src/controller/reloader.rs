use super::approval::Approval;
use super::PACKAGE_NAME;
use crate::config::{ConfigOverrides, ReloaderConfig};
use crate::host::{
    Clock, Collaborators, ConfirmationGate, HoldHandle, MigrationHandler, Navigator, RetryFn,
    SplashScreen,
};
use crate::metrics::{
    CHECK_TIMEOUTS, CHECKS_STARTED, CONFIRMATIONS_REQUESTED, RELOADS_BLOCKED, RELOADS_TRIGGERED,
    UPDATES_APPLIED_INSTANTLY, UPDATES_RECEIVED,
};
use crate::models::{
    CycleOutcome, MigrationResponse, RefreshPolicy, ReloadState, ResumeAction, keys,
};
use crate::policy::PolicyEngine;
use crate::storage::{self, KeyValueStore};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Decides when a pending update is applied by reloading the application.
///
/// One instance per process. Cloning is cheap and every clone drives the
/// same controller.
#[derive(Clone)]
pub struct Reloader {
    inner: Arc<Inner>,
}

pub(super) struct Inner {
    engine: PolicyEngine,
    config: RwLock<ReloaderConfig>,
    initialized: AtomicBool,
    confirming: AtomicBool,

    store: Arc<dyn KeyValueStore>,
    splash: Option<Arc<dyn SplashScreen>>,
    navigator: Arc<dyn Navigator>,
    gate: Option<Arc<dyn ConfirmationGate>>,
    clock: Arc<dyn Clock>,

    hold: Mutex<Option<Box<dyn HoldHandle>>>,
    retry: Mutex<Option<RetryFn>>,
    cycle: Mutex<Option<JoinHandle<CycleOutcome>>>,

    update_available: watch::Sender<bool>,
    is_checked: watch::Sender<bool>,
    state: watch::Sender<ReloadState>,
}

impl Reloader {
    /// Create the controller and take the startup hold right away
    pub fn new(collaborators: Collaborators, config: ReloaderConfig) -> Self {
        let hold = collaborators.hold.acquire();
        debug!("Starting with base configuration: {:?}", config);

        Self {
            inner: Arc::new(Inner {
                engine: PolicyEngine,
                config: RwLock::new(config),
                initialized: AtomicBool::new(false),
                confirming: AtomicBool::new(false),
                store: collaborators.store,
                splash: collaborators.splash,
                navigator: collaborators.navigator,
                gate: collaborators.gate,
                clock: collaborators.clock,
                hold: Mutex::new(Some(hold)),
                retry: Mutex::new(None),
                cycle: Mutex::new(None),
                update_available: watch::channel(false).0,
                is_checked: watch::channel(false).0,
                state: watch::channel(ReloadState::Idle).0,
            }),
        }
    }

    /// Merge `overrides` into the configuration and run the start cycle.
    ///
    /// Only the first call has any effect; it returns `true`. The start
    /// decision is taken before returning, the wait runs on a spawned task
    /// (see [`Reloader::join_cycle`]). Outside a tokio runtime there is
    /// nothing to wait on, so the start is settled on the spot.
    pub fn initialize(&self, overrides: ConfigOverrides) -> bool {
        if self
            .inner
            .initialized
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Already initialized, ignoring");
            return false;
        }

        let merged = self.inner.config().merge(&overrides);
        info!(
            "Initializing {}: check={:?}, refresh={:?}, check_timer={:?}",
            PACKAGE_NAME, merged.check, merged.refresh, merged.check_timer
        );
        match self.inner.config.write() {
            Ok(mut config) => *config = merged,
            Err(poisoned) => *poisoned.into_inner() = merged,
        }

        let should_check = self.inner.should_check_on_start();
        if should_check {
            self.inner.set_state(ReloadState::Checking);
        }
        let inner = self.inner.clone();
        if !self.spawn_cycle(async move { inner.run_start(should_check).await }) {
            self.inner.finish_inline(should_check);
        }
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::SeqCst)
    }

    /// Run the start cycle inline: check for an update or release the hold
    pub async fn on_start(&self) -> CycleOutcome {
        let should_check = self.inner.should_check_on_start();
        self.inner.run_start(should_check).await
    }

    /// The application came back from the background
    pub fn on_resume(&self) -> ResumeAction {
        let inner = &self.inner;
        debug!("Application resumed");

        if inner.state() == ReloadState::Reloading {
            debug!("Reload already under way, ignoring resume");
            return ResumeAction::Nothing;
        }

        let config = inner.config();
        let last_pause_at = storage::read_timestamp(&*inner.store, keys::LAST_PAUSE);
        let should_check =
            inner
                .engine
                .should_check_on_resume(&config, inner.clock.now(), last_pause_at);

        // The next idle period has to be measured from a fresh pause
        inner.remove_key(keys::LAST_PAUSE);

        if should_check {
            inner.show_splash();
            inner.set_state(ReloadState::Checking);
            let cycle = self.inner.clone();
            if self.spawn_cycle(async move { cycle.run_check().await }) {
                return ResumeAction::Checking;
            }
            return match inner.finish_inline(true) {
                CycleOutcome::Reloading => ResumeAction::Reloading,
                _ => ResumeAction::Nothing,
            };
        }

        if inner.update_available() && config.refresh == RefreshPolicy::OnStartAndResume {
            debug!("Update already pending, applying on resume");
            return if inner.reload_now() {
                ResumeAction::Reloading
            } else {
                ResumeAction::Blocked
            };
        }

        ResumeAction::Nothing
    }

    /// The application went to the background
    pub fn on_pause(&self) {
        let now = self.inner.clock.now();
        debug!("Application paused at {}", now);
        if let Err(e) = storage::write_timestamp(&*self.inner.store, keys::LAST_PAUSE, now) {
            warn!("Failed to record pause time: {}", e);
        }
    }

    /// Remember this start and forget any pause from the previous process
    pub fn record_start(&self) {
        let now = self.inner.clock.now();
        if let Err(e) = storage::write_timestamp(&*self.inner.store, keys::LAST_START, now) {
            warn!("Failed to record start time: {}", e);
        }
        self.inner.remove_key(keys::LAST_PAUSE);
    }

    /// Reload now unless the update is still waiting for confirmation.
    /// Returns whether a reload is under way.
    pub fn reload_now(&self) -> bool {
        self.inner.reload_now()
    }

    /// Called by the update-delivery channel once per new build
    pub fn on_update_available(&self, retry: Option<RetryFn>) -> MigrationResponse {
        self.inner.on_update_available(retry)
    }

    /// Handler to register with the update-delivery channel
    pub fn migration_handler(&self) -> MigrationHandler {
        let reloader = self.clone();
        Box::new(move |retry| reloader.on_update_available(retry))
    }

    /// Wait for the in-flight start or resume cycle, if any
    pub async fn join_cycle(&self) -> Option<CycleOutcome> {
        let handle = lock(&self.inner.cycle).take()?;
        match handle.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                debug!("Check cycle did not complete: {}", e);
                None
            },
        }
    }

    /// Tear down any in-flight check cycle
    pub fn dispose(&self) {
        if let Some(handle) = lock(&self.inner.cycle).take() {
            debug!("Aborting in-flight check cycle");
            handle.abort();
        }
    }

    pub fn config(&self) -> ReloaderConfig {
        self.inner.config()
    }

    pub fn state(&self) -> ReloadState {
        self.inner.state()
    }

    pub fn update_available(&self) -> bool {
        self.inner.update_available()
    }

    pub fn is_checked(&self) -> bool {
        *self.inner.is_checked.borrow()
    }

    /// Level-triggered view of the update flag
    pub fn subscribe_update_available(&self) -> watch::Receiver<bool> {
        self.inner.update_available.subscribe()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ReloadState> {
        self.inner.state.subscribe()
    }

    /// Returns false, dropping `cycle`, when there is no runtime to run it on
    fn spawn_cycle<F>(&self, cycle: F) -> bool
    where
        F: Future<Output = CycleOutcome> + Send + 'static,
    {
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!("Cannot run check cycle outside a tokio runtime: {}", e);
                return false;
            },
        };

        let handle = runtime.spawn(cycle);
        if let Some(previous) = lock(&self.inner.cycle).replace(handle) {
            debug!("Replacing previous check cycle");
            previous.abort();
        }
        true
    }
}

impl fmt::Debug for Reloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reloader")
            .field("state", &self.state())
            .field("update_available", &self.update_available())
            .field("is_checked", &self.is_checked())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl Inner {
    fn config(&self) -> ReloaderConfig {
        match self.config.read() {
            Ok(config) => config.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn state(&self) -> ReloadState {
        *self.state.borrow()
    }

    fn update_available(&self) -> bool {
        *self.update_available.borrow()
    }

    /// Reloading is terminal for this process
    fn set_state(&self, next: ReloadState) {
        self.state.send_if_modified(|current| {
            if *current == next || *current == ReloadState::Reloading {
                return false;
            }
            debug!("State {:?} -> {:?}", current, next);
            *current = next;
            true
        });
    }

    pub(super) fn set_checked(&self, checked: bool) {
        self.is_checked.send_replace(checked);
    }

    pub(super) fn retry(&self) {
        let retry = lock(&self.retry).clone();
        match retry {
            Some(retry) => retry(),
            None => info!("No retry function yet"),
        }
    }

    fn confirmation_required(&self) -> bool {
        self.engine
            .is_confirmation_required(&self.config(), self.gate.is_some())
    }

    fn should_check_on_start(&self) -> bool {
        let timestamps = storage::load_timestamps(&*self.store);
        self.engine.should_check_on_start(
            &self.config(),
            timestamps.was_refreshed_at,
            timestamps.last_start_at,
        )
    }

    fn remove_key(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            warn!("Failed to remove {}: {}", key, e);
        }
    }

    fn release_hold(&self) {
        match lock(&self.hold).take() {
            Some(hold) => {
                debug!("Releasing launch screen hold");
                hold.release();
            },
            None => debug!("Launch screen hold already released"),
        }
    }

    fn show_splash(&self) {
        match &self.splash {
            Some(splash) => splash.show(),
            None => warn!("Splash screen not available, cannot show it"),
        }
    }

    fn hide_splash(&self) {
        match &self.splash {
            Some(splash) => splash.hide(),
            None => warn!("Splash screen not available, cannot hide it"),
        }
    }

    async fn run_start(&self, should_check: bool) -> CycleOutcome {
        if should_check {
            return self.run_check().await;
        }

        let delay = self.config().launch_screen_delay;
        debug!("No update check needed, releasing hold in {:?}", delay);
        tokio::time::sleep(delay).await;

        self.release_hold();
        // This start is settled; a later resume is evaluated on its own
        self.remove_key(keys::WAS_REFRESHED);
        self.set_state(ReloadState::Settled);
        CycleOutcome::NoCheck
    }

    /// Race an incoming update against the check timer
    async fn run_check(&self) -> CycleOutcome {
        CHECKS_STARTED.inc();
        self.set_state(ReloadState::Checking);

        let check_timer = self.config().check_timer;
        let mut update_rx = self.update_available.subscribe();
        let mut checked_rx = self.is_checked.subscribe();
        let mut state_rx = self.state.subscribe();

        if self.update_available() {
            debug!("Update already pending, attempting reload");
        } else {
            debug!("Waiting up to {:?} for an update", check_timer);
        }

        let reload = async {
            // Resolves immediately when the flag is already set
            let available = update_rx.wait_for(|available| *available).await.is_ok();
            if !available {
                return std::future::pending::<()>().await;
            }

            loop {
                if self.reload_now() {
                    return;
                }
                // Blocked on the gate: keep waiting for confirmation, not for a new build
                self.set_state(ReloadState::Idle);
                if checked_rx.changed().await.is_err() {
                    return std::future::pending::<()>().await;
                }
            }
        };

        // An instant apply hands the reload to the delivery channel without
        // raising the update flag, so watch the state as well
        let reloading = state_rx.wait_for(|state| *state == ReloadState::Reloading);

        tokio::select! {
            biased;
            _ = reloading => CycleOutcome::Reloading,
            _ = reload => CycleOutcome::Reloading,
            _ = tokio::time::sleep(check_timer) => {
                if self.state() == ReloadState::Reloading {
                    return CycleOutcome::Reloading;
                }
                self.settle();
                CycleOutcome::Settled
            },
        }
    }

    /// Settle a cycle without waiting: reload if an update is already
    /// pending, otherwise show the application right away
    fn finish_inline(&self, should_check: bool) -> CycleOutcome {
        if should_check && self.update_available() && self.reload_now() {
            return CycleOutcome::Reloading;
        }

        info!("Settling without waiting for an update");
        self.release_hold();
        self.hide_splash();
        if !should_check {
            self.remove_key(keys::WAS_REFRESHED);
        }
        self.set_state(ReloadState::Settled);

        if should_check {
            CycleOutcome::Settled
        } else {
            CycleOutcome::NoCheck
        }
    }

    fn settle(&self) {
        info!("No reload within the check timer, showing the application");
        CHECK_TIMEOUTS.inc();
        self.release_hold();
        self.hide_splash();
        self.set_state(ReloadState::Settled);
    }

    /// Mark the reload in storage and cover the screen; navigation is left to the caller
    fn prepare_to_reload(&self) {
        self.set_state(ReloadState::Reloading);

        let now = self.clock.now();
        debug!("Marking reload at {}", now);
        if let Err(e) = storage::write_timestamp(&*self.store, keys::WAS_REFRESHED, now) {
            warn!("Failed to record reload time: {}", e);
        }

        self.show_splash();
        RELOADS_TRIGGERED.inc();
    }

    fn reload_now(&self) -> bool {
        if self.state() == ReloadState::Reloading {
            debug!("Reload already under way");
            return true;
        }

        if self.confirmation_required() && !*self.is_checked.borrow() {
            info!("Not reloading: update is waiting for confirmation");
            RELOADS_BLOCKED.inc();
            return false;
        }

        self.prepare_to_reload();

        // Replacing the location skips asset revalidation, but with a fragment
        // it would only scroll, so fall back to a full reload there.
        let url = self.navigator.current_url();
        if url.has_fragment {
            info!("Reloading application in place");
            self.navigator.reload_in_place();
        } else {
            info!("Reloading application via location replace");
            self.navigator.replace_location(&url.full);
        }
        true
    }

    fn on_update_available(self: &Arc<Self>, retry: Option<RetryFn>) -> MigrationResponse {
        UPDATES_RECEIVED.inc();
        if let Some(retry) = retry {
            *lock(&self.retry) = Some(retry);
        }

        let config = self.config();
        let confirmation_required = self.confirmation_required();
        let is_checked = *self.is_checked.borrow();
        debug!(
            "Update available: refresh={:?}, confirmation_required={}, is_checked={}",
            config.refresh, confirmation_required, is_checked
        );

        if config.refresh == RefreshPolicy::Instantly && (!confirmation_required || is_checked) {
            // The channel performs the reload itself once we answer
            self.prepare_to_reload();
            self.set_checked(false);
            UPDATES_APPLIED_INSTANTLY.inc();
            return MigrationResponse::apply_now();
        }

        if confirmation_required {
            self.request_confirmation();
        }

        self.update_available.send_replace(true);
        MigrationResponse::not_yet()
    }

    fn request_confirmation(self: &Arc<Self>) {
        let Some(gate) = self.gate.clone() else {
            return;
        };

        // A gate that approves synchronously re-enters through the retry
        if self.confirming.swap(true, Ordering::SeqCst) {
            debug!("Confirmation already in progress, not asking again");
            return;
        }

        debug!("Asking confirmation gate before reloading");
        CONFIRMATIONS_REQUESTED.inc();
        gate.before_reload(Approval::new(Arc::downgrade(self)));
        self.confirming.store(false, Ordering::SeqCst);
    }
}
