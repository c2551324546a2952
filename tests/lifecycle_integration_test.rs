// Integration tests for bootstrap and lifecycle wiring
//
// These run the reloader the way a host would: registered with an update
// channel, driven by pause/resume events over the lifecycle channel

mod common;

use chrono::Duration as ChronoDuration;
use common::{Harness, config};
use reloader::host::{
    Collaborators, ConfirmationGate, HeadlessNavigator, LocalDelivery, LoggingHold, ManualGate,
    SplashScreen, TracingSplash,
};
use reloader::lifecycle::{self, LifecycleEvent};
use reloader::models::keys;
use reloader::{CheckPolicy, CycleOutcome, RefreshPolicy, ReloadState, Reloader, ReloaderConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

struct Headless {
    harness: Harness,
    navigator: Arc<HeadlessNavigator>,
    hold: Arc<LoggingHold>,
    gate: Arc<ManualGate>,
    delivery: Arc<LocalDelivery>,
}

impl Headless {
    fn new() -> Self {
        Self {
            harness: Harness::new(),
            navigator: Arc::new(HeadlessNavigator::new("app://localhost/")),
            hold: Arc::new(LoggingHold::new()),
            gate: Arc::new(ManualGate::new()),
            delivery: LocalDelivery::new(),
        }
    }

    fn reloader(&self, config: ReloaderConfig, with_gate: bool) -> Reloader {
        let collaborators = Collaborators {
            store: self.harness.store.clone(),
            hold: self.hold.clone(),
            splash: Some(Arc::new(TracingSplash::new()) as Arc<dyn SplashScreen>),
            navigator: self.navigator.clone(),
            gate: with_gate.then(|| self.gate.clone() as Arc<dyn ConfirmationGate>),
            clock: self.harness.clock.clone(),
        };
        Reloader::new(collaborators, config)
    }
}

async fn settle_tasks() {
    sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_bootstrap_initializes_and_records_start() {
    let host = Headless::new();
    host.harness.set_timestamp(keys::LAST_PAUSE, host.harness.now());
    let reloader = host.reloader(
        ReloaderConfig {
            check: CheckPolicy::FirstStart,
            ..config(1000)
        },
        false,
    );

    let (_handle, _events) = lifecycle::start(&reloader, host.delivery.as_ref());

    assert!(reloader.is_initialized());
    assert!(host.harness.has_key(keys::LAST_START));
    assert!(!host.harness.has_key(keys::LAST_PAUSE));

    // First launch ever, so the start decision was to check
    assert_eq!(reloader.state(), ReloadState::Checking);
    assert_eq!(reloader.join_cycle().await, Some(CycleOutcome::Settled));
    assert!(host.hold.is_released());
}

#[tokio::test(start_paused = true)]
async fn test_bootstrap_without_automatic_initialization() {
    let host = Headless::new();
    let reloader = host.reloader(
        ReloaderConfig {
            automatic_initialization: false,
            ..config(1000)
        },
        false,
    );

    let (_handle, _events) = lifecycle::start(&reloader, host.delivery.as_ref());

    assert!(!reloader.is_initialized());
    assert!(host.harness.has_key(keys::LAST_START));
    assert_eq!(reloader.join_cycle().await, None);
    assert!(!host.hold.is_released());
}

#[tokio::test(start_paused = true)]
async fn test_manual_initialize_after_bootstrap_is_not_a_first_launch() {
    let host = Headless::new();
    let reloader = host.reloader(
        ReloaderConfig {
            check: CheckPolicy::FirstStart,
            automatic_initialization: false,
            ..config(1000)
        },
        false,
    );

    let (_handle, _events) = lifecycle::start(&reloader, host.delivery.as_ref());
    assert!(reloader.initialize(Default::default()));

    // The start was already recorded, so there is nothing to wait for
    assert_eq!(reloader.join_cycle().await, Some(CycleOutcome::NoCheck));
    assert_eq!(reloader.state(), ReloadState::Settled);
    assert!(host.hold.is_released());
}

#[tokio::test(start_paused = true)]
async fn test_update_from_delivery_channel_reloads_during_check() {
    let host = Headless::new();
    let reloader = host.reloader(config(5000), false);
    let (_handle, _events) = lifecycle::start(&reloader, host.delivery.as_ref());

    settle_tasks().await;
    let response = host.delivery.announce().unwrap();
    assert!(!response.apply_now);

    assert_eq!(reloader.join_cycle().await, Some(CycleOutcome::Reloading));
    assert_eq!(host.navigator.navigations(), 1);
    assert!(host.harness.has_key(keys::WAS_REFRESHED));
}

#[tokio::test(start_paused = true)]
async fn test_pause_and_resume_events_drive_a_new_check() {
    let host = Headless::new();
    let reloader = host.reloader(config(1000), false);
    let (_handle, events) = lifecycle::start(&reloader, host.delivery.as_ref());
    assert_eq!(reloader.join_cycle().await, Some(CycleOutcome::Settled));

    events.send(LifecycleEvent::Pause).unwrap();
    settle_tasks().await;
    assert!(host.harness.has_key(keys::LAST_PAUSE));

    host.harness.clock.advance(ChronoDuration::minutes(10));
    events.send(LifecycleEvent::Resume).unwrap();
    settle_tasks().await;
    assert!(!host.harness.has_key(keys::LAST_PAUSE));

    host.delivery.announce().unwrap();
    assert_eq!(reloader.join_cycle().await, Some(CycleOutcome::Reloading));
    assert_eq!(host.navigator.navigations(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_manual_gate_approval_with_delivery_retry() {
    let host = Headless::new();
    let reloader = host.reloader(
        ReloaderConfig {
            require_confirmation_before_reload: true,
            ..config(0)
        },
        true,
    );
    let (_handle, _events) = lifecycle::start(&reloader, host.delivery.as_ref());
    reloader.join_cycle().await;

    let response = host.delivery.announce().unwrap();
    assert!(!response.apply_now);
    assert_eq!(host.gate.requests(), 1);
    assert!(!reloader.reload_now());

    // Approval retries the migration, which asks the gate again
    assert!(host.gate.approve());
    assert_eq!(host.gate.requests(), 2);
    assert!(reloader.is_checked());

    assert!(reloader.reload_now());
    assert_eq!(host.navigator.navigations(), 1);
    assert!(!host.delivery.was_applied());
}

#[tokio::test(start_paused = true)]
async fn test_manual_gate_approval_applies_instantly() {
    let host = Headless::new();
    let reloader = host.reloader(
        ReloaderConfig {
            refresh: RefreshPolicy::Instantly,
            require_confirmation_before_reload: true,
            ..config(0)
        },
        true,
    );
    let (_handle, _events) = lifecycle::start(&reloader, host.delivery.as_ref());
    reloader.join_cycle().await;

    assert!(!host.delivery.announce().unwrap().apply_now);
    assert!(!host.delivery.was_applied());

    assert!(host.gate.approve());
    assert!(host.delivery.was_applied());
    assert!(!reloader.is_checked());
    assert_eq!(reloader.state(), ReloadState::Reloading);
    assert_eq!(host.navigator.navigations(), 0);
}

#[test]
fn test_manual_gate_without_request() {
    let gate = ManualGate::new();
    assert!(!gate.approve());
    assert!(!gate.defer());
    assert_eq!(gate.requests(), 0);
}
