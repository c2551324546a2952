// Common test utilities for integration tests
//
// Recording stand-ins for every host collaborator, so tests can assert on
// the exact sequence of things the reloader asked the host to do.

#![allow(dead_code)]

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reloader::host::{
    Clock, Collaborators, ConfirmationGate, CurrentUrl, HoldHandle, Navigator, SplashScreen,
    StartupHold,
};
use reloader::models::keys;
use reloader::storage::{KeyValueStore, MemoryStore, encode_timestamp};
use reloader::{Approval, Reloader, ReloaderConfig};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    HoldReleased,
    SplashShown,
    SplashHidden,
    ReloadInPlace { refresh_marked: bool },
    Replace { url: String, refresh_marked: bool },
    GateAsked,
}

pub type EventLog = Arc<Mutex<Vec<HostEvent>>>;

fn push(log: &EventLog, event: HostEvent) {
    log.lock().unwrap().push(event);
}

pub struct RecordingHold {
    log: EventLog,
}

struct RecordingHoldHandle {
    log: EventLog,
}

impl HoldHandle for RecordingHoldHandle {
    fn release(self: Box<Self>) {
        push(&self.log, HostEvent::HoldReleased);
    }
}

impl StartupHold for RecordingHold {
    fn acquire(&self) -> Box<dyn HoldHandle> {
        Box::new(RecordingHoldHandle {
            log: self.log.clone(),
        })
    }
}

pub struct RecordingSplash {
    log: EventLog,
}

impl SplashScreen for RecordingSplash {
    fn show(&self) {
        push(&self.log, HostEvent::SplashShown);
    }

    fn hide(&self) {
        push(&self.log, HostEvent::SplashHidden);
    }
}

/// Navigator that notes whether the reload marker was already persisted
pub struct RecordingNavigator {
    log: EventLog,
    url: Mutex<String>,
    store: Arc<MemoryStore>,
}

impl RecordingNavigator {
    fn refresh_marked(&self) -> bool {
        self.store.get(keys::WAS_REFRESHED).is_some()
    }
}

impl Navigator for RecordingNavigator {
    fn current_url(&self) -> CurrentUrl {
        CurrentUrl::parse(self.url.lock().unwrap().clone())
    }

    fn reload_in_place(&self) {
        let refresh_marked = self.refresh_marked();
        push(&self.log, HostEvent::ReloadInPlace { refresh_marked });
    }

    fn replace_location(&self, url: &str) {
        let refresh_marked = self.refresh_marked();
        push(
            &self.log,
            HostEvent::Replace {
                url: url.to_string(),
                refresh_marked,
            },
        );
    }
}

/// Gate that keeps every approval handle it is given
#[derive(Default)]
pub struct RecordingGate {
    log: Mutex<Option<EventLog>>,
    approvals: Mutex<Vec<Approval>>,
}

impl RecordingGate {
    pub fn asked(&self) -> usize {
        self.approvals.lock().unwrap().len()
    }

    pub fn latest(&self) -> Approval {
        self.approvals
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("gate was never asked")
    }
}

impl ConfirmationGate for RecordingGate {
    fn before_reload(&self, approval: Approval) {
        if let Some(log) = self.log.lock().unwrap().as_ref() {
            push(log, HostEvent::GateAsked);
        }
        self.approvals.lock().unwrap().push(approval);
    }
}

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: ChronoDuration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

pub struct Harness {
    pub log: EventLog,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub gate: Arc<RecordingGate>,
    pub url: String,
    pub with_splash: bool,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            store: Arc::new(MemoryStore::new()),
            clock: Arc::new(ManualClock::new(
                DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
            )),
            gate: Arc::new(RecordingGate::default()),
            url: "https://app.example.com/home".to_string(),
            with_splash: true,
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn without_splash(mut self) -> Self {
        self.with_splash = false;
        self
    }

    pub fn collaborators(&self, with_gate: bool) -> Collaborators {
        *self.gate.log.lock().unwrap() = Some(self.log.clone());

        Collaborators {
            store: self.store.clone(),
            hold: Arc::new(RecordingHold {
                log: self.log.clone(),
            }),
            splash: self.with_splash.then(|| {
                Arc::new(RecordingSplash {
                    log: self.log.clone(),
                }) as Arc<dyn SplashScreen>
            }),
            navigator: Arc::new(RecordingNavigator {
                log: self.log.clone(),
                url: Mutex::new(self.url.clone()),
                store: self.store.clone(),
            }),
            gate: with_gate.then(|| self.gate.clone() as Arc<dyn ConfirmationGate>),
            clock: self.clock.clone(),
        }
    }

    pub fn reloader(&self, config: ReloaderConfig, with_gate: bool) -> Reloader {
        Reloader::new(self.collaborators(with_gate), config)
    }

    pub fn events(&self) -> Vec<HostEvent> {
        self.log.lock().unwrap().clone()
    }

    pub fn reloads(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    HostEvent::ReloadInPlace { .. } | HostEvent::Replace { .. }
                )
            })
            .count()
    }

    pub fn set_timestamp(&self, key: &str, at: DateTime<Utc>) {
        self.store.set(key, &encode_timestamp(at)).unwrap();
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.store.get(key).is_some()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

/// Configuration without confirmation, the way most scenarios want it
pub fn config(check_timer_ms: u64) -> ReloaderConfig {
    ReloaderConfig {
        check_timer: std::time::Duration::from_millis(check_timer_ms),
        require_confirmation_before_reload: false,
        ..Default::default()
    }
}
