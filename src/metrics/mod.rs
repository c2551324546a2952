use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};
use tracing::info;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Update channel metrics
    pub static ref UPDATES_RECEIVED: IntCounter = IntCounter::new(
        "reloader_updates_received_total",
        "Total number of update notifications received from the delivery channel"
    ).unwrap();

    pub static ref UPDATES_APPLIED_INSTANTLY: IntCounter = IntCounter::new(
        "reloader_updates_applied_instantly_total",
        "Total number of updates handed back to the delivery channel to apply immediately"
    ).unwrap();

    // Check cycle metrics
    pub static ref CHECKS_STARTED: IntCounter = IntCounter::new(
        "reloader_checks_started_total",
        "Total number of update checks started on start or resume"
    ).unwrap();

    pub static ref CHECK_TIMEOUTS: IntCounter = IntCounter::new(
        "reloader_check_timeouts_total",
        "Total number of update checks that gave up without reloading"
    ).unwrap();

    // Reload metrics
    pub static ref RELOADS_TRIGGERED: IntCounter = IntCounter::new(
        "reloader_reloads_triggered_total",
        "Total number of reloads triggered"
    ).unwrap();

    pub static ref RELOADS_BLOCKED: IntCounter = IntCounter::new(
        "reloader_reloads_blocked_total",
        "Total number of reload attempts blocked pending confirmation"
    ).unwrap();

    // Confirmation metrics
    pub static ref CONFIRMATIONS_REQUESTED: IntCounter = IntCounter::new(
        "reloader_confirmations_requested_total",
        "Total number of times the confirmation gate was asked"
    ).unwrap();

    pub static ref CONFIRMATIONS_APPROVED: IntCounter = IntCounter::new(
        "reloader_confirmations_approved_total",
        "Total number of approvals received from the confirmation gate"
    ).unwrap();

    pub static ref CONFIRMATIONS_DEFERRED: IntCounter = IntCounter::new(
        "reloader_confirmations_deferred_total",
        "Total number of deferrals received from the confirmation gate"
    ).unwrap();
}

pub fn register_metrics() {
    REGISTRY.register(Box::new(UPDATES_RECEIVED.clone())).ok();
    REGISTRY
        .register(Box::new(UPDATES_APPLIED_INSTANTLY.clone()))
        .ok();
    REGISTRY.register(Box::new(CHECKS_STARTED.clone())).ok();
    REGISTRY.register(Box::new(CHECK_TIMEOUTS.clone())).ok();
    REGISTRY.register(Box::new(RELOADS_TRIGGERED.clone())).ok();
    REGISTRY.register(Box::new(RELOADS_BLOCKED.clone())).ok();
    REGISTRY
        .register(Box::new(CONFIRMATIONS_REQUESTED.clone()))
        .ok();
    REGISTRY
        .register(Box::new(CONFIRMATIONS_APPROVED.clone()))
        .ok();
    REGISTRY
        .register(Box::new(CONFIRMATIONS_DEFERRED.clone()))
        .ok();

    info!("Metrics registered");
}

/// Render the registry in the Prometheus text exposition format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
