// Library exports for integration testing
//
// This file exposes internal modules for integration tests while keeping
// the binary entrypoint in main.rs

pub mod config;
pub mod controller;
pub mod host;
pub mod lifecycle;
pub mod metrics;
pub mod models;
pub mod policy;
pub mod storage;

// Re-export commonly used types for testing
pub use config::{ConfigOverrides, ReloaderConfig};
pub use controller::{Approval, Reloader};
pub use host::Collaborators;
pub use models::{CheckPolicy, CycleOutcome, MigrationResponse, RefreshPolicy, ReloadState, ResumeAction};

// Helper functions for testing
/// Convenience function for testing the start decision of the policy engine
pub fn test_should_check_on_start(
    check: CheckPolicy,
    refreshed_by_us: bool,
    started_before: bool,
) -> bool {
    let engine = policy::PolicyEngine;
    let config = ReloaderConfig {
        check,
        ..Default::default()
    };
    let now = chrono::Utc::now();

    engine.should_check_on_start(
        &config,
        refreshed_by_us.then_some(now),
        started_before.then_some(now),
    )
}
