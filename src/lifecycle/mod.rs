// Wiring between the host application shell and the reloader
//
// The shell forwards lifecycle events through a channel; the listener task
// applies them to the controller one at a time, in order.

use crate::config::ConfigOverrides;
use crate::controller::{PACKAGE_NAME, Reloader};
use crate::host::UpdateDelivery;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleEvent {
    Resume,
    Pause,
}

pub type LifecycleSender = mpsc::UnboundedSender<LifecycleEvent>;
pub type LifecycleReceiver = mpsc::UnboundedReceiver<LifecycleEvent>;

/// Register with the delivery channel, initialize if configured to, record
/// this start and begin listening for lifecycle events.
pub fn start(
    reloader: &Reloader,
    delivery: &dyn UpdateDelivery,
) -> (JoinHandle<()>, LifecycleSender) {
    delivery.on_migrate(PACKAGE_NAME, reloader.migration_handler());

    if reloader.config().automatic_initialization {
        reloader.initialize(ConfigOverrides::default());
    } else {
        debug!("Automatic initialization disabled, waiting for initialize()");
    }

    // After the start decision, so a first launch is still seen as one
    reloader.record_start();

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(process_lifecycle_events(reloader.clone(), event_rx));

    (handle, event_tx)
}

async fn process_lifecycle_events(reloader: Reloader, mut rx: LifecycleReceiver) {
    info!("Starting lifecycle event processor");

    while let Some(event) = rx.recv().await {
        debug!("Processing lifecycle event: {:?}", event);
        match event {
            LifecycleEvent::Resume => {
                let action = reloader.on_resume();
                debug!("Resume handled: {:?}", action);
            },
            LifecycleEvent::Pause => reloader.on_pause(),
        }
    }

    info!("Lifecycle event processor stopped");
}
