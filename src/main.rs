use anyhow::{Context, Result};
use reloader::config::ReloaderConfig;
use reloader::host::{
    Collaborators, ConfirmationGate, HeadlessNavigator, LocalDelivery, LoggingHold, ManualGate,
    SplashScreen, SystemClock, TracingSplash,
};
use reloader::lifecycle::{self, LifecycleEvent};
use reloader::storage::FileStore;
use reloader::{ConfigOverrides, Reloader, metrics};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let settings_path = std::env::var("RELOADER_SETTINGS").ok().map(PathBuf::from);
    let config = ReloaderConfig::load(settings_path.as_deref())?;

    // Initialize tracing
    let default_filter = if config.debug {
        "reloader=debug"
    } else {
        "reloader=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting reloader host simulator");
    metrics::register_metrics();

    let store_path = std::env::var("RELOADER_STORE_PATH")
        .unwrap_or_else(|_| "reloader-store.json".to_string());
    let store = Arc::new(
        FileStore::open(&store_path).with_context(|| format!("Failed to open {}", store_path))?,
    );
    let url = std::env::var("RELOADER_URL").unwrap_or_else(|_| "app://localhost/".to_string());

    let navigator = Arc::new(HeadlessNavigator::new(url));
    let splash = Arc::new(TracingSplash::new());
    let gate = Arc::new(ManualGate::new());
    let delivery = LocalDelivery::new();

    let collaborators = Collaborators {
        store,
        hold: Arc::new(LoggingHold::new()),
        splash: Some(splash as Arc<dyn SplashScreen>),
        navigator: navigator.clone(),
        gate: config
            .require_confirmation_before_reload
            .then(|| gate.clone() as Arc<dyn ConfirmationGate>),
        clock: Arc::new(SystemClock),
    };

    let reloader = Reloader::new(collaborators, config);
    let (lifecycle_handle, events) = lifecycle::start(&reloader, delivery.as_ref());

    info!("Commands: pause, resume, update, approve, defer, init, status, metrics, quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = navigator.wait_for_navigation() => {
                info!("Application reloaded, process would be replaced now");
                break;
            },
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match line.trim() {
                    "pause" => events.send(LifecycleEvent::Pause)?,
                    "resume" => events.send(LifecycleEvent::Resume)?,
                    "update" => match delivery.announce() {
                        Some(response) => {
                            info!("Delivery channel got {}", serde_json::to_string(&response)?);
                            if response.apply_now {
                                info!("Delivery channel applies the new build, process would be replaced now");
                                break;
                            }
                        },
                        None => warn!("No migration handler registered"),
                    },
                    "approve" => {
                        if !gate.approve() {
                            warn!("Nothing waiting for approval");
                        }
                    },
                    "defer" => {
                        if !gate.defer() {
                            warn!("Nothing waiting for approval");
                        }
                    },
                    "init" => {
                        if !reloader.initialize(ConfigOverrides::default()) {
                            info!("Already initialized");
                        }
                    },
                    "status" => info!("{:?}", reloader),
                    "metrics" => println!("{}", metrics::gather_metrics()?),
                    "quit" | "exit" => break,
                    "" => {},
                    other => warn!("Unknown command: {}", other),
                }
            },
        }
    }

    reloader.dispose();
    lifecycle_handle.abort();
    info!("Reloader host simulator stopped");

    Ok(())
}
