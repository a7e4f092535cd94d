//! Dispatch console binary
//!
//! Usage: `dispatch-console [SERVICE_REQUEST_ID]`

use anyhow::Context;
use dispatch_console::{ConnectionMonitor, ConsoleConfig};
use dispatch_realtime::ChannelStatus;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    let config = ConsoleConfig::from_env().context("Failed to load configuration")?;
    init_tracing(config.log_json);

    let service_request_id = config.resolve_service_request(std::env::args().nth(1))?;

    tracing::info!(
        api_url = %config.realtime.api_url,
        namespace = %config.realtime.namespace,
        service_request_id = %service_request_id,
        "Starting dispatch console"
    );

    let monitor = ConnectionMonitor::new(&config)?;
    let mut status = monitor.subscribe_status();

    monitor.connect(&service_request_id).await?;
    tracing::info!(status = monitor.status_label(), "Waiting for events");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received");
                monitor.disconnect();
                break;
            }
            update = status.recv() => match update {
                Ok(ChannelStatus::Disconnected { reason }) if reason.is_involuntary() => {
                    tracing::error!(reason = %reason, "Connection lost");
                    break;
                }
                Ok(update) => tracing::debug!(status = ?update, "Channel status"),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Missed channel status updates");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    let history = monitor.history();
    tracing::info!(
        events = history.len(),
        capacity = history.capacity(),
        status = monitor.status_label(),
        "Dispatch console stopped"
    );
    for event in history.snapshot() {
        tracing::info!(
            event = %event.event_type,
            event_id = ?event.event_id,
            sequence = ?event.sequence,
            "Recorded event"
        );
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "dispatch_console=info,dispatch_realtime=info".into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
