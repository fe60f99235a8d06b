use anyhow::{Context, Result};
use beacon::config::BeaconConfig;
use beacon::topic::TopicTable;
use beacon::viewer::{Dashboard, ViewerConnection};
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Frames buffered between the socket and the reducer
const FRAME_QUEUE: usize = 1024;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "beacon_viewer=info,beacon=info".into()),
        )
        .init();

    info!("Beacon viewer starting...");

    let config = BeaconConfig::from_env().context("Failed to load configuration")?;
    let topics = TopicTable::from_config(&config.topics).context("Invalid topic configuration")?;

    info!(
        url = %config.viewer.url,
        device = %topics.base(),
        reconnect_delay_ms = config.viewer.reconnect_delay_ms,
        "Configuration loaded"
    );

    let mut dashboard = Dashboard::new(topics, config.aggregator.clone());
    let (frames_tx, mut frames_rx) = mpsc::channel(FRAME_QUEUE);
    let connection = ViewerConnection::start(config.viewer.clone(), frames_tx);
    let mut link = connection.watch();
    let mut summary_tick = tokio::time::interval(config.viewer.summary_interval());

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(frame) = frames_rx.recv() => {
                dashboard.apply_frame(&frame, Utc::now());
            }

            changed = link.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *link.borrow_and_update();
                info!(state = %state, "Bridge link");
                dashboard.set_link(state);
            }

            _ = summary_tick.tick() => {
                let summary = dashboard.summary(Utc::now());
                match serde_json::to_string(&summary) {
                    Ok(json) => info!(overall = %summary.overall, summary = %json, "Dashboard"),
                    Err(e) => warn!(error = %e, "Failed to encode summary"),
                }
            }

            result = &mut shutdown => {
                result.context("Failed to listen for ctrl_c signal")?;
                info!("Shutdown signal received");
                break;
            }
        }
    }

    connection.shutdown().await;
    info!("Beacon viewer stopped");

    Ok(())
}
