use anyhow::{Context, Result};
use beacon::api::create_router;
use beacon::bridge::BridgeServer;
use beacon::broker::{BrokerClient, CommandSink};
use beacon::config::BeaconConfig;
use beacon::topic::TopicTable;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "beacon=info".into()),
        )
        .init();

    info!("Beacon bridge starting...");

    let config = BeaconConfig::from_env().context("Failed to load configuration")?;
    let topics = TopicTable::from_config(&config.topics).context("Invalid topic configuration")?;

    info!(
        broker = %format!("{}:{}", config.broker.host, config.broker.port),
        device = %topics.base(),
        bind = %config.bridge.bind,
        ws_path = %config.bridge.ws_path,
        "Configuration loaded"
    );

    // Broker link and bridge
    let broker = BrokerClient::new(config.broker.clone(), topics);
    let sink: Arc<dyn CommandSink> = Arc::new(broker.clone());
    let bridge = Arc::new(BridgeServer::new(sink, config.bridge.viewer_queue_capacity));

    // The link keeps retrying in the background whatever the first attempt says
    match broker.connect(bridge.clone()).await {
        Ok(()) => info!("Broker link established"),
        Err(e) => warn!(error = %e, "Broker not reachable yet, retrying in background"),
    }

    // Start HTTP/WebSocket server
    let router = create_router(Arc::clone(&bridge), &config.bridge.ws_path);
    let listener = tokio::net::TcpListener::bind(&config.bridge.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bridge.bind))?;
    info!(bind = %config.bridge.bind, "Bridge listening");

    let shutdown_bridge = Arc::clone(&bridge);
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl_c signal");
        }
        info!("Shutdown signal received");
        shutdown_bridge.close_viewers();
    });

    if let Err(e) = server.await {
        error!(error = %e, "Bridge server error");
    }

    // Retained "offline" before the socket closes
    broker.shutdown().await;
    info!("Beacon bridge stopped");

    Ok(())
}
