//! Masto Stream Binary
//!
//! Streams one channel and logs every event until interrupted.
//!
//! # Usage
//!
//! ```bash
//! MASTO_STREAMING_URL=wss://example.social/api/v1/streaming cargo run --bin masto-stream
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `MASTO_STREAMING_URL`: Streaming endpoint
//!
//! ## Optional
//! - `MASTO_URL`: REST base URL, used to log the server version
//! - `MASTO_ACCESS_TOKEN`: Access token
//! - `MASTO_STREAM`: Channel to follow (default: public), e.g. `hashtag:rust`, `list:42`
//! - `MASTO_PING_INTERVAL_SECS`: Keepalive interval, 0 disables (default: 30)
//! - `MASTO_PONG_TIMEOUT_SECS`: Keepalive timeout (default: 60)
//! - `MASTO_METRICS_PORT`: Prometheus metrics port (default: disabled)
//! - `RUST_LOG`: Log level (default: `masto_stream=info`)

use anyhow::Context;
use masto_stream::{
    Channel, ClientConfig, InstanceRepository, RestGateway, StreamingClient, init_metrics,
    init_telemetry,
};
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();
    init_telemetry().context("failed to initialise logging")?;

    tracing::info!("Starting Masto Stream");

    if let Some(port) = std::env::var("MASTO_METRICS_PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .filter(|port| *port != 0)
    {
        init_metrics(port).context("failed to start metrics exporter")?;
    }

    let config = ClientConfig::from_env()?;
    let channel = channel_from_env();
    log_config(&config, &channel);

    if config.rest_url.is_some() {
        log_server(&config).await;
    }

    let client = StreamingClient::new(&config);
    client.connect().await?;

    let mut subscription = client.subscribe(channel)?;

    loop {
        tokio::select! {
            result = signal::ctrl_c() => {
                result.context("failed to listen for shutdown signal")?;
                tracing::info!("Shutdown signal received");
                break;
            }
            event = subscription.recv() => match event {
                Some(Ok(event)) => {
                    tracing::info!(
                        stream = ?event.stream,
                        event = %event.event,
                        payload = ?event.payload,
                        "Event"
                    );
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Stream ended with error");
                    break;
                }
                None => {
                    tracing::info!("Stream ended");
                    break;
                }
            },
        }
    }

    subscription.unsubscribe();
    client.close().await;
    tracing::info!("Masto Stream stopped");
    Ok(())
}

/// Channel from `MASTO_STREAM`, e.g. `public:local`, `hashtag:rust`, `list:42`.
fn channel_from_env() -> Channel {
    let raw = std::env::var("MASTO_STREAM").unwrap_or_else(|_| "public".to_string());
    Channel::from_name(&raw)
}

/// Log the server version when a REST URL is configured.
async fn log_server(config: &ClientConfig) {
    let repository = match RestGateway::from_config(config) {
        Ok(gateway) => InstanceRepository::new(gateway),
        Err(e) => {
            tracing::warn!(error = %e, "REST gateway unavailable");
            return;
        }
    };

    match repository.fetch().await {
        Ok(instance) => tracing::info!(
            uri = %instance.uri,
            version = %instance.version,
            "Connected server"
        ),
        Err(e) => tracing::warn!(error = %e, "Failed to fetch server information"),
    }
}

/// Log the parsed configuration.
fn log_config(config: &ClientConfig, channel: &Channel) {
    tracing::info!(
        endpoint = %config.endpoint,
        authenticated = config.credential.is_some(),
        channel = %channel.tag(),
        "Configuration loaded"
    );
    tracing::debug!(
        ping_interval = ?config.heartbeat.ping_interval,
        pong_timeout = ?config.heartbeat.pong_timeout,
        "Keepalive settings"
    );
}

fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}
