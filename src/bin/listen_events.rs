use anyhow::{Context, Result};
use mattermost_listener::bin_common::{init_tracing, load_config_from_env, ConfigType};
use mattermost_listener::mattersocket::{EventClient, EventEnvelope, ExitReason, ServerOptions};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Load config first (before logging is initialized)
    let config_path = load_config_from_env(ConfigType::Listener);
    let options = ServerOptions::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    options.validate()?;

    init_tracing(options.effective_log_level());

    let client = Arc::new(EventClient::builder().options(&options)?.build()?);
    print_banner(client.config().url(), options.keepalive);

    let listener = Arc::clone(&client);
    let mut task = tokio::spawn(async move { listener.connect(log_event).await });

    let reason = tokio::select! {
        joined = &mut task => joined?,
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl+C received, disconnecting");
            client.disconnect();
            task.await?
        }
    };

    match &reason {
        ExitReason::Failed(e) => warn!("Listener stopped after failure: {}", e),
        other => info!("Listener stopped: {:?}", other),
    }
    print_shutdown(&client);
    Ok(())
}

async fn log_event(event: EventEnvelope) {
    if let Some(hello) = event.hello() {
        info!(
            connection_id = %hello.connection_id,
            server_version = %hello.server_version,
            "Connected to server"
        );
        return;
    }

    match (event.event(), event.seq()) {
        (Some(name), seq) => info!(event = name, ?seq, "{}", data_summary(&event)),
        (None, _) => info!("Reply: {}", data_summary(&event)),
    }
}

fn data_summary(event: &EventEnvelope) -> String {
    match (event.data(), event.as_text()) {
        (Some(data), _) => data.to_string(),
        (None, Some(text)) => text.to_string(),
        (None, None) => event
            .as_json()
            .map(|value| value.to_string())
            .unwrap_or_default(),
    }
}

fn print_banner(url: &str, keepalive: bool) {
    info!("");
    info!("========================================");
    info!("Starting Mattermost event listener");
    info!("Endpoint: {}", url);
    info!("Stay connected: {}", keepalive);
    info!("Press Ctrl+C to stop");
    info!("========================================");
    info!("");
}

fn print_shutdown(client: &EventClient) {
    let metrics = client.metrics();
    info!("");
    info!("========================================");
    info!("Event listener stopped gracefully");
    info!(
        "Frames: {} | Events: {} | Decode errors: {} | Heartbeats: {} | Reconnects: {}",
        metrics.frames_received,
        metrics.events_dispatched,
        metrics.decode_errors,
        metrics.heartbeats_sent,
        metrics.reconnect_count
    );
    info!("========================================");
}
