use std::path::PathBuf;

use color_eyre::{eyre::eyre, Result};
use mqtt_explorer::config::ExplorerConfig;
use mqtt_explorer::dashboard::Dashboard;
use mqtt_explorer::error::SessionError;
use mqtt_explorer::Explorer;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Why the main loop stopped
enum Outcome {
    Interrupted,
    SessionEnded(Result<(), SessionError>),
}

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config = load_config().await?;
    info!("Starting MQTT explorer for {}", config.broker.endpoint());

    let mut explorer = Explorer::new(config.explorer.history_limit())
        .with_dashboard(Dashboard::from_configs(config.dashboard.clone()));

    if !config.explorer.filter.is_empty() {
        explorer
            .subscribe(&config.explorer.filter)
            .await
            .map_err(|e| eyre!("Invalid topic filter in config: {}", e))?;
    }

    let logger = spawn_message_logger(explorer.accepted_messages());
    let dashboard_feed = explorer.spawn_dashboard_feed();

    explorer
        .connect(config.broker.clone(), config.reconnect)
        .await
        .map_err(|e| eyre!("Failed to connect: {}", e))?;

    if config.simulator.enabled {
        if let Err(e) = explorer
            .start_simulator(&config.broker, config.reconnect, config.simulator.clone())
            .await
        {
            warn!("Simulator could not start: {}", e);
        }
    }

    let outcome = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!("Failed to listen for ctrl-c: {}", e);
            }
            Outcome::Interrupted
        }
        result = explorer.wait_session() => Outcome::SessionEnded(result),
    };

    logger.abort();
    dashboard_feed.abort();

    match outcome {
        Outcome::Interrupted => {
            info!("Interrupted, shutting down");
            let sent = explorer.stop_simulator().await;
            debug!("Simulator sent {} messages", sent);
            explorer
                .disconnect()
                .await
                .map_err(|e| eyre!("Disconnect failed: {}", e))?;
        }
        Outcome::SessionEnded(Ok(())) => info!("Session closed"),
        Outcome::SessionEnded(Err(e @ SessionError::RetryExhausted { .. })) => {
            error!("{}", e);
            explorer.stop_simulator().await;
            std::process::exit(1);
        }
        Outcome::SessionEnded(Err(e)) => {
            explorer.stop_simulator().await;
            return Err(eyre!("Session failed: {}", e));
        }
    }

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

/// First argument overrides the default config location.
async fn load_config() -> Result<ExplorerConfig> {
    let path = match std::env::args_os().nth(1) {
        Some(path) => PathBuf::from(path),
        None => ExplorerConfig::default_path()?,
    };

    ExplorerConfig::ensure_default(&path)
        .await
        .map_err(|e| eyre!("Failed to load {}: {}", path.display(), e))
}

fn spawn_message_logger(
    mut accepted: broadcast::Receiver<mqtt_explorer::mqtt::MqttMessage>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match accepted.recv().await {
                Ok(message) => info!("{}", message.render()),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Message log skipped {} messages", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
