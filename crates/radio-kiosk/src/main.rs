mod http;
mod mpv;

use std::sync::Arc;

use radio_core::config::Config;
use radio_core::core::{RadioCore, RadioEvent};
use radio_core::platform;
use radio_core::transport::HttpTransport;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Setup file logging
    let data_dir = platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("kiosk.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,radio_kiosk=debug,radio_core=debug")
            }),
        )
        .init();

    eprintln!("radio-kiosk: logging to {}", log_path.display());
    info!("Log file: {:?}", log_path);

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());

    // Event channel: every input funnels into RadioCore
    let (event_tx, event_rx) = tokio::sync::mpsc::unbounded_channel::<RadioEvent>();

    let (player, player_task) = mpv::MpvPlayer::spawn(event_tx.clone());
    let transport = Arc::new(HttpTransport::new(&config.fetch)?);

    let mut radio_core = RadioCore::new(&config, player, transport, event_tx.clone());
    radio_core.start(&config.catalog.path);

    if config.http.enabled {
        let _http_handle = http::start_server(
            config.http.bind_address.clone(),
            config.http.port,
            radio_core.subscribe(),
            event_tx.clone(),
        );
    }

    let shutdown_tx = event_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            return;
        }
        info!("Interrupt received");
        let _ = shutdown_tx.send(RadioEvent::Shutdown);
    });
    drop(event_tx);

    info!("Kiosk initialised, running event loop");
    radio_core.run(event_rx).await;

    // RadioCore dropped its MpvPlayer; the player task now stops mpv and exits.
    if let Err(e) = player_task.await {
        warn!("mpv player task ended abnormally: {}", e);
    }
    Ok(())
}
