//! lkhcast Server – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den
//! Gruppen-Server mit UDP-Multicast.

use std::sync::Arc;

use anyhow::Result;
use lkhcast_server::{LkhServer, LogSink, ServerConfig};
use lkhcast_transport::UdpMulticastSender;

#[tokio::main]
async fn main() -> Result<()> {
    let config_pfad = std::env::var("LKH_CONFIG").unwrap_or_else(|_| "lkhcast.toml".into());
    let config = ServerConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        algorithmus = %config.gruppe.algorithmus,
        "lkhcast Server wird initialisiert"
    );

    let multicast = UdpMulticastSender::binden(&config.netzwerk.multicast).await?;
    let server = LkhServer::binden(&config, Arc::new(multicast), Arc::new(LogSink)).await?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(fehler = %e, "Signal-Handler nicht installiert");
            return;
        }
        tracing::info!("Ctrl-C empfangen");
        let _ = shutdown_tx.send(true);
    });

    server.starten(shutdown_rx).await?;
    Ok(())
}

/// Initialisiert tracing-subscriber mit dem konfigurierten Level und Format
fn logging_initialisieren(level: &str, format: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}
