use liveslides_server::{Config, LiveSlidesServer};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "liveslides_server=debug,liveslides_core=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting Live Slides Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Sync mode: {}", config.sync.mode);
    info!("CORS origins: {:?}", config.cors_origins);

    let server = LiveSlidesServer::new(config);

    if server.config().auto_start {
        if let Err(e) = server.start().await {
            error!("{}", e);
            std::process::exit(1);
        }
    } else {
        info!("Live Slides hub auto-start disabled");
    }

    match server.start_sync_if_configured().await {
        Ok(true) => {}
        Ok(false) => info!("Network sync not started (mode off or auto-connect disabled)"),
        // Sync failures are reported, the hub keeps running
        Err(e) => warn!("Network sync failed to start: {}", e),
    }

    shutdown_signal().await;
    server.shutdown().await;

    info!("Server shut down gracefully");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
