use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::get,
};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{HubError, SyncError};
use crate::handlers::{
    api::ApiState,
    api_routes,
    ws::{WsState, ws_handler},
};
use crate::hub::Hub;
use crate::netsync::SyncEngine;

struct RunningHub {
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// The process-level owner of the hub and the network sync engine.
///
/// The two subsystems never touch each other's state; both are reachable
/// only through this object.
pub struct LiveSlidesServer {
    config: Config,
    hub: Arc<Hub>,
    sync: Arc<SyncEngine>,
    running: Mutex<Option<RunningHub>>,
}

impl LiveSlidesServer {
    /// Create a stopped server.
    pub fn new(config: Config) -> Self {
        let hub = Arc::new(Hub::new(
            config.session_channel_capacity,
            config.transcript_history_limit,
        ));
        let sync = Arc::new(SyncEngine::from_config(&config));
        Self {
            config,
            hub,
            sync,
            running: Mutex::new(None),
        }
    }

    /// Configuration the server was created with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The session hub.
    pub fn hub(&self) -> Arc<Hub> {
        self.hub.clone()
    }

    /// The network sync engine.
    pub fn sync(&self) -> Arc<SyncEngine> {
        self.sync.clone()
    }

    /// Build the hub router: `/ws`, `/api/*` and `/health`.
    pub fn router(&self, shutdown: watch::Receiver<bool>) -> Router {
        let ws_state = WsState {
            hub: self.hub.clone(),
            shutdown,
        };
        let api_state = ApiState {
            hub: self.hub.clone(),
            sync: self.sync.clone(),
        };

        Router::new()
            // Health check
            .route("/", get(|| async { "Live Slides Server" }))
            .route("/health", get(|| async { "OK" }))
            // Notepad / viewer WebSocket endpoint
            .route("/ws", get(ws_handler).with_state(ws_state))
            // Read-only HTTP snapshots
            .nest("/api", api_routes(api_state))
            .layer(self.cors_layer())
            .layer(TraceLayer::new_for_http())
    }

    fn cors_layer(&self) -> CorsLayer {
        let cors = CorsLayer::new()
            .allow_methods([Method::GET, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE]);

        if self.config.allows_any_origin() {
            return cors.allow_origin(Any);
        }
        let origins: Vec<HeaderValue> = self
            .config
            .cors_origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin: {}", origin);
                    None
                }
            })
            .collect();
        cors.allow_origin(AllowOrigin::list(origins))
    }

    /// Bind the hub and start serving. Returns the bound address.
    pub async fn start(&self) -> Result<SocketAddr, HubError> {
        let mut running = self.running.lock().await;
        if let Some(hub) = running.as_ref() {
            return Err(HubError::AlreadyRunning(hub.addr));
        }

        let addr = self.config.server_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| HubError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local = listener.local_addr().map_err(|source| HubError::Bind {
            addr: addr.clone(),
            source,
        })?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let app = self.router(shutdown_rx.clone());
        let mut signal = shutdown_rx;
        let task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = signal.wait_for(|stop| *stop).await;
                })
                .await;
            if let Err(e) = result {
                error!("Live Slides server error: {}", e);
            }
        });

        info!("Live Slides server listening on ws://{}/ws", local);
        warn!(
            "Live Slides and network sync have no authentication or encryption; \
             anyone who can reach these ports can join sessions or act as a sync peer"
        );

        *running = Some(RunningHub {
            addr: local,
            shutdown: shutdown_tx,
            task,
        });
        Ok(local)
    }

    /// Address the hub is bound to, if running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|hub| hub.addr)
    }

    /// Start network sync when configured to connect on launch.
    pub async fn start_sync_if_configured(&self) -> Result<bool, SyncError> {
        let settings = self.sync.settings().await;
        if !settings.auto_connect || settings.mode == liveslides_core::replication::SyncMode::Off {
            return Ok(false);
        }
        self.sync.start().await?;
        Ok(true)
    }

    /// Stop the hub. Returns whether it was running.
    pub async fn stop(&self) -> bool {
        let Some(hub) = self.running.lock().await.take() else {
            return false;
        };
        let _ = hub.shutdown.send(true);
        if let Err(e) = hub.task.await {
            error!("Live Slides server task failed: {}", e);
        }
        info!("Live Slides server on {} stopped", hub.addr);
        true
    }

    /// Stop the hub and network sync.
    pub async fn shutdown(&self) {
        self.sync.stop().await;
        self.stop().await;
    }
}
