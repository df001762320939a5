//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::FleetError;
use crate::server::handlers::{
    devices_handler, display_run_handler, display_setup_handler, display_status_handler, health_handler,
    reboot_device_handler, station_stop_handler, stations_handler, stops_run_handler, stops_setup_handler,
    stops_status_handler, version_handler,
};
use crate::server::state::ServerState;

/// Every route the controller serves
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Switches
        .route("/api/devices", get(devices_handler))
        .route("/api/devices/{name}/reboot", post(reboot_device_handler))
        // Station stops
        .route("/api/stations", get(stations_handler))
        .route("/api/stations/{station_id}/stops", post(station_stop_handler))
        // Agent provisioning
        .route("/setup/rpi", get(display_setup_handler))
        .route("/setup/rpi/run", post(display_run_handler))
        .route("/setup/rpi/status", get(display_status_handler))
        .route("/setup/rpi/stops", get(stops_setup_handler))
        .route("/setup/rpi/stops/run", post(stops_run_handler))
        .route("/setup/rpi/stops/status", get(stops_status_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), FleetError>>, FleetError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| FleetError::Server(format!("bind {}: {}", addr, e)))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| FleetError::Server(e.to_string()))
    });

    Ok(handle)
}
