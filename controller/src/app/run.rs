//! Main application run loop

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app::options::AppOptions;
use crate::app::state::FleetController;
use crate::errors::FleetError;
use crate::server::auth::CallerAuthorizer;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::workers::monitor;

/// Run the controller until `shutdown_signal` resolves
pub async fn run(
    options: AppOptions,
    controller: Arc<FleetController>,
    authorizer: Arc<dyn CallerAuthorizer>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), FleetError> {
    info!("Starting field network controller...");

    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.max_shutdown_delay);

    if let Err(e) = init(&options, controller, authorizer, &shutdown_tx, &mut shutdown_manager).await {
        error!("Failed to start controller: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    controller: Arc<FleetController>,
    authorizer: Arc<dyn CallerAuthorizer>,
    shutdown_tx: &broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), FleetError> {
    init_monitor_workers(options.monitor.clone(), &controller, shutdown_tx, shutdown_manager);
    init_server(options, controller, authorizer, shutdown_tx.subscribe(), shutdown_manager).await
}

fn init_monitor_workers(
    options: monitor::Options,
    controller: &FleetController,
    shutdown_tx: &broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) {
    if !options.enabled {
        warn!("Switch management disabled; device monitors will idle");
    }
    for device in controller.devices.all() {
        let device = device.clone();
        let options = options.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            monitor::run(
                &options,
                device.as_ref(),
                tokio::time::sleep,
                Box::pin(async move {
                    let _ = shutdown_rx.recv().await;
                }),
            )
            .await;
        });
        shutdown_manager.add_monitor_worker_handle(handle);
    }
    info!("Started {} device monitors", controller.devices.len());
}

async fn init_server(
    options: &AppOptions,
    controller: Arc<FleetController>,
    authorizer: Arc<dyn CallerAuthorizer>,
    mut shutdown_rx: broadcast::Receiver<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), FleetError> {
    info!("Initializing HTTP server...");

    let state = Arc::new(ServerState::new(controller, authorizer));
    let handle = serve(&options.server, state, async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_server_handle(handle)
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    max_shutdown_delay: Duration,
    monitor_worker_handles: Vec<JoinHandle<()>>,
    server_handle: Option<JoinHandle<Result<(), FleetError>>>,
}

impl ShutdownManager {
    fn new(shutdown_tx: broadcast::Sender<()>, max_shutdown_delay: Duration) -> Self {
        Self {
            shutdown_tx,
            max_shutdown_delay,
            monitor_worker_handles: Vec::new(),
            server_handle: None,
        }
    }

    fn add_monitor_worker_handle(&mut self, handle: JoinHandle<()>) {
        self.monitor_worker_handles.push(handle);
    }

    fn with_server_handle(&mut self, handle: JoinHandle<Result<(), FleetError>>) -> Result<(), FleetError> {
        if self.server_handle.is_some() {
            return Err(FleetError::Shutdown("server_handle already set".to_string()));
        }
        self.server_handle = Some(handle);
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), FleetError> {
        let _ = self.shutdown_tx.send(());

        let delay = self.max_shutdown_delay;
        let result = tokio::time::timeout(delay, self.shutdown_impl()).await;
        match result {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, aborting remaining tasks...",
                    delay
                );
                for handle in self.monitor_worker_handles.drain(..) {
                    handle.abort();
                }
                if let Some(handle) = self.server_handle.take() {
                    handle.abort();
                }
                Err(FleetError::Shutdown("timed out".to_string()))
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), FleetError> {
        info!("Shutting down field network controller...");

        // 1. Device monitors
        for handle in self.monitor_worker_handles.iter_mut() {
            handle.await.map_err(|e| FleetError::Shutdown(e.to_string()))?;
        }
        self.monitor_worker_handles.clear();

        // 2. HTTP server
        if let Some(handle) = self.server_handle.as_mut() {
            handle.await.map_err(|e| FleetError::Shutdown(e.to_string()))??;
        }
        self.server_handle = None;

        info!("Shutdown complete");
        Ok(())
    }
}
