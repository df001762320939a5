//! Health monitor worker, one per managed device

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::info;

use crate::devices::ManagedDevice;

/// Monitor worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Time between polls
    pub interval: Duration,

    /// Probing is skipped while switch management is off
    pub enabled: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            enabled: true,
        }
    }
}

/// Run the monitor loop for `device` until shutdown.
///
/// Polls are strictly sequential; a slow probe delays the next one rather
/// than overlapping it.
pub async fn run<S, F>(
    options: &Options,
    device: &ManagedDevice,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("{}: monitor worker starting...", device.name());

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("{}: monitor worker shutting down...", device.name());
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }

        if !options.enabled {
            continue;
        }

        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("{}: monitor worker shutting down...", device.name());
                return;
            }
            _ = device.poll() => {}
        }
    }
}
