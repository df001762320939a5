//! Fleet controller context: owns every device, job and station record

use std::sync::Arc;

use secrecy::ExposeSecret;
use tracing::info;

use crate::app::options::AppOptions;
use crate::devices::DeviceRegistry;
use crate::errors::FleetError;
use crate::probe::{NetworkProber, Prober};
use crate::provision::orchestrator::Orchestrator;
use crate::provision::remote::ShellConnector;
use crate::provision::ssh::SshConnector;
use crate::stations::StationStops;
use crate::storage::params::{JsonFileStore, KeyValueStore};
use crate::storage::settings::Settings;

/// Everything the workers and the HTTP layer share
pub struct FleetController {
    pub devices: Arc<DeviceRegistry>,
    pub stations: Arc<StationStops>,
    pub orchestrator: Arc<Orchestrator>,

    /// Reboots are refused while switch management is off
    pub switch_management_enabled: bool,
}

/// Collaborators injected into the controller
pub struct Collaborators {
    pub prober: Arc<dyn Prober>,
    pub connector: Arc<dyn ShellConnector>,
    pub store: Arc<dyn KeyValueStore>,
}

impl FleetController {
    /// Build the controller with real sockets, SSH and the on-disk parameter store.
    pub async fn init(options: &AppOptions, settings: &Settings) -> Result<Self, FleetError> {
        let collaborators = Collaborators {
            prober: Arc::new(NetworkProber),
            connector: Arc::new(SshConnector::new(options.ssh.clone())),
            store: Arc::new(JsonFileStore::new(options.layout.params_file())),
        };
        Self::with_collaborators(options, settings, collaborators).await
    }

    pub async fn with_collaborators(
        options: &AppOptions,
        settings: &Settings,
        collaborators: Collaborators,
    ) -> Result<Self, FleetError> {
        info!("Initializing fleet controller...");

        let devices = DeviceRegistry::from_settings(
            &settings.devices,
            &settings.health.thresholds,
            collaborators.prober.clone(),
        )?;
        info!("Managing {} devices", devices.len());

        let stations = StationStops::from_settings(&settings.station_stops);
        let orchestrator = Orchestrator::new(
            collaborators.connector,
            collaborators.prober,
            collaborators.store,
            options.provisioning.clone(),
            stations.configured_secret().expose_secret().to_string(),
        );
        orchestrator.load_sticky().await;

        Ok(Self {
            devices: Arc::new(devices),
            stations: Arc::new(stations),
            orchestrator: Arc::new(orchestrator),
            switch_management_enabled: settings.switch_management_enabled,
        })
    }
}
