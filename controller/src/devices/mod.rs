//! Managed devices: driver, prober and health state for each configured switch.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::drivers::{driver_for, Credentials, DeviceDriver, DeviceEndpoint, RebootOutcome};
use crate::errors::{FleetError, TransportKind};
use crate::health::fsm::{HealthFsm, HealthSettings, Transition};
use crate::models::device::{DeviceModel, DeviceSnapshot, DeviceStatus};
use crate::probe::{host_part, wait_until_reachable, ProbeMethod, Prober};
use crate::storage::settings::DeviceSettings;

const DEFAULT_READY_BUDGET: Duration = Duration::from_secs(20);
const READY_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Static description of how one device is probed and rebooted
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    pub name: String,
    pub model: DeviceModel,
    pub address: String,
    pub probe: ProbeMethod,
    pub probe_timeout: Duration,
    pub reboot_grace: Duration,

    /// Budget for the device to answer before a reboot is attempted
    pub ready_budget: Duration,
    pub ready_retry_delay: Duration,
}

impl DeviceProfile {
    /// Profile with the model's defaults.
    pub fn for_model(name: impl Into<String>, model: DeviceModel, address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            name: name.into(),
            probe: probe_for(model, &address),
            probe_timeout: model.default_probe_timeout(),
            reboot_grace: model.default_reboot_grace(),
            ready_budget: DEFAULT_READY_BUDGET,
            ready_retry_delay: READY_RETRY_DELAY,
            model,
            address,
        }
    }

    pub fn from_settings(settings: &DeviceSettings) -> Self {
        let mut profile = Self::for_model(settings.name.clone(), settings.model, settings.address.clone());
        if let Some(secs) = settings.reboot_grace_secs {
            profile.reboot_grace = Duration::from_secs(secs);
        }
        if let Some(secs) = settings.ready_budget_secs {
            profile.ready_budget = Duration::from_secs(secs);
        }
        profile
    }

    pub fn host(&self) -> &str {
        host_part(&self.address)
    }
}

/// TCP probes follow an explicit port in the address.
fn probe_for(model: DeviceModel, address: &str) -> ProbeMethod {
    let explicit_port = address
        .rsplit_once(':')
        .and_then(|(_, port)| port.parse::<u16>().ok());
    match (model.default_probe(), explicit_port) {
        (ProbeMethod::Tcp { .. }, Some(port)) => ProbeMethod::Tcp { port },
        (method, _) => method,
    }
}

struct HealthState {
    fsm: HealthFsm,
    last_reboot_wall: Option<DateTime<Utc>>,
}

/// One switch under management.
///
/// Status only changes through the health state machine; the reboot path
/// goes through `HealthFsm::mark_rebooted`.
pub struct ManagedDevice {
    profile: DeviceProfile,
    driver: Arc<dyn DeviceDriver>,
    prober: Arc<dyn Prober>,
    health: Mutex<HealthState>,
    reboot_lock: Mutex<()>,
}

impl ManagedDevice {
    pub fn new(
        profile: DeviceProfile,
        thresholds: HealthSettings,
        driver: Arc<dyn DeviceDriver>,
        prober: Arc<dyn Prober>,
    ) -> Self {
        let fsm = HealthFsm::new(thresholds, profile.reboot_grace);
        Self {
            profile,
            driver,
            prober,
            health: Mutex::new(HealthState {
                fsm,
                last_reboot_wall: None,
            }),
            reboot_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub async fn status(&self) -> DeviceStatus {
        self.health.lock().await.fsm.status()
    }

    /// Take one reachability sample and feed it to the state machine.
    pub async fn poll(&self) -> Option<Transition> {
        let reachable = self
            .prober
            .is_reachable(self.profile.host(), self.profile.probe, self.profile.probe_timeout)
            .await;
        self.observe(reachable, Instant::now()).await
    }

    /// Feed a sample taken at `now`; logs only on status change.
    pub async fn observe(&self, reachable: bool, now: Instant) -> Option<Transition> {
        let transition = self.health.lock().await.fsm.observe(reachable, now);
        if let Some(t) = &transition {
            log_transition(&self.profile.name, t);
        }
        transition
    }

    /// Wait for the device, log in, trigger a reboot and open the grace window.
    ///
    /// Failures are returned to the caller; they do not change the status.
    pub async fn reboot(&self) -> Result<RebootOutcome, FleetError> {
        let Ok(_guard) = self.reboot_lock.try_lock() else {
            return Err(FleetError::Conflict(format!(
                "{}: reboot already in progress",
                self.profile.name
            )));
        };

        let ready = wait_until_reachable(
            self.prober.as_ref(),
            self.profile.host(),
            self.profile.probe,
            self.profile.probe_timeout,
            self.profile.ready_budget,
            self.profile.ready_retry_delay,
        )
        .await;
        if !ready {
            error!("{}: device unreachable before reboot attempt", self.profile.name);
            return Err(FleetError::transport(
                TransportKind::Timeout,
                format!("{}: device unreachable before reboot attempt", self.profile.name),
            ));
        }

        let outcome = match self.login_and_reboot().await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("{}: reboot failed: {}", self.profile.name, e);
                return Err(e);
            }
        };

        let mut health = self.health.lock().await;
        health.last_reboot_wall = Some(Utc::now());
        if let Some(t) = health.fsm.mark_rebooted(Instant::now()) {
            log_transition(&self.profile.name, &t);
        }
        drop(health);

        match outcome {
            RebootOutcome::Accepted => {
                info!("{}: Reboot request sent - {}", self.profile.name, self.profile.address)
            }
            RebootOutcome::ConnectionLost { confirmed_down } => info!(
                "{}: Reboot request sent - {} (connection dropped, confirmed down: {})",
                self.profile.name, self.profile.address, confirmed_down
            ),
        }
        Ok(outcome)
    }

    async fn login_and_reboot(&self) -> Result<RebootOutcome, FleetError> {
        let mut session = self.driver.authenticate().await?;
        self.driver.reboot(&mut session).await
    }

    pub async fn snapshot(&self) -> DeviceSnapshot {
        let health = self.health.lock().await;
        DeviceSnapshot {
            name: self.profile.name.clone(),
            model: self.profile.model,
            address: self.profile.address.clone(),
            status: health.fsm.status(),
            last_reboot_at: health.last_reboot_wall,
            consecutive_successes: health.fsm.consecutive_ok(),
            consecutive_failures: health.fsm.consecutive_fail(),
        }
    }
}

fn log_transition(name: &str, transition: &Transition) {
    match transition.since_reboot {
        Some(elapsed) => info!(
            "{}: changed from {} to {} in {}s.",
            name,
            transition.from,
            transition.to,
            elapsed.as_secs_f64().round()
        ),
        None if transition.to == DeviceStatus::Error => warn!(
            "{}: status changed from {} to {}.",
            name, transition.from, transition.to
        ),
        None => info!(
            "{}: status changed from {} to {}.",
            name, transition.from, transition.to
        ),
    }
}

/// All configured devices, keyed by name
pub struct DeviceRegistry {
    devices: BTreeMap<String, Arc<ManagedDevice>>,
}

impl DeviceRegistry {
    pub fn new(devices: Vec<Arc<ManagedDevice>>) -> Result<Self, FleetError> {
        let mut map = BTreeMap::new();
        for device in devices {
            let name = device.name().to_string();
            if map.insert(name.clone(), device).is_some() {
                return Err(FleetError::Config(format!("duplicate device name '{}'", name)));
            }
        }
        Ok(Self { devices: map })
    }

    /// Build drivers for every configured device.
    pub fn from_settings(
        devices: &[DeviceSettings],
        thresholds: &HealthSettings,
        prober: Arc<dyn Prober>,
    ) -> Result<Self, FleetError> {
        let mut managed = Vec::with_capacity(devices.len());
        for settings in devices {
            let profile = DeviceProfile::from_settings(settings);
            let endpoint = DeviceEndpoint {
                name: profile.name.clone(),
                address: profile.address.clone(),
                credentials: Credentials {
                    username: settings.username.clone(),
                    password: SecretString::from(settings.password.clone()),
                },
                probe: profile.probe,
                probe_timeout: profile.probe_timeout,
            };
            let driver = driver_for(profile.model, endpoint, prober.clone())?;
            managed.push(Arc::new(ManagedDevice::new(
                profile,
                thresholds.clone(),
                driver,
                prober.clone(),
            )));
        }
        Self::new(managed)
    }

    pub fn get(&self, name: &str) -> Option<Arc<ManagedDevice>> {
        self.devices.get(name).cloned()
    }

    pub fn all(&self) -> impl Iterator<Item = &Arc<ManagedDevice>> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Snapshots in name order.
    pub async fn snapshots(&self) -> Vec<DeviceSnapshot> {
        let mut out = Vec::with_capacity(self.devices.len());
        for device in self.devices.values() {
            out.push(device.snapshot().await);
        }
        out
    }
}
