//! Settings file management

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::FleetError;
use crate::filesys::file::File;
use crate::health::fsm::HealthSettings;
use crate::logs::LogLevel;
use crate::models::device::DeviceModel;

/// Controller settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_level: LogLevel,

    /// Directory for the daily rolling log file; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default)]
    pub json_logs: bool,

    #[serde(default)]
    pub server: ServerSettings,

    /// Monitor loops only probe while this is on
    #[serde(default)]
    pub switch_management_enabled: bool,

    #[serde(default)]
    pub health: HealthMonitorSettings,

    #[serde(default)]
    pub devices: Vec<DeviceSettings>,

    #[serde(default)]
    pub station_stops: StationStopSettings,

    #[serde(default)]
    pub provisioning: ProvisioningSettings,
}

impl Settings {
    /// Load settings, falling back to defaults when the file does not exist.
    pub async fn load(file: &File) -> Result<Self, FleetError> {
        if !file.exists().await {
            warn!(
                "Settings file {} not found, using defaults",
                file.path().display()
            );
            return Ok(Self::default());
        }
        file.read_json::<Settings>().await
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Bearer token for privileged routes; empty allows every caller
    #[serde(default)]
    pub admin_token: String,
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            admin_token: String::new(),
        }
    }
}

/// Health monitor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthMonitorSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(flatten)]
    pub thresholds: HealthSettings,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl HealthMonitorSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for HealthMonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            thresholds: HealthSettings::default(),
        }
    }
}

/// One managed switch
#[derive(Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    pub name: String,
    pub model: DeviceModel,

    /// Host or `host:port` of the web management UI
    pub address: String,

    #[serde(default = "default_device_username")]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Overrides the model's post-reboot grace window
    #[serde(default)]
    pub reboot_grace_secs: Option<u64>,

    /// How long a reboot request waits for the device to answer first
    #[serde(default)]
    pub ready_budget_secs: Option<u64>,
}

fn default_device_username() -> String {
    "admin".to_string()
}

impl fmt::Debug for DeviceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSettings")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &"[redacted]")
            .field("reboot_grace_secs", &self.reboot_grace_secs)
            .field("ready_budget_secs", &self.ready_budget_secs)
            .finish()
    }
}

/// Remote station stop ingestion settings
#[derive(Clone, Serialize, Deserialize)]
pub struct StationStopSettings {
    #[serde(default)]
    pub enabled: bool,

    /// Shared secret agents must present; empty accepts any caller
    #[serde(default)]
    pub secret: String,

    /// A station is offline once its last report is this old
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

fn default_stale_after_secs() -> u64 {
    5
}

impl Default for StationStopSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            secret: String::new(),
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

impl fmt::Debug for StationStopSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StationStopSettings")
            .field("enabled", &self.enabled)
            .field("secret_set", &!self.secret.is_empty())
            .field("stale_after_secs", &self.stale_after_secs)
            .finish()
    }
}

/// Agent provisioning settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningSettings {
    /// Arena web address the display role points its browser at
    #[serde(default = "default_arena_base_url")]
    pub arena_base_url: String,

    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,

    #[serde(default = "default_ssh_connect_timeout_secs")]
    pub ssh_connect_timeout_secs: u64,

    #[serde(default = "default_ssh_command_timeout_secs")]
    pub ssh_command_timeout_secs: u64,

    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,

    #[serde(default = "default_scan_concurrency")]
    pub scan_concurrency: usize,
}

fn default_arena_base_url() -> String {
    "http://10.0.100.5:8080".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

fn default_ssh_connect_timeout_secs() -> u64 {
    4
}

fn default_ssh_command_timeout_secs() -> u64 {
    30
}

fn default_scan_timeout_ms() -> u64 {
    2000
}

fn default_scan_concurrency() -> usize {
    128
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        Self {
            arena_base_url: default_arena_base_url(),
            ssh_port: default_ssh_port(),
            ssh_connect_timeout_secs: default_ssh_connect_timeout_secs(),
            ssh_command_timeout_secs: default_ssh_command_timeout_secs(),
            scan_timeout_ms: default_scan_timeout_ms(),
            scan_concurrency: default_scan_concurrency(),
        }
    }
}
