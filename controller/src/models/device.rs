//! Managed device models

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::probe::ProbeMethod;

/// Derived health status of a managed device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceStatus {
    /// No conclusive samples yet
    #[default]
    Unknown,

    /// Rebooting or being reconfigured; unreachability is expected
    Configuring,

    /// Answering probes
    Active,

    /// Unreachable outside any reboot grace window
    Error,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceStatus::Unknown => "UNKNOWN",
            DeviceStatus::Configuring => "CONFIGURING",
            DeviceStatus::Active => "ACTIVE",
            DeviceStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Supported switch firmware families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceModel {
    /// TP-Link Easy Smart (TL-SG108E); plain form login with a cookie session
    TplinkSg108e,

    /// NETGEAR Plus (GS308E/EP); nonce challenge login, hash-gated reboot
    NetgearGs308e,
}

impl DeviceModel {
    /// Time after a reboot during which unreachability is expected.
    pub fn default_reboot_grace(self) -> Duration {
        match self {
            DeviceModel::TplinkSg108e => Duration::from_secs(40),
            DeviceModel::NetgearGs308e => Duration::from_secs(30),
        }
    }

    /// How the health monitor checks the device.
    pub fn default_probe(self) -> ProbeMethod {
        match self {
            DeviceModel::TplinkSg108e => ProbeMethod::Tcp { port: 80 },
            DeviceModel::NetgearGs308e => ProbeMethod::Icmp,
        }
    }

    pub fn default_probe_timeout(self) -> Duration {
        match self {
            DeviceModel::TplinkSg108e => Duration::from_millis(500),
            DeviceModel::NetgearGs308e => Duration::from_secs(1),
        }
    }
}

impl fmt::Display for DeviceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceModel::TplinkSg108e => "TP-Link TL-SG108E",
            DeviceModel::NetgearGs308e => "NETGEAR GS308E",
        };
        f.write_str(s)
    }
}

/// Read-only view of one device, safe to hand to UI callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub name: String,
    pub model: DeviceModel,
    pub address: String,
    pub status: DeviceStatus,
    pub last_reboot_at: Option<DateTime<Utc>>,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}
