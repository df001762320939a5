//! Hysteresis state machine deriving device health from reachability samples

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::models::device::DeviceStatus;

/// Thresholds for the health state machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSettings {
    /// Consecutive reachable samples needed before reporting ACTIVE
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// Consecutive unreachable samples needed before reporting ERROR
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

fn default_success_threshold() -> u32 {
    3
}

fn default_failure_threshold() -> u32 {
    5
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            success_threshold: default_success_threshold(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

/// A status change produced by one sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: DeviceStatus,
    pub to: DeviceStatus,

    /// Time since the last reboot, set when a reboot completes (CONFIGURING -> ACTIVE)
    pub since_reboot: Option<Duration>,
}

/// Per-device health state machine.
///
/// Starts in UNKNOWN and has no terminal state.
#[derive(Debug, Clone)]
pub struct HealthFsm {
    settings: HealthSettings,
    reboot_grace: Duration,
    status: DeviceStatus,
    last_reboot_at: Option<Instant>,
    consecutive_ok: u32,
    consecutive_fail: u32,
}

impl HealthFsm {
    pub fn new(settings: HealthSettings, reboot_grace: Duration) -> Self {
        Self {
            settings,
            reboot_grace,
            status: DeviceStatus::Unknown,
            last_reboot_at: None,
            consecutive_ok: 0,
            consecutive_fail: 0,
        }
    }

    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    pub fn last_reboot_at(&self) -> Option<Instant> {
        self.last_reboot_at
    }

    pub fn reboot_grace(&self) -> Duration {
        self.reboot_grace
    }

    pub fn consecutive_ok(&self) -> u32 {
        self.consecutive_ok
    }

    pub fn consecutive_fail(&self) -> u32 {
        self.consecutive_fail
    }

    /// True while `now` falls inside the post-reboot grace window.
    pub fn in_grace_window(&self, now: Instant) -> bool {
        self.last_reboot_at
            .map(|at| now.saturating_duration_since(at) < self.reboot_grace)
            .unwrap_or(false)
    }

    /// Record that a reboot was triggered at `now`.
    ///
    /// Both streaks are cleared: a device still answering in the instant
    /// before it goes down cannot flip straight back to ACTIVE, and failures
    /// from before the reboot do not count once the grace window ends.
    pub fn mark_rebooted(&mut self, now: Instant) -> Option<Transition> {
        self.last_reboot_at = Some(now);
        self.consecutive_ok = 0;
        self.consecutive_fail = 0;
        self.set_status(DeviceStatus::Configuring, None)
    }

    /// Feed one reachability sample taken at `now`.
    pub fn observe(&mut self, reachable: bool, now: Instant) -> Option<Transition> {
        if reachable {
            self.consecutive_ok = self.consecutive_ok.saturating_add(1);
            self.consecutive_fail = 0;

            if self.consecutive_ok >= self.settings.success_threshold
                && self.status != DeviceStatus::Active
            {
                let since_reboot = match (self.status, self.last_reboot_at) {
                    (DeviceStatus::Configuring, Some(at)) => Some(now.saturating_duration_since(at)),
                    _ => None,
                };
                return self.set_status(DeviceStatus::Active, since_reboot);
            }
            return None;
        }

        self.consecutive_fail = self.consecutive_fail.saturating_add(1);
        self.consecutive_ok = 0;

        // Expected downtime; the failure streak must not override it.
        if self.in_grace_window(now) {
            return self.set_status(DeviceStatus::Configuring, None);
        }

        if self.consecutive_fail >= self.settings.failure_threshold {
            return self.set_status(DeviceStatus::Error, None);
        }
        None
    }

    fn set_status(&mut self, to: DeviceStatus, since_reboot: Option<Duration>) -> Option<Transition> {
        if self.status == to {
            return None;
        }
        let from = self.status;
        self.status = to;
        Some(Transition {
            from,
            to,
            since_reboot,
        })
    }
}
