//! Remote station stop ingestion.
//!
//! Station agents push their E-stop/A-stop buttons here. `online` is never
//! stored; it is derived from the age of the last accepted report.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::errors::FleetError;
use crate::models::station::StationId;
use crate::storage::settings::StationStopSettings;

/// Body of a stop report
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopReport {
    #[serde(default)]
    pub e_stop: bool,

    #[serde(default)]
    pub a_stop: bool,

    #[serde(default)]
    pub secret: String,
}

/// Derived status of one station
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationStopStatus {
    pub station: StationId,
    pub online: bool,
    pub remote_e_stop: bool,
    pub remote_a_stop: bool,
    pub last_update: Option<DateTime<Utc>>,
}

/// Display form of [`StationStopStatus`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationStatusView {
    pub station: StationId,
    pub online: bool,
    pub remote_e_stop: bool,
    pub remote_a_stop: bool,

    /// Local `HH:MM:SS`, or `Never`
    pub last_update: String,
}

impl From<&StationStopStatus> for StationStatusView {
    fn from(status: &StationStopStatus) -> Self {
        Self {
            station: status.station,
            online: status.online,
            remote_e_stop: status.remote_e_stop,
            remote_a_stop: status.remote_a_stop,
            last_update: status
                .last_update
                .map(|at| at.with_timezone(&Local).format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "Never".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct StationRecord {
    remote_e_stop: bool,
    remote_a_stop: bool,
    last_update: Option<DateTime<Utc>>,
}

/// Per-station stop state behind one map-wide lock
pub struct StationStops {
    enabled: bool,
    secret: SecretString,
    stale_after: Duration,
    stations: RwLock<BTreeMap<StationId, StationRecord>>,
}

impl StationStops {
    pub fn new(enabled: bool, secret: SecretString, stale_after: Duration) -> Self {
        let stations = StationId::ALL
            .into_iter()
            .map(|id| (id, StationRecord::default()))
            .collect();
        Self {
            enabled,
            secret,
            stale_after,
            stations: RwLock::new(stations),
        }
    }

    pub fn from_settings(settings: &StationStopSettings) -> Self {
        Self::new(
            settings.enabled,
            SecretString::from(settings.secret.clone()),
            Duration::from_secs(settings.stale_after_secs),
        )
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Secret agents are provisioned with when the operator leaves it blank.
    pub fn configured_secret(&self) -> &SecretString {
        &self.secret
    }

    pub async fn report_stop(&self, station: &str, report: &StopReport) -> Result<StationStopStatus, FleetError> {
        self.report_stop_at(station, report, Utc::now()).await
    }

    /// Validate and apply one report as of `now`.
    pub async fn report_stop_at(
        &self,
        station: &str,
        report: &StopReport,
        now: DateTime<Utc>,
    ) -> Result<StationStopStatus, FleetError> {
        if !self.enabled {
            return Err(FleetError::FeatureDisabled("station RPi stops disabled".to_string()));
        }
        self.check_secret(&report.secret)?;
        let station: StationId = station.parse()?;

        let mut stations = self.stations.write().await;
        let record = stations.entry(station).or_default();
        let before = self.status_of(station, record, now);

        record.remote_e_stop = report.e_stop;
        record.remote_a_stop = report.a_stop;
        record.last_update = Some(now);
        let after = self.status_of(station, record, now);
        drop(stations);

        if before.online != after.online {
            info!("Station RPi {} online={}", station, after.online);
        }
        if before.remote_e_stop != after.remote_e_stop || before.remote_a_stop != after.remote_a_stop {
            info!(
                "Station RPi {} remote E={} A={}",
                station, after.remote_e_stop, after.remote_a_stop
            );
        }
        Ok(after)
    }

    fn check_secret(&self, presented: &str) -> Result<(), FleetError> {
        let expected = self.secret.expose_secret();
        if expected.is_empty() {
            return Ok(());
        }
        let presented = presented.trim();
        if presented.is_empty() {
            return Err(FleetError::Permission("secret required".to_string()));
        }
        if presented != expected {
            return Err(FleetError::Permission("invalid secret".to_string()));
        }
        Ok(())
    }

    fn status_of(&self, station: StationId, record: &StationRecord, now: DateTime<Utc>) -> StationStopStatus {
        StationStopStatus {
            station,
            online: self.is_fresh(record.last_update, now),
            remote_e_stop: record.remote_e_stop,
            remote_a_stop: record.remote_a_stop,
            last_update: record.last_update,
        }
    }

    /// Online while the last report is younger than the staleness threshold.
    fn is_fresh(&self, last_update: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let Some(at) = last_update else {
            return false;
        };
        match (now - at).to_std() {
            Ok(age) => age < self.stale_after,
            // report stamped in the future
            Err(_) => true,
        }
    }

    pub async fn snapshot(&self) -> Vec<StationStopStatus> {
        self.snapshot_at(Utc::now()).await
    }

    /// All stations in fixed order, evaluated at `now`. Never mutates state.
    pub async fn snapshot_at(&self, now: DateTime<Utc>) -> Vec<StationStopStatus> {
        let stations = self.stations.read().await;
        StationId::ALL
            .into_iter()
            .map(|id| {
                let record = stations.get(&id).copied().unwrap_or_default();
                self.status_of(id, &record, now)
            })
            .collect()
    }

    pub async fn views(&self) -> Vec<StationStatusView> {
        self.snapshot().await.iter().map(StationStatusView::from).collect()
    }
}
