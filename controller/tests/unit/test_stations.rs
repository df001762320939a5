use std::time::Duration;

use chrono::{TimeZone, Utc};
use secrecy::SecretString;

use fieldnet::errors::FleetError;
use fieldnet::models::station::StationId;
use fieldnet::stations::{StationStops, StopReport};

fn stops(secret: &str) -> StationStops {
    StationStops::new(true, SecretString::from(secret.to_string()), Duration::from_secs(5))
}

fn report(e_stop: bool, a_stop: bool, secret: &str) -> StopReport {
    StopReport {
        e_stop,
        a_stop,
        secret: secret.to_string(),
    }
}

#[tokio::test]
async fn test_valid_report_updates_station() {
    let stations = stops("secret");
    let now = Utc.with_ymd_and_hms(2025, 4, 12, 14, 0, 0).unwrap();

    let status = stations
        .report_stop_at("r1", &report(true, false, "secret"), now)
        .await
        .unwrap();
    assert_eq!(status.station, StationId::R1);
    assert!(status.remote_e_stop);
    assert!(!status.remote_a_stop);
    assert!(status.online);

    let snapshot = stations.snapshot_at(now).await;
    let order: Vec<StationId> = snapshot.iter().map(|s| s.station).collect();
    assert_eq!(order, StationId::ALL.to_vec());
    assert!(snapshot[0].online && snapshot[0].remote_e_stop);
    assert!(snapshot[1..].iter().all(|s| !s.online && s.last_update.is_none()));
}

#[tokio::test]
async fn test_wrong_secret_leaves_state_unchanged() {
    let stations = stops("secret");
    let now = Utc.with_ymd_and_hms(2025, 4, 12, 14, 0, 0).unwrap();
    let before = stations.snapshot_at(now).await;

    let err = stations
        .report_stop_at("R1", &report(true, false, "wrong"), now)
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::Permission(ref msg) if msg == "invalid secret"));

    let err = stations
        .report_stop_at("R1", &report(true, false, "  "), now)
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::Permission(ref msg) if msg == "secret required"));

    assert_eq!(stations.snapshot_at(now).await, before);
}

#[tokio::test]
async fn test_open_when_no_secret_configured() {
    let stations = stops("");
    let now = Utc::now();
    assert!(stations.report_stop_at("B3", &report(false, true, ""), now).await.is_ok());
}

#[tokio::test]
async fn test_rejects_unknown_station_and_disabled_feature() {
    let stations = stops("");
    let err = stations.report_stop("R4", &report(false, false, "")).await.unwrap_err();
    assert!(matches!(err, FleetError::Validation(_)));

    let disabled = StationStops::new(false, SecretString::from(String::new()), Duration::from_secs(5));
    let err = disabled.report_stop("R1", &report(false, false, "")).await.unwrap_err();
    assert!(matches!(err, FleetError::FeatureDisabled(_)));
}

#[tokio::test]
async fn test_online_goes_stale_at_threshold() {
    let stations = stops("");
    let t0 = Utc.with_ymd_and_hms(2025, 4, 12, 14, 0, 0).unwrap();
    stations.report_stop_at("b2", &report(false, false, ""), t0).await.unwrap();

    let at = |millis: i64| t0 + chrono::Duration::milliseconds(millis);
    let b2 = |snapshot: Vec<fieldnet::stations::StationStopStatus>| snapshot[4].clone();

    assert!(b2(stations.snapshot_at(at(4_999)).await).online);
    assert!(!b2(stations.snapshot_at(at(5_000)).await).online);

    // reading never mutates: earlier instants still read as online
    let first = stations.snapshot_at(at(1_000)).await;
    let second = stations.snapshot_at(at(1_000)).await;
    assert_eq!(first, second);
    assert!(b2(first).online);

    let view = stations.views().await;
    assert_ne!(view[4].last_update, "Never");
    assert_eq!(view[0].last_update, "Never");
}
