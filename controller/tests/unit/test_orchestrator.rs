use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Semaphore;

use fieldnet::errors::FleetError;
use fieldnet::provision::job::JobState;
use fieldnet::provision::orchestrator::{Orchestrator, OrchestratorOptions};
use fieldnet::provision::request::{JobClass, ProvisionForm};
use fieldnet::scanner::ScanOptions;
use fieldnet::storage::params::{InMemoryStore, KeyValueStore};

use crate::fakes::{FakeConnector, FakeProber, HostBehavior};

fn options() -> OrchestratorOptions {
    OrchestratorOptions {
        scan: ScanOptions {
            timeout: Duration::from_millis(50),
            ..Default::default()
        },
        probe_timeout: Duration::from_millis(50),
        ..Default::default()
    }
}

fn orchestrator(
    connector: Arc<FakeConnector>,
    prober: Arc<FakeProber>,
    store: Arc<InMemoryStore>,
) -> Arc<Orchestrator> {
    Arc::new(Orchestrator::new(
        connector,
        prober,
        store,
        options(),
        "arena-secret".to_string(),
    ))
}

fn display_form(host: &str) -> ProvisionForm {
    ProvisionForm {
        host: host.to_string(),
        static_host: "10.0.100.41".to_string(),
        subnet_mask: "255.255.255.0".to_string(),
        gateway: "10.0.100.2".to_string(),
        dns: "10.0.100.2".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_pinned_host_is_configured() {
    let connector = Arc::new(FakeConnector::new(&[]));
    let orchestrator = orchestrator(connector.clone(), FakeProber::with_up(&[]), Arc::new(InMemoryStore::new()));

    let handle = orchestrator
        .run(JobClass::Display, display_form("10.0.100.199"))
        .await
        .unwrap();
    handle.await.unwrap();

    let snapshot = orchestrator.snapshot(JobClass::Display).await.unwrap();
    assert_eq!(snapshot.state, JobState::Done);
    assert!(snapshot.lines[0].contains("Starting... URL=http://10.0.100.5:8080/display?displayId=FTA1"));
    assert!(snapshot.lines[0].contains("static=10.0.100.41/24"));
    assert!(snapshot.log.contains("Connecting: 10.0.100.199"));
    assert!(snapshot.log.contains("REMOTE: started"));
    assert!(snapshot.lines.last().unwrap().ends_with("Configured OK: 10.0.100.199"));

    let execs = connector.exec_log();
    assert_eq!(execs.len(), 2);
    assert!(execs[0].stdin.contains("set_static_ip '10.0.100.41/24' '10.0.100.2' '10.0.100.2'"));
    assert!(execs[1].command.starts_with("sudo -S"));
    assert_eq!(execs[1].stdin, "1234Five\n");
}

#[tokio::test]
async fn test_scan_tries_gateways_last_and_aggregates() {
    let connector = Arc::new(FakeConnector::new(&[("10.0.100.5", HostBehavior::RejectsPassword)]));
    let prober = FakeProber::with_up(&["10.0.100.1", "10.0.100.5"]);
    let orchestrator = orchestrator(connector.clone(), prober, Arc::new(InMemoryStore::new()));

    let mut form = display_form("");
    form.scan_subnet = "10.0.100.0/29".to_string();
    orchestrator.run(JobClass::Display, form).await.unwrap().await.unwrap();

    assert_eq!(connector.connect_order(), vec!["10.0.100.5", "10.0.100.1"]);

    let snapshot = orchestrator.snapshot(JobClass::Display).await.unwrap();
    assert_eq!(snapshot.state, JobState::Done);
    assert!(snapshot.log.contains("Scanning 10.0.100.0/29 for SSH..."));
    assert!(snapshot.log.contains("Error configuring 10.0.100.5: "));
    assert!(snapshot.log.contains("Configured OK: 10.0.100.1"));
    assert!(snapshot.lines.last().unwrap().contains("Failures: 10.0.100.5: "));
}

#[tokio::test]
async fn test_empty_scan_is_an_error() {
    let connector = Arc::new(FakeConnector::new(&[]));
    let orchestrator = orchestrator(connector.clone(), FakeProber::with_up(&[]), Arc::new(InMemoryStore::new()));

    let mut form = display_form("");
    form.scan_subnet = "10.0.100.0/29".to_string();
    orchestrator.run(JobClass::Display, form).await.unwrap().await.unwrap();

    let snapshot = orchestrator.snapshot(JobClass::Display).await.unwrap();
    assert_eq!(snapshot.state, JobState::Error);
    assert!(snapshot.lines.last().unwrap().ends_with("No hosts found."));
    assert!(connector.connect_order().is_empty());
}

#[tokio::test]
async fn test_all_targets_failing_is_an_error() {
    let connector = Arc::new(FakeConnector::new(&[("10.0.100.199", HostBehavior::UploadFails)]));
    let orchestrator = orchestrator(connector, FakeProber::with_up(&[]), Arc::new(InMemoryStore::new()));

    orchestrator
        .run(JobClass::Display, display_form("10.0.100.199"))
        .await
        .unwrap()
        .await
        .unwrap();

    let snapshot = orchestrator.snapshot(JobClass::Display).await.unwrap();
    assert_eq!(snapshot.state, JobState::Error);
    assert!(snapshot.log.contains("Permission denied"));
    assert!(snapshot.lines.last().unwrap().contains("All attempts failed: 10.0.100.199: "));
}

#[tokio::test]
async fn test_dropped_launch_counts_only_when_host_goes_away() {
    let connector = Arc::new(FakeConnector::new(&[("10.0.100.199", HostBehavior::DropsOnLaunch)]));

    // host gone after the drop: the new network settings took effect
    let orchestrator = orchestrator(connector.clone(), FakeProber::with_up(&[]), Arc::new(InMemoryStore::new()));
    orchestrator
        .run(JobClass::Display, display_form("10.0.100.199"))
        .await
        .unwrap()
        .await
        .unwrap();
    let snapshot = orchestrator.snapshot(JobClass::Display).await.unwrap();
    assert_eq!(snapshot.state, JobState::Done);
    assert!(snapshot.log.contains("assuming started"));

    // host still answering: the drop is a real failure
    let orchestrator = orchestrator_with_up(connector, &["10.0.100.199"]);
    orchestrator
        .run(JobClass::Display, display_form("10.0.100.199"))
        .await
        .unwrap()
        .await
        .unwrap();
    let snapshot = orchestrator.snapshot(JobClass::Display).await.unwrap();
    assert_eq!(snapshot.state, JobState::Error);
}

fn orchestrator_with_up(connector: Arc<FakeConnector>, up: &[&str]) -> Arc<Orchestrator> {
    orchestrator(connector, FakeProber::with_up(up), Arc::new(InMemoryStore::new()))
}

#[tokio::test]
async fn test_panic_in_run_becomes_error_state() {
    let connector = Arc::new(FakeConnector::new(&[("10.0.100.199", HostBehavior::Panics)]));
    let orchestrator = orchestrator(connector, FakeProber::with_up(&[]), Arc::new(InMemoryStore::new()));

    let handle = orchestrator
        .run(JobClass::Display, display_form("10.0.100.199"))
        .await
        .unwrap();
    assert!(handle.await.is_ok());

    let snapshot = orchestrator.snapshot(JobClass::Display).await.unwrap();
    assert_eq!(snapshot.state, JobState::Error);
    assert!(snapshot.lines.last().unwrap().ends_with("panic: connector exploded"));

    // the slot is free again
    let handle = orchestrator
        .run(JobClass::Display, display_form("10.0.100.199"))
        .await
        .unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_second_run_is_rejected_while_running() {
    let gate = Arc::new(Semaphore::new(0));
    let connector = Arc::new(FakeConnector::new(&[]).gated(gate.clone()));
    let orchestrator = orchestrator(connector, FakeProber::with_up(&[]), Arc::new(InMemoryStore::new()));

    let handle = orchestrator
        .run(JobClass::Display, display_form("10.0.100.199"))
        .await
        .unwrap();
    let before = orchestrator.snapshot(JobClass::Display).await.unwrap();
    assert_eq!(before.state, JobState::Running);

    let err = orchestrator
        .run(JobClass::Display, display_form("10.0.100.200"))
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::Conflict(_)));
    let during = orchestrator.snapshot(JobClass::Display).await.unwrap();
    assert!(during.lines[0].contains("host=10.0.100.199"));
    assert!(!during.log.contains("10.0.100.200"));

    // the other class is independent
    let mut stops = display_form("10.0.100.51");
    stops.station_id = "b1".to_string();
    let stops_handle = orchestrator.run(JobClass::StationStops, stops).await.unwrap();

    gate.add_permits(2);
    handle.await.unwrap();
    stops_handle.await.unwrap();
    assert_eq!(
        orchestrator.snapshot(JobClass::Display).await.unwrap().state,
        JobState::Done
    );
    assert_eq!(
        orchestrator.snapshot(JobClass::StationStops).await.unwrap().state,
        JobState::Done
    );
}

#[tokio::test]
async fn test_invalid_form_is_rejected_before_running() {
    let connector = Arc::new(FakeConnector::new(&[]));
    let orchestrator = orchestrator(connector.clone(), FakeProber::with_up(&[]), Arc::new(InMemoryStore::new()));

    let mut form = display_form("10.0.100.199");
    form.subnet_mask = "255.0.255.0".to_string();
    let err = orchestrator.run(JobClass::Display, form).await.unwrap_err();
    assert!(matches!(err, FleetError::Validation(_)));

    let mut form = ProvisionForm {
        static_host: "10.0.100.51".to_string(),
        ..Default::default()
    };
    form.station_id = "G1".to_string();
    let err = orchestrator.run(JobClass::StationStops, form).await.unwrap_err();
    assert!(matches!(err, FleetError::Validation(_)));

    assert_eq!(
        orchestrator.snapshot(JobClass::Display).await.unwrap().state,
        JobState::Idle
    );
    assert!(connector.connect_order().is_empty());
}

#[tokio::test]
async fn test_stops_role_and_sticky_parameters() {
    let connector = Arc::new(FakeConnector::new(&[]));
    let store = Arc::new(InMemoryStore::new());
    let orchestrator = orchestrator(connector.clone(), FakeProber::with_up(&[]), store.clone());

    let mut form = display_form("10.0.100.51");
    form.station_id = "r3".to_string();
    form.api_host = "http://10.0.100.5:8080/".to_string();
    orchestrator.run(JobClass::StationStops, form).await.unwrap().await.unwrap();

    let script = &connector.exec_log()[0].stdin;
    assert!(script.contains("STATION_ID='R3'"));
    assert!(script.contains("API_URL='http://10.0.100.5:8080/api/stations/R3/stops'"));
    assert!(script.contains(r#"SECRET_JSON='"arena-secret"'"#));

    let stored: Value = store.load("provisioning.stops").await.unwrap().unwrap();
    assert_eq!(stored["stationId"], "R3");
    assert_eq!(stored["host"], "10.0.100.51");

    // a fresh orchestrator over the same store pre-fills the last run
    let restarted = orchestrator_store(store);
    restarted.load_sticky().await;
    let page = restarted.form_for_page(JobClass::StationStops).await.unwrap();
    assert_eq!(page.station_id, "R3");
    assert_eq!(page.host, "10.0.100.51");
    assert_eq!(restarted.form_for_page(JobClass::Display).await.unwrap().display_id, "FTA1");
}

fn orchestrator_store(store: Arc<InMemoryStore>) -> Arc<Orchestrator> {
    orchestrator(Arc::new(FakeConnector::new(&[])), FakeProber::with_up(&[]), store)
}
