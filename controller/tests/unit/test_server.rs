use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use fieldnet::app::options::AppOptions;
use fieldnet::app::state::{Collaborators, FleetController};
use fieldnet::models::device::DeviceModel;
use fieldnet::server::auth::BearerAuthorizer;
use fieldnet::server::serve::router;
use fieldnet::server::state::ServerState;
use fieldnet::storage::layout::StorageLayout;
use fieldnet::storage::params::InMemoryStore;
use fieldnet::storage::settings::{DeviceSettings, Settings};

use crate::fakes::{FakeConnector, FakeProber};

fn settings(switch_management: bool, stations_enabled: bool) -> Settings {
    let mut settings = Settings::default();
    settings.switch_management_enabled = switch_management;
    settings.station_stops.enabled = stations_enabled;
    settings.station_stops.secret = "secret".to_string();
    settings.devices = vec![DeviceSettings {
        name: "red".to_string(),
        model: DeviceModel::TplinkSg108e,
        address: "10.0.100.3".to_string(),
        username: "admin".to_string(),
        password: "pw".to_string(),
        reboot_grace_secs: None,
        ready_budget_secs: None,
    }];
    settings
}

async fn app(settings: Settings, admin_token: &str) -> Router {
    let options = AppOptions::from_settings(StorageLayout::new("/nonexistent/fieldnet"), &settings);
    let collaborators = Collaborators {
        prober: FakeProber::with_up(&[]),
        connector: Arc::new(FakeConnector::new(&[])),
        store: Arc::new(InMemoryStore::new()),
    };
    let controller = FleetController::with_collaborators(&options, &settings, collaborators)
        .await
        .unwrap();
    let authorizer = Arc::new(BearerAuthorizer::new(admin_token));
    router(Arc::new(ServerState::new(Arc::new(controller), authorizer)))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = app(settings(false, false), "").await;
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], "healthy");
}

// ================================= STATIONS ==================================== //

#[tokio::test]
async fn test_station_stop_report() {
    let app = app(settings(false, true), "").await;

    let (status, body) = send(
        &app,
        post_json("/api/stations/r2/stops", r#"{"eStop": true, "aStop": false, "secret": "secret"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), serde_json::json!({ "success": true }));

    let (status, body) = send(&app, get("/api/stations")).await;
    assert_eq!(status, StatusCode::OK);
    let stations: Value = serde_json::from_str(&body).unwrap();
    let r2 = stations
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["station"] == "R2")
        .unwrap();
    assert_eq!(r2["remoteEStop"], true);
    assert_eq!(r2["online"], true);
}

#[tokio::test]
async fn test_station_stop_rejections() {
    let app = app(settings(false, true), "").await;

    let (status, body) = send(
        &app,
        post_json("/api/stations/R1/stops", r#"{"eStop": true, "secret": "wrong"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, "invalid secret");

    let (status, body) = send(&app, post_json("/api/stations/R1/stops", "{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.starts_with("invalid request body"));

    let (status, body) = send(
        &app,
        post_json("/api/stations/x9/stops", r#"{"eStop": true, "secret": "secret"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "Invalid station ID 'X9'.");

    // nothing above reached the table
    let (_, body) = send(&app, get("/api/stations")).await;
    let stations: Value = serde_json::from_str(&body).unwrap();
    assert!(stations.as_array().unwrap().iter().all(|s| s["lastUpdate"].is_null()));
}

#[tokio::test]
async fn test_station_stops_disabled() {
    let app = app(settings(false, false), "").await;
    let (status, _) = send(
        &app,
        post_json("/api/stations/R1/stops", r#"{"eStop": true, "secret": "secret"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_station_stops_disabled_wins_over_malformed_body() {
    let app = app(settings(false, false), "").await;
    let (status, body) = send(&app, post_json("/api/stations/R1/stops", "{not json")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, "station RPi stops disabled");

    let (status, _) = send(
        &app,
        post_json("/api/stations/x9/stops", r#"{"eStop": true, "secret": "wrong"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

// ================================= DEVICES ===================================== //

#[tokio::test]
async fn test_reboot_refused_while_switch_management_off() {
    let app = app(settings(false, false), "").await;
    let (status, body) = send(&app, post_json("/api/devices/red/reboot", "")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, "switch management disabled");
}

#[tokio::test]
async fn test_reboot_unknown_device() {
    let app = app(settings(true, false), "").await;
    let (status, _) = send(&app, post_json("/api/devices/green/reboot", "")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_privileged_routes_require_token() {
    let app = app(settings(true, false), "hunter2").await;

    let (status, _) = send(&app, post_json("/api/devices/red/reboot", "")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, get("/setup/rpi")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let request = Request::builder()
        .uri("/setup/rpi")
        .header(header::AUTHORIZATION, "Bearer hunter2")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_devices_listing() {
    let app = app(settings(true, false), "").await;
    let (status, body) = send(&app, get("/api/devices")).await;
    assert_eq!(status, StatusCode::OK);
    let devices: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(devices.as_array().unwrap().len(), 1);
    assert_eq!(devices[0]["name"], "red");
}

// =============================== PROVISIONING ================================== //

fn post_form(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_setup_run_rejects_bad_mask() {
    let app = app(settings(false, false), "").await;
    let (status, _) = send(
        &app,
        post_form(
            "/setup/rpi/run",
            "host=10.0.100.199&staticHost=10.0.100.41&subnetMask=255.0.255.0",
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(&app, get("/setup/rpi/status")).await;
    let status: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(status["state"], "Idle");
}

#[tokio::test]
async fn test_setup_run_redirects_and_reports() {
    let app = app(settings(false, false), "").await;
    let response = app
        .clone()
        .oneshot(post_form(
            "/setup/rpi/run",
            "host=10.0.100.199&staticHost=10.0.100.41&subnetMask=255.255.255.0&sshPass=hunter2",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/setup/rpi");

    // the job runs detached; poll until it settles
    let mut state = Value::Null;
    for _ in 0..100 {
        let (_, body) = send(&app, get("/setup/rpi/status")).await;
        let status: Value = serde_json::from_str(&body).unwrap();
        state = status["state"].clone();
        if state != "Running" {
            assert!(status.get("stationStatus").is_none());
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(state, "Done");

    // the page pre-fills the sticky form without the password
    let (_, body) = send(&app, get("/setup/rpi")).await;
    let page: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(page["form"]["host"], "10.0.100.199");
    assert_eq!(page["form"]["sshPass"], "");
}

#[tokio::test]
async fn test_stops_status_lists_every_station() {
    let app = app(settings(false, true), "").await;
    let (status, body) = send(&app, get("/setup/rpi/stops/status")).await;
    assert_eq!(status, StatusCode::OK);
    let status: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(status["state"], "Idle");
    let table = status["stationStatus"].as_array().unwrap();
    assert_eq!(table.len(), 6);
    assert!(table.iter().all(|s| s["lastUpdate"] == "Never"));
}
