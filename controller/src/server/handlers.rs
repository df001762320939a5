//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect},
    Form, Json,
};
use serde::Serialize;
use serde_json::json;

use crate::drivers::RebootOutcome;
use crate::errors::FleetError;
use crate::models::device::DeviceSnapshot;
use crate::provision::job::{JobSnapshot, JobState};
use crate::provision::request::{JobClass, ProvisionForm};
use crate::server::state::ServerState;
use crate::stations::{StationStatusView, StationStopStatus, StopReport};
use crate::utils::version_info;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "fieldnet".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

fn require_caller(state: &ServerState, headers: &HeaderMap) -> Result<(), FleetError> {
    if state.authorizer.is_authorized(headers) {
        Ok(())
    } else {
        Err(FleetError::Permission("not authorized".to_string()))
    }
}

// ================================= DEVICES ===================================== //

pub async fn devices_handler(State(state): State<Arc<ServerState>>) -> Json<Vec<DeviceSnapshot>> {
    Json(state.controller.devices.snapshots().await)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebootResponse {
    pub device: String,
    pub connection_lost: bool,
    pub confirmed_down: bool,
}

pub async fn reboot_device_handler(
    State(state): State<Arc<ServerState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<Json<RebootResponse>, FleetError> {
    require_caller(&state, &headers)?;
    if !state.controller.switch_management_enabled {
        return Err(FleetError::FeatureDisabled("switch management disabled".to_string()));
    }
    let device = state
        .controller
        .devices
        .get(&name)
        .ok_or_else(|| FleetError::NotFound(format!("no device named '{}'", name)))?;

    let (connection_lost, confirmed_down) = match device.reboot().await? {
        RebootOutcome::Accepted => (false, false),
        RebootOutcome::ConnectionLost { confirmed_down } => (true, confirmed_down),
    };
    Ok(Json(RebootResponse {
        device: name,
        connection_lost,
        confirmed_down,
    }))
}

// ================================= STATIONS ==================================== //

/// The feature switch is checked before the body; the body is parsed by
/// hand so malformed JSON maps onto a plain-text 400.
pub async fn station_stop_handler(
    State(state): State<Arc<ServerState>>,
    Path(station_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, FleetError> {
    if !state.controller.stations.enabled() {
        return Err(FleetError::FeatureDisabled("station RPi stops disabled".to_string()));
    }
    let report: StopReport = serde_json::from_slice(&body)
        .map_err(|e| FleetError::Validation(format!("invalid request body: {}", e)))?;
    state.controller.stations.report_stop(&station_id, &report).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn stations_handler(State(state): State<Arc<ServerState>>) -> Json<Vec<StationStopStatus>> {
    Json(state.controller.stations.snapshot().await)
}

// =============================== PROVISIONING ================================== //

/// Setup page model: the form to pre-fill and the current job
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupPage {
    pub form: ProvisionForm,
    pub status: JobSnapshot,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub station_status: Option<Vec<StationStatusView>>,
}

/// Job status, with the station table for the stop role
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupStatus {
    pub state: JobState,
    pub log: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub station_status: Option<Vec<StationStatusView>>,
}

async fn station_table(state: &ServerState, class: JobClass) -> Option<Vec<StationStatusView>> {
    match class {
        JobClass::StationStops => Some(state.controller.stations.views().await),
        JobClass::Display => None,
    }
}

async fn setup_page(state: &ServerState, headers: &HeaderMap, class: JobClass) -> Result<Json<SetupPage>, FleetError> {
    require_caller(state, headers)?;
    let mut form = state.controller.orchestrator.form_for_page(class).await?;
    form.ssh_pass.clear();
    form.secret.clear();
    Ok(Json(SetupPage {
        form,
        status: state.controller.orchestrator.snapshot(class).await?,
        station_status: station_table(state, class).await,
    }))
}

async fn setup_status(state: &ServerState, headers: &HeaderMap, class: JobClass) -> Result<Json<SetupStatus>, FleetError> {
    require_caller(state, headers)?;
    let snapshot = state.controller.orchestrator.snapshot(class).await?;
    Ok(Json(SetupStatus {
        state: snapshot.state,
        log: snapshot.log,
        station_status: station_table(state, class).await,
    }))
}

async fn setup_run(
    state: &ServerState,
    headers: &HeaderMap,
    class: JobClass,
    form: ProvisionForm,
) -> Result<(), FleetError> {
    require_caller(state, headers)?;
    // the job runs detached; its handle is not awaited
    state.controller.orchestrator.run(class, form).await?;
    Ok(())
}

pub async fn display_setup_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> Result<Json<SetupPage>, FleetError> {
    setup_page(&state, &headers, JobClass::Display).await
}

pub async fn display_run_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Form(form): Form<ProvisionForm>,
) -> Result<Redirect, FleetError> {
    setup_run(&state, &headers, JobClass::Display, form).await?;
    Ok(Redirect::to("/setup/rpi"))
}

pub async fn display_status_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> Result<Json<SetupStatus>, FleetError> {
    setup_status(&state, &headers, JobClass::Display).await
}

pub async fn stops_setup_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> Result<Json<SetupPage>, FleetError> {
    setup_page(&state, &headers, JobClass::StationStops).await
}

pub async fn stops_run_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Form(form): Form<ProvisionForm>,
) -> Result<Redirect, FleetError> {
    setup_run(&state, &headers, JobClass::StationStops, form).await?;
    Ok(Redirect::to("/setup/rpi/stops"))
}

pub async fn stops_status_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
) -> Result<Json<SetupStatus>, FleetError> {
    setup_status(&state, &headers, JobClass::StationStops).await
}
