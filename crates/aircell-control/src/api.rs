//! REST control surface.
//!
//! POST /control/pause                 — toggle run/pause
//! POST /control/drop                  — toggle error injection
//! POST /control/delay                 — toggle latency injection
//! POST /init/simulation               — start workers; unpause
//! POST /configure                     — view scale, PHY profile, subnet
//! POST /init/basestation              — create tower
//! POST /init/userequipment            — create UE (allocates an IP)
//! POST /update/basestation/{id}       — move / power-toggle tower
//! POST /update/userequipment/{id}     — move UE, optionally rotate IP
//! GET  /get/basestation/{id}          — tower descriptor
//! GET  /get/userequipment/{id}        — UE descriptor
//! GET  /check/userequipment/{id}      — in-flight counters
//! GET  /check/link/{id}               — sampled link quality
//! WS   /packet_transfer               — live per-packet lines
//!
//! Positions in request and response bodies are pixels; the engine works
//! in meters. The `pixels_per_meter` factor set via /configure converts
//! at this boundary only.

use std::net::Ipv4Addr;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use aircell_sim::topology::{TowerDescriptor, UeDescriptor};
use aircell_sim::{NetworkType, SimError};

use crate::state::AppState;
use crate::ws;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/control/pause", post(control_pause))
        .route("/control/drop", post(control_drop))
        .route("/control/delay", post(control_delay))
        .route("/init/simulation", post(init_simulation))
        .route("/configure", post(configure))
        .route("/init/basestation", post(init_basestation))
        .route("/init/userequipment", post(init_userequipment))
        .route("/update/basestation/{id}", post(update_basestation))
        .route("/update/userequipment/{id}", post(update_userequipment))
        .route("/get/basestation/{id}", get(get_basestation))
        .route("/get/userequipment/{id}", get(get_userequipment))
        .route("/check/userequipment/{id}", get(check_userequipment))
        .route("/check/link/{id}", get(check_link))
        .route("/packet_transfer", get(ws::handler))
}

// ── Errors ──────────────────────────────────────────────────────────

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<SimError> for ApiError {
    fn from(err: SimError) -> Self {
        match &err {
            SimError::UnknownTower(_) | SimError::UnknownUe(_) => Self::not_found(err.to_string()),
            SimError::NotAttached(_) | SimError::Subnet(_) => Self::conflict(err.to_string()),
            SimError::Bridge(_) => Self::internal(err.to_string()),
        }
    }
}

// ── Run-state toggles ───────────────────────────────────────────────

async fn control_pause(State(state): State<AppState>) -> Json<Value> {
    let paused = state.sim().toggle_pause();
    Json(json!({ "paused": paused }))
}

async fn control_drop(State(state): State<AppState>) -> Json<Value> {
    let drop = state.sim().toggle_dropping();
    Json(json!({ "drop": drop }))
}

async fn control_delay(State(state): State<AppState>) -> Json<Value> {
    let delay = state.sim().toggle_delaying();
    Json(json!({ "delay": delay }))
}

async fn init_simulation(State(state): State<AppState>) -> Json<Value> {
    let started = state.sim().start();
    Json(json!({
        "ok": true,
        "message": if started { "Simulation initialized" } else { "Simulation already running" },
        "paused": state.sim().is_paused(),
    }))
}

// ── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SimulationConfig {
    height: f64,
    width: f64,
    pixels_per_meter: f64,
    network_type: NetworkType,
    starting_ip: Ipv4Addr,
}

async fn configure(
    State(state): State<AppState>,
    Json(body): Json<SimulationConfig>,
) -> Result<Json<Value>, ApiError> {
    if body.height <= 0.0 || body.width <= 0.0 {
        return Err(ApiError::bad_request("height and width must be positive"));
    }
    if body.pixels_per_meter <= 0.0 {
        return Err(ApiError::bad_request("pixels_per_meter must be positive"));
    }
    state.set_pixels_per_meter(body.pixels_per_meter);
    state.sim().configure(body.network_type, body.starting_ip);
    Ok(Json(json!({ "ok": true, "message": "Simulation configured" })))
}

// ── Base stations ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct BaseStationInit {
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
struct BaseStationUpdate {
    x: f64,
    y: f64,
    on: bool,
}

fn tower_body(tower: &TowerDescriptor, ppm: f64) -> Value {
    json!({
        "id": tower.id,
        "x": tower.x * ppm,
        "y": tower.y * ppm,
        "on": tower.on,
    })
}

async fn init_basestation(
    State(state): State<AppState>,
    Json(body): Json<BaseStationInit>,
) -> Json<Value> {
    let ppm = state.pixels_per_meter();
    let tower = state.sim().add_tower(body.x / ppm, body.y / ppm, true);
    tracing::info!(id = tower.id, "base station created");
    Json(json!({
        "message": format!("Base Station {} created successfully", tower.id),
        "base_station": tower_body(&tower, ppm),
    }))
}

async fn update_basestation(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(body): Json<BaseStationUpdate>,
) -> Result<Json<Value>, ApiError> {
    let ppm = state.pixels_per_meter();
    let tower = state
        .sim()
        .update_tower(id, body.x / ppm, body.y / ppm, body.on)?;
    Ok(Json(json!({
        "message": format!("BaseStation {id} updated successfully"),
        "base_station": tower_body(&tower, ppm),
    })))
}

async fn get_basestation(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<Value>, ApiError> {
    let tower = state.sim().tower_descriptor(id)?;
    Ok(Json(
        json!({ "base_station": tower_body(&tower, state.pixels_per_meter()) }),
    ))
}

// ── User equipment ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct UserEquipmentInit {
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
struct UserEquipmentUpdate {
    x: f64,
    y: f64,
    change_ip: bool,
}

fn ue_body(ue: &UeDescriptor, ppm: f64) -> Value {
    json!({
        "id": ue.id,
        "x": ue.x * ppm,
        "y": ue.y * ppm,
        "ip": ue.ip,
        "bs": ue.bs,
        "up_packets": ue.up_packets,
        "down_packets": ue.down_packets,
    })
}

async fn init_userequipment(
    State(state): State<AppState>,
    Json(body): Json<UserEquipmentInit>,
) -> Result<Json<Value>, ApiError> {
    let ppm = state.pixels_per_meter();
    let ue = state.sim().add_ue(body.x / ppm, body.y / ppm)?;
    tracing::info!(id = ue.id, ip = %ue.ip, "user equipment created");
    Ok(Json(json!({
        "message": format!("User Equipment {} created successfully", ue.id),
        "user_equipment": ue_body(&ue, ppm),
    })))
}

async fn update_userequipment(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(body): Json<UserEquipmentUpdate>,
) -> Result<Json<Value>, ApiError> {
    let ppm = state.pixels_per_meter();
    let ue = state
        .sim()
        .update_ue(id, body.x / ppm, body.y / ppm, body.change_ip)?;
    Ok(Json(json!({
        "message": format!("UserEquipment {id} updated successfully"),
        "user_equipment": ue_body(&ue, ppm),
    })))
}

async fn get_userequipment(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<Value>, ApiError> {
    let ue = state.sim().ue_descriptor(id)?;
    Ok(Json(
        json!({ "user_equipment": ue_body(&ue, state.pixels_per_meter()) }),
    ))
}

async fn check_userequipment(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<aircell_sim::UeCheck>, ApiError> {
    Ok(Json(state.sim().ue_check(id)?))
}

async fn check_link(
    State(state): State<AppState>,
    Path(id): Path<u32>,
) -> Result<Json<aircell_sim::LinkStats>, ApiError> {
    Ok(Json(state.sim().link_stats(id)?))
}
