//! API integration tests for aircell-control.
//!
//! These tests exercise the REST API through axum's tower service
//! interface (no TCP). Each test builds a fresh simulator over the
//! in-memory bridge, so no worker threads are needed unless the test
//! explicitly starts the simulation.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use aircell_control::api;
use aircell_control::state::AppState;
use aircell_sim::{ChannelBridge, SimConfig, Simulator};

/// Build a test app around a fresh simulator.
fn test_app() -> (Router, Arc<Simulator>) {
    let bridge = Arc::new(ChannelBridge::new());
    let cfg = SimConfig {
        stats_path: std::env::temp_dir().join("aircell-api-test-stats.log"),
        ..SimConfig::default()
    };
    let sim = Arc::new(Simulator::new(cfg, bridge));
    let app = Router::new()
        .merge(api::router())
        .with_state(AppState::new(sim.clone()));
    (app, sim)
}

async fn request(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request builds");

    let response = app.clone().oneshot(request).await.expect("handler runs");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("body is JSON")
    };
    (status, value)
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    request(app, "POST", uri, Some(body)).await
}

async fn post_empty(app: &Router, uri: &str) -> (StatusCode, Value) {
    request(app, "POST", uri, None).await
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    request(app, "GET", uri, None).await
}

// ── Base stations ───────────────────────────────────────────────────

#[tokio::test]
async fn basestation_create_fetch_update() {
    let (app, _sim) = test_app();

    let (status, body) = post(&app, "/init/basestation", json!({"x": 100.0, "y": 200.0})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["base_station"]["id"], 0);
    assert_eq!(body["base_station"]["on"], true);
    assert_eq!(body["base_station"]["x"], 100.0);

    let (status, body) = get(&app, "/get/basestation/0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["base_station"]["y"], 200.0);

    let (status, body) = post(
        &app,
        "/update/basestation/0",
        json!({"x": 110.0, "y": 210.0, "on": false}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["base_station"]["on"], false);
    assert_eq!(body["base_station"]["x"], 110.0);
}

#[tokio::test]
async fn unknown_entities_return_404_with_an_error_body() {
    let (app, _sim) = test_app();

    let (status, body) = get(&app, "/get/basestation/9").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("9"));

    let (status, _) = get(&app, "/get/userequipment/3").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post(
        &app,
        "/update/userequipment/3",
        json!({"x": 0.0, "y": 0.0, "change_ip": false}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── User equipment ──────────────────────────────────────────────────

#[tokio::test]
async fn ue_creation_allocates_sequential_ips_and_serving_tower() {
    let (app, _sim) = test_app();

    post(&app, "/init/basestation", json!({"x": 0.0, "y": 0.0})).await;

    let (status, body) = post(&app, "/init/userequipment", json!({"x": 30.0, "y": 40.0})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_equipment"]["ip"], "10.0.0.1");
    assert_eq!(body["user_equipment"]["bs"], 0);
    assert_eq!(body["user_equipment"]["up_packets"], 0);

    let (_, body) = post(&app, "/init/userequipment", json!({"x": 50.0, "y": 60.0})).await;
    assert_eq!(body["user_equipment"]["ip"], "10.0.0.2");

    // Powering the only tower off detaches everyone.
    post(
        &app,
        "/update/basestation/0",
        json!({"x": 0.0, "y": 0.0, "on": false}),
    )
    .await;
    let (_, body) = get(&app, "/get/userequipment/0").await;
    assert_eq!(body["user_equipment"]["bs"], -1);
}

#[tokio::test]
async fn ue_update_can_rotate_the_ip() {
    let (app, _sim) = test_app();
    post(&app, "/init/basestation", json!({"x": 0.0, "y": 0.0})).await;
    post(&app, "/init/userequipment", json!({"x": 5.0, "y": 5.0})).await;

    let (status, body) = post(
        &app,
        "/update/userequipment/0",
        json!({"x": 9.0, "y": 9.0, "change_ip": true}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_equipment"]["ip"], "10.0.0.2");
    assert_eq!(body["user_equipment"]["x"], 9.0);

    let (status, body) = get(&app, "/check/userequipment/0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["up_packets"], 0);
    assert_eq!(body["down_packets"], 0);
}

// ── Link quality ────────────────────────────────────────────────────

#[tokio::test]
async fn check_link_needs_an_attached_ue() {
    let (app, _sim) = test_app();
    post(&app, "/init/userequipment", json!({"x": 5.0, "y": 5.0})).await;

    let (status, body) = get(&app, "/check/link/0").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("not attached"));

    post(&app, "/init/basestation", json!({"x": 0.0, "y": 0.0})).await;
    let (status, body) = get(&app, "/check/link/0").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["upload_bandwidth"].as_f64().unwrap() >= 0.0);
    assert!(body["download_per"].as_f64().unwrap() <= 1.0);
    assert!(body["upload_latency"].is_number() || body["upload_latency"].is_null());
}

// ── Toggles and configuration ───────────────────────────────────────

#[tokio::test]
async fn control_toggles_report_the_new_state() {
    let (app, _sim) = test_app();

    // The simulator boots paused; the first toggle resumes it.
    let (status, body) = post_empty(&app, "/control/pause").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["paused"], false);
    let (_, body) = post_empty(&app, "/control/pause").await;
    assert_eq!(body["paused"], true);

    let (_, body) = post_empty(&app, "/control/drop").await;
    assert_eq!(body["drop"], false);
    let (_, body) = post_empty(&app, "/control/drop").await;
    assert_eq!(body["drop"], true);

    let (_, body) = post_empty(&app, "/control/delay").await;
    assert_eq!(body["delay"], false);
}

#[tokio::test]
async fn configure_validates_and_scales_positions() {
    let (app, _sim) = test_app();

    let (status, _) = post(
        &app,
        "/configure",
        json!({
            "height": 600.0, "width": 800.0, "pixels_per_meter": 0.0,
            "network_type": "NR_100", "starting_ip": "10.0.0.1"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post(
        &app,
        "/configure",
        json!({
            "height": 600.0, "width": 800.0, "pixels_per_meter": 2.0,
            "network_type": "NR_100", "starting_ip": "10.0.0.20"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    // Positions in bodies are now pixels at 2 px/m; they round-trip.
    let (_, body) = post(&app, "/init/basestation", json!({"x": 100.0, "y": 40.0})).await;
    assert_eq!(body["base_station"]["x"], 100.0);
    assert_eq!(body["base_station"]["y"], 40.0);

    // The reconfigured starting address takes effect for new UEs.
    let (_, body) = post(&app, "/init/userequipment", json!({"x": 100.0, "y": 40.0})).await;
    assert_eq!(body["user_equipment"]["ip"], "10.0.0.20");
}

#[tokio::test]
async fn init_simulation_starts_and_unpauses() {
    let (app, sim) = test_app();

    let (status, body) = post_empty(&app, "/init/simulation").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["paused"], false);

    // A second init is harmless.
    let (status, body) = post_empty(&app, "/init/simulation").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["paused"], false);

    sim.shutdown();
}
