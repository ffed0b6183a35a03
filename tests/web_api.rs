//! Integration tests for the control-plane HTTP API.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt; // for .collect().await
use serde_json::json;
use tower::util::ServiceExt; // for `oneshot`

use smoko_rs::config::Config;
use smoko_rs::hardware::{SensorError, TemperatureSensor};
use smoko_rs::hass::{RemoteError, RemoteSwitch, SensorSink};
use smoko_rs::heater::{Heater, SwitchState};
use smoko_rs::monitor::Monitor;
use smoko_rs::probe::{ProbeMonitor, ProbeSample, ProbeSource};
use smoko_rs::web::api::{create_router, AppState};

struct FixedSensor;

#[async_trait]
impl TemperatureSensor for FixedSensor {
    async fn read_temperature(&self) -> Result<f64, SensorError> {
        Ok(50.0)
    }

    fn details(&self) -> serde_json::Value {
        serde_json::json!({ "driver": "fixed", "resolution": 0.5 })
    }
}

#[derive(Default)]
struct RecordingSwitch {
    commands: Mutex<Vec<SwitchState>>,
}

#[async_trait]
impl RemoteSwitch for RecordingSwitch {
    async fn set_switch(&self, _entity: &str, state: SwitchState) -> Result<(), RemoteError> {
        self.commands.lock().unwrap().push(state);
        Ok(())
    }

    async fn switch_state(&self, _entity: &str) -> Result<SwitchState, RemoteError> {
        Ok(SwitchState::Off)
    }
}

struct NullSink;

#[async_trait]
impl SensorSink for NullSink {
    async fn publish_temperature(&self, _sensor: &str, _temp_c: f64) -> Result<(), RemoteError> {
        Ok(())
    }
}

struct NoProbe;

#[async_trait]
impl ProbeSource for NoProbe {
    async fn fetch_samples(&self) -> Result<Vec<ProbeSample>, RemoteError> {
        Ok(Vec::new())
    }
}

fn test_state() -> (AppState, Arc<RecordingSwitch>) {
    let mut config = Config::default();
    config.control.target_temp = 225.0;
    config.control.target_delta = 4.5;
    let switch = Arc::new(RecordingSwitch::default());
    let heater = Arc::new(Heater::new(switch.clone(), config.control.resync_every));
    let monitor = Arc::new(Monitor::new(
        &config,
        Arc::new(FixedSensor),
        heater,
        Arc::new(NullSink),
        None,
    ));
    let probe = Arc::new(ProbeMonitor::new(Arc::new(NoProbe), 4, false));
    (AppState { monitor, probe }, switch)
}

async fn get_json(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let value = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, value)
}

fn post_json(uri: &str, payload: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap()
}

#[tokio::test]
async fn status_reports_a_stopped_session() {
    let (state, _) = test_state();
    let app = create_router(state);

    let (status, body) = get_json(app, "/api/v1/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "Stopped");
    assert_eq!(body["action"], "Start");
    assert_eq!(body["heater_state"], "disabled");
    assert!((body["target_temp"].as_f64().unwrap() - 225.0).abs() < 1e-6);
    assert!(body["latest"].is_null());
    assert_eq!(body["strategy"], "pid");
}

#[tokio::test]
async fn setpoint_round_trips_through_fahrenheit() {
    let (state, _) = test_state();
    let app = create_router(state);

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/setpoint",
            json!({ "target_temp": 250.0, "target_delta": 4.5, "interval": 6 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let (_, body) = get_json(app, "/api/v1/status").await;
    assert!((body["target_temp"].as_f64().unwrap() - 250.0).abs() < 1e-6);
    assert!((body["target_delta"].as_f64().unwrap() - 4.5).abs() < 1e-6);
    assert_eq!(body["interval"], 6);
}

#[tokio::test]
async fn zero_interval_is_rejected_and_previous_config_kept() {
    let (state, _) = test_state();
    let app = create_router(state);

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/setpoint",
            json!({ "target_temp": 250.0, "target_delta": 4.5, "interval": 0 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let (_, body) = get_json(app, "/api/v1/status").await;
    assert!((body["target_temp"].as_f64().unwrap() - 225.0).abs() < 1e-6);
    assert_eq!(body["interval"], 10);
}

#[tokio::test]
async fn tuning_rejects_out_of_range_alpha() {
    let (state, _) = test_state();
    let app = create_router(state);

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/tuning",
            json!({
                "proportional_gain": 5.0,
                "integral_gain": 0.02,
                "derivative_gain": 10.0,
                "alpha": 1.5,
                "integral_windup_guard": 20.0,
                "hass_entity_name": "switch.test",
                "hass_sensor_name": "smoker_temp",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let ok = app
        .oneshot(post_json(
            "/api/v1/tuning",
            json!({
                "proportional_gain": 6.0,
                "integral_gain": 0.05,
                "derivative_gain": 8.0,
                "alpha": 0.4,
                "integral_windup_guard": 15.0,
                "hass_entity_name": "switch.other",
                "hass_sensor_name": "pit_temp",
                "hass_sensor_enabled": true,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn element_toggle_issues_the_safety_off() {
    let (state, switch) = test_state();
    let app = create_router(state);

    let response = app
        .clone()
        .oneshot(post_json("/api/v1/element", json!({ "enabled": true })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let (_, body) = get_json(app.clone(), "/api/v1/element").await;
    assert_eq!(body["enabled"], true);
    assert_eq!(body["state"], "off");

    let response = app
        .clone()
        .oneshot(post_json("/api/v1/element", json!({ "enabled": false })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Disable always re-asserts Off at the switch exactly once
    assert_eq!(switch.commands.lock().unwrap().as_slice(), &[SwitchState::Off]);
    let (_, body) = get_json(app, "/api/v1/element").await;
    assert_eq!(body["state"], "disabled");
}

#[tokio::test]
async fn history_endpoints_return_empty_collections() {
    let (state, _) = test_state();
    let app = create_router(state);

    let (status, body) = get_json(app.clone(), "/api/v1/history").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (status, body) = get_json(app.clone(), "/api/v1/history/since/-3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (status, body) = get_json(app.clone(), "/api/v1/probe/cooks").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));

    let (status, body) = get_json(app, "/api/v1/probe/history/since/5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));
}

#[tokio::test]
async fn sensor_details_are_exposed() {
    let (state, _) = test_state();
    let app = create_router(state);

    let (status, body) = get_json(app, "/api/v1/sensor").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["driver"], "fixed");
}
