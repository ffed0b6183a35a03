//! Defines the Axum API routes and handlers.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::Stream;

use crate::control::PidGains;
use crate::monitor::{Monitor, TuningUpdate};
use crate::probe::ProbeMonitor;
use crate::units::{celsius_to_fahrenheit, delta_c_to_f};
use crate::web::models::{
    ElementRequest, ElementResponse, ErrorResponse, SetpointRequest, StatusResponse, TuningRequest,
};

#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<Monitor>,
    pub probe: Arc<ProbeMonitor>,
}

/// Creates the Axum router with all the API endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/history", get(get_history))
        .route("/api/v1/history/since/{index}", get(get_history_since))
        .route("/api/v1/history/stream", get(stream_history))
        .route("/api/v1/setpoint", post(update_setpoint))
        .route("/api/v1/tuning", post(update_tuning))
        .route("/api/v1/monitor/start", post(start_monitoring))
        .route("/api/v1/monitor/stop", post(stop_monitoring))
        .route("/api/v1/element", get(get_element).post(set_element))
        .route("/api/v1/sensor", get(get_sensor_details))
        .route("/api/v1/probe/cooks", get(get_probe_cooks))
        .route("/api/v1/probe/history", get(get_probe_history))
        .route("/api/v1/probe/history/since/{index}", get(get_probe_history_since))
        .with_state(state)
}

async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let monitor = &state.monitor;
    let monitoring_state = monitor.state().await;
    let (target_c, delta_c, interval) = monitor.setpoint().await;
    let settings = monitor.settings().await;

    Json(StatusResponse {
        state: monitoring_state.to_string(),
        action: monitoring_state.action().to_string(),
        heater_state: monitor.heater_mode().await,
        element_enabled: monitor.element_enabled().await,
        session: monitor.session().await,
        latest: monitor.latest().await,
        one_min_temp: monitor.one_min_temp().await,
        target_temp: celsius_to_fahrenheit(target_c),
        target_delta: delta_c_to_f(delta_c),
        interval,
        strategy: format!("{:?}", settings.strategy).to_lowercase(),
        gains: settings.gains,
        telemetry: monitor.telemetry_stats(),
    })
}

async fn get_history(State(state): State<AppState>) -> Json<serde_json::Value> {
    let history = state.monitor.history_all().await;
    Json(serde_json::json!(history))
}

async fn get_history_since(
    State(state): State<AppState>,
    Path(index): Path<i64>,
) -> Json<serde_json::Value> {
    let history = state.monitor.history_since(index).await;
    Json(serde_json::json!(history))
}

/// One SSE event per accepted measurement.
async fn stream_history(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.monitor.subscribe_measurements();
    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(measurement) => {
                    if let Ok(event) = Event::default().json_data(&measurement) {
                        yield Ok(event);
                    }
                }
                // A slow client that missed events just resumes with the next one
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn update_setpoint(
    State(state): State<AppState>,
    Json(payload): Json<SetpointRequest>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    state
        .monitor
        .update_setpoint(payload.target_temp, payload.target_delta, payload.interval)
        .await
        .map_err(reject)?;
    state.probe.set_polls_per_minute(payload.interval);
    Ok(StatusCode::NO_CONTENT)
}

async fn update_tuning(
    State(state): State<AppState>,
    Json(payload): Json<TuningRequest>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    let update = TuningUpdate {
        gains: PidGains {
            proportional_gain: payload.proportional_gain,
            integral_gain: payload.integral_gain,
            derivative_gain: payload.derivative_gain,
            alpha: payload.alpha,
            integral_windup_guard: payload.integral_windup_guard,
        },
        entity_id: payload.hass_entity_name,
        sensor_name: payload.hass_sensor_name,
        hass_sensor_enabled: payload.hass_sensor_enabled,
        telemetry_enabled: payload.telemetry_enabled,
    };
    state.monitor.update_tuning(update).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn start_monitoring(State(state): State<AppState>) -> StatusCode {
    state.monitor.clone().start().await;
    state.probe.clone().start().await;
    StatusCode::ACCEPTED
}

async fn stop_monitoring(State(state): State<AppState>) -> StatusCode {
    state.monitor.stop().await;
    state.probe.stop().await;
    StatusCode::ACCEPTED
}

async fn get_element(State(state): State<AppState>) -> Json<ElementResponse> {
    Json(ElementResponse {
        enabled: state.monitor.element_enabled().await,
        state: state.monitor.heater_mode().await,
    })
}

async fn set_element(
    State(state): State<AppState>,
    Json(payload): Json<ElementRequest>,
) -> Json<ElementResponse> {
    if payload.enabled {
        state.monitor.enable_element().await;
    } else {
        state.monitor.disable_element().await;
    }
    Json(ElementResponse {
        enabled: state.monitor.element_enabled().await,
        state: state.monitor.heater_mode().await,
    })
}

async fn get_sensor_details(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.monitor.sensor_details())
}

async fn get_probe_cooks(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!(state.probe.cooks().await))
}

async fn get_probe_history(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!(state.probe.history().await))
}

async fn get_probe_history_since(
    State(state): State<AppState>,
    Path(index): Path<i64>,
) -> Json<serde_json::Value> {
    Json(serde_json::json!(state.probe.history_since(index).await))
}

fn reject(e: crate::config::ConfigError) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}
