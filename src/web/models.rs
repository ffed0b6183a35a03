//! Contains the data models for API requests and responses.
//!
//! Temperatures cross this boundary in Fahrenheit; everything behind it is
//! Celsius.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::control::PidGains;
use crate::heater::HeaterMode;
use crate::history::Measurement;
use crate::telemetry::TelemetryStats;

/// Snapshot of the monitoring session for the dashboard.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: String,
    pub action: String,
    pub heater_state: HeaterMode,
    pub element_enabled: bool,
    pub session: Option<Uuid>,
    pub latest: Option<Measurement>,
    pub one_min_temp: f64,
    pub target_temp: f64,
    pub target_delta: f64,
    pub interval: usize,
    pub strategy: String,
    pub gains: PidGains,
    pub telemetry: Option<TelemetryStats>,
}

/// Setpoint update, Fahrenheit in.
#[derive(Debug, Deserialize)]
pub struct SetpointRequest {
    pub target_temp: f64,
    pub target_delta: f64,
    pub interval: u32,
}

/// Controller tuning and integration naming.
#[derive(Debug, Deserialize)]
pub struct TuningRequest {
    pub proportional_gain: f64,
    pub integral_gain: f64,
    pub derivative_gain: f64,
    pub alpha: f64,
    pub integral_windup_guard: f64,
    pub hass_entity_name: String,
    pub hass_sensor_name: String,
    #[serde(default)]
    pub hass_sensor_enabled: bool,
    #[serde(default)]
    pub telemetry_enabled: bool,
}

/// Heating element enable/disable.
#[derive(Debug, Deserialize)]
pub struct ElementRequest {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct ElementResponse {
    pub enabled: bool,
    pub state: HeaterMode,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
