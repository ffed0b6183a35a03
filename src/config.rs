// src/config.rs - Host configuration
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::control::{PidGains, StrategyKind};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub control: ControlConfig,

    #[serde(default)]
    pub pid: PidGains,

    #[serde(default)]
    pub sensor: SensorConfig,

    #[serde(default)]
    pub hass: HassConfig,

    #[serde(default)]
    pub mqtt: MqttConfig,

    #[serde(default)]
    pub probe: ProbeConfig,

    #[serde(default)]
    pub web: WebConfig,
}

/// Control-loop settings. Setpoints are written in Fahrenheit here because
/// that is how the operator thinks; they convert to Celsius at load.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControlConfig {
    #[serde(default = "default_target_temp")]
    pub target_temp: f64,

    #[serde(default = "default_target_delta")]
    pub target_delta: f64,

    /// Samples per minute; also the trend-fit window length.
    #[serde(default = "default_samples_per_minute")]
    pub samples_per_minute: u32,

    /// Seconds between control decisions.
    #[serde(default = "default_control_period")]
    pub control_period_secs: f64,

    /// Seconds between actuation cycles.
    #[serde(default = "default_actuation_period")]
    pub actuation_period_secs: f64,

    /// Actuation cycles between switch-state resync reads.
    #[serde(default = "default_resync_every")]
    pub resync_every: u64,

    #[serde(default)]
    pub strategy: StrategyKind,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SensorConfig {
    #[serde(default)]
    pub driver: SensorDriver,

    #[serde(default = "default_sensor_port")]
    pub port: String,

    #[serde(default = "default_sensor_baud")]
    pub baud: u32,

    /// Reported accuracy of the thermocouple, °C.
    #[serde(default = "default_sensor_resolution")]
    pub resolution: f64,

    #[serde(default = "default_sensor_timeout")]
    pub read_timeout_secs: f64,

    /// Ambient start temperature for the simulated driver, °C.
    #[serde(default = "default_sim_ambient")]
    pub sim_ambient: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SensorDriver {
    Serial,
    #[default]
    Sim,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HassConfig {
    #[serde(default = "default_hass_url")]
    pub base_url: String,

    #[serde(default)]
    pub token: String,

    #[serde(default = "default_hass_entity")]
    pub entity_id: String,

    #[serde(default = "default_hass_sensor")]
    pub sensor_name: String,

    /// Push temperature readings to the dashboard sensors.
    #[serde(default)]
    pub sensor_enabled: bool,

    #[serde(default = "default_hass_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MqttConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_mqtt_broker")]
    pub broker: String,

    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_mqtt_client_id")]
    pub client_id: String,

    #[serde(default = "default_mqtt_topic")]
    pub topic: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProbeConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_probe_url")]
    pub base_url: String,

    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_web_port")]
    pub port: u16,
}

fn default_target_temp() -> f64 {
    225.0
}
fn default_target_delta() -> f64 {
    4.5
}
fn default_samples_per_minute() -> u32 {
    10
}
fn default_control_period() -> f64 {
    6.0
}
fn default_actuation_period() -> f64 {
    1.0
}
fn default_resync_every() -> u64 {
    30
}
fn default_sensor_port() -> String {
    "/dev/ttyUSB0".to_string()
}
fn default_sensor_baud() -> u32 {
    115_200
}
fn default_sensor_resolution() -> f64 {
    0.5
}
fn default_sensor_timeout() -> f64 {
    10.0
}
fn default_sim_ambient() -> f64 {
    22.0
}
fn default_hass_url() -> String {
    "https://homeassistant.local:8123".to_string()
}
fn default_hass_entity() -> String {
    "switch.smoker_element".to_string()
}
fn default_hass_sensor() -> String {
    "smoker_temp".to_string()
}
fn default_hass_timeout() -> u64 {
    10
}
fn default_mqtt_broker() -> String {
    "localhost".to_string()
}
fn default_mqtt_port() -> u16 {
    1883
}
fn default_mqtt_client_id() -> String {
    "smoker-host".to_string()
}
fn default_mqtt_topic() -> String {
    "smoker/measurements".to_string()
}
fn default_probe_url() -> String {
    "https://public-api.cloud.meater.com/v1".to_string()
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_web_port() -> u16 {
    8080
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            target_temp: default_target_temp(),
            target_delta: default_target_delta(),
            samples_per_minute: default_samples_per_minute(),
            control_period_secs: default_control_period(),
            actuation_period_secs: default_actuation_period(),
            resync_every: default_resync_every(),
            strategy: StrategyKind::default(),
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            driver: SensorDriver::default(),
            port: default_sensor_port(),
            baud: default_sensor_baud(),
            resolution: default_sensor_resolution(),
            read_timeout_secs: default_sensor_timeout(),
            sim_ambient: default_sim_ambient(),
        }
    }
}

impl Default for HassConfig {
    fn default() -> Self {
        Self {
            base_url: default_hass_url(),
            token: String::new(),
            entity_id: default_hass_entity(),
            sensor_name: default_hass_sensor(),
            sensor_enabled: false,
            timeout_secs: default_hass_timeout(),
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            broker: default_mqtt_broker(),
            port: default_mqtt_port(),
            username: String::new(),
            password: String::new(),
            client_id: default_mqtt_client_id(),
            topic: default_mqtt_topic(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_probe_url(),
            email: String::new(),
            password: String::new(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_web_port(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.control.samples_per_minute < 1 {
            return Err(ConfigError::Invalid(
                "samples_per_minute must be at least 1".into(),
            ));
        }
        if self.control.control_period_secs <= 0.0 {
            return Err(ConfigError::Invalid(
                "control_period_secs must be positive".into(),
            ));
        }
        if self.control.actuation_period_secs <= 0.0 {
            return Err(ConfigError::Invalid(
                "actuation_period_secs must be positive".into(),
            ));
        }
        if self.control.resync_every < 1 {
            return Err(ConfigError::Invalid("resync_every must be at least 1".into()));
        }
        if self.sensor.resolution <= 0.0 {
            return Err(ConfigError::Invalid("sensor resolution must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.pid.alpha) {
            return Err(ConfigError::Invalid("pid alpha must be within 0..=1".into()));
        }
        if self.pid.integral_windup_guard < 0.0 {
            return Err(ConfigError::Invalid(
                "pid integral_windup_guard must not be negative".into(),
            ));
        }
        if self.hass.base_url.is_empty() {
            return Err(ConfigError::Invalid("hass base_url must be set".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.control.samples_per_minute, 10);
        assert_eq!(config.control.target_temp, 225.0);
        assert_eq!(config.sensor.driver, SensorDriver::Sim);
        assert_eq!(config.web.port, 8080);
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let toml = r#"
[control]
target_temp = 250.0
samples_per_minute = 6
strategy = "threshold"

[sensor]
driver = "serial"
port = "/dev/ttyAMA0"

[hass]
base_url = "https://hass.example:8123"
token = "abc123"
entity_id = "switch.snf_plug7"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.control.target_temp, 250.0);
        assert_eq!(config.control.samples_per_minute, 6);
        assert_eq!(config.control.strategy, crate::control::StrategyKind::Threshold);
        assert_eq!(config.sensor.driver, SensorDriver::Serial);
        assert_eq!(config.hass.entity_id, "switch.snf_plug7");
        // untouched sections keep their defaults
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.control.control_period_secs, 6.0);
    }

    #[test]
    fn rejects_zero_sampling_interval() {
        let toml = r#"
[control]
samples_per_minute = 0
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_out_of_range_alpha() {
        let toml = r#"
[pid]
proportional_gain = 5.0
integral_gain = 0.02
derivative_gain = 10.0
alpha = 1.5
integral_windup_guard = 20.0
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("smoker.toml");
        let config = Config::default();
        fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.control.samples_per_minute, config.control.samples_per_minute);
        assert_eq!(loaded.hass.base_url, config.hass.base_url);
    }
}
