// src/hass.rs - Home Assistant REST client for switch control and sensor updates
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::heater::SwitchState;

/// Failure calling a remote HTTP API. Never fatal to a control loop; the
/// affected cycle is skipped and the next one retries.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Remote call returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Remote call failed: {0}")]
    Transport(String),

    #[error("Unexpected payload: {0}")]
    Payload(String),
}

/// Remote on/off control of the heating element.
#[async_trait]
pub trait RemoteSwitch: Send + Sync {
    async fn set_switch(&self, entity_id: &str, state: SwitchState) -> Result<(), RemoteError>;
    async fn switch_state(&self, entity_id: &str) -> Result<SwitchState, RemoteError>;
}

/// Push temperature readings to an external dashboard sensor.
#[async_trait]
pub trait SensorSink: Send + Sync {
    async fn publish_temperature(&self, sensor_name: &str, temp_c: f64) -> Result<(), RemoteError>;
}

/// Client for the Home Assistant REST API. The underlying agent is a
/// blocking HTTP client, so every call runs on the blocking thread pool.
pub struct HassClient {
    agent: ureq::Agent,
    base_url: String,
    token: String,
}

impl HassClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("smoker-host/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    async fn post_json(&self, url: String, payload: String) -> Result<String, RemoteError> {
        let agent = self.agent.clone();
        let auth = format!("Bearer {}", self.token);
        tokio::task::spawn_blocking(move || {
            let response = agent
                .post(&url)
                .set("Authorization", &auth)
                .set("Content-Type", "application/json")
                .send_string(&payload);
            flatten_response(response)
        })
        .await
        .map_err(|e| RemoteError::Transport(e.to_string()))?
    }

    async fn get_json(&self, url: String) -> Result<String, RemoteError> {
        let agent = self.agent.clone();
        let auth = format!("Bearer {}", self.token);
        tokio::task::spawn_blocking(move || {
            let response = agent
                .get(&url)
                .set("Authorization", &auth)
                .set("Accept", "application/json")
                .call();
            flatten_response(response)
        })
        .await
        .map_err(|e| RemoteError::Transport(e.to_string()))?
    }
}

fn flatten_response(response: Result<ureq::Response, ureq::Error>) -> Result<String, RemoteError> {
    match response {
        Ok(resp) => resp
            .into_string()
            .map_err(|e| RemoteError::Transport(e.to_string())),
        Err(ureq::Error::Status(status, resp)) => Err(RemoteError::Status {
            status,
            body: resp.into_string().unwrap_or_default(),
        }),
        Err(ureq::Error::Transport(e)) => Err(RemoteError::Transport(e.to_string())),
    }
}

#[async_trait]
impl RemoteSwitch for HassClient {
    async fn set_switch(&self, entity_id: &str, state: SwitchState) -> Result<(), RemoteError> {
        let url = format!("{}/api/services/switch/turn_{}", self.base_url, state);
        let payload = serde_json::json!({ "entity_id": entity_id }).to_string();
        self.post_json(url, payload).await?;
        Ok(())
    }

    async fn switch_state(&self, entity_id: &str) -> Result<SwitchState, RemoteError> {
        let url = format!("{}/api/states/{}", self.base_url, entity_id);
        let body = self.get_json(url).await?;
        let value: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| RemoteError::Payload(e.to_string()))?;
        match value.get("state").and_then(|s| s.as_str()) {
            Some("on") => Ok(SwitchState::On),
            Some("off") => Ok(SwitchState::Off),
            other => Err(RemoteError::Payload(format!(
                "unrecognized switch state {:?}",
                other
            ))),
        }
    }
}

#[async_trait]
impl SensorSink for HassClient {
    /// Publish the reading as paired °C and °F sensor states. A failure on
    /// the first sensor aborts the second; the caller treats the whole call
    /// as best-effort.
    async fn publish_temperature(&self, sensor_name: &str, temp_c: f64) -> Result<(), RemoteError> {
        let now = chrono::Utc::now().to_rfc3339();
        let states = [
            (
                format!("sensor.{}_c", sensor_name),
                serde_json::json!({
                    "state": format!("{:.1}", temp_c),
                    "attributes": {
                        "unit_of_measurement": "°C",
                        "friendly_name": "Smoker Temp C",
                        "datetime": now,
                    }
                }),
            ),
            (
                format!("sensor.{}_f", sensor_name),
                serde_json::json!({
                    "state": format!("{:.1}", temp_c * 1.8 + 32.0),
                    "attributes": {
                        "unit_of_measurement": "°F",
                        "friendly_name": "Smoker Temp F",
                        "datetime": now,
                    }
                }),
            ),
        ];

        for (entity, payload) in states {
            let url = format!("{}/api/states/{}", self.base_url, entity);
            self.post_json(url, payload.to_string()).await?;
        }
        Ok(())
    }
}
