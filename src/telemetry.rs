// src/telemetry.rs - Fire-and-forget MQTT measurement publisher
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rumqttc::{AsyncClient, MqttOptions, QoS};
use serde::Serialize;
use uuid::Uuid;

use crate::config::MqttConfig;
use crate::history::Measurement;

/// Telemetry counters surfaced through the status endpoint.
#[derive(Debug, Default, Serialize)]
pub struct TelemetryStats {
    pub published: u64,
    pub failed: u64,
}

/// MQTT sink for accepted measurements. Publish failures are counted and
/// logged, never propagated; the broker connection recovers on its own
/// through the polled event loop.
pub struct Telemetry {
    client: AsyncClient,
    topic: String,
    published: AtomicU64,
    failed: AtomicU64,
}

impl Telemetry {
    pub fn connect(config: &MqttConfig) -> Self {
        let mut options =
            MqttOptions::new(config.client_id.as_str(), config.broker.as_str(), config.port);
        options.set_keep_alive(Duration::from_secs(30));
        if !config.username.is_empty() {
            options.set_credentials(config.username.as_str(), config.password.as_str());
        }

        let (client, mut event_loop) = AsyncClient::new(options, 16);
        let broker = format!("{}:{}", config.broker, config.port);
        tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(event) => tracing::trace!("MQTT event: {:?}", event),
                    Err(e) => {
                        tracing::warn!("MQTT connection to {} lost: {}", broker, e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });

        Self {
            client,
            topic: config.topic.clone(),
            published: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub async fn publish_measurement(&self, session: Option<Uuid>, measurement: &Measurement) {
        let payload = serde_json::json!({
            "session": session,
            "measurement": measurement,
        });
        let bytes = match serde_json::to_vec(&payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Telemetry payload serialization failed: {}", e);
                self.failed.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        match self
            .client
            .publish(self.topic.clone(), QoS::AtLeastOnce, false, bytes)
            .await
        {
            Ok(()) => {
                self.published.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::warn!("Telemetry publish to {} failed: {}", self.topic, e);
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn stats(&self) -> TelemetryStats {
        TelemetryStats {
            published: self.published.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}
