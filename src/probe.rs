// src/probe.rs - Read-only cloud probe poller (not control-relevant)
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, RwLock};

use crate::hass::RemoteError;

/// The probe service only refreshes every 15 seconds; polling faster than
/// four times a minute is wasted work.
pub const MAX_POLLS_PER_MINUTE: u32 = 4;

/// One reading fetched from the cloud API, before it is indexed into the
/// history.
#[derive(Debug, Clone)]
pub struct ProbeSample {
    pub probe_id: String,
    pub cook_id: String,
    pub cook_name: String,
    pub cook_state: String,
    pub internal: f64,
    pub ambient: f64,
    pub target_temp: f64,
    pub peak_temp: f64,
    pub elapsed: Option<i64>,
    pub remaining: Option<i64>,
}

/// An indexed probe reading as served to the web layer.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReading {
    pub index: u64,
    pub time: DateTime<Utc>,
    pub timestamp_ms: i64,
    pub cook_id: String,
    pub probe_id: String,
    pub name: String,
    pub state: String,
    pub internal: f64,
    pub ambient: f64,
    pub target_temp: f64,
    pub peak_temp: f64,
    pub elapsed: Option<i64>,
    pub remaining: Option<i64>,
}

/// Append-only probe history, bucketed per cook, with a single shared
/// sequence index across all cooks.
#[derive(Debug, Default)]
pub struct ProbeHistory {
    index: u64,
    cooks: HashMap<String, String>,
    readings: HashMap<String, Vec<ProbeReading>>,
}

impl ProbeHistory {
    pub fn add(&mut self, sample: ProbeSample) -> &ProbeReading {
        let now = Utc::now();
        let reading = ProbeReading {
            index: self.index,
            time: now,
            timestamp_ms: now.timestamp_millis(),
            cook_id: sample.cook_id.clone(),
            probe_id: sample.probe_id,
            name: sample.cook_name.clone(),
            state: sample.cook_state,
            internal: sample.internal,
            ambient: sample.ambient,
            target_temp: sample.target_temp,
            peak_temp: sample.peak_temp,
            elapsed: sample.elapsed,
            remaining: sample.remaining,
        };
        self.index += 1;

        self.cooks
            .entry(sample.cook_id.clone())
            .or_insert(sample.cook_name);
        let bucket = self.readings.entry(sample.cook_id).or_default();
        bucket.push(reading);
        bucket.last().expect("reading just pushed")
    }

    pub fn cooks(&self) -> HashMap<String, String> {
        self.cooks.clone()
    }

    pub fn history(&self) -> HashMap<String, Vec<ProbeReading>> {
        self.readings.clone()
    }

    pub fn history_since(&self, since: i64) -> HashMap<String, Vec<ProbeReading>> {
        self.readings
            .iter()
            .map(|(cook, readings)| {
                let filtered = readings
                    .iter()
                    .filter(|r| r.index as i64 > since)
                    .cloned()
                    .collect();
                (cook.clone(), filtered)
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.index = 0;
        self.cooks.clear();
        self.readings.clear();
    }
}

/// Source of probe samples.
#[async_trait]
pub trait ProbeSource: Send + Sync {
    async fn fetch_samples(&self) -> Result<Vec<ProbeSample>, RemoteError>;
}

/// Client for the cloud probe REST API: token login, then device polling.
pub struct CloudProbeClient {
    agent: ureq::Agent,
    base_url: String,
    email: String,
    password: String,
    token: std::sync::Mutex<Option<String>>,
}

impl CloudProbeClient {
    pub fn new(base_url: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("smoker-host/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent,
            base_url: base_url.into(),
            email: email.into(),
            password: password.into(),
            token: std::sync::Mutex::new(None),
        }
    }

    fn login(agent: &ureq::Agent, base_url: &str, email: &str, password: &str) -> Result<String, RemoteError> {
        let payload = serde_json::json!({ "email": email, "password": password }).to_string();
        let body = match agent
            .post(&format!("{}/login", base_url))
            .set("Content-Type", "application/json")
            .send_string(&payload)
        {
            Ok(resp) => resp
                .into_string()
                .map_err(|e| RemoteError::Transport(e.to_string()))?,
            Err(ureq::Error::Status(status, resp)) => {
                return Err(RemoteError::Status {
                    status,
                    body: resp.into_string().unwrap_or_default(),
                })
            }
            Err(ureq::Error::Transport(e)) => return Err(RemoteError::Transport(e.to_string())),
        };

        let value: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| RemoteError::Payload(e.to_string()))?;
        value["data"]["token"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| RemoteError::Payload("login response carried no token".into()))
    }

    fn fetch_devices(agent: &ureq::Agent, base_url: &str, token: &str) -> Result<Vec<ProbeSample>, RemoteError> {
        let body = match agent
            .get(&format!("{}/devices", base_url))
            .set("Authorization", &format!("Bearer {}", token))
            .call()
        {
            Ok(resp) => resp
                .into_string()
                .map_err(|e| RemoteError::Transport(e.to_string()))?,
            Err(ureq::Error::Status(status, resp)) => {
                return Err(RemoteError::Status {
                    status,
                    body: resp.into_string().unwrap_or_default(),
                })
            }
            Err(ureq::Error::Transport(e)) => return Err(RemoteError::Transport(e.to_string())),
        };

        let value: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| RemoteError::Payload(e.to_string()))?;
        let devices = value["data"]["devices"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        let mut samples = Vec::new();
        for device in devices {
            let cook = &device["cook"];
            // A probe without an active cook carries nothing worth keeping
            if cook.is_null() {
                continue;
            }
            samples.push(ProbeSample {
                probe_id: device["id"].as_str().unwrap_or_default().to_string(),
                cook_id: cook["id"].as_str().unwrap_or_default().to_string(),
                cook_name: cook["name"].as_str().unwrap_or_default().to_string(),
                cook_state: cook["state"].as_str().unwrap_or_default().to_string(),
                internal: device["temperature"]["internal"].as_f64().unwrap_or(0.0),
                ambient: device["temperature"]["ambient"].as_f64().unwrap_or(0.0),
                target_temp: cook["temperature"]["target"].as_f64().unwrap_or(0.0),
                peak_temp: cook["temperature"]["peak"].as_f64().unwrap_or(0.0),
                elapsed: cook["time"]["elapsed"].as_i64(),
                remaining: cook["time"]["remaining"].as_i64(),
            });
        }
        Ok(samples)
    }
}

#[async_trait]
impl ProbeSource for CloudProbeClient {
    async fn fetch_samples(&self) -> Result<Vec<ProbeSample>, RemoteError> {
        let agent = self.agent.clone();
        let base_url = self.base_url.clone();
        let email = self.email.clone();
        let password = self.password.clone();
        let cached = self.token.lock().unwrap().clone();

        let result = tokio::task::spawn_blocking(move || {
            let token = match cached {
                Some(token) => token,
                None => Self::login(&agent, &base_url, &email, &password)?,
            };
            let samples = Self::fetch_devices(&agent, &base_url, &token)?;
            Ok::<_, RemoteError>((samples, token))
        })
        .await
        .map_err(|e| RemoteError::Transport(e.to_string()))?;

        match result {
            Ok((samples, token)) => {
                *self.token.lock().unwrap() = Some(token);
                Ok(samples)
            }
            Err(RemoteError::Status { status: 401, body }) => {
                // Expired token; the next poll logs in again
                *self.token.lock().unwrap() = None;
                Err(RemoteError::Status { status: 401, body })
            }
            Err(e) => Err(e),
        }
    }
}

/// Independent polling loop feeding the probe history. Started and stopped
/// alongside the monitoring session; never influences control decisions.
pub struct ProbeMonitor {
    source: Arc<dyn ProbeSource>,
    history: Arc<RwLock<ProbeHistory>>,
    polls_per_minute: AtomicU32,
    enabled: bool,
    running: Arc<AtomicBool>,
    shutdown: broadcast::Sender<()>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ProbeMonitor {
    pub fn new(source: Arc<dyn ProbeSource>, polls_per_minute: u32, enabled: bool) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            source,
            history: Arc::new(RwLock::new(ProbeHistory::default())),
            polls_per_minute: AtomicU32::new(polls_per_minute.clamp(1, MAX_POLLS_PER_MINUTE)),
            enabled,
            running: Arc::new(AtomicBool::new(false)),
            shutdown,
            task: Mutex::new(None),
        }
    }

    /// Cadence follows the monitoring interval but never exceeds the
    /// service's own refresh rate.
    pub fn set_polls_per_minute(&self, polls_per_minute: u32) {
        self.polls_per_minute.store(
            polls_per_minute.clamp(1, MAX_POLLS_PER_MINUTE),
            Ordering::Relaxed,
        );
    }

    pub async fn start(self: Arc<Self>) {
        if !self.enabled {
            tracing::debug!("Probe monitor disabled, not starting");
            return;
        }
        self.stop().await;

        tracing::info!("Starting probe monitor");
        self.history.write().await.clear();
        self.running.store(true, Ordering::SeqCst);

        let this = self.clone();
        let handle = tokio::spawn(async move {
            let mut shutdown = this.shutdown.subscribe();
            loop {
                if !this.running.load(Ordering::SeqCst) {
                    break;
                }
                match this.source.fetch_samples().await {
                    Ok(samples) => {
                        if samples.is_empty() {
                            tracing::debug!("No active probe cooks");
                        }
                        let mut history = this.history.write().await;
                        for sample in samples {
                            history.add(sample);
                        }
                    }
                    Err(e) => tracing::warn!("Probe poll failed: {}", e),
                }
                if !this.running.load(Ordering::SeqCst) {
                    break;
                }
                let period = Duration::from_secs_f64(
                    60.0 / this.polls_per_minute.load(Ordering::Relaxed).max(1) as f64,
                );
                tokio::select! {
                    _ = tokio::time::sleep(period) => {}
                    _ = shutdown.recv() => {}
                }
            }
            tracing::info!("Probe monitor stopped");
        });
        *self.task.lock().await = Some(handle);
    }

    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.shutdown.send(());
        if let Some(handle) = self.task.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::warn!("Probe task join failed: {}", e);
            }
        }
    }

    pub async fn cooks(&self) -> HashMap<String, String> {
        self.history.read().await.cooks()
    }

    pub async fn history(&self) -> HashMap<String, Vec<ProbeReading>> {
        self.history.read().await.history()
    }

    pub async fn history_since(&self, since: i64) -> HashMap<String, Vec<ProbeReading>> {
        self.history.read().await.history_since(since)
    }
}
