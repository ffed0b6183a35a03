// src/monitor.rs - Monitoring session orchestration
//
// Three periodic tasks share the measurement history, the heater state
// machine, and a stop flag: acquisition (sensor -> history -> sinks),
// control (history -> strategy -> heater intent), and actuation (intent ->
// remote switch). Tasks coordinate only through shared state; none awaits
// another.
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::{Config, ConfigError};
use crate::control::{strategy_for, ControlInput, ControlStrategy, PidGains, StrategyKind};
use crate::hardware::{round_to_resolution, TemperatureSensor};
use crate::hass::SensorSink;
use crate::heater::{Heater, HeaterMode, SwitchState};
use crate::history::{Measurement, TempHistory};
use crate::telemetry::{Telemetry, TelemetryStats};
use crate::units::{delta_f_to_c, fahrenheit_to_celsius};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitoringState {
    Stopped,
    Starting,
    Monitoring,
    Stopping,
    Failed,
}

impl MonitoringState {
    /// The lifecycle action the control plane may take next.
    pub fn action(&self) -> &'static str {
        match self {
            MonitoringState::Stopped | MonitoringState::Failed => "Start",
            _ => "Stop",
        }
    }
}

impl fmt::Display for MonitoringState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitoringState::Stopped => write!(f, "Stopped"),
            MonitoringState::Starting => write!(f, "Starting"),
            MonitoringState::Monitoring => write!(f, "Monitoring"),
            MonitoringState::Stopping => write!(f, "Stopping"),
            MonitoringState::Failed => write!(f, "Failed (Sensor)"),
        }
    }
}

/// Runtime-tunable settings. Each task reads what it needs once at the top
/// of a cycle, so changes apply on the next cycle, never mid-cycle.
#[derive(Debug, Clone)]
pub struct ControlSettings {
    pub gains: PidGains,
    pub control_period_secs: f64,
    pub strategy: StrategyKind,
    pub entity_id: String,
    pub sensor_name: String,
    pub hass_sensor_enabled: bool,
    pub telemetry_enabled: bool,
}

/// Operator tuning submitted through the web layer.
#[derive(Debug, Clone)]
pub struct TuningUpdate {
    pub gains: PidGains,
    pub entity_id: String,
    pub sensor_name: String,
    pub hass_sensor_enabled: bool,
    pub telemetry_enabled: bool,
}

pub struct Monitor {
    sensor: Arc<dyn TemperatureSensor>,
    sensor_sink: Arc<dyn SensorSink>,
    telemetry: Option<Arc<Telemetry>>,
    heater: Arc<Heater>,
    history: Arc<RwLock<TempHistory>>,
    settings: Arc<RwLock<ControlSettings>>,
    state: RwLock<MonitoringState>,
    session: RwLock<Option<Uuid>>,
    resolution: f64,
    actuation_period: Duration,
    stop_requested: Arc<AtomicBool>,
    shutdown: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    live: broadcast::Sender<Measurement>,
}

impl Monitor {
    pub fn new(
        config: &Config,
        sensor: Arc<dyn TemperatureSensor>,
        heater: Arc<Heater>,
        sensor_sink: Arc<dyn SensorSink>,
        telemetry: Option<Arc<Telemetry>>,
    ) -> Self {
        let history = TempHistory::new(
            fahrenheit_to_celsius(config.control.target_temp),
            delta_f_to_c(config.control.target_delta),
            config.control.samples_per_minute as usize,
        );
        let settings = ControlSettings {
            gains: config.pid,
            control_period_secs: config.control.control_period_secs,
            strategy: config.control.strategy,
            entity_id: config.hass.entity_id.clone(),
            sensor_name: config.hass.sensor_name.clone(),
            hass_sensor_enabled: config.hass.sensor_enabled,
            telemetry_enabled: config.mqtt.enabled,
        };
        let (shutdown, _) = broadcast::channel(1);
        let (live, _) = broadcast::channel(64);

        Self {
            sensor,
            sensor_sink,
            telemetry,
            heater,
            history: Arc::new(RwLock::new(history)),
            settings: Arc::new(RwLock::new(settings)),
            state: RwLock::new(MonitoringState::Stopped),
            session: RwLock::new(None),
            resolution: config.sensor.resolution,
            actuation_period: Duration::from_secs_f64(config.control.actuation_period_secs),
            stop_requested: Arc::new(AtomicBool::new(false)),
            shutdown,
            tasks: Mutex::new(Vec::new()),
            live,
        }
    }

    /// Begin a monitoring session. A running session is stopped and joined
    /// first, then history and controller state start fresh.
    pub async fn start(self: Arc<Self>) {
        self.stop().await;

        tracing::info!("Starting temperature monitoring");
        if let Err(e) = self.sensor.read_temperature().await {
            tracing::error!("Sensor probe failed, monitoring not started: {}", e);
            *self.state.write().await = MonitoringState::Failed;
            return;
        }

        self.history.write().await.clear();
        self.stop_requested.store(false, Ordering::SeqCst);
        *self.state.write().await = MonitoringState::Starting;
        *self.session.write().await = Some(Uuid::new_v4());

        let mut tasks = self.tasks.lock().await;
        let acquisition = {
            let this = self.clone();
            let shutdown = self.shutdown.subscribe();
            tokio::spawn(this.acquisition_loop(shutdown))
        };
        let control = {
            let this = self.clone();
            let shutdown = self.shutdown.subscribe();
            tokio::spawn(this.control_loop(shutdown))
        };
        let actuation = {
            let this = self.clone();
            let shutdown = self.shutdown.subscribe();
            tokio::spawn(this.actuation_loop(shutdown))
        };
        tasks.extend([acquisition, control, actuation]);
    }

    /// Request a cooperative stop and wait for all three tasks to exit.
    pub async fn stop(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().await;
            tasks.drain(..).collect()
        };
        if handles.is_empty() {
            return;
        }

        tracing::info!("Stopping temperature monitoring");
        *self.state.write().await = MonitoringState::Stopping;
        self.stop_requested.store(true, Ordering::SeqCst);
        let _ = self.shutdown.send(());

        for result in join_all(handles).await {
            if let Err(e) = result {
                tracing::warn!("Monitoring task join failed: {}", e);
            }
        }

        self.heater.clear_desired().await;
        *self.session.write().await = None;
        *self.state.write().await = MonitoringState::Stopped;
    }

    fn stopping(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    async fn pause(&self, period: Duration, shutdown: &mut broadcast::Receiver<()>) {
        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = shutdown.recv() => {}
        }
    }

    async fn acquisition_period(&self) -> Duration {
        let window = self.history.read().await.window_size().max(1);
        Duration::from_secs_f64(60.0 / window as f64)
    }

    /// Acquisition task: read the sensor, record the sample, feed the sinks.
    /// A failed read skips the cycle; nothing here is fatal.
    async fn acquisition_loop(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        loop {
            if self.stopping() {
                break;
            }
            match self.sensor.read_temperature().await {
                Ok(raw) => {
                    let temperature = round_to_resolution(raw, self.resolution);
                    let heating = self.heater.is_heating().await;
                    let measurement = self.history.write().await.add(temperature, heating);
                    tracing::debug!(
                        "Recorded {}°C (sample {})",
                        measurement.temperature,
                        measurement.index
                    );

                    {
                        let mut state = self.state.write().await;
                        if *state == MonitoringState::Starting {
                            tracing::info!("First reading accepted, monitoring live");
                            *state = MonitoringState::Monitoring;
                        }
                    }

                    let _ = self.live.send(measurement.clone());
                    self.feed_sinks(&measurement).await;
                }
                Err(e) => {
                    tracing::warn!("Sensor read failed, skipping cycle: {}", e);
                }
            }
            if self.stopping() {
                break;
            }
            let period = self.acquisition_period().await;
            self.pause(period, &mut shutdown).await;
        }
        tracing::info!("Acquisition task stopped");
    }

    async fn feed_sinks(&self, measurement: &Measurement) {
        let (telemetry_enabled, hass_enabled, sensor_name) = {
            let settings = self.settings.read().await;
            (
                settings.telemetry_enabled,
                settings.hass_sensor_enabled,
                settings.sensor_name.clone(),
            )
        };

        if telemetry_enabled {
            if let Some(telemetry) = &self.telemetry {
                let session = *self.session.read().await;
                telemetry.publish_measurement(session, measurement).await;
            }
        }

        // Dashboard sensors update once per window-length, i.e. once a minute
        let window = self.history.read().await.window_size() as u64;
        if hass_enabled && window > 0 && measurement.index % window == 0 {
            if let Err(e) = self
                .sensor_sink
                .publish_temperature(&sensor_name, measurement.temperature)
                .await
            {
                tracing::warn!("Dashboard sensor update failed: {}", e);
            }
        }
    }

    /// Control task: after warm-up, run the session's strategy each period
    /// and hand the intent to the heater.
    async fn control_loop(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut strategy = strategy_for(self.settings.read().await.strategy);
        strategy.reset();
        tracing::info!("Control task using {} strategy", strategy.name());

        // Let one full window of samples accumulate before deciding anything
        loop {
            if self.stopping() {
                tracing::info!("Control task stopped during warm-up");
                return;
            }
            let (len, window) = {
                let history = self.history.read().await;
                (history.len(), history.window_size())
            };
            if len > window {
                break;
            }
            let period = self.acquisition_period().await;
            self.pause(period, &mut shutdown).await;
        }

        loop {
            if self.stopping() {
                break;
            }
            let (intent, period) = {
                let settings = self.settings.read().await;
                let history = self.history.read().await;
                let intent = control_cycle(&history, &settings, strategy.as_mut());
                (intent, Duration::from_secs_f64(settings.control_period_secs))
            };
            self.heater.set_desired(intent).await;
            self.pause(period, &mut shutdown).await;
        }
        tracing::info!("Control task stopped");
    }

    /// Actuation task: reconcile intent with the physical switch.
    async fn actuation_loop(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        loop {
            if self.stopping() {
                break;
            }
            let entity_id = self.settings.read().await.entity_id.clone();
            self.heater.run_cycle(&entity_id).await;
            if self.stopping() {
                break;
            }
            self.pause(self.actuation_period, &mut shutdown).await;
        }
        tracing::info!("Actuation task stopped");
    }

    // --- control-plane surface -------------------------------------------

    pub async fn state(&self) -> MonitoringState {
        *self.state.read().await
    }

    pub async fn session(&self) -> Option<Uuid> {
        *self.session.read().await
    }

    pub async fn latest(&self) -> Option<Measurement> {
        self.history.read().await.latest().cloned()
    }

    pub async fn history_all(&self) -> Vec<Measurement> {
        self.history.read().await.all().to_vec()
    }

    pub async fn history_since(&self, since: i64) -> Vec<Measurement> {
        self.history.read().await.history_since(since)
    }

    pub async fn one_min_temp(&self) -> f64 {
        self.history.read().await.one_min_temp()
    }

    /// Live feed of accepted measurements, one event per sample.
    pub fn subscribe_measurements(&self) -> broadcast::Receiver<Measurement> {
        self.live.subscribe()
    }

    /// Setpoint in Celsius plus the sampling interval.
    pub async fn setpoint(&self) -> (f64, f64, usize) {
        let history = self.history.read().await;
        (history.target_temp(), history.delta(), history.window_size())
    }

    /// Update setpoint (Fahrenheit in) and sampling interval. Rejected
    /// wholesale when the interval is invalid; the running configuration is
    /// kept.
    pub async fn update_setpoint(
        &self,
        target_temp_f: f64,
        target_delta_f: f64,
        interval: u32,
    ) -> Result<(), ConfigError> {
        if interval < 1 {
            return Err(ConfigError::Invalid(
                "sampling interval must be at least 1 per minute".into(),
            ));
        }
        let mut history = self.history.write().await;
        history.set_target(fahrenheit_to_celsius(target_temp_f), delta_f_to_c(target_delta_f));
        history.set_window_size(interval as usize);
        Ok(())
    }

    pub async fn settings(&self) -> ControlSettings {
        self.settings.read().await.clone()
    }

    pub async fn update_tuning(&self, update: TuningUpdate) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&update.gains.alpha) {
            return Err(ConfigError::Invalid("alpha must be within 0..=1".into()));
        }
        if update.gains.integral_windup_guard < 0.0 {
            return Err(ConfigError::Invalid(
                "integral_windup_guard must not be negative".into(),
            ));
        }
        let mut settings = self.settings.write().await;
        settings.gains = update.gains;
        settings.entity_id = update.entity_id;
        settings.sensor_name = update.sensor_name;
        settings.hass_sensor_enabled = update.hass_sensor_enabled;
        settings.telemetry_enabled = update.telemetry_enabled;
        tracing::info!(
            "Tuning updated: Kp={} Ki={} Kd={} alpha={} guard={}",
            settings.gains.proportional_gain,
            settings.gains.integral_gain,
            settings.gains.derivative_gain,
            settings.gains.alpha,
            settings.gains.integral_windup_guard,
        );
        Ok(())
    }

    pub async fn enable_element(&self) {
        self.heater.enable().await;
    }

    pub async fn disable_element(&self) {
        let entity_id = self.settings.read().await.entity_id.clone();
        self.heater.disable(&entity_id).await;
    }

    pub async fn element_enabled(&self) -> bool {
        self.heater.is_enabled().await
    }

    pub async fn heater_mode(&self) -> HeaterMode {
        self.heater.mode().await
    }

    pub fn sensor_details(&self) -> serde_json::Value {
        self.sensor.details()
    }

    pub fn telemetry_stats(&self) -> Option<TelemetryStats> {
        self.telemetry.as_ref().map(|t| t.stats())
    }
}

/// One control decision from current shared state. Empty history here is a
/// programming error: the loop only reaches this after warm-up and the
/// history is never cleared mid-session.
fn control_cycle(
    history: &TempHistory,
    settings: &ControlSettings,
    strategy: &mut dyn ControlStrategy,
) -> SwitchState {
    let latest = history
        .latest()
        .expect("control cycle ran against an empty history");
    let input = ControlInput {
        current_temp: latest.temperature,
        projected_temp: history.one_min_temp(),
        target_temp: history.target_temp(),
        delta: history.delta(),
        dt: settings.control_period_secs,
        gains: settings.gains,
    };
    strategy.decide(&input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::strategy::{PidControl, ThresholdControl};

    fn settings() -> ControlSettings {
        ControlSettings {
            gains: PidGains::default(),
            control_period_secs: 6.0,
            strategy: StrategyKind::Pid,
            entity_id: "switch.test".into(),
            sensor_name: "smoker_temp".into(),
            hass_sensor_enabled: false,
            telemetry_enabled: false,
        }
    }

    #[test]
    fn pid_cycle_demands_heat_below_setpoint() {
        // 135°F -> 57.2°C with the pit steady at 50°C
        let mut history = TempHistory::new(
            fahrenheit_to_celsius(135.0),
            delta_f_to_c(2.5),
            5,
        );
        for _ in 0..5 {
            history.add(50.0, false);
        }
        assert!((history.one_min_temp() - 50.0).abs() < 1e-9);

        let mut strategy = PidControl::default();
        let intent = control_cycle(&history, &settings(), &mut strategy);
        assert_eq!(intent, SwitchState::On);
    }

    #[test]
    fn pid_cycle_releases_heat_above_setpoint() {
        let mut history = TempHistory::new(50.0, 1.0, 3);
        for _ in 0..3 {
            history.add(80.0, true);
        }
        let mut strategy = PidControl::default();
        let intent = control_cycle(&history, &settings(), &mut strategy);
        assert_eq!(intent, SwitchState::Off);
    }

    #[test]
    fn threshold_cycle_tracks_projection() {
        let mut history = TempHistory::new(57.2, 1.4, 3);
        for _ in 0..3 {
            history.add(50.0, false);
        }
        let mut strategy = ThresholdControl;
        let intent = control_cycle(&history, &settings(), &mut strategy);
        assert_eq!(intent, SwitchState::On);
    }

    #[test]
    fn monitoring_state_actions() {
        assert_eq!(MonitoringState::Stopped.action(), "Start");
        assert_eq!(MonitoringState::Failed.action(), "Start");
        assert_eq!(MonitoringState::Monitoring.action(), "Stop");
        assert_eq!(MonitoringState::Stopped.to_string(), "Stopped");
        assert_eq!(MonitoringState::Failed.to_string(), "Failed (Sensor)");
    }
}
