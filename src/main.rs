// src/main.rs - Smoker host entry point
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use smoko_rs::config::{Config, SensorDriver};
use smoko_rs::hardware::{SerialThermocouple, SimulatedSmoker, TemperatureSensor};
use smoko_rs::hass::HassClient;
use smoko_rs::heater::Heater;
use smoko_rs::monitor::Monitor;
use smoko_rs::probe::{CloudProbeClient, ProbeMonitor};
use smoko_rs::telemetry::Telemetry;
use smoko_rs::web::api::{create_router, AppState};

#[derive(Parser, Debug)]
#[command(name = "smoker-host", about = "Smoker temperature control host")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(default_value = "smoker.toml")]
    config: String,

    /// Override the configured bind address, e.g. 127.0.0.1:9090
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();

    tracing::info!("Starting smoker-host {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Loading configuration from: {}", args.config);

    let config = Config::load(&args.config).map_err(|e| {
        tracing::error!("Failed to load config from '{}': {}", args.config, e);
        Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
    })?;

    tracing::info!(
        "Setpoint {}°F ± {}°F at {} samples/min, {} strategy",
        config.control.target_temp,
        config.control.target_delta,
        config.control.samples_per_minute,
        format!("{:?}", config.control.strategy).to_lowercase(),
    );

    let hass = Arc::new(HassClient::new(
        config.hass.base_url.clone(),
        config.hass.token.clone(),
        Duration::from_secs(config.hass.timeout_secs),
    ));

    let mut sim_heating_flag = None;
    let sensor: Arc<dyn TemperatureSensor> = match config.sensor.driver {
        SensorDriver::Serial => Arc::new(
            SerialThermocouple::open(
                &config.sensor.port,
                config.sensor.baud,
                config.sensor.resolution,
                Duration::from_secs_f64(config.sensor.read_timeout_secs),
            )
            .map_err(|e| {
                tracing::error!("Failed to open thermocouple: {}", e);
                Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
            })?,
        ),
        SensorDriver::Sim => {
            tracing::info!("Using simulated smoker plant");
            let sim = SimulatedSmoker::new(config.sensor.sim_ambient);
            sim_heating_flag = Some(sim.heating_flag());
            Arc::new(sim)
        }
    };

    let telemetry = if config.mqtt.enabled {
        tracing::info!("Connecting telemetry to {}:{}", config.mqtt.broker, config.mqtt.port);
        Some(Arc::new(Telemetry::connect(&config.mqtt)))
    } else {
        None
    };

    let heater = Arc::new(Heater::new(hass.clone(), config.control.resync_every));
    let monitor = Arc::new(Monitor::new(
        &config,
        sensor,
        heater.clone(),
        hass.clone(),
        telemetry,
    ));

    // The simulated plant follows the real heater state
    if let Some(flag) = sim_heating_flag {
        let heater = heater.clone();
        tokio::spawn(async move {
            loop {
                flag.store(heater.is_heating().await, Ordering::Relaxed);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        });
    }

    let probe_client = Arc::new(CloudProbeClient::new(
        config.probe.base_url.clone(),
        config.probe.email.clone(),
        config.probe.password.clone(),
    ));
    let probe = Arc::new(ProbeMonitor::new(
        probe_client,
        config.control.samples_per_minute,
        config.probe.enabled,
    ));

    let app = create_router(AppState { monitor, probe });

    let bind = args
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.web.bind_address, config.web.port));
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!("Web API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
