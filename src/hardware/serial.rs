// src/hardware/serial.rs - Serial-attached thermocouple amplifier driver
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use serial2_tokio::SerialPort;
use tokio::sync::Mutex;
use tokio::time::timeout;

use super::{SensorError, TemperatureSensor};

/// Thermocouple amplifier streaming newline-delimited Celsius readings over
/// a serial line. Reads keep only the freshest complete line, so a slow
/// poll cadence does not serve up stale measurements.
pub struct SerialThermocouple {
    port: SerialPort,
    buffer: Mutex<Vec<u8>>,
    port_name: String,
    baud: u32,
    resolution: f64,
    read_timeout: Duration,
}

impl SerialThermocouple {
    pub fn open(
        port_name: &str,
        baud: u32,
        resolution: f64,
        read_timeout: Duration,
    ) -> Result<Self, SensorError> {
        tracing::info!("Opening thermocouple on {} at {} baud", port_name, baud);
        let port = SerialPort::open(port_name, baud)?;
        Ok(Self {
            port,
            buffer: Mutex::new(Vec::new()),
            port_name: port_name.to_string(),
            baud,
            resolution,
            read_timeout,
        })
    }
}

#[async_trait]
impl TemperatureSensor for SerialThermocouple {
    async fn read_temperature(&self) -> Result<f64, SensorError> {
        let mut buffer = self.buffer.lock().await;
        loop {
            // Consume everything up to the newest complete line; earlier
            // lines are stale by definition
            if let Some(end) = buffer.iter().rposition(|&b| b == b'\n') {
                let consumed: Vec<u8> = buffer.drain(..=end).collect();
                let text = String::from_utf8_lossy(&consumed);
                if let Some(line) = text.lines().rev().find(|l| !l.trim().is_empty()) {
                    let line = line.trim();
                    return line
                        .parse::<f64>()
                        .map_err(|_| SensorError::Parse(line.to_string()));
                }
                continue;
            }

            let mut chunk = [0u8; 256];
            let n = timeout(self.read_timeout, self.port.read(&mut chunk))
                .await
                .map_err(|_| SensorError::Timeout(self.read_timeout))??;
            if n == 0 {
                return Err(SensorError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "serial port closed",
                )));
            }
            buffer.extend_from_slice(&chunk[..n]);
        }
    }

    fn details(&self) -> serde_json::Value {
        serde_json::json!({
            "driver": "serial",
            "port": self.port_name,
            "baud": self.baud,
            "resolution": self.resolution,
        })
    }
}
