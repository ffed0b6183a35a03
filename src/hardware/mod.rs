// src/hardware/mod.rs - Temperature sensor drivers
pub mod serial;
pub mod sim;

use async_trait::async_trait;
use thiserror::Error;

pub use serial::SerialThermocouple;
pub use sim::SimulatedSmoker;

/// Driver/hardware failure reading the thermocouple. Fatal only to the
/// acquisition cycle that hit it; the next cycle retries unconditionally.
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("Sensor I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sensor read timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Unparseable sensor reading: {0:?}")]
    Parse(String),
}

/// A single-scalar temperature source in °C.
#[async_trait]
pub trait TemperatureSensor: Send + Sync {
    async fn read_temperature(&self) -> Result<f64, SensorError>;

    /// Driver details for the web layer's sensor report.
    fn details(&self) -> serde_json::Value;
}

/// Round a raw reading to the driver's stated resolution.
pub fn round_to_resolution(value: f64, resolution: f64) -> f64 {
    if resolution <= 0.0 {
        return value;
    }
    (value / resolution).round() * resolution
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_half_degree() {
        assert_eq!(round_to_resolution(22.26, 0.5), 22.5);
        assert_eq!(round_to_resolution(22.24, 0.5), 22.0);
        assert_eq!(round_to_resolution(-1.3, 0.5), -1.5);
    }

    #[test]
    fn zero_resolution_passes_through() {
        assert_eq!(round_to_resolution(22.26, 0.0), 22.26);
    }
}
