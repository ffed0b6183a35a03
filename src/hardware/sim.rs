// src/hardware/sim.rs - Simulated smoker plant for development and tests
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rand::Rng;

use super::{SensorError, TemperatureSensor};

/// First-order thermal model with measurement noise. When the heating flag
/// is set the pit climbs toward the element ceiling, otherwise it decays
/// toward ambient.
pub struct SimulatedSmoker {
    temp: Mutex<f64>,
    heating: Arc<AtomicBool>,
    ambient: f64,
}

const ELEMENT_CEILING: f64 = 160.0;

impl SimulatedSmoker {
    pub fn new(ambient: f64) -> Self {
        Self {
            temp: Mutex::new(ambient),
            heating: Arc::new(AtomicBool::new(false)),
            ambient,
        }
    }

    /// Shared flag the caller wires to the real heater state so the plant
    /// responds to actuation.
    pub fn heating_flag(&self) -> Arc<AtomicBool> {
        self.heating.clone()
    }
}

#[async_trait]
impl TemperatureSensor for SimulatedSmoker {
    async fn read_temperature(&self) -> Result<f64, SensorError> {
        let mut rng = rand::rng();
        let mut temp = self.temp.lock().unwrap();
        if self.heating.load(Ordering::Relaxed) {
            *temp += 0.03 * (ELEMENT_CEILING - *temp);
        } else {
            *temp -= 0.02 * (*temp - self.ambient);
        }
        *temp += rng.random_range(-0.2..0.2);
        Ok(*temp)
    }

    fn details(&self) -> serde_json::Value {
        serde_json::json!({
            "driver": "sim",
            "ambient": self.ambient,
        })
    }
}
