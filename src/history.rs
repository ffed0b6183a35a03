// src/history.rs - Temperature measurement log and trend projection
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Returned by the projection when fewer than a full window of samples exist.
pub const NO_PROJECTION: f64 = -1.0;

/// A single temperature sample. Created once at insertion, never mutated.
///
/// Serialized field names match the wire format the web layer exposes.
#[derive(Debug, Clone, Serialize)]
pub struct Measurement {
    pub index: u64,
    pub time: DateTime<Utc>,
    pub temperature: f64,
    pub set_temperature: f64,
    pub delta: f64,
    pub units: &'static str,
    pub one_min_temp: f64,
    pub heating: bool,
}

/// Append-only log of temperature samples for one monitoring session.
///
/// Owns the active setpoint so every sample snapshots the target that was in
/// force when it was taken. `window_size` is the number of samples per
/// minute; the projection window and the acquisition cadence both derive
/// from it.
#[derive(Debug)]
pub struct TempHistory {
    measurements: Vec<Measurement>,
    index: u64,
    target_temp: f64,
    delta: f64,
    window_size: usize,
}

impl TempHistory {
    pub fn new(target_temp_c: f64, delta_c: f64, window_size: usize) -> Self {
        Self {
            measurements: Vec::new(),
            index: 0,
            target_temp: target_temp_c,
            delta: delta_c,
            window_size,
        }
    }

    /// Record a new reading. The projection stored on the sample is computed
    /// from the state of the log *before* this sample is appended.
    pub fn add(&mut self, temperature: f64, heating: bool) -> Measurement {
        let one_min_temp = self.one_min_temp();
        self.index += 1;
        let measurement = Measurement {
            index: self.index,
            time: Utc::now(),
            temperature,
            set_temperature: self.target_temp,
            delta: self.delta,
            units: "C",
            one_min_temp,
            heating,
        };
        self.measurements.push(measurement.clone());
        measurement
    }

    /// Expected temperature one minute out, from a degree-1 least-squares
    /// fit over the most recent `window_size` samples evaluated at position
    /// `2 * window_size`. Returns [`NO_PROJECTION`] until a full window of
    /// readings exists.
    pub fn one_min_temp(&self) -> f64 {
        let w = self.window_size;
        if w == 0 || self.measurements.len() < w {
            return NO_PROJECTION;
        }

        let recent = &self.measurements[self.measurements.len() - w..];
        let n = w as f64;
        let mean_x = (n - 1.0) / 2.0;
        let mean_y = recent.iter().map(|m| m.temperature).sum::<f64>() / n;

        let mut num = 0.0;
        let mut den = 0.0;
        for (i, m) in recent.iter().enumerate() {
            let dx = i as f64 - mean_x;
            num += dx * (m.temperature - mean_y);
            den += dx * dx;
        }

        // A single-sample window has no slope to fit
        let slope = if den == 0.0 { 0.0 } else { num / den };
        let intercept = mean_y - slope * mean_x;

        intercept + slope * (2.0 * n)
    }

    /// All measurements with a sequence index greater than `since`, in
    /// insertion order. Accepts any value, including negative and
    /// beyond-latest.
    pub fn history_since(&self, since: i64) -> Vec<Measurement> {
        self.measurements
            .iter()
            .filter(|m| m.index as i64 > since)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> &[Measurement] {
        &self.measurements
    }

    pub fn latest(&self) -> Option<&Measurement> {
        self.measurements.last()
    }

    /// Discard all measurements and restart the sequence index. Must not
    /// race with `add`; the orchestrator only calls this between sessions.
    pub fn clear(&mut self) {
        self.measurements.clear();
        self.index = 0;
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn target_temp(&self) -> f64 {
        self.target_temp
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Update the setpoint. Takes effect for samples recorded afterwards;
    /// existing measurements keep the snapshot they were taken with.
    pub fn set_target(&mut self, target_temp_c: f64, delta_c: f64) {
        tracing::info!(
            "Setting target temperature to {:.2}°C ± {:.2}°C",
            target_temp_c,
            delta_c
        );
        self.target_temp = target_temp_c;
        self.delta = delta_c;
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Change the samples-per-minute window. Applies from the next
    /// projection call onwards.
    pub fn set_window_size(&mut self, window_size: usize) {
        self.window_size = window_size;
    }
}
