// src/control/pid.rs - PID control law for the heating element
use serde::{Deserialize, Serialize};

use crate::heater::SwitchState;

/// Operator-tunable gains. Read fresh every control cycle so tuning from
/// the web layer takes effect without a restart.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub proportional_gain: f64,
    pub integral_gain: f64,
    pub derivative_gain: f64,
    /// Low-pass coefficient for the derivative term, 0..=1. Higher values
    /// track the raw derivative more closely.
    pub alpha: f64,
    /// Clamp bound for the integral accumulator.
    pub integral_windup_guard: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            proportional_gain: 5.0,
            integral_gain: 0.02,
            derivative_gain: 10.0,
            alpha: 0.3,
            integral_windup_guard: 20.0,
        }
    }
}

/// State carried across control cycles. Reset only on session start.
#[derive(Debug, Clone, Default)]
pub struct PidState {
    pub integral: f64,
    pub previous_error: f64,
    pub previous_derivative: f64,
}

impl PidState {
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = 0.0;
        self.previous_derivative = 0.0;
    }
}

/// Evaluate one control cycle. `dt` is the seconds between cycles and must
/// be positive; the orchestrator runs on a fixed period so this holds by
/// construction. Output above zero demands heat.
pub fn evaluate(
    gains: &PidGains,
    state: &mut PidState,
    target: f64,
    current: f64,
    dt: f64,
) -> SwitchState {
    let error = target - current;

    let guard = gains.integral_windup_guard;
    state.integral = (state.integral + error * dt).clamp(-guard, guard);

    let derivative = (error - state.previous_error) / dt;
    let filtered = gains.alpha * derivative + (1.0 - gains.alpha) * state.previous_derivative;

    let output = gains.proportional_gain * error
        + gains.integral_gain * state.integral
        + gains.derivative_gain * filtered;

    state.previous_error = error;
    state.previous_derivative = filtered;

    if output > 0.0 {
        SwitchState::On
    } else {
        SwitchState::Off
    }
}
