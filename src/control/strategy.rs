// src/control/strategy.rs - Pluggable control decision strategies
use serde::{Deserialize, Serialize};

use crate::control::pid::{evaluate, PidGains, PidState};
use crate::heater::SwitchState;
use crate::history::NO_PROJECTION;

/// Which decision strategy a monitoring session runs with. Selected at
/// session start; the two are never active together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    #[default]
    Pid,
    Threshold,
}

/// Everything a strategy may look at for one cycle.
#[derive(Debug, Clone, Copy)]
pub struct ControlInput {
    /// Latest recorded temperature, °C.
    pub current_temp: f64,
    /// One-minute trend projection, °C ([`NO_PROJECTION`] when under-full).
    pub projected_temp: f64,
    /// Active setpoint, °C.
    pub target_temp: f64,
    /// Setpoint tolerance band, °C.
    pub delta: f64,
    /// Seconds since the previous control cycle.
    pub dt: f64,
    pub gains: PidGains,
}

pub trait ControlStrategy: Send {
    /// Decide the actuation intent for this cycle.
    fn decide(&mut self, input: &ControlInput) -> SwitchState;

    /// Drop state carried across cycles. Called at session start.
    fn reset(&mut self);

    fn name(&self) -> &'static str;
}

pub fn strategy_for(kind: StrategyKind) -> Box<dyn ControlStrategy> {
    match kind {
        StrategyKind::Pid => Box::new(PidControl::default()),
        StrategyKind::Threshold => Box::new(ThresholdControl),
    }
}

/// PID control driven by the latest reading.
#[derive(Debug, Default)]
pub struct PidControl {
    state: PidState,
}

impl ControlStrategy for PidControl {
    fn decide(&mut self, input: &ControlInput) -> SwitchState {
        evaluate(
            &input.gains,
            &mut self.state,
            input.target_temp,
            input.current_temp,
            input.dt,
        )
    }

    fn reset(&mut self) {
        self.state.reset();
    }

    fn name(&self) -> &'static str {
        "pid"
    }
}

/// Legacy projection-threshold tracker. Both triggers compare the
/// one-minute projection against the lower band edge; Off is evaluated
/// second, so equality at the boundary lands Off.
#[derive(Debug)]
pub struct ThresholdControl;

impl ControlStrategy for ThresholdControl {
    fn decide(&mut self, input: &ControlInput) -> SwitchState {
        if input.projected_temp == NO_PROJECTION {
            return SwitchState::Off;
        }

        let lower = input.target_temp - input.delta;
        let mut intent = SwitchState::Off;
        if input.projected_temp <= lower {
            intent = SwitchState::On;
        }
        if input.projected_temp >= lower {
            intent = SwitchState::Off;
        }
        intent
    }

    fn reset(&mut self) {}

    fn name(&self) -> &'static str {
        "threshold"
    }
}
