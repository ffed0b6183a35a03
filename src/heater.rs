// src/heater.rs - Heating element state machine
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::hass::RemoteSwitch;

/// Physical on/off state of the remote switch, and the shape of an
/// actuation intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchState {
    On,
    Off,
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchState::On => write!(f, "on"),
            SwitchState::Off => write!(f, "off"),
        }
    }
}

/// Presentation state of the heating element. `Disabled` masks the
/// underlying on/off, which is still tracked so enabling resumes where the
/// switch was left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaterMode {
    Disabled,
    Off,
    On,
}

#[derive(Debug)]
struct HeaterInner {
    enabled: bool,
    current: SwitchState,
    desired: Option<SwitchState>,
    cycles: u64,
}

/// Reconciles the controller's actuation intent with the actual remote
/// switch. `desired` is written by the control task, `current` only by the
/// actuation task (or a resync read), so readers may briefly observe one
/// ahead of the other.
pub struct Heater {
    switch: Arc<dyn RemoteSwitch>,
    state: RwLock<HeaterInner>,
    resync_every: u64,
}

impl Heater {
    pub fn new(switch: Arc<dyn RemoteSwitch>, resync_every: u64) -> Self {
        Self {
            switch,
            state: RwLock::new(HeaterInner {
                enabled: false,
                current: SwitchState::Off,
                desired: None,
                cycles: 0,
            }),
            resync_every: resync_every.max(1),
        }
    }

    /// Permit actuation again, resuming from the last known switch state.
    pub async fn enable(&self) {
        let mut state = self.state.write().await;
        if !state.enabled {
            tracing::info!("Heating element enabled");
            state.enabled = true;
        }
    }

    /// Safety action: issue one best-effort Off command, then refuse further
    /// actuation regardless of whether the command landed.
    pub async fn disable(&self, entity_id: &str) {
        tracing::info!("Heating element disabled, forcing switch off");
        match self.switch.set_switch(entity_id, SwitchState::Off).await {
            Ok(()) => {
                let mut state = self.state.write().await;
                state.current = SwitchState::Off;
            }
            Err(e) => {
                tracing::warn!("Off command during disable failed: {}", e);
            }
        }
        let mut state = self.state.write().await;
        state.enabled = false;
        state.desired = None;
    }

    /// Store the controller's latest intent. Applied by the next actuation
    /// cycle.
    pub async fn set_desired(&self, intent: SwitchState) {
        self.state.write().await.desired = Some(intent);
    }

    /// One actuation cycle: apply a pending intent if it differs from the
    /// last confirmed state, and every `resync_every` cycles re-read the
    /// true switch state to absorb out-of-band changes. Neither path can
    /// fail the caller.
    pub async fn run_cycle(&self, entity_id: &str) {
        let (command, resync_due) = {
            let mut state = self.state.write().await;
            state.cycles += 1;
            let resync_due = state.cycles % self.resync_every == 0;
            if !state.enabled {
                (None, resync_due)
            } else {
                match state.desired {
                    Some(desired) if desired != state.current => (Some(desired), resync_due),
                    _ => (None, resync_due),
                }
            }
        };

        if let Some(target) = command {
            match self.switch.set_switch(entity_id, target).await {
                Ok(()) => {
                    tracing::debug!("Switch {} -> {}", entity_id, target);
                    self.state.write().await.current = target;
                }
                Err(e) => {
                    // current stays untouched so the next cycle retries
                    tracing::warn!("Switch command {} failed: {}", target, e);
                }
            }
        }

        if resync_due {
            match self.switch.switch_state(entity_id).await {
                Ok(actual) => {
                    let mut state = self.state.write().await;
                    if state.current != actual {
                        tracing::info!("Switch state resynced to {}", actual);
                    }
                    state.current = actual;
                }
                Err(e) => {
                    tracing::warn!("Switch state resync failed: {}", e);
                }
            }
        }
    }

    pub async fn is_enabled(&self) -> bool {
        self.state.read().await.enabled
    }

    /// True when the switch was last confirmed on. This is what the
    /// acquisition task records on each sample.
    pub async fn is_heating(&self) -> bool {
        self.state.read().await.current == SwitchState::On
    }

    pub async fn mode(&self) -> HeaterMode {
        let state = self.state.read().await;
        if !state.enabled {
            HeaterMode::Disabled
        } else {
            match state.current {
                SwitchState::On => HeaterMode::On,
                SwitchState::Off => HeaterMode::Off,
            }
        }
    }

    /// Drop any pending intent, used when a session stops.
    pub async fn clear_desired(&self) {
        self.state.write().await.desired = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hass::RemoteError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct MockSwitch {
        commands: Mutex<Vec<SwitchState>>,
        fail_commands: std::sync::atomic::AtomicBool,
        reported_state: Mutex<SwitchState>,
    }

    impl MockSwitch {
        fn new() -> Self {
            Self {
                commands: Mutex::new(Vec::new()),
                fail_commands: std::sync::atomic::AtomicBool::new(false),
                reported_state: Mutex::new(SwitchState::Off),
            }
        }

        fn sent(&self) -> Vec<SwitchState> {
            self.commands.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteSwitch for MockSwitch {
        async fn set_switch(&self, _entity: &str, state: SwitchState) -> Result<(), RemoteError> {
            self.commands.lock().unwrap().push(state);
            if self.fail_commands.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(RemoteError::Status {
                    status: 503,
                    body: "unavailable".into(),
                });
            }
            *self.reported_state.lock().unwrap() = state;
            Ok(())
        }

        async fn switch_state(&self, _entity: &str) -> Result<SwitchState, RemoteError> {
            Ok(*self.reported_state.lock().unwrap())
        }
    }

    #[tokio::test]
    async fn applies_desired_intent_once() {
        let switch = Arc::new(MockSwitch::new());
        let heater = Heater::new(switch.clone(), 1000);
        heater.enable().await;
        heater.set_desired(SwitchState::On).await;

        heater.run_cycle("switch.test").await;
        heater.run_cycle("switch.test").await;

        // Second cycle sees desired == current and stays quiet
        assert_eq!(switch.sent(), vec![SwitchState::On]);
        assert_eq!(heater.mode().await, HeaterMode::On);
    }

    #[tokio::test]
    async fn failed_command_retries_next_cycle() {
        let switch = Arc::new(MockSwitch::new());
        let heater = Heater::new(switch.clone(), 1000);
        heater.enable().await;
        heater.set_desired(SwitchState::On).await;

        switch
            .fail_commands
            .store(true, std::sync::atomic::Ordering::SeqCst);
        heater.run_cycle("switch.test").await;
        assert_eq!(heater.mode().await, HeaterMode::Off);

        switch
            .fail_commands
            .store(false, std::sync::atomic::Ordering::SeqCst);
        heater.run_cycle("switch.test").await;

        assert_eq!(switch.sent(), vec![SwitchState::On, SwitchState::On]);
        assert_eq!(heater.mode().await, HeaterMode::On);
    }

    #[tokio::test]
    async fn disabled_heater_never_issues_commands() {
        let switch = Arc::new(MockSwitch::new());
        let heater = Heater::new(switch.clone(), 1000);
        heater.set_desired(SwitchState::On).await;

        heater.run_cycle("switch.test").await;

        assert!(switch.sent().is_empty());
        assert_eq!(heater.mode().await, HeaterMode::Disabled);
    }

    #[tokio::test]
    async fn disable_reasserts_off_even_when_already_off() {
        let switch = Arc::new(MockSwitch::new());
        let heater = Heater::new(switch.clone(), 1000);
        heater.enable().await;
        assert_eq!(heater.mode().await, HeaterMode::Off);

        heater.disable("switch.test").await;

        assert_eq!(switch.sent(), vec![SwitchState::Off]);
        assert_eq!(heater.mode().await, HeaterMode::Disabled);
    }

    #[tokio::test]
    async fn disable_sticks_even_if_off_command_fails() {
        let switch = Arc::new(MockSwitch::new());
        switch
            .fail_commands
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let heater = Heater::new(switch.clone(), 1000);
        heater.enable().await;

        heater.disable("switch.test").await;

        assert_eq!(switch.sent(), vec![SwitchState::Off]);
        assert_eq!(heater.mode().await, HeaterMode::Disabled);
    }

    #[tokio::test]
    async fn resync_overwrites_current_from_switch() {
        let switch = Arc::new(MockSwitch::new());
        let heater = Heater::new(switch.clone(), 2);
        heater.enable().await;

        // Somebody toggled the physical switch out-of-band
        *switch.reported_state.lock().unwrap() = SwitchState::On;

        heater.run_cycle("switch.test").await; // cycle 1, no resync
        assert_eq!(heater.mode().await, HeaterMode::Off);
        heater.run_cycle("switch.test").await; // cycle 2, resync
        assert_eq!(heater.mode().await, HeaterMode::On);
    }

    #[tokio::test]
    async fn enable_resumes_last_known_state() {
        let switch = Arc::new(MockSwitch::new());
        let heater = Heater::new(switch.clone(), 1000);
        heater.enable().await;
        heater.set_desired(SwitchState::On).await;
        heater.run_cycle("switch.test").await;

        heater.disable("switch.test").await;
        assert_eq!(heater.mode().await, HeaterMode::Disabled);

        heater.enable().await;
        // Disable forced the switch off; resume reflects that
        assert_eq!(heater.mode().await, HeaterMode::Off);
    }
}
