//! In-memory registry of named output triggers.

use crate::config::TriggerConfig;
use crate::error::{NodeError, Result};
use crate::triggers::gpio::{Level, OutputBank, OutputLine};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Logical state of a trigger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TriggerState {
    Off,
    On,
}

impl TriggerState {
    pub fn is_on(self) -> bool {
        self == TriggerState::On
    }

    fn level(self) -> Level {
        match self {
            TriggerState::On => Level::High,
            TriggerState::Off => Level::Low,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TriggerState::On => "on",
            TriggerState::Off => "off",
        }
    }
}

impl fmt::Display for TriggerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerState {
    type Err = NodeError;

    /// Accepts exactly `on` or `off`, ignoring case and surrounding whitespace.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "on" => Ok(TriggerState::On),
            "off" => Ok(TriggerState::Off),
            other => Err(NodeError::invalid_input(format!(
                "action must be 'on' or 'off', got '{}'",
                other
            ))),
        }
    }
}

/// Externally visible view of one trigger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriggerStatus {
    /// Normalized trigger name
    pub trigger: String,
    /// BCM pin number
    pub pin: u8,
    /// Current logical state
    pub state: TriggerState,
}

/// Trim and lowercase a trigger name.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

struct Slot {
    state: TriggerState,
    // None once the line has been released.
    line: Option<Box<dyn OutputLine>>,
}

impl Slot {
    fn release(&mut self, name: &str) {
        if let Some(mut line) = self.line.take() {
            if let Err(e) = line.write(Level::Low) {
                warn!("Failed to switch off trigger {} (pin {}): {}", name, line.pin(), e);
            }
            self.state = TriggerState::Off;
            debug!("Released pin {} for trigger {}", line.pin(), name);
        }
    }
}

struct Trigger {
    pin: u8,
    slot: Mutex<Slot>,
}

/// Registry of the statically configured triggers.
///
/// Each trigger owns its claimed output line behind its own lock, so a `set`
/// on one trigger never waits on another, and the pin write and record update
/// for a trigger are never observed half done.
pub struct TriggerRegistry {
    triggers: BTreeMap<String, Trigger>,
}

impl TriggerRegistry {
    /// Claim every configured pin as a low output and record it as `off`.
    ///
    /// Fails on the first pin that cannot be claimed; lines claimed before the
    /// failure are released again.
    pub fn initialize(config: &TriggerConfig, bank: &dyn OutputBank) -> Result<Self> {
        debug!("setup triggers {:?}", config);

        let mut triggers = BTreeMap::new();
        for (name, pin) in config.iter() {
            let mut line = bank.claim(pin)?;
            line.write(Level::Low)?;

            triggers.insert(
                name.to_string(),
                Trigger {
                    pin,
                    slot: Mutex::new(Slot {
                        state: TriggerState::Off,
                        line: Some(line),
                    }),
                },
            );
        }

        info!("Initialized {} trigger(s)", triggers.len());
        Ok(Self { triggers })
    }

    fn lookup(&self, name: &str) -> Result<(String, &Trigger)> {
        let name = normalize_name(name);
        match self.triggers.get(&name) {
            Some(trigger) => Ok((name, trigger)),
            None => Err(NodeError::not_found(name)),
        }
    }

    /// Current state of `name`.
    pub async fn get(&self, name: &str) -> Result<TriggerStatus> {
        let (name, trigger) = self.lookup(name)?;
        let state = trigger.slot.lock().await.state;

        Ok(TriggerStatus {
            trigger: name,
            pin: trigger.pin,
            state,
        })
    }

    /// Drive `name` to `desired` and record it.
    ///
    /// The record only changes after the pin write succeeded.
    pub async fn set(&self, name: &str, desired: TriggerState) -> Result<TriggerStatus> {
        let (name, trigger) = self.lookup(name)?;
        let mut slot = trigger.slot.lock().await;

        let line = slot.line.as_mut().ok_or_else(|| {
            NodeError::hardware_write(format!("pin {} has been released", trigger.pin))
        })?;
        line.write(desired.level()).map_err(|e| match e {
            NodeError::HardwareWriteFailure(_) => e,
            other => NodeError::hardware_write(other.to_string()),
        })?;
        slot.state = desired;

        Ok(TriggerStatus {
            trigger: name,
            pin: trigger.pin,
            state: desired,
        })
    }

    /// All triggers, ordered by name.
    pub async fn list(&self) -> Vec<TriggerStatus> {
        let mut statuses = Vec::with_capacity(self.triggers.len());
        for (name, trigger) in &self.triggers {
            statuses.push(TriggerStatus {
                trigger: name.clone(),
                pin: trigger.pin,
                state: trigger.slot.lock().await.state,
            });
        }
        statuses
    }

    /// Configured trigger names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.triggers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// Switch every output off and release the pins.
    ///
    /// A failed switch-off is logged and the pin is released regardless.
    /// Calling this more than once is harmless.
    pub async fn shutdown(&self) {
        debug!("destroy: turn off and cleanup pins");
        for (name, trigger) in &self.triggers {
            trigger.slot.lock().await.release(name);
        }
    }
}

impl Drop for TriggerRegistry {
    fn drop(&mut self) {
        for (name, trigger) in self.triggers.iter_mut() {
            trigger.slot.get_mut().release(name);
        }
    }
}

impl fmt::Debug for TriggerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.triggers.iter().map(|(name, t)| (name, t.pin)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triggers::gpio::SimulatedBank;
    use std::sync::Arc;

    fn config() -> TriggerConfig {
        TriggerConfig::from_pairs([("sofa", 23), ("lamp", 24)]).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_starts_off() {
        let bank = SimulatedBank::new().unwrap();
        let registry = TriggerRegistry::initialize(&config(), &bank).unwrap();

        for name in ["sofa", "lamp"] {
            let status = registry.get(name).await.unwrap();
            assert_eq!(status.state, TriggerState::Off);
        }
        assert_eq!(bank.level(23), Some(Level::Low));
        assert!(bank.is_claimed(24));
    }

    #[tokio::test]
    async fn test_get_normalizes_name() {
        let bank = SimulatedBank::new().unwrap();
        let registry = TriggerRegistry::initialize(&config(), &bank).unwrap();

        let status = registry.get("  SoFa ").await.unwrap();
        assert_eq!(status.trigger, "sofa");
        assert_eq!(status.pin, 23);
    }

    #[tokio::test]
    async fn test_unknown_trigger() {
        let bank = SimulatedBank::new().unwrap();
        let registry = TriggerRegistry::initialize(&config(), &bank).unwrap();

        assert!(matches!(
            registry.get("garage").await,
            Err(NodeError::NotFound(_))
        ));
        assert!(matches!(
            registry.set("garage", TriggerState::On).await,
            Err(NodeError::NotFound(_))
        ));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_set_writes_pin() {
        let bank = SimulatedBank::new().unwrap();
        let registry = TriggerRegistry::initialize(&config(), &bank).unwrap();

        let status = registry.set("sofa", TriggerState::On).await.unwrap();
        assert_eq!(status.state, TriggerState::On);
        assert_eq!(bank.level(23), Some(Level::High));
        assert_eq!(registry.get("sofa").await.unwrap().state, TriggerState::On);

        registry.set("SOFA", TriggerState::Off).await.unwrap();
        assert_eq!(bank.level(23), Some(Level::Low));
    }

    #[tokio::test]
    async fn test_failed_write_keeps_record() {
        let bank = SimulatedBank::new().unwrap();
        let registry = TriggerRegistry::initialize(&config(), &bank).unwrap();
        bank.fail_pin(23);

        let err = registry.set("sofa", TriggerState::On).await.unwrap_err();
        assert!(matches!(err, NodeError::HardwareWriteFailure(_)));
        assert_eq!(registry.get("sofa").await.unwrap().state, TriggerState::Off);
        assert_eq!(bank.level(23), Some(Level::Low));
    }

    #[test]
    fn test_partial_initialize_releases_claimed_pins() {
        let bank = SimulatedBank::new().unwrap();
        // "lamp" sorts before "sofa", so pin 24 is claimed first.
        bank.fail_pin(23);

        let result = TriggerRegistry::initialize(&config(), &bank);
        assert!(result.is_err());
        assert!(!bank.is_claimed(24));
    }

    #[tokio::test]
    async fn test_shutdown_turns_off_and_releases() {
        let bank = SimulatedBank::new().unwrap();
        let registry = TriggerRegistry::initialize(&config(), &bank).unwrap();
        registry.set("sofa", TriggerState::On).await.unwrap();

        registry.shutdown().await;
        assert_eq!(bank.level(23), Some(Level::Low));
        assert!(!bank.is_claimed(23));
        assert!(!bank.is_claimed(24));

        // Second shutdown is a no-op, writes after release fail.
        registry.shutdown().await;
        assert!(matches!(
            registry.set("sofa", TriggerState::On).await,
            Err(NodeError::HardwareWriteFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_releases_even_when_write_fails() {
        let bank = SimulatedBank::new().unwrap();
        let registry = TriggerRegistry::initialize(&config(), &bank).unwrap();
        registry.set("sofa", TriggerState::On).await.unwrap();
        bank.fail_pin(23);

        registry.shutdown().await;
        assert!(!bank.is_claimed(23));
    }

    #[tokio::test]
    async fn test_drop_releases_pins() {
        let bank = SimulatedBank::new().unwrap();
        let registry = TriggerRegistry::initialize(&config(), &bank).unwrap();
        registry.set("lamp", TriggerState::On).await.unwrap();

        drop(registry);
        assert_eq!(bank.level(24), Some(Level::Low));
        assert!(!bank.is_claimed(24));
    }

    #[tokio::test]
    async fn test_concurrent_sets_on_different_triggers() {
        let bank = SimulatedBank::new().unwrap();
        let registry = Arc::new(TriggerRegistry::initialize(&config(), &bank).unwrap());

        let mut handles = Vec::new();
        for i in 0..50 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                let (name, state) = if i % 2 == 0 {
                    ("sofa", TriggerState::On)
                } else {
                    ("lamp", TriggerState::Off)
                };
                registry.set(name, state).await.unwrap()
            }));
        }
        for result in futures_util::future::join_all(handles).await {
            result.unwrap();
        }

        assert_eq!(registry.get("sofa").await.unwrap().state, TriggerState::On);
        assert_eq!(registry.get("lamp").await.unwrap().state, TriggerState::Off);
        assert_eq!(bank.level(23), Some(Level::High));
        assert_eq!(bank.level(24), Some(Level::Low));
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let bank = SimulatedBank::new().unwrap();
        let registry = TriggerRegistry::initialize(&config(), &bank).unwrap();

        let names: Vec<_> = registry.list().await.into_iter().map(|s| s.trigger).collect();
        assert_eq!(names, vec!["lamp", "sofa"]);
    }

    #[test]
    fn test_trigger_state_parse() {
        assert_eq!(" On ".parse::<TriggerState>().unwrap(), TriggerState::On);
        assert_eq!("OFF".parse::<TriggerState>().unwrap(), TriggerState::Off);
        assert!(matches!(
            "of".parse::<TriggerState>(),
            Err(NodeError::InvalidInput(_))
        ));
        assert!("".parse::<TriggerState>().is_err());
    }

    #[test]
    fn test_trigger_status_json() {
        let status = TriggerStatus {
            trigger: "sofa".to_string(),
            pin: 23,
            state: TriggerState::On,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json, serde_json::json!({"trigger": "sofa", "pin": 23, "state": "on"}));
    }
}
