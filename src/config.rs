//! Static node configuration, read once at startup.

use crate::error::{NodeError, Result};
use crate::triggers::gpio::MAX_BCM_PIN;
use crate::triggers::normalize_name;
use crate::web::WebConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Mapping of trigger name to BCM pin.
///
/// Names are stored normalized. Neither names nor pins repeat.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriggerConfig {
    pins: BTreeMap<String, u8>,
}

impl TriggerConfig {
    /// Build a validated configuration from `(name, pin)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, u8)>,
        S: AsRef<str>,
    {
        let mut pins = BTreeMap::new();
        for (name, pin) in pairs {
            let name = normalize_name(name.as_ref());
            if name.is_empty() {
                return Err(NodeError::config_error("trigger name must not be empty"));
            }
            if pin > MAX_BCM_PIN {
                return Err(NodeError::config_error(format!(
                    "pin {} for trigger '{}' is outside 0..={}",
                    pin, name, MAX_BCM_PIN
                )));
            }
            if let Some((other, _)) = pins.iter().find(|(_, p)| **p == pin) {
                return Err(NodeError::config_error(format!(
                    "pin {} is assigned to both '{}' and '{}'",
                    pin, other, name
                )));
            }
            if pins.insert(name.clone(), pin).is_some() {
                return Err(NodeError::config_error(format!(
                    "trigger '{}' is configured twice",
                    name
                )));
            }
        }
        Ok(Self { pins })
    }

    /// Iterate `(name, pin)` in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u8)> {
        self.pins.iter().map(|(name, &pin)| (name.as_str(), pin))
    }

    pub fn pin(&self, name: &str) -> Option<u8> {
        self.pins.get(&normalize_name(name)).copied()
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}

/// Parse a `NAME=PIN` trigger definition.
pub fn parse_trigger_spec(spec: &str) -> Result<(String, u8)> {
    let (name, pin) = spec.split_once('=').ok_or_else(|| {
        NodeError::config_error(format!("expected NAME=PIN, got '{}'", spec))
    })?;
    let pin = pin
        .trim()
        .parse::<u8>()
        .map_err(|e| NodeError::config_error(format!("invalid pin in '{}': {}", spec, e)))?;
    let name = normalize_name(name);
    if name.is_empty() {
        return Err(NodeError::config_error(format!("missing trigger name in '{}'", spec)));
    }
    Ok((name, pin))
}

/// MQTT broker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Broker host name or address
    pub host: String,
    /// Broker port
    pub port: u16,
    /// Topic readings are published to
    pub topic: String,
    /// MQTT client identifier
    pub client_id: String,
    /// Upper bound for connecting and getting a publish acknowledged
    pub timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: crate::DEFAULT_BROKER_HOST.to_string(),
            port: crate::DEFAULT_BROKER_PORT,
            topic: crate::DEFAULT_TOPIC.to_string(),
            client_id: crate::DEFAULT_CLIENT_ID.to_string(),
            timeout: Duration::from_secs(crate::DEFAULT_BROKER_TIMEOUT_SECS),
        }
    }
}

impl BrokerConfig {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Everything the node needs to start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub web: WebConfig,
    pub broker: BrokerConfig,
    pub triggers: TriggerConfig,
    /// Time between sensor reading cycles
    pub read_interval: Duration,
    /// Upper bound for a single sensor read
    pub sensor_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            web: WebConfig::default(),
            broker: BrokerConfig::default(),
            triggers: TriggerConfig::from_pairs([(crate::DEFAULT_TRIGGER, crate::DEFAULT_TRIGGER_PIN)])
                .unwrap_or_default(),
            read_interval: Duration::from_secs(crate::DEFAULT_INTERVAL_SECS),
            sensor_timeout: Duration::from_secs(crate::DEFAULT_SENSOR_TIMEOUT_SECS),
        }
    }
}

impl NodeConfig {
    /// Reject settings the node cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.read_interval.is_zero() {
            return Err(NodeError::config_error("read interval must be positive"));
        }
        if self.sensor_timeout.is_zero() {
            return Err(NodeError::config_error("sensor timeout must be positive"));
        }
        if self.broker.timeout.is_zero() {
            return Err(NodeError::config_error("broker timeout must be positive"));
        }
        if self.broker.topic.is_empty() {
            return Err(NodeError::config_error("broker topic must not be empty"));
        }
        if self.triggers.is_empty() {
            return Err(NodeError::config_error("at least one trigger is required"));
        }
        Ok(())
    }
}
