//! # piflora - Raspberry Pi climate node
//!
//! A small home-automation node for a Raspberry Pi with an HDC1080
//! temperature/humidity sensor and a handful of relay outputs.
//!
//! ## Features
//!
//! - **Climate readings**: periodic temperature/humidity samples with dew point
//! - **MQTT publishing**: every reading is sent to a broker topic as JSON
//! - **Web page**: the last reading, live-updated over WebSocket
//! - **Trigger API**: switch named GPIO outputs on and off over HTTP
//! - **Simulation**: without the `gpio` feature, sensor and pins are simulated
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use piflora::{
//!     start_web_server, AppState, ReadingStore, SimulatedBank, TriggerConfig,
//!     TriggerRegistry, WebConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bank = SimulatedBank::new()?;
//!     let triggers = TriggerConfig::from_pairs([("sofa", 23)])?;
//!     let registry = Arc::new(TriggerRegistry::initialize(&triggers, &bank)?);
//!
//!     let state = AppState::new(registry, ReadingStore::new());
//!     start_web_server(WebConfig::default(), state, std::future::pending()).await?;
//!     Ok(())
//! }
//! ```

pub mod climate;
pub mod config;
pub mod error;
pub mod triggers;
pub mod web;

// Re-export public API
pub use climate::{
    calc_dewpoint, spawn_schedule, stop_schedule, ClimateSensor, LastReading, MqttPublisher,
    Publisher, ReadingPipeline, ReadingStore, SimulatedSensor,
};
pub use config::{BrokerConfig, NodeConfig, TriggerConfig};
pub use error::{NodeError, Result};
pub use triggers::{SimulatedBank, TriggerRegistry, TriggerState, TriggerStatus};
pub use web::{create_app, start_web_server, AppState, WebConfig};

/// The default sensor reading interval in seconds
pub const DEFAULT_INTERVAL_SECS: u64 = 300;

/// The default upper bound for one sensor read in seconds
pub const DEFAULT_SENSOR_TIMEOUT_SECS: u64 = 5;

/// The default web server port
pub const DEFAULT_WEB_PORT: u16 = 5000;

/// The default MQTT broker address
pub const DEFAULT_BROKER_HOST: &str = "10.0.0.21";

/// The default MQTT broker port
pub const DEFAULT_BROKER_PORT: u16 = 1883;

/// The default topic readings are published to
pub const DEFAULT_TOPIC: &str = "environmentals/piflora";

/// The default MQTT client identifier
pub const DEFAULT_CLIENT_ID: &str = "piflora";

/// The default broker timeout in seconds
pub const DEFAULT_BROKER_TIMEOUT_SECS: u64 = 120;

/// The trigger configured when none is given
pub const DEFAULT_TRIGGER: &str = "sofa";

/// BCM pin of the default trigger
pub const DEFAULT_TRIGGER_PIN: u8 = 23;
