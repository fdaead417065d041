//! Climate sensing: sensor drivers, dew point, broker publishing and the
//! periodic reading pipeline.
//!
//! This module provides everything between the HDC1080 on the I2C bus and the
//! `LastReading` snapshot the web page renders.

pub mod data;
pub mod dewpoint;
pub mod pipeline;
pub mod publisher;
pub mod sensor;

// Re-export commonly used items
pub use data::{ClimatePayload, LastReading, Measurement, SensorIdentity};
pub use dewpoint::calc_dewpoint;
pub use pipeline::{spawn_schedule, stop_schedule, ReadingPipeline, ReadingStore};
pub use publisher::{MqttPublisher, Publisher};
pub use sensor::{initialize_sensor, ClimateSensor, DefaultSensor, SensorSettings, SimulatedSensor};
