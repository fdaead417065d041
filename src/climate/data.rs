//! Data structures for climate readings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status shown before the first cycle completed.
pub const WAITING_MESSAGE: &str = "waiting for first measurement";

/// Raw values as returned by the sensor driver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Temperature in °C
    pub temperature: f64,
    /// Relative humidity in %
    pub humidity: f64,
}

/// Payload published to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClimatePayload {
    pub temperature: f64,
    pub humidity: f64,
}

/// The most recent reading, as served by the web surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastReading {
    /// Temperature in °C, two decimals
    pub temperature: f64,
    /// Relative humidity in %, one decimal
    pub humidity: f64,
    /// Dew point in °C, one decimal; absent when the humidity is out of domain
    pub dewpoint: Option<f64>,
    /// Outcome of the most recent publish attempt
    pub message: String,
    /// When the sensor was read
    pub measured_at: Option<DateTime<Utc>>,
}

impl Default for LastReading {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            humidity: 0.0,
            dewpoint: Some(0.0),
            message: WAITING_MESSAGE.to_string(),
            measured_at: None,
        }
    }
}

impl LastReading {
    /// Payload for the broker carrying this reading's values.
    pub fn payload(&self) -> ClimatePayload {
        ClimatePayload {
            temperature: self.temperature,
            humidity: self.humidity,
        }
    }
}

/// Identification registers of the sensor, read once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorIdentity {
    pub manufacturer_id: u16,
    pub device_id: u16,
    pub serial_number: u64,
}
