//! Temperature/humidity sensor drivers.
//!
//! The HDC1080 driver talks to the sensor over I2C and is only compiled with
//! the `gpio` feature. Everywhere else a simulated sensor stands in.

use crate::climate::data::{Measurement, SensorIdentity};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

/// HDC1080 register map.
pub mod registers {
    pub const TEMPERATURE: u8 = 0x00;
    pub const HUMIDITY: u8 = 0x01;
    pub const CONFIGURATION: u8 = 0x02;
    pub const SERIAL_ID_HIGH: u8 = 0xFB;
    pub const SERIAL_ID_MID: u8 = 0xFC;
    pub const SERIAL_ID_LOW: u8 = 0xFD;
    pub const MANUFACTURER_ID: u8 = 0xFE;
    pub const DEVICE_ID: u8 = 0xFF;
}

const CONFIG_HEATER: u16 = 1 << 13;
const CONFIG_TEMPERATURE_11BIT: u16 = 1 << 10;
const CONFIG_HUMIDITY_11BIT: u16 = 0b01 << 8;
const CONFIG_HUMIDITY_8BIT: u16 = 0b10 << 8;

/// Temperature measurement resolution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TemperatureResolution {
    Bits11,
    Bits14,
}

/// Humidity measurement resolution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HumidityResolution {
    Bits8,
    Bits11,
    Bits14,
}

/// One-time sensor configuration applied at startup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SensorSettings {
    pub temperature_resolution: TemperatureResolution,
    pub humidity_resolution: HumidityResolution,
    pub heater: bool,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            temperature_resolution: TemperatureResolution::Bits14,
            humidity_resolution: HumidityResolution::Bits14,
            heater: false,
        }
    }
}

impl SensorSettings {
    /// Configuration register value for these settings.
    ///
    /// Acquisition mode stays 0 so temperature and humidity are triggered
    /// separately.
    pub fn config_word(&self) -> u16 {
        let mut word = 0;
        if self.heater {
            word |= CONFIG_HEATER;
        }
        if self.temperature_resolution == TemperatureResolution::Bits11 {
            word |= CONFIG_TEMPERATURE_11BIT;
        }
        word |= match self.humidity_resolution {
            HumidityResolution::Bits14 => 0,
            HumidityResolution::Bits11 => CONFIG_HUMIDITY_11BIT,
            HumidityResolution::Bits8 => CONFIG_HUMIDITY_8BIT,
        };
        word
    }
}

/// Convert a raw temperature register value to °C.
pub fn raw_to_celsius(raw: u16) -> f64 {
    (f64::from(raw) / 65536.0) * 165.0 - 40.0
}

/// Convert a raw humidity register value to % relative humidity.
pub fn raw_to_relative_humidity(raw: u16) -> f64 {
    (f64::from(raw) / 65536.0) * 100.0
}

/// Blocking temperature/humidity sensor.
pub trait ClimateSensor: Send {
    /// Read the current temperature in °C.
    fn read_temperature(&mut self) -> Result<f64>;

    /// Read the current relative humidity in %.
    fn read_humidity(&mut self) -> Result<f64>;

    /// Read the identification registers.
    fn identify(&mut self) -> Result<SensorIdentity>;

    /// Read the raw configuration register.
    fn read_config(&mut self) -> Result<u16>;

    /// Apply resolution and heater settings.
    fn configure(&mut self, settings: &SensorSettings) -> Result<()>;

    /// Read temperature then humidity.
    fn measure(&mut self) -> Result<Measurement> {
        let temperature = self.read_temperature()?;
        let humidity = self.read_humidity()?;
        Ok(Measurement {
            temperature,
            humidity,
        })
    }
}

/// Identify and configure the sensor, logging what it reports.
pub fn initialize_sensor(
    sensor: &mut dyn ClimateSensor,
    settings: &SensorSettings,
) -> Result<SensorIdentity> {
    let identity = sensor.identify()?;
    info!("Manufacturer ID=0x{:X}", identity.manufacturer_id);
    info!("Device ID=0x{:X}", identity.device_id);
    info!("Serial Number ID=0x{:X}", identity.serial_number);
    info!("configure register = 0x{:X}", sensor.read_config()?);

    sensor.configure(settings)?;
    info!(
        "configure register = 0x{:X} (temperature {:?}, humidity {:?}, heater {})",
        sensor.read_config()?,
        settings.temperature_resolution,
        settings.humidity_resolution,
        if settings.heater { "on" } else { "off" }
    );

    Ok(identity)
}

#[cfg(feature = "gpio")]
mod hdc1080 {
    use super::*;
    use crate::error::NodeError;
    use rppal::i2c::I2c;
    use std::thread;
    use std::time::Duration;

    /// Default I2C address of the HDC1080.
    pub const ADDRESS: u16 = 0x40;

    // Longest conversion at 14 bit is 6.5 ms.
    const CONVERSION_WAIT: Duration = Duration::from_millis(15);

    /// TI HDC1080 on the Raspberry Pi I2C bus.
    pub struct Hdc1080 {
        i2c: I2c,
    }

    impl Hdc1080 {
        /// Open the default I2C bus and address the sensor.
        pub fn new() -> Result<Self> {
            let mut i2c = I2c::new()
                .map_err(|e| NodeError::gpio_error(format!("Failed to open I2C bus: {}", e)))?;
            i2c.set_slave_address(ADDRESS)
                .map_err(|e| NodeError::gpio_error(format!("Failed to address HDC1080: {}", e)))?;
            Ok(Self { i2c })
        }

        fn read_register(&mut self, register: u8, wait: Option<Duration>) -> Result<u16> {
            self.i2c
                .write(&[register])
                .map_err(|e| NodeError::sensor_read(format!("register 0x{:02X}: {}", register, e)))?;
            if let Some(wait) = wait {
                thread::sleep(wait);
            }
            let mut buffer = [0u8; 2];
            self.i2c
                .read(&mut buffer)
                .map_err(|e| NodeError::sensor_read(format!("register 0x{:02X}: {}", register, e)))?;
            Ok(u16::from_be_bytes(buffer))
        }
    }

    impl ClimateSensor for Hdc1080 {
        fn read_temperature(&mut self) -> Result<f64> {
            let raw = self.read_register(registers::TEMPERATURE, Some(CONVERSION_WAIT))?;
            Ok(raw_to_celsius(raw))
        }

        fn read_humidity(&mut self) -> Result<f64> {
            let raw = self.read_register(registers::HUMIDITY, Some(CONVERSION_WAIT))?;
            Ok(raw_to_relative_humidity(raw))
        }

        fn identify(&mut self) -> Result<SensorIdentity> {
            let manufacturer_id = self.read_register(registers::MANUFACTURER_ID, None)?;
            let device_id = self.read_register(registers::DEVICE_ID, None)?;
            let high = self.read_register(registers::SERIAL_ID_HIGH, None)?;
            let mid = self.read_register(registers::SERIAL_ID_MID, None)?;
            let low = self.read_register(registers::SERIAL_ID_LOW, None)?;

            Ok(SensorIdentity {
                manufacturer_id,
                device_id,
                serial_number: (u64::from(high) << 32) | (u64::from(mid) << 16) | u64::from(low),
            })
        }

        fn read_config(&mut self) -> Result<u16> {
            self.read_register(registers::CONFIGURATION, None)
        }

        fn configure(&mut self, settings: &SensorSettings) -> Result<()> {
            let [msb, lsb] = settings.config_word().to_be_bytes();
            self.i2c
                .write(&[registers::CONFIGURATION, msb, lsb])
                .map_err(|e| NodeError::gpio_error(format!("Failed to configure HDC1080: {}", e)))?;
            Ok(())
        }
    }
}

/// Sensor stand-in reporting fixed values.
#[derive(Debug, Clone)]
pub struct SimulatedSensor {
    measurement: Measurement,
    config: u16,
}

impl SimulatedSensor {
    pub fn new() -> Result<Self> {
        Ok(Self::default())
    }

    pub fn with_values(temperature: f64, humidity: f64) -> Self {
        Self {
            measurement: Measurement {
                temperature,
                humidity,
            },
            config: 0,
        }
    }
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self::with_values(21.5, 45.0)
    }
}

impl ClimateSensor for SimulatedSensor {
    fn read_temperature(&mut self) -> Result<f64> {
        Ok(self.measurement.temperature)
    }

    fn read_humidity(&mut self) -> Result<f64> {
        Ok(self.measurement.humidity)
    }

    fn identify(&mut self) -> Result<SensorIdentity> {
        Ok(SensorIdentity {
            manufacturer_id: 0x5449,
            device_id: 0x1050,
            serial_number: 0,
        })
    }

    fn read_config(&mut self) -> Result<u16> {
        Ok(self.config)
    }

    fn configure(&mut self, settings: &SensorSettings) -> Result<()> {
        self.config = settings.config_word();
        Ok(())
    }
}

// Re-export the appropriate sensor
#[cfg(feature = "gpio")]
pub use hdc1080::Hdc1080 as DefaultSensor;

#[cfg(not(feature = "gpio"))]
pub use self::SimulatedSensor as DefaultSensor;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_conversions() {
        assert_eq!(raw_to_celsius(0), -40.0);
        assert!((raw_to_celsius(0x6000) - 21.875).abs() < 1e-9);
        assert_eq!(raw_to_relative_humidity(0), 0.0);
        assert_eq!(raw_to_relative_humidity(0x8000), 50.0);
    }

    #[test]
    fn test_config_word() {
        assert_eq!(SensorSettings::default().config_word(), 0x0000);

        let settings = SensorSettings {
            temperature_resolution: TemperatureResolution::Bits11,
            humidity_resolution: HumidityResolution::Bits8,
            heater: true,
        };
        assert_eq!(settings.config_word(), 0x2000 | 0x0400 | 0x0200);

        let settings = SensorSettings {
            humidity_resolution: HumidityResolution::Bits11,
            ..Default::default()
        };
        assert_eq!(settings.config_word(), 0x0100);
    }

    #[test]
    fn test_initialize_simulated_sensor() {
        let mut sensor = SimulatedSensor::default();
        let settings = SensorSettings {
            heater: true,
            ..Default::default()
        };

        let identity = initialize_sensor(&mut sensor, &settings).unwrap();
        assert_eq!(identity.manufacturer_id, 0x5449);
        assert_eq!(sensor.read_config().unwrap(), 0x2000);
    }

    #[test]
    fn test_measure_reads_both_values() {
        let mut sensor = SimulatedSensor::with_values(19.25, 61.0);
        let measurement = sensor.measure().unwrap();
        assert_eq!(measurement.temperature, 19.25);
        assert_eq!(measurement.humidity, 61.0);
    }
}
