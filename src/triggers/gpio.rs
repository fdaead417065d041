//! GPIO output lines for Raspberry Pi triggers.
//!
//! This module provides the claim/write/release surface the trigger registry
//! drives. The real provider is feature-gated so the crate still builds and
//! runs on machines without a GPIO header.

use crate::error::{NodeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// Highest BCM GPIO number exposed on the 40-pin header.
pub const MAX_BCM_PIN: u8 = 27;

/// Electrical level of an output line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Level {
    /// Driven low (inactive)
    Low,
    /// Driven high (active)
    High,
}

/// A claimed output line. Dropping the line releases the underlying pin.
pub trait OutputLine: Send {
    /// BCM number of the claimed pin.
    fn pin(&self) -> u8;

    /// Drive the line to the given level.
    fn write(&mut self, level: Level) -> Result<()>;
}

/// Source of output lines.
pub trait OutputBank: Send + Sync {
    /// Claim `pin` as an output, already driven low.
    fn claim(&self, pin: u8) -> Result<Box<dyn OutputLine>>;
}

#[cfg(feature = "gpio")]
mod raspberry_pi {
    use super::*;
    use rppal::gpio::{Gpio, OutputPin};

    /// Raspberry Pi GPIO bank using rppal.
    pub struct RaspberryPiBank {
        gpio: Gpio,
    }

    impl RaspberryPiBank {
        /// Open the GPIO peripheral.
        pub fn new() -> Result<Self> {
            let gpio = Gpio::new().map_err(|e| {
                NodeError::gpio_error(format!("Failed to initialize GPIO: {}", e))
            })?;

            Ok(Self { gpio })
        }
    }

    impl OutputBank for RaspberryPiBank {
        fn claim(&self, pin: u8) -> Result<Box<dyn OutputLine>> {
            if pin > MAX_BCM_PIN {
                return Err(NodeError::gpio_error(format!("Pin {} is not available", pin)));
            }

            let output = self
                .gpio
                .get(pin)
                .map_err(|e| NodeError::gpio_error(format!("Failed to claim pin {}: {}", pin, e)))?
                .into_output_low();

            Ok(Box::new(RaspberryPiLine { output }))
        }
    }

    /// An rppal output pin. rppal resets the pin mode when it is dropped.
    struct RaspberryPiLine {
        output: OutputPin,
    }

    impl OutputLine for RaspberryPiLine {
        fn pin(&self) -> u8 {
            self.output.pin()
        }

        fn write(&mut self, level: Level) -> Result<()> {
            match level {
                Level::Low => self.output.set_low(),
                Level::High => self.output.set_high(),
            }
            Ok(())
        }
    }
}

#[derive(Debug, Default)]
struct SimulatedPins {
    levels: HashMap<u8, Level>,
    claimed: HashSet<u8>,
    failing: HashSet<u8>,
}

/// In-memory output bank for systems without GPIO support.
///
/// Clones share the same pin table, so a test can keep a handle and inspect
/// what the registry wrote.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBank {
    pins: Arc<Mutex<SimulatedPins>>,
}

impl SimulatedBank {
    pub fn new() -> Result<Self> {
        Ok(Self::default())
    }

    fn pins(&self) -> MutexGuard<'_, SimulatedPins> {
        self.pins.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Last level written to `pin`, if it was ever claimed.
    pub fn level(&self, pin: u8) -> Option<Level> {
        self.pins().levels.get(&pin).copied()
    }

    /// Whether `pin` is currently claimed.
    pub fn is_claimed(&self, pin: u8) -> bool {
        self.pins().claimed.contains(&pin)
    }

    /// Make every following claim of and write to `pin` fail.
    pub fn fail_pin(&self, pin: u8) {
        self.pins().failing.insert(pin);
    }

    /// Undo [`SimulatedBank::fail_pin`].
    pub fn heal_pin(&self, pin: u8) {
        self.pins().failing.remove(&pin);
    }
}

impl OutputBank for SimulatedBank {
    fn claim(&self, pin: u8) -> Result<Box<dyn OutputLine>> {
        let mut pins = self.pins();

        if pin > MAX_BCM_PIN {
            return Err(NodeError::gpio_error(format!("Pin {} is not available", pin)));
        }
        if pins.failing.contains(&pin) {
            return Err(NodeError::gpio_error(format!("Failed to claim pin {}", pin)));
        }
        if !pins.claimed.insert(pin) {
            return Err(NodeError::gpio_error(format!("Pin {} is already claimed", pin)));
        }
        pins.levels.insert(pin, Level::Low);

        Ok(Box::new(SimulatedLine {
            pin,
            bank: self.clone(),
        }))
    }
}

struct SimulatedLine {
    pin: u8,
    bank: SimulatedBank,
}

impl OutputLine for SimulatedLine {
    fn pin(&self) -> u8 {
        self.pin
    }

    fn write(&mut self, level: Level) -> Result<()> {
        let mut pins = self.bank.pins();
        if pins.failing.contains(&self.pin) {
            return Err(NodeError::hardware_write(format!(
                "simulated fault on pin {}",
                self.pin
            )));
        }
        pins.levels.insert(self.pin, level);
        Ok(())
    }
}

impl Drop for SimulatedLine {
    fn drop(&mut self) {
        self.bank.pins().claimed.remove(&self.pin);
    }
}

// Re-export the appropriate output bank
#[cfg(feature = "gpio")]
pub use raspberry_pi::RaspberryPiBank as DefaultOutputBank;

#[cfg(not(feature = "gpio"))]
pub use self::SimulatedBank as DefaultOutputBank;
