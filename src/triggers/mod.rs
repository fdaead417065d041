//! Named physical outputs ("triggers") and their state.
//!
//! This module holds the registry the HTTP API reads and mutates, and the GPIO
//! layer it drives.

pub mod gpio;
pub mod registry;

// Re-export commonly used items
pub use gpio::{DefaultOutputBank, Level, OutputBank, OutputLine, SimulatedBank};
pub use registry::{normalize_name, TriggerRegistry, TriggerState, TriggerStatus};
