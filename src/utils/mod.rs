//! Utility module for KiraPlayer
//!
//! This module provides common utilities used throughout the crate:
//! - Error handling with a custom error type
//! - Configuration management
//! - A wall clock seam for time-based heuristics

pub mod clock;
pub mod config;
pub mod error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BridgeConfig, Config, GeneralConfig, PlayerTuning, ProxyEndpoint};
pub use error::{BridgeError, IntoBridgeError, Result};

/// Initialize the application configuration
///
/// Loads configuration from:
/// 1. Default values
/// 2. System configuration file
/// 3. User configuration file
/// 4. Environment variables
pub fn load_config() -> Result<Config> {
    Config::load()
}

/// Clamp a value between min and max
pub fn clamp<T: PartialOrd>(value: T, min: T, max: T) -> T {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

/// A time value that can be reported to the host (finite and positive)
pub fn is_meaningful_time(value: f64) -> bool {
    value.is_finite() && value > 0.0
}
