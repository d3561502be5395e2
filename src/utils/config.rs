//! Configuration management for KiraPlayer
//!
//! This module handles loading and managing the bridge configuration
//! from config files and environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::utils::error::{BridgeError, IntoBridgeError, Result};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tunnel endpoint used by the fallback fetch path
    pub proxy: ProxyEndpoint,

    /// Request bridge settings
    pub bridge: BridgeConfig,

    /// Player behaviour tuning
    pub player: PlayerTuning,

    /// General application settings
    pub general: GeneralConfig,
}

/// Local tunnel endpoint (host/port/protocol triple)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyEndpoint {
    /// `http` or `https`
    pub protocol: String,

    /// Host name or address of the tunnel
    pub host: String,

    /// Port, kept as a string the way the page stores it
    pub port: String,
}

/// Request bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Deadline for pending requests in milliseconds (0 disables it)
    pub request_timeout_ms: u64,
}

/// Player behaviour configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerTuning {
    /// A pause younger than this is treated as an interruption
    pub resume_window_ms: u64,

    /// Minimum position delta before progress is forwarded to the host
    pub progress_threshold_secs: f64,

    /// Re-enable ABR when bandwidth drops below this share of the stream bitrate
    pub abr_recovery_ratio: f64,

    /// Height cap applied while a video starts
    pub initial_max_height: u32,

    /// Interval of the position-saving timer
    pub save_position_interval_ms: u64,

    /// Codec family never offered or selected
    pub excluded_codec: String,

    /// Volume used when nothing has been persisted
    pub default_volume: f64,

    /// Audio language the engine prefers before any selection
    pub preferred_audio_language: String,
}

/// General application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ProxyEndpoint {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "127.0.0.1".to_string(),
            port: "5173".to_string(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
        }
    }
}

impl Default for PlayerTuning {
    fn default() -> Self {
        Self {
            resume_window_ms: 1000,
            progress_threshold_secs: 0.9,
            abr_recovery_ratio: 0.7,
            initial_max_height: 480,
            save_position_interval_ms: 5000,
            excluded_codec: "av01".to_string(),
            default_volume: 1.0,
            preferred_audio_language: "en-US".to_string(),
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl ProxyEndpoint {
    /// Whether a tunnel host is configured at all
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty()
    }
}

impl BridgeConfig {
    /// Pending request deadline, `None` when disabled
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }
}

impl Config {
    /// Load configuration from various sources
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. System config file (/etc/kiraplayer/config.toml on Linux)
    /// 3. User config file (~/.config/kiraplayer/config.toml on Linux)
    /// 4. Environment variables (KIRAPLAYER_* prefix)
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(system_path) = Self::system_config_path() {
            if system_path.exists() {
                config = Self::read_file(&system_path)?;
            }
        }

        if let Some(user_path) = Self::user_config_path() {
            if user_path.exists() {
                config = Self::read_file(&user_path)?;
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load an explicit file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut config = Self::read_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the given path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).config_err("Failed to create config directory")?;
        }

        let toml = toml::to_string_pretty(self).config_err("Failed to serialize config")?;

        std::fs::write(path, toml).config_err("Failed to write config file")?;

        Ok(())
    }

    fn read_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).config_err("Failed to read config file")?;
        toml::from_str::<Self>(&contents).config_err("Failed to parse config file")
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("KIRAPLAYER_PROXY_HOST") {
            self.proxy.host = host;
        }

        if let Ok(port) = std::env::var("KIRAPLAYER_PROXY_PORT") {
            self.proxy.port = port;
        }

        if let Ok(protocol) = std::env::var("KIRAPLAYER_PROXY_PROTOCOL") {
            self.proxy.protocol = protocol;
        }

        if let Ok(timeout) = std::env::var("KIRAPLAYER_REQUEST_TIMEOUT_MS") {
            self.bridge.request_timeout_ms = timeout.parse()
                .map_err(|_| BridgeError::Config("Invalid KIRAPLAYER_REQUEST_TIMEOUT_MS".to_string()))?;
        }

        if let Ok(log_level) = std::env::var("KIRAPLAYER_LOG_LEVEL") {
            self.general.log_level = log_level;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.proxy.is_configured() {
            return Err(BridgeError::Config("Proxy host must not be empty".to_string()));
        }

        match self.proxy.port.parse::<u16>() {
            Ok(port) if port > 0 => {}
            _ => {
                return Err(BridgeError::Config(format!(
                    "Invalid proxy port '{}'",
                    self.proxy.port
                )));
            }
        }

        if !["http", "https"].contains(&self.proxy.protocol.as_str()) {
            return Err(BridgeError::Config(format!(
                "Invalid proxy protocol '{}', must be http or https",
                self.proxy.protocol
            )));
        }

        let ratio = self.player.abr_recovery_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(BridgeError::Config("ABR recovery ratio must be in (0, 1]".to_string()));
        }

        if self.player.progress_threshold_secs <= 0.0 {
            return Err(BridgeError::Config("Progress threshold must be positive".to_string()));
        }

        if !(0.0..=1.0).contains(&self.player.default_volume) {
            return Err(BridgeError::Config("Default volume must be between 0.0 and 1.0".to_string()));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.general.log_level.as_str()) {
            return Err(BridgeError::Config(format!(
                "Invalid log level '{}', must be one of: {:?}",
                self.general.log_level,
                valid_log_levels
            )));
        }

        Ok(())
    }

    /// Get system config file path
    fn system_config_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        return Some(PathBuf::from("/etc/kiraplayer/config.toml"));

        #[cfg(target_os = "macos")]
        return Some(PathBuf::from("/Library/Application Support/KiraPlayer/config.toml"));

        #[allow(unreachable_code)]
        None
    }

    /// Get user config file path
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("kiraplayer").join("config.toml"))
    }
}
