//! Error types for KiraPlayer
//!
//! This module defines the error type shared by the bridge, the dispatcher
//! and the player controller. We use thiserror for the library error and
//! leave anyhow to the binary edge.

use thiserror::Error;

/// Main error type for KiraPlayer
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Host channel missing, unreachable or throwing
    #[error("Transport error: {0}")]
    Transport(String),

    /// Host answered with something we cannot interpret
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A pending request outlived its deadline
    #[error("Request {id} timed out")]
    Timeout { id: u32 },

    /// A pending request was removed before completion
    #[error("Request {id} was cancelled")]
    Cancelled { id: u32 },

    /// Streaming engine errors
    #[error("Engine error: {0}")]
    Engine(String),

    /// Engine gave up after its own retry policy
    #[error("Streaming failure: {0}")]
    StreamingFailure(String),

    /// Content the engine refuses to play
    #[error("Unplayable: {0}")]
    Unplayable(String),

    /// A newer load replaced this one while it was in flight
    #[error("Load of {0} was superseded")]
    Superseded(String),

    /// Platform autoplay policy rejected a play request
    #[error("Autoplay was prevented by the browser")]
    AutoplayBlocked,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Direct network fetch failed
    #[error("HTTP error: {0}")]
    Http(String),

    /// File I/O errors
    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid base64 body
    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        BridgeError::Http(err.to_string())
    }
}

impl From<url::ParseError> for BridgeError {
    fn from(err: url::ParseError) -> Self {
        BridgeError::InvalidInput(format!("URL parse error: {}", err))
    }
}

impl BridgeError {
    /// Create a protocol error from string
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        BridgeError::Protocol(msg.into())
    }

    /// Whether this error is shown to the end user.
    ///
    /// Only unplayable content and terminal engine failures reach the user;
    /// everything else is logged and recovered from.
    pub fn is_user_visible(&self) -> bool {
        matches!(self, BridgeError::Unplayable(_) | BridgeError::StreamingFailure(_))
    }
}

/// Convenience type alias for Results in KiraPlayer
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Extension trait for converting other errors to BridgeError
pub trait IntoBridgeError<T> {
    /// Convert this error into a BridgeError with the given context
    fn transport_err(self, context: &str) -> Result<T>;
    fn config_err(self, context: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> IntoBridgeError<T> for std::result::Result<T, E> {
    fn transport_err(self, context: &str) -> Result<T> {
        self.map_err(|e| BridgeError::Transport(format!("{}: {}", context, e)))
    }

    fn config_err(self, context: &str) -> Result<T> {
        self.map_err(|e| BridgeError::Config(format!("{}: {}", context, e)))
    }
}
