//! Host transport seams
//!
//! The embedding application exposes one handler channel (JSON in, JSON
//! out) and, optionally, a binary message port. Both are traits so the
//! bridge can run against a real web view, a stdio pipe or a test double.

use crate::protocol::{AppMessage, AppRequest, EnvInfo, ProxyStatus};
use crate::utils::error::{BridgeError, IntoBridgeError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, warn};
use parking_lot::Mutex;
use serde_json::Value;
use std::io::Write;

/// The host's handler channel
#[async_trait]
pub trait HostChannel: Send + Sync {
    /// Whether a host callback channel is present
    fn is_available(&self) -> bool;

    /// Fire-and-forget notification over the `sendToApp` handler
    async fn post(&self, message: &AppMessage) -> Result<()>;

    /// Round trip expecting a JSON reply
    async fn call(&self, request: &AppRequest) -> Result<Value>;
}

/// Outgoing half of the binary side channel
#[async_trait]
pub trait WebMessagePort: Send + Sync {
    async fn post_message(&self, frame: Bytes) -> Result<()>;
}

/// Send a notification, dropping it quietly when no host is attached
pub async fn send_to_app(host: &dyn HostChannel, message: &AppMessage) {
    if !host.is_available() {
        debug!("No host attached, dropping {:?}", message);
        return;
    }
    if let Err(e) = host.post(message).await {
        warn!("Failed to notify host: {}", e);
    }
}

/// Ask the host for its environment, falling back to defaults
pub async fn init_env(host: &dyn HostChannel) -> EnvInfo {
    if !host.is_available() {
        return EnvInfo::default();
    }
    match host.call(&AppRequest::InitEnv).await {
        Ok(reply) => serde_json::from_value(reply).unwrap_or_else(|e| {
            warn!("Malformed initEnv reply: {}", e);
            EnvInfo::default()
        }),
        Err(e) => {
            warn!("initEnv failed: {}", e);
            EnvInfo::default()
        }
    }
}

/// Ask the host whether its local proxy server is running
///
/// Never cached: every call goes back to the host.
pub async fn check_proxy(host: &dyn HostChannel) -> bool {
    match host.call(&AppRequest::CheckProxy).await {
        Ok(reply) => serde_json::from_value::<ProxyStatus>(reply)
            .map(|status| status.running)
            .unwrap_or(false),
        Err(e) => {
            debug!("checkProxy failed: {}", e);
            false
        }
    }
}

/// Host that writes notifications as JSON lines
///
/// It cannot answer calls, so tunneling falls back to direct fetches.
pub struct StdioHost {
    out: Mutex<Box<dyn Write + Send>>,
}

impl StdioHost {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self { out: Mutex::new(out) }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }
}

#[async_trait]
impl HostChannel for StdioHost {
    fn is_available(&self) -> bool {
        true
    }

    async fn post(&self, message: &AppMessage) -> Result<()> {
        let line = serde_json::to_string(message)?;
        let mut out = self.out.lock();
        writeln!(out, "{}", line).transport_err("Writing to host")?;
        out.flush().transport_err("Flushing host output")
    }

    async fn call(&self, request: &AppRequest) -> Result<Value> {
        Err(BridgeError::Transport(format!(
            "stdio host cannot answer {}",
            serde_json::to_value(request)?["cmd"]
        )))
    }
}
