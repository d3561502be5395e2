//! Binary side channel
//!
//! Large or binary response bodies arrive out of band as single binary
//! frames: a 4-byte big-endian request id followed by the payload. Support
//! is negotiated once per session by echoing the `[9, 5]` probe.

use crate::bridge::host::{send_to_app, HostChannel, WebMessagePort};
use crate::bridge::registry::PendingRequestRegistry;
use crate::protocol::AppMessage;
use crate::utils::error::Result;
use bytes::{Buf, Bytes};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;

/// Capability probe, echoed back by hosts that support the channel
pub const PROBE_FRAME: [u8; 2] = [9, 5];

/// Length of the request id prefix on data frames
pub const FRAME_ID_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelState {
    Idle,
    Probing,
    Supported,
}

/// Incoming demultiplexer for binary response frames
pub struct BinarySideChannel {
    port: Arc<dyn WebMessagePort>,
    host: Arc<dyn HostChannel>,
    registry: Arc<PendingRequestRegistry<Bytes>>,
    state: Mutex<ChannelState>,
}

impl BinarySideChannel {
    pub fn new(
        port: Arc<dyn WebMessagePort>,
        host: Arc<dyn HostChannel>,
        registry: Arc<PendingRequestRegistry<Bytes>>,
    ) -> Self {
        Self {
            port,
            host,
            registry,
            state: Mutex::new(ChannelState::Idle),
        }
    }

    /// Send the probe frame; later calls are no-ops
    pub async fn initialize(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != ChannelState::Idle {
                return Ok(());
            }
            *state = ChannelState::Probing;
        }

        debug!("Probing binary side channel");
        if let Err(e) = self.port.post_message(Bytes::from_static(&PROBE_FRAME)).await {
            *self.state.lock() = ChannelState::Idle;
            return Err(e);
        }
        Ok(())
    }

    pub fn is_supported(&self) -> bool {
        *self.state.lock() == ChannelState::Supported
    }

    /// Handle one incoming binary frame
    pub async fn on_message(&self, frame: Bytes) {
        if !self.is_supported() {
            if frame.as_ref() == PROBE_FRAME {
                {
                    let mut state = self.state.lock();
                    if *state != ChannelState::Probing {
                        debug!("Ignoring probe echo in state {:?}", *state);
                        return;
                    }
                    *state = ChannelState::Supported;
                }
                info!("Binary side channel supported");
                send_to_app(self.host.as_ref(), &AppMessage::SupportWebMessage { support: true }).await;
            } else {
                debug!("Dropping {}-byte frame before handshake", frame.len());
            }
            return;
        }

        if frame.len() < FRAME_ID_LEN {
            warn!("Dropping short side channel frame ({} bytes)", frame.len());
            return;
        }

        let id = frame.slice(..FRAME_ID_LEN).get_u32();
        let payload = frame.slice(FRAME_ID_LEN..);
        if !self.registry.complete(id, payload) {
            debug!("Side channel frame for unknown request {}", id);
        }
    }
}
