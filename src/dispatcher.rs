//! Host command dispatch
//!
//! The single entry point for host-to-page commands. Payloads are parsed
//! into the closed [`HostCommand`] union and routed by pattern matching.
//! Unknown tags and malformed payloads are logged and ignored; they never
//! become errors for the host.

use crate::context::AppPlayerContext;
use crate::protocol::{ControllerAction, HostCommand, LifecycleState};
use crate::utils::error::{BridgeError, Result};

use log::{debug, warn};
use serde_json::{json, Value};
use std::sync::Arc;

/// Routes host commands to the player session
pub struct CommandDispatcher {
    context: Arc<AppPlayerContext>,
}

impl CommandDispatcher {
    pub fn new(context: Arc<AppPlayerContext>) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Arc<AppPlayerContext> {
        &self.context
    }

    /// Handle one raw command; queries return their answer
    pub async fn handle(&self, payload: Value) -> Option<Value> {
        let command: HostCommand = match serde_json::from_value(payload) {
            Ok(command) => command,
            Err(e) => {
                warn!("Ignoring malformed host command: {}", e);
                return None;
            }
        };

        match self.dispatch(command).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Host command failed: {}", e);
                None
            }
        }
    }

    /// Handle one command given as JSON text
    pub async fn handle_str(&self, text: &str) -> Option<Value> {
        match serde_json::from_str(text) {
            Ok(payload) => self.handle(payload).await,
            Err(e) => {
                warn!("Ignoring non-JSON host command: {}", e);
                None
            }
        }
    }

    /// Route a parsed command
    pub async fn dispatch(&self, command: HostCommand) -> Result<Option<Value>> {
        let controller = self.context.controller();

        match command {
            HostCommand::AppLifecycleState { state, is_android } => {
                if !is_android && matches!(state, LifecycleState::Paused | LifecycleState::Resumed) {
                    // A pause the element just fired must be recorded before the check
                    self.context.reconciler().drain_pending().await;
                    controller.resume_if_interrupted().await?;
                }
            }
            HostCommand::Controller { action, data } => match action {
                ControllerAction::Play | ControllerAction::Pause => controller.toggle_play().await?,
                ControllerAction::SeekTo => {
                    let seconds = data
                        .as_ref()
                        .and_then(Value::as_f64)
                        .ok_or_else(|| BridgeError::InvalidInput(format!("seekTo needs a number, got {:?}", data)))?;
                    controller.seek_to(seconds)?;
                }
                ControllerAction::Unknown => debug!("Ignoring unknown controller action"),
            },
            HostCommand::PreLoadVideo { video_id } => {
                self.context.loader().preload(&video_id);
            }
            HostCommand::LoadVideo { video_id, start_time } => {
                self.context.loader().load_video(&video_id, start_time).await?;
            }
            HostCommand::GetTracks => {
                return Ok(Some(json!({
                    "tracks": controller.tracks(),
                    "textTracks": controller.text_tracks(),
                })));
            }
            HostCommand::SelectTrack { height, language } => {
                controller.select_track(height, language.as_deref());
            }
            HostCommand::GetTextTracks => {
                return Ok(Some(serde_json::to_value(controller.text_tracks())?));
            }
            HostCommand::SetTextTrack { language } => {
                controller.set_text_track(language.as_deref());
            }
            HostCommand::SelectSpeed { speed } => controller.set_speed(speed)?,
            HostCommand::SetLoop { enable } => controller.set_loop(enable),
            HostCommand::EnablePip => controller.toggle_pip().await?,
            HostCommand::Volume { volume } => controller.set_volume(volume)?,
            HostCommand::ShowingAds { showing } => controller.set_showing_ads(showing).await?,
            HostCommand::TestWebMessage => match self.context.side_channel() {
                Some(channel) => channel.initialize().await?,
                None => debug!("No side channel attached"),
            },
            HostCommand::Unknown => debug!("Ignoring unknown host command"),
        }

        Ok(None)
    }
}
