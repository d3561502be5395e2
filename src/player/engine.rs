//! Media engine seams
//!
//! The adaptive streaming engine, the video element, the background audio
//! session and the video info client are all external collaborators. This
//! module defines the surface the controller and the reconciler drive, and
//! the closed set of events those collaborators emit.

use crate::utils::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// One variant (video + audio pairing) the engine can play
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VariantTrack {
    pub id: u64,
    pub height: u32,
    pub width: u32,
    pub bandwidth: u64,
    /// Codec string, e.g. `avc1.4d401f` or `av01.0.05M.08`
    pub video_codec: Option<String>,
    pub language: String,
    pub roles: Vec<String>,
    pub active: bool,
}

impl VariantTrack {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Whether the codec belongs to `family` (`av01` matches `av01.0.05M.08`)
    pub fn codec_family_is(&self, family: &str) -> bool {
        self.video_codec
            .as_deref()
            .map(|codec| codec.split('.').next() == Some(family))
            .unwrap_or(false)
    }
}

/// One caption track
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextTrack {
    pub id: u64,
    pub language: String,
    pub label: Option<String>,
    pub kind: String,
    pub active: bool,
}

/// Bandwidth figures used by the ABR recovery rule
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EngineStats {
    /// Estimated available bandwidth in bits per second
    pub estimated_bandwidth: f64,
    /// Bitrate of the variant currently being consumed
    pub stream_bandwidth: f64,
}

/// Seekable window of the presentation
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SeekRange {
    pub start: f64,
    pub end: f64,
}

/// Engine configuration changes the player makes
#[derive(Debug, Clone, PartialEq)]
pub enum EngineSetting {
    AbrEnabled(bool),
    /// `None` lifts the restriction
    AbrMaxHeight(Option<u32>),
    PreferredAudioLanguage(String),
}

/// Adaptive streaming engine
#[async_trait]
pub trait StreamingEngine: Send + Sync {
    /// Load a manifest
    ///
    /// # Arguments
    ///
    /// * `manifest_uri` - Manifest to load
    /// * `start_time` - Start position in seconds, `None` for the live edge
    async fn load(&self, manifest_uri: &str, start_time: Option<f64>) -> Result<()>;

    /// Tear down the current presentation
    async fn unload(&self) -> Result<()>;

    /// Apply a configuration change
    fn configure(&self, setting: EngineSetting);

    /// All variants of the current presentation
    fn variant_tracks(&self) -> Vec<VariantTrack>;

    /// All caption tracks of the current presentation
    fn text_tracks(&self) -> Vec<TextTrack>;

    /// Switch to a variant
    ///
    /// # Arguments
    ///
    /// * `id` - Variant id
    /// * `clear_buffer` - Drop already buffered content of the old variant
    fn select_variant_track(&self, id: u64, clear_buffer: bool);

    fn select_text_track(&self, id: u64);

    fn set_text_track_visibility(&self, visible: bool);

    fn is_text_track_visible(&self) -> bool;

    fn is_buffering(&self) -> bool;

    fn stats(&self) -> EngineStats;

    fn seek_range(&self) -> SeekRange;

    /// Drop every request and response filter registered on the
    /// networking engine
    fn clear_network_filters(&self);

    /// Restart streaming after a failure
    ///
    /// # Arguments
    ///
    /// * `delay_secs` - Delay before the retry starts
    ///
    /// # Returns
    ///
    /// Returns false when the engine has nothing to retry
    fn retry_streaming(&self, delay_secs: f64) -> bool;
}

/// The video element
#[async_trait]
pub trait MediaElement: Send + Sync {
    /// Start playback; rejected with `AutoplayBlocked` by platform policy
    async fn play(&self) -> Result<()>;

    fn pause(&self);

    fn paused(&self) -> bool;

    fn current_time(&self) -> f64;

    fn set_current_time(&self, seconds: f64);

    fn duration(&self) -> f64;

    fn volume(&self) -> f64;

    fn set_volume(&self, volume: f64);

    fn playback_rate(&self) -> f64;

    fn set_playback_rate(&self, rate: f64);

    fn looping(&self) -> bool;

    fn set_looping(&self, enable: bool);

    fn in_pip(&self) -> bool;

    async fn request_pip(&self) -> Result<()>;

    async fn exit_pip(&self) -> Result<()>;
}

/// Background audio session: the silence player plus the OS media session
pub trait AudioSession: Send + Sync {
    /// Start the looping silent track
    fn start_silence(&self);

    fn stop_silence(&self);

    fn is_silence_playing(&self) -> bool;

    /// Publish position state to the OS media session
    fn set_position_state(&self, position: f64, duration: f64, rate: f64);
}

/// Events emitted by the engine and the element
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    // engine
    Loading,
    Loaded,
    Buffering { buffering: bool },
    TracksChanged,
    TextTrackVisibility,
    VariantChanged,
    Unloading,
    Error { code: u32, message: String },
    /// Any other named engine event
    Other(String),

    // element
    Playing,
    Pause,
    Ended,
    TimeUpdate { current_time: f64, duration: f64 },
    VolumeChange { volume: f64 },
    EnterPip,
    LeavePip,
}

pub type MediaEventSender = mpsc::UnboundedSender<MediaEvent>;
pub type MediaEventReceiver = mpsc::UnboundedReceiver<MediaEvent>;

/// Create the single typed event channel
pub fn media_event_channel() -> (MediaEventSender, MediaEventReceiver) {
    mpsc::unbounded_channel()
}

/// Playability verdict of the video info client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playability {
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Resolved video info
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
    pub video_id: String,
    pub playability: Playability,
    #[serde(default)]
    pub manifest_uri: Option<String>,
    #[serde(default)]
    pub is_live: bool,
    #[serde(default)]
    pub start_seconds: Option<f64>,
}

impl VideoInfo {
    pub fn is_playable(&self) -> bool {
        self.playability.status == "OK"
    }

    pub fn unplayable_reason(&self) -> &str {
        self.playability.reason.as_deref().unwrap_or("Unknown reason")
    }
}

/// Client that resolves a video id into playable info
#[async_trait]
pub trait VideoInfoProvider: Send + Sync {
    async fn fetch_video_info(&self, video_id: &str) -> Result<VideoInfo>;
}
