//! Player module for KiraPlayer
//!
//! This module sits between the host protocol and the external media
//! engine. The controller maps app verbs onto the engine, the reconciler
//! turns engine events into the host's status stream, and the loader owns
//! the per-video lifecycle.

pub mod controller;
pub mod engine;
pub mod headless;
pub mod preload;
pub mod session;
pub mod state;
pub mod tracks;

pub use controller::{PlayHistory, PlayerController};
pub use engine::{
    media_event_channel, AudioSession, EngineSetting, EngineStats, MediaElement, MediaEvent, MediaEventReceiver,
    MediaEventSender, Playability, SeekRange, StreamingEngine, TextTrack, VariantTrack, VideoInfo,
    VideoInfoProvider,
};
pub use headless::{HeadlessEngine, StaticVideoInfo};
pub use preload::PreloadCache;
pub use session::VideoLoader;
pub use state::{PlaybackSession, PlaybackStateReconciler};
