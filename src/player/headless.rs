//! Headless media engine
//!
//! An in-process stand-in for the streaming engine, the video element and
//! the audio session. It keeps their observable state, emits the matching
//! [`MediaEvent`]s and records the calls made on it, which makes it the
//! engine of the stdio binary and of the test suites.

use crate::player::engine::{
    AudioSession, EngineSetting, EngineStats, MediaElement, MediaEvent, MediaEventSender, Playability,
    SeekRange, StreamingEngine, TextTrack, VariantTrack, VideoInfo, VideoInfoProvider,
};
use crate::utils::error::{BridgeError, Result};
use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug)]
struct HeadlessState {
    manifest: Option<String>,
    variants: Vec<VariantTrack>,
    text_tracks: Vec<TextTrack>,
    text_visible: bool,
    abr_enabled: bool,
    abr_max_height: Option<u32>,
    preferred_language: Option<String>,
    stats: EngineStats,
    seek_range: SeekRange,
    buffering: bool,

    paused: bool,
    current_time: f64,
    duration: f64,
    volume: f64,
    rate: f64,
    looping: bool,
    in_pip: bool,
    autoplay_allowed: bool,

    silence: bool,
    position_state: Option<(f64, f64, f64)>,

    play_calls: usize,
    pause_calls: usize,
    unload_calls: usize,
    filter_clears: usize,
    retries: usize,
    selected_variants: Vec<u64>,
}

impl Default for HeadlessState {
    fn default() -> Self {
        Self {
            manifest: None,
            variants: Vec::new(),
            text_tracks: Vec::new(),
            text_visible: false,
            abr_enabled: true,
            abr_max_height: None,
            preferred_language: None,
            stats: EngineStats::default(),
            seek_range: SeekRange::default(),
            buffering: false,
            paused: true,
            current_time: 0.0,
            duration: f64::NAN,
            volume: 1.0,
            rate: 1.0,
            looping: false,
            in_pip: false,
            autoplay_allowed: true,
            silence: false,
            position_state: None,
            play_calls: 0,
            pause_calls: 0,
            unload_calls: 0,
            filter_clears: 0,
            retries: 0,
            selected_variants: Vec::new(),
        }
    }
}

/// Engine, element and audio session in one object
pub struct HeadlessEngine {
    events: MediaEventSender,
    state: Mutex<HeadlessState>,
}

impl HeadlessEngine {
    pub fn new(events: MediaEventSender) -> Self {
        Self {
            events,
            state: Mutex::new(HeadlessState::default()),
        }
    }

    /// Push an event as if the engine or the element fired it
    pub fn emit(&self, event: MediaEvent) {
        if self.events.send(event).is_err() {
            debug!("Media event dropped, no subscriber");
        }
    }

    pub fn set_variant_tracks(&self, tracks: Vec<VariantTrack>) {
        self.state.lock().variants = tracks;
    }

    pub fn set_text_tracks(&self, tracks: Vec<TextTrack>) {
        self.state.lock().text_tracks = tracks;
    }

    pub fn set_stats(&self, stats: EngineStats) {
        self.state.lock().stats = stats;
    }

    pub fn set_seek_range(&self, range: SeekRange) {
        self.state.lock().seek_range = range;
    }

    pub fn set_duration(&self, duration: f64) {
        self.state.lock().duration = duration;
    }

    pub fn set_autoplay_allowed(&self, allowed: bool) {
        self.state.lock().autoplay_allowed = allowed;
    }

    /// Report a buffering change the way the engine would
    pub fn set_buffering(&self, buffering: bool) {
        self.state.lock().buffering = buffering;
        self.emit(MediaEvent::Buffering { buffering });
    }

    pub fn manifest(&self) -> Option<String> {
        self.state.lock().manifest.clone()
    }

    pub fn abr_enabled(&self) -> bool {
        self.state.lock().abr_enabled
    }

    pub fn abr_max_height(&self) -> Option<u32> {
        self.state.lock().abr_max_height
    }

    pub fn preferred_language(&self) -> Option<String> {
        self.state.lock().preferred_language.clone()
    }

    pub fn position_state(&self) -> Option<(f64, f64, f64)> {
        self.state.lock().position_state
    }

    pub fn play_calls(&self) -> usize {
        self.state.lock().play_calls
    }

    pub fn pause_calls(&self) -> usize {
        self.state.lock().pause_calls
    }

    pub fn unload_calls(&self) -> usize {
        self.state.lock().unload_calls
    }

    pub fn filter_clears(&self) -> usize {
        self.state.lock().filter_clears
    }

    pub fn retries(&self) -> usize {
        self.state.lock().retries
    }

    pub fn selected_variants(&self) -> Vec<u64> {
        self.state.lock().selected_variants.clone()
    }
}

#[async_trait]
impl StreamingEngine for HeadlessEngine {
    async fn load(&self, manifest_uri: &str, start_time: Option<f64>) -> Result<()> {
        self.emit(MediaEvent::Loading);
        {
            let mut state = self.state.lock();
            state.manifest = Some(manifest_uri.to_string());
            state.current_time = start_time.unwrap_or(0.0);
        }
        self.emit(MediaEvent::Loaded);
        self.emit(MediaEvent::TracksChanged);
        Ok(())
    }

    async fn unload(&self) -> Result<()> {
        let had_manifest = {
            let mut state = self.state.lock();
            state.unload_calls += 1;
            state.paused = true;
            state.current_time = 0.0;
            state.manifest.take().is_some()
        };
        if had_manifest {
            self.emit(MediaEvent::Unloading);
        }
        Ok(())
    }

    fn configure(&self, setting: EngineSetting) {
        let mut state = self.state.lock();
        match setting {
            EngineSetting::AbrEnabled(enabled) => state.abr_enabled = enabled,
            EngineSetting::AbrMaxHeight(height) => state.abr_max_height = height,
            EngineSetting::PreferredAudioLanguage(language) => state.preferred_language = Some(language),
        }
    }

    fn variant_tracks(&self) -> Vec<VariantTrack> {
        self.state.lock().variants.clone()
    }

    fn text_tracks(&self) -> Vec<TextTrack> {
        self.state.lock().text_tracks.clone()
    }

    fn select_variant_track(&self, id: u64, _clear_buffer: bool) {
        {
            let mut state = self.state.lock();
            state.selected_variants.push(id);
            for track in state.variants.iter_mut() {
                track.active = track.id == id;
            }
        }
        self.emit(MediaEvent::VariantChanged);
    }

    fn select_text_track(&self, id: u64) {
        let mut state = self.state.lock();
        for track in state.text_tracks.iter_mut() {
            track.active = track.id == id;
        }
    }

    fn set_text_track_visibility(&self, visible: bool) {
        let changed = {
            let mut state = self.state.lock();
            let changed = state.text_visible != visible;
            state.text_visible = visible;
            changed
        };
        if changed {
            self.emit(MediaEvent::TextTrackVisibility);
        }
    }

    fn is_text_track_visible(&self) -> bool {
        self.state.lock().text_visible
    }

    fn is_buffering(&self) -> bool {
        self.state.lock().buffering
    }

    fn stats(&self) -> EngineStats {
        self.state.lock().stats
    }

    fn seek_range(&self) -> SeekRange {
        self.state.lock().seek_range
    }

    fn clear_network_filters(&self) {
        self.state.lock().filter_clears += 1;
    }

    fn retry_streaming(&self, _delay_secs: f64) -> bool {
        let mut state = self.state.lock();
        state.retries += 1;
        state.manifest.is_some()
    }
}

#[async_trait]
impl MediaElement for HeadlessEngine {
    async fn play(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.play_calls += 1;
            if !state.autoplay_allowed {
                return Err(BridgeError::AutoplayBlocked);
            }
            state.paused = false;
        }
        self.emit(MediaEvent::Playing);
        Ok(())
    }

    fn pause(&self) {
        let was_playing = {
            let mut state = self.state.lock();
            state.pause_calls += 1;
            !std::mem::replace(&mut state.paused, true)
        };
        if was_playing {
            self.emit(MediaEvent::Pause);
        }
    }

    fn paused(&self) -> bool {
        self.state.lock().paused
    }

    fn current_time(&self) -> f64 {
        self.state.lock().current_time
    }

    fn set_current_time(&self, seconds: f64) {
        self.state.lock().current_time = seconds;
    }

    fn duration(&self) -> f64 {
        self.state.lock().duration
    }

    fn volume(&self) -> f64 {
        self.state.lock().volume
    }

    fn set_volume(&self, volume: f64) {
        self.state.lock().volume = volume;
        self.emit(MediaEvent::VolumeChange { volume });
    }

    fn playback_rate(&self) -> f64 {
        self.state.lock().rate
    }

    fn set_playback_rate(&self, rate: f64) {
        self.state.lock().rate = rate;
    }

    fn looping(&self) -> bool {
        self.state.lock().looping
    }

    fn set_looping(&self, enable: bool) {
        self.state.lock().looping = enable;
    }

    fn in_pip(&self) -> bool {
        self.state.lock().in_pip
    }

    async fn request_pip(&self) -> Result<()> {
        self.state.lock().in_pip = true;
        self.emit(MediaEvent::EnterPip);
        Ok(())
    }

    async fn exit_pip(&self) -> Result<()> {
        self.state.lock().in_pip = false;
        self.emit(MediaEvent::LeavePip);
        Ok(())
    }
}

impl AudioSession for HeadlessEngine {
    fn start_silence(&self) {
        self.state.lock().silence = true;
    }

    fn stop_silence(&self) {
        self.state.lock().silence = false;
    }

    fn is_silence_playing(&self) -> bool {
        self.state.lock().silence
    }

    fn set_position_state(&self, position: f64, duration: f64, rate: f64) {
        self.state.lock().position_state = Some((position, duration, rate));
    }
}

/// Video info provider answering from a fixed table
#[derive(Debug, Default)]
pub struct StaticVideoInfo {
    videos: Mutex<HashMap<String, VideoInfo>>,
    requests: Mutex<Vec<String>>,
}

impl StaticVideoInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, info: VideoInfo) {
        self.videos.lock().insert(info.video_id.clone(), info);
    }

    /// Register a playable on-demand video
    pub fn insert_playable(&self, video_id: &str, manifest_uri: &str) {
        self.insert(VideoInfo {
            video_id: video_id.to_string(),
            playability: Playability {
                status: "OK".to_string(),
                reason: None,
            },
            manifest_uri: Some(manifest_uri.to_string()),
            is_live: false,
            start_seconds: None,
        });
    }

    /// Ids requested so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl VideoInfoProvider for StaticVideoInfo {
    async fn fetch_video_info(&self, video_id: &str) -> Result<VideoInfo> {
        self.requests.lock().push(video_id.to_string());
        self.videos
            .lock()
            .get(video_id)
            .cloned()
            .ok_or_else(|| BridgeError::Unplayable(format!("Unknown video {}", video_id)))
    }
}
