//! Player controller implementation for KiraPlayer
//!
//! The PlayerController maps app-level verbs onto the streaming engine and
//! the video element, and owns the derived behaviour around them: the
//! resume heuristic, ads gating, track selection and PiP toggling.

use crate::player::engine::{AudioSession, EngineSetting, MediaElement, StreamingEngine};
use crate::player::tracks::{list_text_tracks, list_variant_tracks, pick_text_track, pick_variant};
use crate::protocol::{PlayerSetting, TextTrackInfo, TrackInfo};
use crate::storage::Storage;
use crate::toast::ToastStore;
use crate::utils::clock::Clock;
use crate::utils::config::PlayerTuning;
use crate::utils::error::{BridgeError, Result};
use crate::utils::{clamp, is_meaningful_time};

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Timestamps of the last play/pause transitions, in epoch milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayHistory {
    pub last_play: Option<u64>,
    pub last_pause: Option<u64>,
}

/// Main player controller
pub struct PlayerController {
    // Collaborators
    engine: Arc<dyn StreamingEngine>,
    element: Arc<dyn MediaElement>,
    audio: Arc<dyn AudioSession>,
    clock: Arc<dyn Clock>,
    storage: Arc<Storage>,
    toasts: Arc<ToastStore>,
    tuning: PlayerTuning,

    // Shared state, last write wins
    showing_ads: AtomicBool,
    pip_busy: AtomicBool,
    history: Mutex<PlayHistory>,
    setting: RwLock<PlayerSetting>,

    /// Caption visibility the host asked for last
    requested_text_visibility: Mutex<Option<bool>>,
}

impl PlayerController {
    pub fn new(
        engine: Arc<dyn StreamingEngine>,
        element: Arc<dyn MediaElement>,
        audio: Arc<dyn AudioSession>,
        clock: Arc<dyn Clock>,
        storage: Arc<Storage>,
        toasts: Arc<ToastStore>,
        tuning: PlayerTuning,
    ) -> Self {
        Self {
            engine,
            element,
            audio,
            clock,
            storage,
            toasts,
            tuning,
            showing_ads: AtomicBool::new(false),
            pip_busy: AtomicBool::new(false),
            history: Mutex::new(PlayHistory::default()),
            setting: RwLock::new(PlayerSetting::default()),
            requested_text_visibility: Mutex::new(None),
        }
    }

    pub fn engine(&self) -> &Arc<dyn StreamingEngine> {
        &self.engine
    }

    pub fn element(&self) -> &Arc<dyn MediaElement> {
        &self.element
    }

    pub fn audio(&self) -> &Arc<dyn AudioSession> {
        &self.audio
    }

    pub fn tuning(&self) -> &PlayerTuning {
        &self.tuning
    }

    // --- Playback -------------------------------------------------------

    /// Start playback unless an ad is showing
    ///
    /// An autoplay rejection is reported as an info toast and is not an error.
    pub async fn play(&self) -> Result<()> {
        if self.is_showing_ads() {
            debug!("Ignoring play while an ad is showing");
            return Ok(());
        }

        match self.element.play().await {
            Ok(()) => Ok(()),
            Err(BridgeError::AutoplayBlocked) => {
                warn!("Autoplay was prevented by the platform");
                self.toasts.info("Autoplay was prevented by the browser.");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub fn pause(&self) {
        self.element.pause();
    }

    /// Play when paused, pause when playing
    pub async fn toggle_play(&self) -> Result<()> {
        if self.element.paused() {
            self.play().await
        } else {
            self.pause();
            Ok(())
        }
    }

    /// Seek to an absolute position in seconds
    pub fn seek_to(&self, seconds: f64) -> Result<()> {
        if !seconds.is_finite() {
            return Err(BridgeError::InvalidInput(format!("Invalid seek position: {}", seconds)));
        }
        self.element.set_current_time(seconds.max(0.0));
        Ok(())
    }

    /// Set and persist the volume (clamped to 0.0..=1.0)
    pub fn set_volume(&self, volume: f64) -> Result<()> {
        if !volume.is_finite() {
            return Err(BridgeError::InvalidInput(format!("Invalid volume: {}", volume)));
        }
        let volume = clamp(volume, 0.0, 1.0);
        self.element.set_volume(volume);
        self.storage.save_volume(volume);
        Ok(())
    }

    /// Apply the persisted volume, or the configured default
    pub fn apply_saved_volume(&self) {
        let volume = self.storage.volume().unwrap_or(self.tuning.default_volume);
        self.element.set_volume(clamp(volume, 0.0, 1.0));
    }

    pub fn set_speed(&self, speed: f64) -> Result<()> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(BridgeError::InvalidInput(format!("Invalid playback speed: {}", speed)));
        }
        self.element.set_playback_rate(speed);
        Ok(())
    }

    pub fn set_loop(&self, enable: bool) {
        self.element.set_looping(enable);
    }

    /// Save the current position of `video_id`
    pub fn save_position(&self, video_id: &str) -> bool {
        self.storage.save_position(video_id, self.element.current_time())
    }

    // --- Ads gating -----------------------------------------------------

    pub fn is_showing_ads(&self) -> bool {
        self.showing_ads.load(Ordering::SeqCst)
    }

    /// Showing an ad pauses and silences the player; clearing the flag
    /// resumes playback once
    pub async fn set_showing_ads(&self, showing: bool) -> Result<()> {
        let was_showing = self.showing_ads.swap(showing, Ordering::SeqCst);

        if showing {
            info!("Ad showing, pausing playback");
            self.element.pause();
            self.audio.stop_silence();
        } else if was_showing {
            info!("Ad finished, resuming playback");
            self.play().await?;
        }
        Ok(())
    }

    /// The silence player is disabled while an ad is showing
    pub fn silence_allowed(&self) -> bool {
        !self.is_showing_ads()
    }

    // --- Resume heuristic -----------------------------------------------

    pub fn record_play(&self) {
        self.history.lock().last_play = Some(self.clock.now_ms());
    }

    pub fn record_pause(&self) {
        self.history.lock().last_pause = Some(self.clock.now_ms());
    }

    pub fn play_history(&self) -> PlayHistory {
        *self.history.lock()
    }

    /// Resume after a transient interruption
    ///
    /// A pause younger than the resume window is treated as caused by the
    /// OS rather than the user. Returns whether play was issued.
    pub async fn resume_if_interrupted(&self) -> Result<bool> {
        let Some(last_pause) = self.history.lock().last_pause else {
            return Ok(false);
        };

        let elapsed = self.clock.now_ms().saturating_sub(last_pause);
        debug!("{} ms since last pause", elapsed);
        if elapsed < self.tuning.resume_window_ms {
            self.play().await?;
            return Ok(true);
        }
        Ok(false)
    }

    // --- Tracks ---------------------------------------------------------

    pub fn player_setting(&self) -> PlayerSetting {
        self.setting.read().clone()
    }

    pub fn set_player_setting(&self, setting: PlayerSetting) {
        *self.setting.write() = setting;
    }

    /// One entry per resolution, ascending
    pub fn tracks(&self) -> Vec<TrackInfo> {
        list_variant_tracks(&self.engine.variant_tracks(), &self.tuning.excluded_codec)
    }

    pub fn text_tracks(&self) -> Vec<TextTrackInfo> {
        list_text_tracks(&self.engine.text_tracks())
    }

    /// Explicit quality choice from the host; remembered as the default
    pub fn select_track(&self, height: u32, language: Option<&str>) -> bool {
        {
            let mut setting = self.setting.write();
            setting.default_height = height;
            if let Some(language) = language {
                setting.language = Some(language.to_string());
            }
        }
        self.apply_track_selection(height, language)
    }

    /// Select the best variant for `height`
    ///
    /// ABR is disabled whenever a variant matches, including when that
    /// variant is already active, so the choice sticks. Returns whether the
    /// active variant changed; `false` does not mean the engine was left
    /// untouched.
    pub fn apply_track_selection(&self, height: u32, language: Option<&str>) -> bool {
        let tracks = self.engine.variant_tracks();
        let Some(track) = pick_variant(&tracks, height, language, &self.tuning.excluded_codec) else {
            debug!("No {}p variant to select", height);
            return false;
        };

        self.engine.configure(EngineSetting::AbrEnabled(false));
        if track.active {
            return false;
        }

        info!("Selecting variant {} ({}p, {})", track.id, track.height, track.language);
        self.engine.select_variant_track(track.id, true);
        true
    }

    /// Apply the persisted quality and language
    pub fn apply_default_tracks(&self) -> bool {
        let setting = self.player_setting();
        self.apply_track_selection(setting.default_height, setting.language.as_deref())
    }

    /// Show captions in `language`, or hide them for `None`
    pub fn set_text_track(&self, language: Option<&str>) -> bool {
        let Some(language) = language else {
            *self.requested_text_visibility.lock() = Some(false);
            self.engine.set_text_track_visibility(false);
            return true;
        };

        let tracks = self.engine.text_tracks();
        match pick_text_track(&tracks, language) {
            Some(track) => {
                self.engine.select_text_track(track.id);
                *self.requested_text_visibility.lock() = Some(true);
                self.engine.set_text_track_visibility(true);
                true
            }
            None => {
                warn!("No caption track for language {}", language);
                false
            }
        }
    }

    /// Restore the caption visibility the host asked for last
    pub fn reconcile_caption_visibility(&self) {
        let Some(wanted) = *self.requested_text_visibility.lock() else {
            return;
        };
        if self.engine.is_text_track_visible() != wanted {
            self.engine.set_text_track_visibility(wanted);
        }
    }

    // --- ABR ------------------------------------------------------------

    /// Re-enable ABR when the estimated bandwidth cannot sustain the
    /// current stream
    pub fn recover_abr_if_starved(&self) -> bool {
        let stats = self.engine.stats();
        if stats.stream_bandwidth > 0.0
            && stats.estimated_bandwidth < stats.stream_bandwidth * self.tuning.abr_recovery_ratio
        {
            info!(
                "Bandwidth {:.0} below {:.0}% of stream {:.0}, re-enabling ABR",
                stats.estimated_bandwidth,
                self.tuning.abr_recovery_ratio * 100.0,
                stats.stream_bandwidth
            );
            self.engine.configure(EngineSetting::AbrEnabled(true));
            return true;
        }
        false
    }

    /// Drop the start-up height cap once playback runs
    pub fn lift_initial_restriction(&self) {
        self.engine.configure(EngineSetting::AbrMaxHeight(None));
    }

    /// Default engine configuration for a new video
    pub fn reset_abr(&self) {
        self.engine.configure(EngineSetting::PreferredAudioLanguage(
            self.tuning.preferred_audio_language.clone(),
        ));
        self.engine.configure(EngineSetting::AbrEnabled(true));
        self.engine
            .configure(EngineSetting::AbrMaxHeight(Some(self.tuning.initial_max_height)));
    }

    // --- Picture in picture ---------------------------------------------

    /// Enter or leave PiP; ignored while a previous toggle is in flight
    pub async fn toggle_pip(&self) -> Result<()> {
        if self
            .pip_busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("PiP toggle already in progress");
            return Ok(());
        }

        let result = if self.element.in_pip() {
            self.element.exit_pip().await
        } else if is_meaningful_time(self.element.current_time()) {
            self.element.request_pip().await
        } else {
            debug!("Not entering PiP before playback has a position");
            Ok(())
        };

        self.pip_busy.store(false, Ordering::SeqCst);
        result
    }
}
