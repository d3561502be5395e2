//! Playback state reconciliation for KiraPlayer
//!
//! Turns raw engine and element events into the normalized status stream
//! the host consumes, and applies the derived behaviour that hangs off
//! state transitions: the silence player, ABR recovery, first-time track
//! defaults, progress coalescing and the loading overlay.

use crate::bridge::host::{send_to_app, HostChannel};
use crate::player::controller::PlayerController;
use crate::player::engine::{MediaEvent, MediaEventReceiver};
use crate::protocol::{AppMessage, EngineErrorInfo, PlayerStatus, ProgressState};
use crate::storage::Storage;
use crate::toast::ToastStore;
use crate::utils::error::BridgeError;
use crate::utils::is_meaningful_time;

use log::{debug, error, info};
use parking_lot::Mutex;
use std::future::poll_fn;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::Poll;

/// Delay before the engine retries a failed stream
const STREAMING_RETRY_DELAY_SECS: f64 = 5.0;

/// State of the video currently wired to the engine
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSession {
    /// Video being played
    pub video_id: Option<String>,

    /// Last video whose first `trackschanged` applied default tracks;
    /// survives video changes
    pub first_tracks_handled: Option<String>,

    /// Last reconciled status
    pub status: PlayerStatus,

    /// Position of the last forwarded progress report
    pub last_forwarded_position: Option<f64>,
}

impl Default for PlaybackSession {
    fn default() -> Self {
        Self {
            video_id: None,
            first_tracks_handled: None,
            status: PlayerStatus::Loading,
            last_forwarded_position: None,
        }
    }
}

/// Event-driven state machine between the engine and the host
pub struct PlaybackStateReconciler {
    controller: Arc<PlayerController>,
    host: Arc<dyn HostChannel>,
    storage: Arc<Storage>,
    toasts: Arc<ToastStore>,
    session: Mutex<PlaybackSession>,
    overlay_visible: AtomicBool,
    events: Mutex<Option<MediaEventReceiver>>,
    handling: tokio::sync::Mutex<()>,
}

impl PlaybackStateReconciler {
    pub fn new(
        controller: Arc<PlayerController>,
        host: Arc<dyn HostChannel>,
        storage: Arc<Storage>,
        toasts: Arc<ToastStore>,
    ) -> Self {
        Self {
            controller,
            host,
            storage,
            toasts,
            session: Mutex::new(PlaybackSession::default()),
            overlay_visible: AtomicBool::new(true),
            events: Mutex::new(None),
            handling: tokio::sync::Mutex::new(()),
        }
    }

    pub fn session(&self) -> PlaybackSession {
        self.session.lock().clone()
    }

    pub fn video_id(&self) -> Option<String> {
        self.session.lock().video_id.clone()
    }

    pub fn status(&self) -> PlayerStatus {
        self.session.lock().status
    }

    /// Loading overlay, shown while loading or buffering
    pub fn overlay_visible(&self) -> bool {
        self.overlay_visible.load(Ordering::SeqCst)
    }

    /// Switch the session to a new video and report `loading`
    pub async fn begin_video(&self, video_id: &str) {
        {
            let mut session = self.session.lock();
            session.video_id = Some(video_id.to_string());
            session.last_forwarded_position = None;
        }
        self.transition(PlayerStatus::Loading).await;
    }

    /// Report content the info client refused to play
    pub async fn report_unplayable(&self, reason: &str) {
        error!("Unplayable: {}", reason);
        self.toasts.error("Unplayable video.");
        self.transition(PlayerStatus::VideoNotAvailable).await;
    }

    /// Report a load failure; only terminal failures reach the user
    pub async fn report_load_error(&self, err: &BridgeError) {
        error!("Error loading video: {}", err);
        if err.is_user_visible() {
            self.toasts.error(&format!("Error loading video: {}", err));
        }
        self.transition(PlayerStatus::Error).await;
    }

    /// Consume events until every sender is gone
    pub async fn run(self: Arc<Self>, events: MediaEventReceiver) {
        *self.events.lock() = Some(events);
        while let Some(event) = self.next_event().await {
            let _handling = self.handling.lock().await;
            self.handle(event).await;
        }
        debug!("Media event channel closed");
    }

    async fn next_event(&self) -> Option<MediaEvent> {
        poll_fn(|cx| match self.events.lock().as_mut() {
            Some(events) => events.poll_recv(cx),
            None => Poll::Ready(None),
        })
        .await
    }

    /// Apply every event already queued
    ///
    /// Commands that read event-derived state call this first so they see
    /// events the element fired before the command arrived.
    pub async fn drain_pending(&self) {
        let _handling = self.handling.lock().await;
        loop {
            let event = self.events.lock().as_mut().and_then(|events| events.try_recv().ok());
            let Some(event) = event else {
                break;
            };
            self.handle(event).await;
        }
    }

    /// Apply one event
    pub async fn handle(&self, event: MediaEvent) {
        match event {
            MediaEvent::Loading => self.transition(PlayerStatus::Loading).await,
            MediaEvent::Buffering { buffering } => self.on_buffering(buffering).await,
            MediaEvent::TracksChanged => self.on_tracks_changed().await,
            MediaEvent::Unloading => self.transition(PlayerStatus::Unloading).await,
            MediaEvent::Error { code, message } => self.on_engine_error(code, message).await,
            MediaEvent::Playing => self.on_playing().await,
            MediaEvent::Pause => self.on_pause().await,
            MediaEvent::Ended => self.transition(PlayerStatus::Ended).await,
            MediaEvent::TimeUpdate { current_time, duration } => {
                self.on_time_update(current_time, duration).await
            }
            MediaEvent::VolumeChange { volume } => self.storage.save_volume(volume),
            MediaEvent::EnterPip => self.notify(PlayerStatus::EnterPip).await,
            MediaEvent::LeavePip => self.notify(PlayerStatus::ExitPip).await,
            MediaEvent::Loaded => self.forward_debug("loaded").await,
            MediaEvent::TextTrackVisibility => self.forward_debug("texttrackvisibility").await,
            MediaEvent::VariantChanged => self.forward_debug("variantchanged").await,
            MediaEvent::Other(name) => self.forward_debug(&name).await,
        }
    }

    /// Record `status`, update derived state and tell the host
    async fn transition(&self, status: PlayerStatus) {
        self.session.lock().status = status;
        self.overlay_visible.store(status.shows_overlay(), Ordering::SeqCst);

        if status == PlayerStatus::Playing {
            let element = self.controller.element();
            self.controller.audio().stop_silence();
            self.controller.audio().set_position_state(
                element.current_time(),
                element.duration(),
                element.playback_rate(),
            );
        } else if status.needs_silence() && self.controller.silence_allowed() {
            self.controller.audio().start_silence();
        }
        self.notify(status).await;
    }

    async fn notify(&self, status: PlayerStatus) {
        send_to_app(self.host.as_ref(), &AppMessage::status(status, self.video_id())).await;
    }

    async fn forward_debug(&self, event: &str) {
        let message = AppMessage::Debug {
            event: event.to_string(),
            id: self.video_id(),
        };
        send_to_app(self.host.as_ref(), &message).await;
    }

    async fn on_playing(&self) {
        self.controller.lift_initial_restriction();
        self.controller.record_play();
        self.transition(PlayerStatus::Playing).await;
    }

    async fn on_pause(&self) {
        // Recorded first: the resume heuristic reads it
        self.controller.record_pause();
        if let Some(video_id) = self.video_id() {
            self.controller.save_position(&video_id);
        }
        self.transition(PlayerStatus::Paused).await;
    }

    async fn on_buffering(&self, buffering: bool) {
        if buffering || self.controller.engine().is_buffering() {
            self.controller.recover_abr_if_starved();
            self.transition(PlayerStatus::Buffering).await;
        } else if self.controller.element().paused() {
            self.transition(PlayerStatus::Paused).await;
        } else {
            self.transition(PlayerStatus::Playing).await;
        }
    }

    async fn on_tracks_changed(&self) {
        self.controller.reconcile_caption_visibility();

        let first_for_video = {
            let mut session = self.session.lock();
            if session.video_id.is_some() && session.first_tracks_handled != session.video_id {
                session.first_tracks_handled = session.video_id.clone();
                true
            } else {
                false
            }
        };
        if first_for_video {
            info!("Applying default tracks for {:?}", self.video_id());
            self.controller.apply_default_tracks();
        }

        let message = AppMessage::GetTracks {
            tracks: self.controller.tracks(),
            text_tracks: self.controller.text_tracks(),
            id: self.video_id(),
        };
        send_to_app(self.host.as_ref(), &message).await;
    }

    async fn on_engine_error(&self, code: u32, message: String) {
        error!("Streaming failure {}: {}", code, message);
        self.toasts.error(&format!("Streaming error: {}", message));

        self.session.lock().status = PlayerStatus::Error;
        self.overlay_visible.store(false, Ordering::SeqCst);
        let status = AppMessage::StatusChanged {
            status: PlayerStatus::Error,
            id: self.video_id(),
            error: Some(EngineErrorInfo { code, message }),
        };
        send_to_app(self.host.as_ref(), &status).await;

        if !self.controller.engine().retry_streaming(STREAMING_RETRY_DELAY_SECS) {
            debug!("Engine had nothing to retry");
        }
    }

    async fn on_time_update(&self, current_time: f64, duration: f64) {
        if !current_time.is_finite() {
            return;
        }

        // Live streams report no usable duration; the seekable end stands in
        let duration = if duration.is_finite() && duration > 0.0 {
            duration
        } else {
            let end = self.controller.engine().seek_range().end;
            if !is_meaningful_time(end) {
                return;
            }
            end
        };

        let threshold = self.controller.tuning().progress_threshold_secs;
        {
            let mut session = self.session.lock();
            let due = match session.last_forwarded_position {
                None => true,
                Some(last) => (current_time - last).abs() >= threshold || current_time >= duration,
            };
            if !due {
                return;
            }
            session.last_forwarded_position = Some(current_time);
        }

        self.controller.record_play();
        let message = AppMessage::ProgressChanged {
            state: ProgressState { current_time, duration },
            id: self.video_id(),
        };
        send_to_app(self.host.as_ref(), &message).await;
    }
}
