//! Video load lifecycle
//!
//! Loading a video tears down everything the previous one left running
//! before the new one is wired up, so no stale timer can write state for
//! the wrong video.

use crate::player::controller::PlayerController;
use crate::player::engine::VideoInfoProvider;
use crate::player::preload::PreloadCache;
use crate::player::state::PlaybackStateReconciler;
use crate::utils::error::{BridgeError, Result};

use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Loads videos into the engine
pub struct VideoLoader {
    controller: Arc<PlayerController>,
    reconciler: Arc<PlaybackStateReconciler>,
    info: Arc<dyn VideoInfoProvider>,
    preload: Arc<PreloadCache>,
    timers: Mutex<Vec<JoinHandle<()>>>,
    generation: AtomicU64,
}

impl VideoLoader {
    pub fn new(
        controller: Arc<PlayerController>,
        reconciler: Arc<PlaybackStateReconciler>,
        info: Arc<dyn VideoInfoProvider>,
        preload: Arc<PreloadCache>,
    ) -> Self {
        Self {
            controller,
            reconciler,
            info,
            preload,
            timers: Mutex::new(Vec::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Speculatively fetch info for a video that is not playing yet
    pub fn preload(&self, video_id: &str) -> Option<JoinHandle<()>> {
        self.preload.preload(video_id, Arc::clone(&self.info))
    }

    /// Number of timers owned by the current video
    pub fn active_timers(&self) -> usize {
        self.timers.lock().iter().filter(|t| !t.is_finished()).count()
    }

    /// Load and start `video_id`
    ///
    /// Unplayable content is reported to the host as `videoNotAvailable`
    /// and returned as [`BridgeError::Unplayable`]. A load overtaken by a
    /// newer one stops at its next suspension point and returns `Ok`.
    pub async fn load_video(&self, video_id: &str, start_time: Option<f64>) -> Result<()> {
        if video_id.is_empty() {
            return Ok(());
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Loading video {} (load {})", video_id, generation);

        if let Some(previous) = self.reconciler.video_id() {
            self.controller.save_position(&previous);
        }
        self.cleanup().await;
        if !self.is_current(generation) {
            return Ok(());
        }

        self.reconciler.begin_video(video_id).await;
        self.controller.reset_abr();

        match self.start(video_id, start_time, generation).await {
            Ok(()) => Ok(()),
            Err(BridgeError::Superseded(video_id)) => {
                debug!("Abandoning load of {}", video_id);
                Ok(())
            }
            Err(_) if !self.is_current(generation) => Ok(()),
            Err(BridgeError::Unplayable(reason)) => {
                self.reconciler.report_unplayable(&reason).await;
                Err(BridgeError::Unplayable(reason))
            }
            Err(e) => {
                self.reconciler.report_load_error(&e).await;
                Err(e)
            }
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn ensure_current(&self, generation: u64, video_id: &str) -> Result<()> {
        if self.is_current(generation) {
            Ok(())
        } else {
            Err(BridgeError::Superseded(video_id.to_string()))
        }
    }

    async fn start(&self, video_id: &str, start_time: Option<f64>, generation: u64) -> Result<()> {
        let info = match self.preload.get(video_id) {
            Some(info) => {
                debug!("Using preloaded info for {}", video_id);
                info
            }
            None => self.info.fetch_video_info(video_id).await?,
        };
        self.ensure_current(generation, video_id)?;

        if !info.is_playable() {
            return Err(BridgeError::Unplayable(info.unplayable_reason().to_string()));
        }

        let manifest = info
            .manifest_uri
            .as_deref()
            .ok_or_else(|| BridgeError::Engine("Could not find a valid manifest URI.".to_string()))?;
        let start_time = if info.is_live {
            None
        } else {
            start_time.or(info.start_seconds)
        };

        self.controller.apply_saved_volume();
        self.controller
            .engine()
            .load(manifest, start_time)
            .await
            .map_err(|e| BridgeError::StreamingFailure(e.to_string()))?;
        self.ensure_current(generation, video_id)?;
        self.controller.play().await?;

        self.start_saving_position(video_id, generation)
    }

    /// Save the position periodically while playing
    fn start_saving_position(&self, video_id: &str, generation: u64) -> Result<()> {
        // Checked under the timer lock so a concurrent cleanup cannot miss it
        let mut timers = self.timers.lock();
        self.ensure_current(generation, video_id)?;

        let controller = Arc::clone(&self.controller);
        let video_id = video_id.to_string();
        let period = Duration::from_millis(self.controller.tuning().save_position_interval_ms);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                if !controller.element().paused() {
                    controller.save_position(&video_id);
                }
            }
        });
        timers.push(handle);
        Ok(())
    }

    /// Tear down the previous video
    pub async fn cleanup(&self) {
        for timer in self.timers.lock().drain(..) {
            timer.abort();
        }

        let engine = self.controller.engine();
        if let Err(e) = engine.unload().await {
            warn!("Engine unload failed: {}", e);
        }
        engine.clear_network_filters();
    }

    /// Save the position and tear down; used when the page goes away
    pub async fn shutdown(&self) {
        if let Some(video_id) = self.reconciler.video_id() {
            self.controller.save_position(&video_id);
        }
        self.cleanup().await;
    }
}
