//! Single-slot preload cache for video info

use crate::player::engine::{VideoInfo, VideoInfoProvider};
use log::{debug, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
struct PreloadSlot {
    video_id: Option<String>,
    response: Option<VideoInfo>,
}

/// Remembers the info of one upcoming video
#[derive(Debug, Default)]
pub struct PreloadCache {
    slot: Mutex<PreloadSlot>,
}

impl PreloadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `video_id`; false when it already names that id
    pub fn begin(&self, video_id: &str) -> bool {
        let mut slot = self.slot.lock();
        if slot.video_id.as_deref() == Some(video_id) {
            return false;
        }
        slot.video_id = Some(video_id.to_string());
        slot.response = None;
        true
    }

    /// Store a finished fetch if the slot still names its video
    pub fn fulfil(&self, video_id: &str, info: VideoInfo) -> bool {
        let mut slot = self.slot.lock();
        if slot.video_id.as_deref() != Some(video_id) {
            debug!("Preload of {} superseded", video_id);
            return false;
        }
        slot.response = Some(info);
        true
    }

    /// Cached info for `video_id`, if the fetch has finished
    pub fn get(&self, video_id: &str) -> Option<VideoInfo> {
        let slot = self.slot.lock();
        if slot.video_id.as_deref() == Some(video_id) {
            slot.response.clone()
        } else {
            None
        }
    }

    /// Start fetching `video_id` in the background
    pub fn preload(
        self: &Arc<Self>,
        video_id: &str,
        provider: Arc<dyn VideoInfoProvider>,
    ) -> Option<JoinHandle<()>> {
        if video_id.is_empty() || !self.begin(video_id) {
            return None;
        }

        let cache = Arc::clone(self);
        let video_id = video_id.to_string();
        Some(tokio::spawn(async move {
            match provider.fetch_video_info(&video_id).await {
                Ok(info) => {
                    if cache.fulfil(&video_id, info) {
                        debug!("Preloaded {}", video_id);
                    }
                }
                Err(e) => warn!("Preload of {} failed: {}", video_id, e),
            }
        }))
    }
}
