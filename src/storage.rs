//! Page-local persisted state
//!
//! Keeps the playback volume, the last position of each video and the
//! tunnel endpoint. Backed by a JSON file, or by memory only.

use crate::utils::config::ProxyEndpoint;
use crate::utils::error::Result;
use log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Positions below this are not worth resuming
const MIN_SAVED_POSITION_SECS: f64 = 1.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct StoredState {
    volume: Option<f64>,
    positions: HashMap<String, f64>,
    proxy: Option<ProxyEndpoint>,
}

/// Persisted key/value state
pub struct Storage {
    path: Option<PathBuf>,
    state: Mutex<StoredState>,
}

impl Storage {
    /// Storage that never touches the disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(StoredState::default()),
        }
    }

    /// Open a JSON file, starting empty when it is missing or unreadable
    pub fn open(path: &Path) -> Self {
        let state = match std::fs::read_to_string(path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_else(|e| {
                warn!("Ignoring corrupt state file {:?}: {}", path, e);
                StoredState::default()
            }),
            Err(_) => StoredState::default(),
        };

        Self {
            path: Some(path.to_path_buf()),
            state: Mutex::new(state),
        }
    }

    /// Default state file under the user data directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("kiraplayer").join("state.json"))
    }

    pub fn volume(&self) -> Option<f64> {
        self.state.lock().volume
    }

    pub fn save_volume(&self, volume: f64) {
        if !volume.is_finite() {
            return;
        }
        self.state.lock().volume = Some(volume);
        self.persist();
    }

    /// Last saved position of `video_id`, 0 when unknown
    pub fn position(&self, video_id: &str) -> f64 {
        self.state.lock().positions.get(video_id).copied().unwrap_or(0.0)
    }

    /// Save a position; empty ids and positions under one second are skipped
    pub fn save_position(&self, video_id: &str, seconds: f64) -> bool {
        if video_id.is_empty() || !seconds.is_finite() || seconds < MIN_SAVED_POSITION_SECS {
            return false;
        }
        self.state.lock().positions.insert(video_id.to_string(), seconds);
        self.persist();
        true
    }

    pub fn proxy_endpoint(&self) -> Option<ProxyEndpoint> {
        self.state.lock().proxy.clone()
    }

    pub fn save_proxy_endpoint(&self, endpoint: &ProxyEndpoint) {
        self.state.lock().proxy = Some(endpoint.clone());
        self.persist();
    }

    /// Write the state file; failures are logged and otherwise ignored
    fn persist(&self) {
        if let Err(e) = self.write_to_disk() {
            warn!("Failed to persist player state: {}", e);
        }
    }

    fn write_to_disk(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(&*self.state.lock())?;
        std::fs::write(path, data)?;
        debug!("Persisted player state to {:?}", path);
        Ok(())
    }
}
