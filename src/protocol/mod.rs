//! Wire protocol between the host and the page
//!
//! Every message is a JSON object whose `cmd` field names the variant.
//! Host-to-page commands deserialize into [`HostCommand`]; page-to-host
//! notifications serialize from [`AppMessage`]; page-to-host calls that
//! expect a reply serialize from [`AppRequest`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Commands sent by the host
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
pub enum HostCommand {
    AppLifecycleState {
        state: LifecycleState,
        #[serde(default, rename = "isAndroid")]
        is_android: bool,
    },
    Controller {
        action: ControllerAction,
        #[serde(default)]
        data: Option<Value>,
    },
    PreLoadVideo {
        #[serde(rename = "videoId")]
        video_id: String,
    },
    LoadVideo {
        #[serde(rename = "videoId")]
        video_id: String,
        #[serde(default, rename = "startTime")]
        start_time: Option<f64>,
    },
    GetTracks,
    SelectTrack {
        height: u32,
        #[serde(default)]
        language: Option<String>,
    },
    GetTextTracks,
    SetTextTrack {
        #[serde(default)]
        language: Option<String>,
    },
    SelectSpeed {
        speed: f64,
    },
    SetLoop {
        #[serde(alias = "loop")]
        enable: bool,
    },
    EnablePip,
    Volume {
        volume: f64,
    },
    ShowingAds {
        #[serde(alias = "isShowingAds")]
        showing: bool,
    },
    TestWebMessage,
    #[serde(other)]
    Unknown,
}

/// Host application lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LifecycleState {
    Paused,
    Resumed,
    Inactive,
    Detached,
    Hidden,
    #[serde(other)]
    Other,
}

/// Actions of the `controller` command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ControllerAction {
    Play,
    Pause,
    SeekTo,
    #[serde(other)]
    Unknown,
}

/// Normalized player status reported to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlayerStatus {
    #[serde(rename = "loading")]
    Loading,
    #[serde(rename = "buffering")]
    Buffering,
    #[serde(rename = "playing")]
    Playing,
    #[serde(rename = "paused")]
    Paused,
    #[serde(rename = "ended")]
    Ended,
    #[serde(rename = "unloading")]
    Unloading,
    #[serde(rename = "enterPIP")]
    EnterPip,
    #[serde(rename = "exitPIP")]
    ExitPip,
    #[serde(rename = "trackschanged")]
    TracksChanged,
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "videoNotAvailable")]
    VideoNotAvailable,
    #[serde(rename = "debug")]
    Debug,
}

impl PlayerStatus {
    /// Whether the loading overlay is shown in this state
    pub fn shows_overlay(self) -> bool {
        matches!(self, PlayerStatus::Loading | PlayerStatus::Buffering)
    }

    /// States in which the main element is silent and the background
    /// audio session must be held open
    pub fn needs_silence(self) -> bool {
        matches!(
            self,
            PlayerStatus::Ended | PlayerStatus::Paused | PlayerStatus::Buffering | PlayerStatus::Unloading
        )
    }
}

/// Current position as reported to the host
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressState {
    pub current_time: f64,
    pub duration: f64,
}

/// One user-facing resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub id: u64,
    pub height: u32,
    pub width: u32,
    pub bandwidth: u64,
    pub label: String,
    pub active: bool,
}

/// One caption track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextTrackInfo {
    pub id: u64,
    pub language: String,
    pub label: Option<String>,
    pub kind: String,
    pub active: bool,
}

/// Engine error details forwarded verbatim with an `error` status
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineErrorInfo {
    pub code: u32,
    pub message: String,
}

/// Notifications sent to the host
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
pub enum AppMessage {
    StatusChanged {
        status: PlayerStatus,
        id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<EngineErrorInfo>,
    },
    ProgressChanged {
        state: ProgressState,
        id: Option<String>,
    },
    GetTracks {
        tracks: Vec<TrackInfo>,
        #[serde(rename = "textTracks")]
        text_tracks: Vec<TextTrackInfo>,
        id: Option<String>,
    },
    Debug {
        event: String,
        id: Option<String>,
    },
    SupportWebMessage {
        support: bool,
    },
}

impl AppMessage {
    pub fn status(status: PlayerStatus, id: Option<String>) -> Self {
        AppMessage::StatusChanged { status, id, error: None }
    }
}

/// Calls to the host that expect a reply
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "cmd", rename_all = "camelCase")]
pub enum AppRequest {
    InitEnv,
    CheckProxy,
    Proxy(ProxyHttpRequest),
}

/// Reply to `initEnv`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EnvInfo {
    pub use_web_message: bool,
    pub inject_proxy: bool,
    pub player_setting: PlayerSetting,
    pub is_android: bool,
    #[serde(rename = "isIOS")]
    pub is_ios: bool,
}

/// Reply to `checkProxy`
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProxyStatus {
    pub running: bool,
}

/// Persisted host preference used for default track selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlayerSetting {
    pub language: Option<String>,
    pub default_height: u32,
}

impl Default for PlayerSetting {
    fn default() -> Self {
        Self {
            language: None,
            default_height: 720,
        }
    }
}

/// A tunneled HTTP request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyHttpRequest {
    pub id: u32,
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub body_base64: Option<String>,
}

/// How the body of a [`ProxyHttpResponse`] is carried
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BodyType {
    Base64,
    WebMessage,
    #[default]
    #[serde(other)]
    Plain,
}

/// The host's answer to a [`ProxyHttpRequest`]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyHttpResponse {
    pub id: u32,
    pub status: u16,
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub body_type: BodyType,
    #[serde(default)]
    pub status_text: Option<String>,
}

/// Hosts send `null` for absent fields as often as they omit them
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
