//! Integration test utilities for KiraPlayer
//!
//! Scripted doubles for the host channel, the direct fetch path and the
//! binary message port, plus a harness that wires them into a full
//! [`AppPlayerContext`] with a headless engine and a manual clock.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::{BufMut, Bytes, BytesMut};
use kiraplayer::bridge::{BinarySideChannel, FetchRequest, FetchResponse, Fetcher, HostChannel, WebMessagePort};
use kiraplayer::player::{media_event_channel, HeadlessEngine, StaticVideoInfo};
use kiraplayer::protocol::{AppMessage, AppRequest, ProxyHttpRequest};
use kiraplayer::storage::Storage;
use kiraplayer::utils::clock::ManualClock;
use kiraplayer::utils::config::Config;
use kiraplayer::{AppPlayerContext, BridgeError, CommandDispatcher, Result};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Start of the manual clock in every harness
pub const CLOCK_START_MS: u64 = 1_700_000_000_000;

/// How the scripted host answers a tunneled request
#[derive(Debug, Clone)]
pub enum ProxyReply {
    /// Reply with `body` encoded as base64
    Base64 { status: u16, body: Vec<u8> },
    /// Reply with `bodyType: webMessage` and push `body` over the side channel
    WebMessage { status: u16, body: Vec<u8> },
    /// Reply with a plain text body
    Plain { status: u16, body: String },
    /// Reply with an explicit id, ignoring the request's
    WrongId { id: u32 },
    /// Fail the call
    Fail(String),
}

type Responder = Box<dyn Fn(&ProxyHttpRequest) -> ProxyReply + Send + Sync>;

/// Host channel double with scripted replies
pub struct ScriptedHost {
    env: Mutex<Value>,
    proxy_running: Mutex<bool>,
    responder: Mutex<Responder>,
    side_channel: Mutex<Option<Arc<BinarySideChannel>>>,
    jitter: Mutex<bool>,
    posted: Mutex<Vec<AppMessage>>,
    proxied: Mutex<Vec<ProxyHttpRequest>>,
    check_proxy_calls: Mutex<usize>,
}

impl ScriptedHost {
    pub fn new(env: Value) -> Self {
        Self {
            env: Mutex::new(env),
            proxy_running: Mutex::new(false),
            responder: Mutex::new(Box::new(echo_url)),
            side_channel: Mutex::new(None),
            jitter: Mutex::new(false),
            posted: Mutex::new(Vec::new()),
            proxied: Mutex::new(Vec::new()),
            check_proxy_calls: Mutex::new(0),
        }
    }

    pub fn set_proxy_running(&self, running: bool) {
        *self.proxy_running.lock() = running;
    }

    pub fn set_responder(&self, responder: impl Fn(&ProxyHttpRequest) -> ProxyReply + Send + Sync + 'static) {
        *self.responder.lock() = Box::new(responder);
    }

    /// Delay replies by a few milliseconds depending on the request id so
    /// concurrent requests complete out of order
    pub fn set_jitter(&self, jitter: bool) {
        *self.jitter.lock() = jitter;
    }

    pub fn attach_side_channel(&self, channel: Arc<BinarySideChannel>) {
        *self.side_channel.lock() = Some(channel);
    }

    pub fn posted(&self) -> Vec<AppMessage> {
        self.posted.lock().clone()
    }

    pub fn proxied(&self) -> Vec<ProxyHttpRequest> {
        self.proxied.lock().clone()
    }

    pub fn check_proxy_calls(&self) -> usize {
        *self.check_proxy_calls.lock()
    }

    /// Status notifications in the order they were posted
    pub fn statuses(&self) -> Vec<String> {
        self.posted
            .lock()
            .iter()
            .filter_map(|m| match m {
                AppMessage::StatusChanged { status, .. } => {
                    serde_json::to_value(status).ok()?.as_str().map(str::to_string)
                }
                _ => None,
            })
            .collect()
    }

    /// Forwarded progress positions in order
    pub fn progress(&self) -> Vec<f64> {
        self.posted
            .lock()
            .iter()
            .filter_map(|m| match m {
                AppMessage::ProgressChanged { state, .. } => Some(state.current_time),
                _ => None,
            })
            .collect()
    }

    async fn answer_proxy(&self, request: ProxyHttpRequest) -> Result<Value> {
        self.proxied.lock().push(request.clone());
        let jitter = *self.jitter.lock();
        if jitter {
            tokio::time::sleep(Duration::from_millis(u64::from(request.id % 4) * 3)).await;
        }

        let reply = (self.responder.lock())(&request);
        match reply {
            ProxyReply::Base64 { status, body } => Ok(json!({
                "id": request.id,
                "status": status,
                "headers": {"content-type": "application/octet-stream"},
                "body": STANDARD.encode(&body),
                "bodyType": "base64",
            })),
            ProxyReply::WebMessage { status, body } => {
                let channel = self
                    .side_channel
                    .lock()
                    .clone()
                    .ok_or_else(|| BridgeError::Transport("no side channel attached".to_string()))?;
                let frame = data_frame(request.id, &body);
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    channel.on_message(frame).await;
                });
                Ok(json!({
                    "id": request.id,
                    "status": status,
                    "headers": null,
                    "body": null,
                    "bodyType": "webMessage",
                }))
            }
            ProxyReply::Plain { status, body } => Ok(json!({
                "id": request.id,
                "status": status,
                "statusText": "OK",
                "body": body,
            })),
            ProxyReply::WrongId { id } => Ok(json!({"id": id, "status": 200, "body": ""})),
            ProxyReply::Fail(message) => Err(BridgeError::Transport(message)),
        }
    }
}

#[async_trait]
impl HostChannel for ScriptedHost {
    fn is_available(&self) -> bool {
        true
    }

    async fn post(&self, message: &AppMessage) -> Result<()> {
        self.posted.lock().push(message.clone());
        Ok(())
    }

    async fn call(&self, request: &AppRequest) -> Result<Value> {
        match request {
            AppRequest::InitEnv => Ok(self.env.lock().clone()),
            AppRequest::CheckProxy => {
                *self.check_proxy_calls.lock() += 1;
                Ok(json!({"running": *self.proxy_running.lock()}))
            }
            AppRequest::Proxy(wire) => self.answer_proxy(wire.clone()).await,
        }
    }
}

fn echo_url(request: &ProxyHttpRequest) -> ProxyReply {
    ProxyReply::Base64 {
        status: 200,
        body: request.url.as_bytes().to_vec(),
    }
}

/// Side channel data frame: big-endian request id followed by the payload
pub fn data_frame(id: u32, payload: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(4 + payload.len());
    frame.put_u32(id);
    frame.put_slice(payload);
    frame.freeze()
}

/// Direct fetch double: answers every request with `direct:<url>`
#[derive(Default)]
pub struct ScriptedFetcher {
    requests: Mutex<Vec<FetchRequest>>,
}

impl ScriptedFetcher {
    pub fn urls(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.url.clone()).collect()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        let body = Bytes::from(format!("direct:{}", request.url));
        self.requests.lock().push(request);
        Ok(FetchResponse {
            status: 200,
            status_text: "OK".to_string(),
            headers: BTreeMap::new(),
            body,
        })
    }
}

/// Outgoing message port that records frames
#[derive(Default)]
pub struct RecordingPort {
    frames: Mutex<Vec<Bytes>>,
}

impl RecordingPort {
    pub fn frames(&self) -> Vec<Bytes> {
        self.frames.lock().clone()
    }
}

#[async_trait]
impl WebMessagePort for RecordingPort {
    async fn post_message(&self, frame: Bytes) -> Result<()> {
        self.frames.lock().push(frame);
        Ok(())
    }
}

/// A fully wired page session over test doubles
pub struct Harness {
    pub host: Arc<ScriptedHost>,
    pub fetcher: Arc<ScriptedFetcher>,
    pub port: Arc<RecordingPort>,
    pub engine: Arc<HeadlessEngine>,
    pub clock: Arc<ManualClock>,
    pub videos: Arc<StaticVideoInfo>,
    pub context: Arc<AppPlayerContext>,
    pub dispatcher: CommandDispatcher,
}

impl Harness {
    /// Build and initialize a session whose host answers `initEnv` with `env`
    pub async fn new(env: Value) -> Self {
        Self::with_config(env, Config::default()).await
    }

    pub async fn with_config(env: Value, config: Config) -> Self {
        let host = Arc::new(ScriptedHost::new(env));
        let fetcher = Arc::new(ScriptedFetcher::default());
        let port = Arc::new(RecordingPort::default());
        let clock = Arc::new(ManualClock::new(CLOCK_START_MS));
        let videos = Arc::new(StaticVideoInfo::new());
        let (tx, rx) = media_event_channel();
        let engine = Arc::new(HeadlessEngine::new(tx));

        let context = AppPlayerContext::builder()
            .with_config(config)
            .with_host(host.clone())
            .with_fetcher(fetcher.clone())
            .with_web_message_port(port.clone())
            .with_media(engine.clone(), engine.clone(), engine.clone(), rx)
            .with_video_info(videos.clone())
            .with_storage(Arc::new(Storage::in_memory()))
            .with_clock(clock.clone())
            .build()
            .expect("harness context builds");
        let context = Arc::new(context);

        if let Some(channel) = context.side_channel() {
            host.attach_side_channel(Arc::clone(channel));
        }
        context.init().await;
        context.spawn_event_loop();

        Self {
            host,
            fetcher,
            port,
            engine,
            clock,
            videos,
            dispatcher: CommandDispatcher::new(Arc::clone(&context)),
            context,
        }
    }

    /// Complete the side channel handshake the way the host does
    pub async fn echo_probe(&self) {
        let channel = self.context.side_channel().expect("side channel attached");
        channel.on_message(Bytes::from_static(&kiraplayer::bridge::PROBE_FRAME)).await;
    }

    /// Let the event loop drain queued media events
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    pub async fn command(&self, payload: Value) -> Option<Value> {
        self.dispatcher.handle(payload).await
    }
}

/// Host environment with tunneling on and the side channel offered
pub fn tunneling_env() -> Value {
    json!({
        "useWebMessage": true,
        "injectProxy": true,
        "playerSetting": {"language": null, "defaultHeight": 720},
        "isAndroid": false,
        "isIOS": false,
    })
}

/// Host environment with tunneling off
pub fn plain_env() -> Value {
    json!({"useWebMessage": false, "injectProxy": false})
}
