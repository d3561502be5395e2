//! Page session context
//!
//! The one handle the host-facing surface holds. It owns every component
//! of a page session and is passed explicitly to the dispatcher instead of
//! living in a global.

use crate::bridge::fetch::{FetchRequest, FetchResponse, Fetcher, HttpFetcher};
use crate::bridge::host::{init_env, HostChannel, WebMessagePort};
use crate::bridge::proxy::RequestProxyBridge;
use crate::bridge::registry::PendingRequestRegistry;
use crate::bridge::side_channel::BinarySideChannel;
use crate::player::{
    media_event_channel, AudioSession, HeadlessEngine, MediaElement, MediaEventReceiver, PlayHistory,
    PlaybackStateReconciler, PlayerController, PreloadCache, StreamingEngine, VideoInfoProvider, VideoLoader,
};
use crate::protocol::EnvInfo;
use crate::storage::Storage;
use crate::toast::ToastStore;
use crate::utils::clock::{Clock, SystemClock};
use crate::utils::config::{Config, ProxyEndpoint};
use crate::utils::error::{BridgeError, Result};

use bytes::Bytes;
use log::{info, warn};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::task::JoinHandle;

struct MediaParts {
    engine: Arc<dyn StreamingEngine>,
    element: Arc<dyn MediaElement>,
    audio: Arc<dyn AudioSession>,
    events: MediaEventReceiver,
}

/// Builder for a page session
pub struct AppPlayerContextBuilder {
    config: Config,
    host: Option<Arc<dyn HostChannel>>,
    fetcher: Option<Arc<dyn Fetcher>>,
    port: Option<Arc<dyn WebMessagePort>>,
    media: Option<MediaParts>,
    info: Option<Arc<dyn VideoInfoProvider>>,
    storage: Option<Arc<Storage>>,
    clock: Option<Arc<dyn Clock>>,
}

impl AppPlayerContextBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            host: None,
            fetcher: None,
            port: None,
            media: None,
            info: None,
            storage: None,
            clock: None,
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_host(mut self, host: Arc<dyn HostChannel>) -> Self {
        self.host = Some(host);
        self
    }

    /// Direct network path; defaults to a reqwest client
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Outgoing half of the binary side channel
    pub fn with_web_message_port(mut self, port: Arc<dyn WebMessagePort>) -> Self {
        self.port = Some(port);
        self
    }

    /// Media collaborators and the receiving end of their event channel
    pub fn with_media(
        mut self,
        engine: Arc<dyn StreamingEngine>,
        element: Arc<dyn MediaElement>,
        audio: Arc<dyn AudioSession>,
        events: MediaEventReceiver,
    ) -> Self {
        self.media = Some(MediaParts {
            engine,
            element,
            audio,
            events,
        });
        self
    }

    pub fn with_video_info(mut self, info: Arc<dyn VideoInfoProvider>) -> Self {
        self.info = Some(info);
        self
    }

    pub fn with_storage(mut self, storage: Arc<Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the context
    pub fn build(self) -> Result<AppPlayerContext> {
        self.config.validate()?;

        let host = self
            .host
            .ok_or_else(|| BridgeError::Config("A host channel is required".to_string()))?;
        let info = self
            .info
            .ok_or_else(|| BridgeError::Config("A video info provider is required".to_string()))?;
        let fetcher = self.fetcher.unwrap_or_else(|| Arc::new(HttpFetcher::new()));
        let storage = self.storage.unwrap_or_else(|| Arc::new(Storage::in_memory()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let media = self.media.unwrap_or_else(|| {
            let (tx, rx) = media_event_channel();
            let headless = Arc::new(HeadlessEngine::new(tx));
            MediaParts {
                engine: headless.clone(),
                element: headless.clone(),
                audio: headless,
                events: rx,
            }
        });

        let toasts = Arc::new(ToastStore::new());
        let registry = PendingRequestRegistry::new(self.config.bridge.request_timeout());

        // A persisted endpoint wins over the configured one
        let endpoint = storage.proxy_endpoint().unwrap_or_else(|| self.config.proxy.clone());
        let proxy = Arc::new(RequestProxyBridge::new(
            Arc::clone(&host),
            fetcher,
            Arc::clone(&registry),
            endpoint,
        ));
        let side_channel = self
            .port
            .map(|port| Arc::new(BinarySideChannel::new(port, Arc::clone(&host), Arc::clone(&registry))));

        let controller = Arc::new(PlayerController::new(
            media.engine,
            media.element,
            media.audio,
            clock,
            Arc::clone(&storage),
            Arc::clone(&toasts),
            self.config.player.clone(),
        ));
        let reconciler = Arc::new(PlaybackStateReconciler::new(
            Arc::clone(&controller),
            Arc::clone(&host),
            Arc::clone(&storage),
            Arc::clone(&toasts),
        ));
        let loader = Arc::new(VideoLoader::new(
            Arc::clone(&controller),
            Arc::clone(&reconciler),
            info,
            Arc::new(PreloadCache::new()),
        ));

        Ok(AppPlayerContext {
            config: self.config,
            host,
            registry,
            proxy,
            side_channel,
            controller,
            reconciler,
            loader,
            storage,
            toasts,
            env: RwLock::new(EnvInfo::default()),
            events: Mutex::new(Some(media.events)),
            event_loop: Mutex::new(None),
        })
    }
}

impl Default for AppPlayerContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything one page session owns
pub struct AppPlayerContext {
    config: Config,
    host: Arc<dyn HostChannel>,
    registry: Arc<PendingRequestRegistry<Bytes>>,
    proxy: Arc<RequestProxyBridge>,
    side_channel: Option<Arc<BinarySideChannel>>,
    controller: Arc<PlayerController>,
    reconciler: Arc<PlaybackStateReconciler>,
    loader: Arc<VideoLoader>,
    storage: Arc<Storage>,
    toasts: Arc<ToastStore>,
    env: RwLock<EnvInfo>,
    events: Mutex<Option<MediaEventReceiver>>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl AppPlayerContext {
    pub fn builder() -> AppPlayerContextBuilder {
        AppPlayerContextBuilder::new()
    }

    /// Ask the host for its environment and wire the session accordingly
    pub async fn init(&self) -> EnvInfo {
        let env = init_env(self.host.as_ref()).await;
        info!(
            "Host environment: webMessage={} injectProxy={} android={} ios={}",
            env.use_web_message, env.inject_proxy, env.is_android, env.is_ios
        );

        self.controller.set_player_setting(env.player_setting.clone());
        self.proxy.set_inject_proxy(env.inject_proxy);

        if env.use_web_message {
            match &self.side_channel {
                Some(channel) => {
                    if let Err(e) = channel.initialize().await {
                        warn!("Side channel probe failed: {}", e);
                    }
                }
                None => warn!("Host offers web messages but no port is attached"),
            }
        }

        *self.env.write() = env.clone();
        env
    }

    /// Start feeding media events into the reconciler; false if already running
    pub fn spawn_event_loop(&self) -> bool {
        let Some(events) = self.events.lock().take() else {
            return false;
        };
        let reconciler = Arc::clone(&self.reconciler);
        *self.event_loop.lock() = Some(tokio::spawn(reconciler.run(events)));
        true
    }

    /// Save state and stop every task of the session
    pub async fn shutdown(&self) {
        self.loader.shutdown().await;
        if let Some(handle) = self.event_loop.lock().take() {
            handle.abort();
        }
        info!("Player session shut down");
    }

    pub async fn proxy_fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        self.proxy.proxy_fetch(request).await
    }

    /// Change and persist the tunnel endpoint
    pub fn set_proxy_endpoint(&self, endpoint: ProxyEndpoint) -> Result<()> {
        if !endpoint.is_configured() {
            return Err(BridgeError::Config("Proxy host must not be empty".to_string()));
        }
        self.storage.save_proxy_endpoint(&endpoint);
        self.proxy.set_endpoint(endpoint);
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn env(&self) -> EnvInfo {
        self.env.read().clone()
    }

    pub fn host(&self) -> &Arc<dyn HostChannel> {
        &self.host
    }

    pub fn registry(&self) -> &Arc<PendingRequestRegistry<Bytes>> {
        &self.registry
    }

    pub fn proxy(&self) -> &Arc<RequestProxyBridge> {
        &self.proxy
    }

    pub fn side_channel(&self) -> Option<&Arc<BinarySideChannel>> {
        self.side_channel.as_ref()
    }

    pub fn controller(&self) -> &Arc<PlayerController> {
        &self.controller
    }

    pub fn reconciler(&self) -> &Arc<PlaybackStateReconciler> {
        &self.reconciler
    }

    pub fn loader(&self) -> &Arc<VideoLoader> {
        &self.loader
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn toasts(&self) -> &Arc<ToastStore> {
        &self.toasts
    }

    pub fn video_id(&self) -> Option<String> {
        self.reconciler.video_id()
    }

    pub fn play_history(&self) -> PlayHistory {
        self.controller.play_history()
    }
}
