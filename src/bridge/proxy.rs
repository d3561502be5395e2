//! Request proxy bridge
//!
//! Intercepts network calls made by the page, serializes them into a
//! `proxy` command, hands them to the host and rebuilds a response from
//! the reply (inline, base64 or delivered later over the side channel).
//! Any failure on the tunneled path falls back to a direct fetch.

use crate::bridge::codec::{decode_body, encode_body};
use crate::bridge::fetch::{FetchRequest, FetchResponse, Fetcher, RequestBody};
use crate::bridge::host::{check_proxy, HostChannel};
use crate::bridge::registry::PendingRequestRegistry;
use crate::protocol::{AppRequest, BodyType, ProxyHttpRequest, ProxyHttpResponse};
use crate::utils::config::ProxyEndpoint;
use crate::utils::error::{BridgeError, Result};
use bytes::Bytes;
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use url::Url;

/// Query parameter carrying the original host of a tunneled URL
pub const PROXY_MARKER: &str = "__host";

/// User agent forced onto tunneled requests that do not set one
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 Safari/537.36";

/// How the fallback path treats a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackRoute {
    /// Already addressed at the tunnel; fetch it as-is
    AlreadyTunneled,
    /// Ordinary URL; the fallback rewrites it onto the tunnel endpoint
    Ordinary,
}

impl FallbackRoute {
    pub fn for_url(url: &str, endpoint: &ProxyEndpoint) -> Self {
        if url.contains(PROXY_MARKER) || points_at_endpoint(url, endpoint) {
            FallbackRoute::AlreadyTunneled
        } else {
            FallbackRoute::Ordinary
        }
    }
}

fn points_at_endpoint(url: &str, endpoint: &ProxyEndpoint) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let port = parsed.port_or_known_default().map(|p| p.to_string());
    parsed.host_str() == Some(endpoint.host.as_str()) && port.as_deref() == Some(endpoint.port.as_str())
}

/// Rewrite `url` onto the tunnel endpoint, keeping the original host in
/// the marker parameter
pub fn rewrite_to_endpoint(url: &str, endpoint: &ProxyEndpoint) -> Result<String> {
    let mut rewritten = Url::parse(url)?;
    let original_host = rewritten
        .host_str()
        .ok_or_else(|| BridgeError::InvalidInput(format!("URL has no host: {}", url)))?
        .to_string();

    let retained: Vec<(String, String)> = rewritten
        .query_pairs()
        .filter(|(k, _)| k != PROXY_MARKER)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    rewritten
        .query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair(PROXY_MARKER, &original_host);

    let port: u16 = endpoint
        .port
        .parse()
        .map_err(|_| BridgeError::Config(format!("Invalid proxy port '{}'", endpoint.port)))?;
    rewritten
        .set_scheme(&endpoint.protocol)
        .map_err(|_| BridgeError::Config(format!("Invalid proxy protocol '{}'", endpoint.protocol)))?;
    rewritten
        .set_host(Some(&endpoint.host))
        .map_err(|e| BridgeError::Config(format!("Invalid proxy host '{}': {}", endpoint.host, e)))?;
    rewritten
        .set_port(Some(port))
        .map_err(|_| BridgeError::Config("URL cannot carry a port".to_string()))?;

    Ok(rewritten.into())
}

/// Bridge that tunnels page requests through the host
pub struct RequestProxyBridge {
    host: Arc<dyn HostChannel>,
    fetcher: Arc<dyn Fetcher>,
    registry: Arc<PendingRequestRegistry<Bytes>>,
    endpoint: RwLock<ProxyEndpoint>,
    inject_proxy: AtomicBool,
    user_agent: String,
}

impl RequestProxyBridge {
    pub fn new(
        host: Arc<dyn HostChannel>,
        fetcher: Arc<dyn Fetcher>,
        registry: Arc<PendingRequestRegistry<Bytes>>,
        endpoint: ProxyEndpoint,
    ) -> Self {
        Self {
            host,
            fetcher,
            registry,
            endpoint: RwLock::new(endpoint),
            inject_proxy: AtomicBool::new(false),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    /// Record whether the host advertised `injectProxy`
    pub fn set_inject_proxy(&self, enabled: bool) {
        self.inject_proxy.store(enabled, Ordering::SeqCst);
    }

    pub fn set_endpoint(&self, endpoint: ProxyEndpoint) {
        *self.endpoint.write() = endpoint;
    }

    pub fn endpoint(&self) -> ProxyEndpoint {
        self.endpoint.read().clone()
    }

    /// Tunneling needs a host channel that asked for it
    pub fn tunneling_available(&self) -> bool {
        self.inject_proxy.load(Ordering::SeqCst) && self.host.is_available()
    }

    /// Fetch `request`, through the host when possible
    pub async fn proxy_fetch(&self, request: FetchRequest) -> Result<FetchResponse> {
        let route = FallbackRoute::for_url(&request.url, &self.endpoint.read());

        if !self.tunneling_available() {
            return self.fallback_fetch(request, route).await;
        }

        if route == FallbackRoute::AlreadyTunneled {
            debug!("{} already targets the tunnel, fetching directly", request.url);
            return self.fetcher.fetch(request).await;
        }

        if check_proxy(self.host.as_ref()).await {
            debug!("Host proxy server running, bypassing the bridge");
            return self.fallback_fetch(request, route).await;
        }

        match self.tunnel(&request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                warn!("Tunneled fetch of {} failed ({}), falling back", request.url, e);
                self.fallback_fetch(request, route).await
            }
        }
    }

    /// The page's normal fetch path
    pub async fn fallback_fetch(&self, request: FetchRequest, route: FallbackRoute) -> Result<FetchResponse> {
        let request = match route {
            FallbackRoute::AlreadyTunneled => request,
            FallbackRoute::Ordinary => {
                let endpoint = self.endpoint.read().clone();
                if !endpoint.is_configured() {
                    request
                } else {
                    match rewrite_to_endpoint(&request.url, &endpoint) {
                        Ok(url) => FetchRequest { url, ..request },
                        Err(e) => {
                            warn!("Could not rewrite {} onto the tunnel: {}", request.url, e);
                            request
                        }
                    }
                }
            }
        };
        self.fetcher.fetch(request).await
    }

    /// Serialize a request into its wire form
    pub fn serialize_request(&self, id: u32, request: &FetchRequest) -> Result<ProxyHttpRequest> {
        let mut headers: BTreeMap<String, String> = request
            .headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
            .collect();
        headers
            .entry("user-agent".to_string())
            .or_insert_with(|| self.user_agent.clone());

        let (body, body_base64) = match &request.body {
            RequestBody::Empty => (None, None),
            RequestBody::Text(text) => (Some(text.clone()), None),
            RequestBody::Binary(bytes) => (None, Some(encode_body(bytes)?)),
            RequestBody::Json(value) => (Some(value.to_string()), None),
        };

        Ok(ProxyHttpRequest {
            id,
            url: request.url.clone(),
            method: request.method.to_ascii_uppercase(),
            headers,
            body,
            body_base64,
        })
    }

    async fn tunnel(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let id = self.registry.next_id();
        let pending = self.registry.create(id);
        let wire = self.serialize_request(id, request)?;

        info!("Tunneling request {}: {} {}", id, wire.method, wire.url);
        let reply = self.host.call(&AppRequest::Proxy(wire)).await?;
        let response: ProxyHttpResponse = serde_json::from_value(reply)
            .map_err(|e| BridgeError::protocol(format!("malformed proxy reply: {}", e)))?;

        if response.id != id {
            return Err(BridgeError::protocol(format!(
                "reply for request {} while waiting on {}",
                response.id, id
            )));
        }

        let body = match response.body_type {
            BodyType::Base64 => decode_body(response.body.as_deref().unwrap_or_default())?,
            BodyType::WebMessage => pending.wait().await?,
            BodyType::Plain => Bytes::from(response.body.unwrap_or_default()),
        };

        Ok(FetchResponse {
            status: response.status,
            status_text: response.status_text.unwrap_or_default(),
            headers: response.headers,
            body,
        })
    }
}
