//! Host bridge
//!
//! Transport seams towards the host, the pending request registry, the
//! request tunnel and the binary side channel that completes tunneled
//! requests out of band.

pub mod codec;
pub mod fetch;
pub mod host;
pub mod proxy;
pub mod registry;
pub mod side_channel;

pub use codec::{decode_body, encode_body, BASE64_CHUNK_SIZE};
pub use fetch::{FetchRequest, FetchResponse, Fetcher, HttpFetcher, RequestBody};
pub use host::{check_proxy, init_env, send_to_app, HostChannel, StdioHost, WebMessagePort};
pub use proxy::{rewrite_to_endpoint, FallbackRoute, RequestProxyBridge, PROXY_MARKER};
pub use registry::{PendingRequest, PendingRequestRegistry};
pub use side_channel::{BinarySideChannel, PROBE_FRAME};
