//! KiraPlayer - host bridge for an embedded web video player
//!
//! A native host drives the page-side player through JSON commands, and
//! the page tunnels its network traffic back through the host. This crate
//! implements the page side: the command dispatcher, the request proxy
//! with its binary side channel, and the playback state machine between
//! the streaming engine and the host.

pub mod bridge;
pub mod context;
pub mod dispatcher;
pub mod player;
pub mod protocol;
pub mod storage;
pub mod toast;
pub mod utils;

pub use context::{AppPlayerContext, AppPlayerContextBuilder};
pub use dispatcher::CommandDispatcher;
pub use utils::error::{BridgeError, Result};
