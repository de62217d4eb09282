//! webblock-server: session tracking and the realtime busy/idle broadcast.
//!
//! The registry turns hook events into a per-session state machine, the hub
//! fans the aggregate snapshot out to subscribers, and the server module
//! exposes both over HTTP and a websocket.

pub mod config;
pub mod hub;
pub mod registry;
pub mod server;

pub use config::{CliOverrides, ServerConfig};
pub use hub::{BroadcastHub, Subscription};
pub use registry::{RegistryConfig, Session, SessionRegistry};
pub use server::WebBlockServer;
