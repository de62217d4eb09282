//! webblock-core: Shared protocol library for webblock.
//!
//! Provides the hook event model, session status, aggregate snapshot,
//! websocket message types, JSON codec and the defaults shared by the
//! server and the client.

pub mod codec;
pub mod defaults;
pub mod error;
pub mod messages;

// Re-export commonly used items at crate root.
pub use codec::{decode, encode};
pub use error::{BlockerError, BlockerResult};
pub use messages::{
    ClientMessage, HookEvent, HookPayload, ServerMessage, SessionStatus, Snapshot,
};
