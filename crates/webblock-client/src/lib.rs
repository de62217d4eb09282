//! webblock-client: consumer side of the webblock realtime channel.
//!
//! `SyncManager` keeps one resilient websocket to the server, mirrors the
//! aggregate session counts, and derives the local blocking decision with a
//! time-boxed manual bypass layered on top.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use webblock_client::{SyncConfig, SyncManager};
//!
//! # async fn example() -> webblock_core::BlockerResult<()> {
//! let manager = SyncManager::start(SyncConfig::default());
//! let mut updates = manager.subscribe();
//!
//! manager.activate_bypass(Duration::from_secs(60));
//! while updates.changed().await.is_ok() {
//!     let state = updates.borrow_and_update().clone();
//!     println!("blocked: {}", state.blocked);
//! }
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod domains;
pub mod http;
pub mod state;
pub mod sync;

// Re-export primary public types.
pub use backoff::Backoff;
pub use domains::DomainList;
pub use http::StatusClient;
pub use state::{ClientState, Mirror};
pub use sync::{SyncConfig, SyncManager};

// Re-export webblock-core error types for convenience.
pub use webblock_core::{BlockerError, BlockerResult};
