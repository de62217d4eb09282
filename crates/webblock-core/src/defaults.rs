//! Defaults shared by the server, the client library and the CLI.

use std::time::Duration;

/// Port the server listens on when nothing else is configured.
pub const DEFAULT_PORT: u16 = 8765;

/// Tools whose invocation means the agent is blocked on the user.
pub const USER_INPUT_TOOLS: &[&str] = &["AskUserQuestion", "ExitPlanMode", "question"];

/// Sessions silent for longer than this are evicted by the reaper.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

pub const REAPER_INTERVAL: Duration = Duration::from_secs(30);

/// Delay before a non-input tool call downgrades `waiting_for_input`.
pub const DEBOUNCE_DELAY: Duration = Duration::from_millis(500);

pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(20);

pub const RECONNECT_DELAY_BASE: Duration = Duration::from_secs(1);
pub const RECONNECT_DELAY_MAX: Duration = Duration::from_secs(30);

pub const BYPASS_DURATION: Duration = Duration::from_secs(10);

/// Upper bound on the opportunistic `/status` fetch.
pub const STATUS_FETCH_TIMEOUT: Duration = Duration::from_secs(2);

pub const DEFAULT_BLOCKED_DOMAINS: &[&str] = &["x.com", "twitter.com", "youtube.com"];
