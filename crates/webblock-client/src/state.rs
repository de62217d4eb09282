//! Local mirror of the server aggregate and the derived blocking decision.

use serde::Serialize;
use tokio::time::Instant;
use webblock_core::Snapshot;

/// Published view of the consumer's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientState {
    pub server_connected: bool,
    pub sessions: usize,
    pub working: usize,
    pub waiting_for_input: usize,
    pub blocked: bool,
    pub bypass_active: bool,
    /// Whole seconds of bypass left, rounded up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bypass_remaining_secs: Option<u64>,
}

/// What the consumer last heard from the server, plus its own bypass.
#[derive(Debug, Clone, Default)]
pub struct Mirror {
    pub server_connected: bool,
    pub sessions: usize,
    pub working: usize,
    pub waiting_for_input: usize,
    pub bypass_until: Option<Instant>,
}

impl Mirror {
    /// Copy the counts out of a server snapshot. The server's own `blocked`
    /// is ignored; the decision is always derived locally.
    pub fn apply_snapshot(&mut self, snapshot: &Snapshot) {
        self.sessions = snapshot.sessions;
        self.working = snapshot.working;
        self.waiting_for_input = snapshot.waiting_for_input;
    }

    pub fn bypass_active(&self, now: Instant) -> bool {
        self.bypass_until.is_some_and(|until| until > now)
    }

    /// Blocked unless bypassed; otherwise blocked while disconnected or
    /// while no session is working or waiting.
    pub fn is_blocked(&self, now: Instant) -> bool {
        if self.bypass_active(now) {
            return false;
        }
        if !self.server_connected {
            return true;
        }
        self.working == 0 && self.waiting_for_input == 0
    }

    pub fn derive(&self, now: Instant) -> ClientState {
        let bypass_remaining_secs = self
            .bypass_until
            .filter(|until| *until > now)
            .map(|until| {
                let left = until - now;
                left.as_secs() + u64::from(left.subsec_nanos() > 0)
            });
        ClientState {
            server_connected: self.server_connected,
            sessions: self.sessions,
            working: self.working,
            waiting_for_input: self.waiting_for_input,
            blocked: self.is_blocked(now),
            bypass_active: bypass_remaining_secs.is_some(),
            bypass_remaining_secs,
        }
    }
}
