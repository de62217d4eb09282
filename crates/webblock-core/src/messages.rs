//! Hook events, session status and the realtime channel messages.
//!
//! The HTTP body posted by agent plugins is loosely typed (`HookPayload`);
//! it is converted into the closed `HookEvent` set at the boundary, and
//! anything that does not map to a known event is left to the caller to
//! ignore explicitly.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of one tracked agent session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Working,
    WaitingForInput,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Working => "working",
            Self::WaitingForInput => "waiting_for_input",
        };
        f.write_str(s)
    }
}

/// Aggregate over all sessions, recomputed after every mutation.
///
/// Serialized with the field names the browser side reads:
/// `{ blocked, sessions, working, waitingForInput }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub blocked: bool,
    pub sessions: usize,
    pub working: usize,
    pub waiting_for_input: usize,
}

impl Snapshot {
    /// Count statuses; `blocked` is true when nothing is working or waiting.
    pub fn from_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = SessionStatus>,
    {
        let mut sessions = 0;
        let mut working = 0;
        let mut waiting_for_input = 0;
        for status in statuses {
            sessions += 1;
            match status {
                SessionStatus::Working => working += 1,
                SessionStatus::WaitingForInput => waiting_for_input += 1,
                SessionStatus::Idle => {}
            }
        }
        Self {
            blocked: working == 0 && waiting_for_input == 0,
            sessions,
            working,
            waiting_for_input,
        }
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::from_statuses(std::iter::empty())
    }
}

/// Raw body of `POST /hook`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookPayload {
    pub session_id: String,
    pub hook_event_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

/// A recognized lifecycle or tool-use event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookEvent {
    Start {
        session_id: String,
        cwd: Option<String>,
    },
    End {
        session_id: String,
    },
    PromptSubmitted {
        session_id: String,
    },
    AgentStopped {
        session_id: String,
    },
    PreToolUse {
        session_id: String,
        tool_name: Option<String>,
    },
}

impl HookEvent {
    /// Map a raw payload onto a known event.
    ///
    /// Accepts both the short names (`start`, `pre-tool-use`, ...) and the
    /// names agent plugins emit natively (`SessionStart`, `PreToolUse`, ...).
    /// Returns `None` for anything else.
    pub fn from_payload(payload: &HookPayload) -> Option<Self> {
        let session_id = payload.session_id.clone();
        let event = match payload.hook_event_name.as_str() {
            "start" | "SessionStart" => Self::Start {
                session_id,
                cwd: payload.cwd.clone(),
            },
            "end" | "SessionEnd" => Self::End { session_id },
            "prompt-submitted" | "UserPromptSubmit" => Self::PromptSubmitted { session_id },
            "agent-stopped" | "Stop" => Self::AgentStopped { session_id },
            "pre-tool-use" | "PreToolUse" => Self::PreToolUse {
                session_id,
                tool_name: payload.tool_name.clone(),
            },
            _ => return None,
        };
        Some(event)
    }

    pub fn session_id(&self) -> &str {
        match self {
            Self::Start { session_id, .. }
            | Self::End { session_id }
            | Self::PromptSubmitted { session_id }
            | Self::AgentStopped { session_id }
            | Self::PreToolUse { session_id, .. } => session_id,
        }
    }

    /// Short event name, used in log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::End { .. } => "end",
            Self::PromptSubmitted { .. } => "prompt-submitted",
            Self::AgentStopped { .. } => "agent-stopped",
            Self::PreToolUse { .. } => "pre-tool-use",
        }
    }
}

/// Messages pushed by the server over the realtime channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    State(Snapshot),
    Pong,
}

/// Messages sent by clients over the realtime channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(name: &str) -> HookPayload {
        HookPayload {
            session_id: "s1".into(),
            hook_event_name: name.into(),
            tool_name: Some("Bash".into()),
            cwd: Some("/work".into()),
        }
    }

    #[test]
    fn short_and_native_names_agree() {
        let pairs = [
            ("start", "SessionStart"),
            ("end", "SessionEnd"),
            ("prompt-submitted", "UserPromptSubmit"),
            ("agent-stopped", "Stop"),
            ("pre-tool-use", "PreToolUse"),
        ];
        for (short, native) in pairs {
            let a = HookEvent::from_payload(&payload(short)).unwrap();
            let b = HookEvent::from_payload(&payload(native)).unwrap();
            assert_eq!(a, b, "{short} vs {native}");
            assert_eq!(a.name(), short);
            assert_eq!(a.session_id(), "s1");
        }
    }

    #[test]
    fn start_keeps_cwd_and_tool_use_keeps_tool() {
        match HookEvent::from_payload(&payload("start")).unwrap() {
            HookEvent::Start { cwd, .. } => assert_eq!(cwd.as_deref(), Some("/work")),
            other => panic!("unexpected event: {other:?}"),
        }
        match HookEvent::from_payload(&payload("PreToolUse")).unwrap() {
            HookEvent::PreToolUse { tool_name, .. } => {
                assert_eq!(tool_name.as_deref(), Some("Bash"))
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_name_is_none() {
        assert!(HookEvent::from_payload(&payload("Notification")).is_none());
        assert!(HookEvent::from_payload(&payload("")).is_none());
    }

    #[test]
    fn snapshot_counts() {
        let s = Snapshot::from_statuses([
            SessionStatus::Idle,
            SessionStatus::Working,
            SessionStatus::WaitingForInput,
            SessionStatus::Working,
        ]);
        assert_eq!(s.sessions, 4);
        assert_eq!(s.working, 2);
        assert_eq!(s.waiting_for_input, 1);
        assert!(!s.blocked);

        let idle = Snapshot::from_statuses([SessionStatus::Idle]);
        assert!(idle.blocked);
        assert_eq!(Snapshot::default().sessions, 0);
        assert!(Snapshot::default().blocked);
    }

    #[test]
    fn payload_optional_fields() {
        let p: HookPayload =
            serde_json::from_str(r#"{"session_id":"a","hook_event_name":"Stop"}"#).unwrap();
        assert_eq!(p.tool_name, None);
        assert_eq!(p.cwd, None);
        assert!(serde_json::from_str::<HookPayload>(r#"{"session_id":"a"}"#).is_err());
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::WaitingForInput).unwrap(),
            r#""waiting_for_input""#
        );
        assert_eq!(SessionStatus::Working.to_string(), "working");
    }
}
