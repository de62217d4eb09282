//! Session registry: the busy/idle state machine.
//!
//! Tracks every active agent session, applies hook events, and publishes the
//! recomputed snapshot to the hub after each one. Also owns the two kinds of
//! scheduled work that touch the sessions: debounced re-checks after
//! non-input tool calls, and the stale session reaper.

use crate::hub::{BroadcastHub, Subscription};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use webblock_core::defaults::{DEBOUNCE_DELAY, REAPER_INTERVAL, SESSION_TIMEOUT, USER_INPUT_TOOLS};
use webblock_core::{HookEvent, HookPayload, SessionStatus, Snapshot};

/// Tunables for the registry and its scheduled work.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Tools whose `pre-tool-use` means the agent waits on the user.
    pub watched_tools: HashSet<String>,
    /// Inactivity after which the reaper evicts a session.
    pub session_timeout: Duration,
    pub reaper_interval: Duration,
    /// Delay before a non-input tool call re-checks `waiting_for_input`.
    pub debounce: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            watched_tools: USER_INPUT_TOOLS.iter().map(|t| t.to_string()).collect(),
            session_timeout: SESSION_TIMEOUT,
            reaper_interval: REAPER_INTERVAL,
            debounce: DEBOUNCE_DELAY,
        }
    }
}

/// One tracked agent session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub status: SessionStatus,
    /// Informational only.
    pub cwd: Option<String>,
    pub last_activity: Instant,
}

struct Inner {
    config: RegistryConfig,
    hub: BroadcastHub,
    sessions: Mutex<HashMap<String, Session>>,
    rechecks: StdMutex<Vec<JoinHandle<()>>>,
    reaper: StdMutex<Option<JoinHandle<()>>>,
}

/// Handle to the registry. Cheap to clone; all clones share one state.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Inner>,
}

impl SessionRegistry {
    pub fn new(config: RegistryConfig, hub: BroadcastHub) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                hub,
                sessions: Mutex::new(HashMap::new()),
                rechecks: StdMutex::new(Vec::new()),
                reaper: StdMutex::new(None),
            }),
        }
    }

    fn from_weak(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Apply a raw hook payload, then broadcast.
    ///
    /// Unrecognized event names change nothing but are still followed by a
    /// broadcast of the unchanged snapshot.
    pub async fn handle_payload(&self, payload: &HookPayload) {
        match HookEvent::from_payload(payload) {
            Some(event) => self.handle_event(event).await,
            None => {
                debug!(
                    session_id = %payload.session_id,
                    event = %payload.hook_event_name,
                    "ignoring unrecognized hook event"
                );
                let sessions = self.inner.sessions.lock().await;
                self.inner.hub.publish(snapshot_of(&sessions));
            }
        }
    }

    /// Apply a hook event, recompute the snapshot and broadcast it.
    ///
    /// The registry lock is held across all three steps so event passes
    /// never interleave.
    pub async fn handle_event(&self, event: HookEvent) {
        let mut sessions = self.inner.sessions.lock().await;
        debug!(session_id = %event.session_id(), event = event.name(), "hook event");

        match event {
            HookEvent::Start { session_id, cwd } => {
                info!(session_id = %session_id, cwd = ?cwd, "session started");
                sessions.insert(
                    session_id.clone(),
                    Session {
                        id: session_id,
                        status: SessionStatus::Idle,
                        cwd,
                        last_activity: Instant::now(),
                    },
                );
            }
            HookEvent::End { session_id } => {
                if sessions.remove(&session_id).is_some() {
                    info!(session_id = %session_id, "session ended");
                }
            }
            HookEvent::PromptSubmitted { session_id } => {
                set_status(&mut sessions, &session_id, SessionStatus::Working);
            }
            HookEvent::AgentStopped { session_id } => {
                set_status(&mut sessions, &session_id, SessionStatus::Idle);
            }
            HookEvent::PreToolUse {
                session_id,
                tool_name,
            } => {
                let watched = tool_name
                    .as_deref()
                    .is_some_and(|tool| self.inner.config.watched_tools.contains(tool));
                if watched {
                    set_status(&mut sessions, &session_id, SessionStatus::WaitingForInput);
                } else {
                    self.schedule_recheck(session_id);
                }
            }
        }

        self.inner.hub.publish(snapshot_of(&sessions));
    }

    /// Downgrade `waiting_for_input` to `working` after the debounce delay,
    /// unless something else changed the status in the meantime.
    fn schedule_recheck(&self, session_id: String) {
        let weak = Arc::downgrade(&self.inner);
        let delay = self.inner.config.debounce;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(registry) = Self::from_weak(&weak) {
                registry.recheck(&session_id).await;
            }
        });

        let mut rechecks = lock(&self.inner.rechecks);
        rechecks.retain(|h| !h.is_finished());
        rechecks.push(handle);
    }

    async fn recheck(&self, session_id: &str) {
        let mut sessions = self.inner.sessions.lock().await;
        let still_waiting = sessions
            .get(session_id)
            .is_some_and(|s| s.status == SessionStatus::WaitingForInput);
        if !still_waiting {
            debug!(session_id, "debounced re-check found status already changed");
            return;
        }
        set_status(&mut sessions, session_id, SessionStatus::Working);
        self.inner.hub.publish(snapshot_of(&sessions));
    }

    /// Evict sessions idle for longer than the session timeout.
    ///
    /// Returns the evicted IDs. Eviction does not broadcast; subscribers see
    /// the change with the next event.
    pub async fn sweep_stale(&self) -> Vec<String> {
        let timeout = self.inner.config.session_timeout;
        let mut sessions = self.inner.sessions.lock().await;
        let mut removed = Vec::new();

        sessions.retain(|id, session| {
            let idle = session.last_activity.elapsed();
            if idle > timeout {
                warn!(session_id = %id, idle_secs = idle.as_secs(), "session expired (idle)");
                removed.push(id.clone());
                return false;
            }
            true
        });

        if !removed.is_empty() {
            debug!(count = removed.len(), "reaper removed sessions");
        }
        removed
    }

    /// Start the periodic stale-session sweep. Replaces a running reaper.
    pub fn start_reaper(&self) {
        let weak = Arc::downgrade(&self.inner);
        let period = self.inner.config.reaper_interval;
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(registry) = Self::from_weak(&weak) else {
                    break;
                };
                registry.sweep_stale().await;
            }
        });

        if let Some(old) = lock(&self.inner.reaper).replace(handle) {
            old.abort();
        }
        info!(interval_secs = period.as_secs(), "stale session reaper started");
    }

    /// Register a subscriber; its first message is the snapshot at join time.
    pub async fn subscribe(&self) -> Subscription {
        let sessions = self.inner.sessions.lock().await;
        self.inner.hub.subscribe(snapshot_of(&sessions))
    }

    pub fn unsubscribe(&self, id: u64) {
        self.inner.hub.unsubscribe(id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.hub.len()
    }

    /// Aggregate over the current sessions.
    pub async fn snapshot(&self) -> Snapshot {
        let sessions = self.inner.sessions.lock().await;
        snapshot_of(&sessions)
    }

    pub async fn session(&self, id: &str) -> Option<Session> {
        self.inner.sessions.lock().await.get(id).cloned()
    }

    /// All sessions, in no particular order.
    pub async fn list(&self) -> Vec<Session> {
        self.inner.sessions.lock().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.sessions.lock().await.len()
    }

    /// Cancel the reaper and every pending re-check.
    pub fn shutdown(&self) {
        if let Some(reaper) = lock(&self.inner.reaper).take() {
            reaper.abort();
        }
        let rechecks: Vec<_> = lock(&self.inner.rechecks).drain(..).collect();
        let pending = rechecks.iter().filter(|h| !h.is_finished()).count();
        for handle in rechecks {
            handle.abort();
        }
        info!(pending_rechecks = pending, "session registry shut down");
    }
}

fn lock<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Set a session's status, creating the session if the ID is unknown.
fn set_status(sessions: &mut HashMap<String, Session>, id: &str, status: SessionStatus) {
    let now = Instant::now();
    match sessions.get_mut(id) {
        Some(session) => {
            session.status = status;
            session.last_activity = now;
        }
        None => {
            sessions.insert(
                id.to_string(),
                Session {
                    id: id.to_string(),
                    status,
                    cwd: None,
                    last_activity: now,
                },
            );
        }
    }
    debug!(session_id = id, status = %status, "session status");
}

fn snapshot_of(sessions: &HashMap<String, Session>) -> Snapshot {
    Snapshot::from_statuses(sessions.values().map(|s| s.status))
}
