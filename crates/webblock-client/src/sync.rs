//! The sync manager: one supervised websocket, the local mirror, the bypass
//! timer, and change notification for whoever renders the decision.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, trace, warn};

use webblock_core::defaults::{
    BYPASS_DURATION, DEFAULT_PORT, KEEPALIVE_INTERVAL, RECONNECT_DELAY_BASE, RECONNECT_DELAY_MAX,
    STATUS_FETCH_TIMEOUT,
};
use webblock_core::{decode, encode, ClientMessage, ServerMessage};

use crate::backoff::Backoff;
use crate::http::StatusClient;
use crate::state::{ClientState, Mirror};

/// Where to find the server and how to pace the connection.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub host: String,
    pub port: u16,
    /// Interval between client pings on an open connection.
    pub keepalive_interval: Duration,
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
    /// Upper bound on a single websocket connect attempt.
    pub connect_timeout: Duration,
    /// Upper bound on the `/status` fallback read.
    pub status_timeout: Duration,
    pub bypass_duration: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            keepalive_interval: KEEPALIVE_INTERVAL,
            reconnect_base: RECONNECT_DELAY_BASE,
            reconnect_max: RECONNECT_DELAY_MAX,
            connect_timeout: Duration::from_secs(10),
            status_timeout: STATUS_FETCH_TIMEOUT,
            bypass_duration: BYPASS_DURATION,
        }
    }
}

impl SyncConfig {
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}/ws", self.host, self.port)
    }

    pub fn http_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

struct Shared {
    config: SyncConfig,
    mirror: Mutex<Mirror>,
    state_tx: watch::Sender<ClientState>,
    status: StatusClient,
}

impl Shared {
    fn mirror(&self) -> MutexGuard<'_, Mirror> {
        self.mirror
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mutate the mirror and publish the re-derived state. The lock is held
    /// across the send so observers see updates in mutation order.
    fn update(&self, f: impl FnOnce(&mut Mirror)) {
        let mut mirror = self.mirror();
        f(&mut mirror);
        self.state_tx.send_replace(mirror.derive(Instant::now()));
    }

    fn handle_text(&self, text: &str) {
        match decode::<ServerMessage>(text) {
            Ok(ServerMessage::State(snapshot)) => {
                debug!(
                    sessions = snapshot.sessions,
                    working = snapshot.working,
                    waiting = snapshot.waiting_for_input,
                    "state update"
                );
                self.update(|m| m.apply_snapshot(&snapshot));
            }
            Ok(ServerMessage::Pong) => trace!("pong"),
            Err(e) => debug!(error = %e, "ignoring unparseable server message"),
        }
    }
}

/// Keeps the local mirror in sync with the server and derives the blocking
/// decision from it.
///
/// At most one connection (or pending reconnect) exists at a time. Dropping
/// the manager stops all background work.
pub struct SyncManager {
    shared: Arc<Shared>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    bypass_expiry: Mutex<Option<JoinHandle<()>>>,
}

impl SyncManager {
    /// Build an idle manager; nothing connects until [`connect`](Self::connect).
    pub fn new(config: SyncConfig) -> Self {
        let mirror = Mirror::default();
        let (state_tx, _) = watch::channel(mirror.derive(Instant::now()));
        let status = StatusClient::new(config.http_url(), config.status_timeout);
        Self {
            shared: Arc::new(Shared {
                config,
                mirror: Mutex::new(mirror),
                state_tx,
                status,
            }),
            supervisor: Mutex::new(None),
            bypass_expiry: Mutex::new(None),
        }
    }

    /// Build a manager and begin connecting immediately.
    pub fn start(config: SyncConfig) -> Self {
        let manager = Self::new(config);
        manager.connect();
        manager
    }

    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    /// Start the connection loop unless one is already running.
    pub fn connect(&self) {
        let mut supervisor = lock(&self.supervisor);
        if supervisor.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        *supervisor = Some(self.spawn_supervisor());
    }

    /// Tear down the current connection or pending reconnect and connect
    /// again right away with the backoff reset. The old socket is closed
    /// before the new attempt starts.
    pub async fn retry_connection(&self) {
        info!("manual reconnect requested");
        let old = lock(&self.supervisor).take();
        if let Some(old) = old {
            old.abort();
            // Resolves once the task, and with it the socket, is dropped.
            let _ = old.await;
        }
        self.shared.update(|m| m.server_connected = false);
        self.connect();
    }

    fn spawn_supervisor(&self) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move { supervise(shared).await })
    }

    /// Suspend blocking for `duration`. Re-activating restarts the window.
    pub fn activate_bypass(&self, duration: Duration) -> Instant {
        let until = Instant::now() + duration;
        self.shared.update(|m| m.bypass_until = Some(until));

        let shared = Arc::clone(&self.shared);
        let expiry = tokio::spawn(async move {
            time::sleep_until(until).await;
            shared.update(|m| {
                if m.bypass_until == Some(until) {
                    m.bypass_until = None;
                }
            });
            info!("bypass expired");
        });
        if let Some(old) = lock(&self.bypass_expiry).replace(expiry) {
            old.abort();
        }

        info!(secs = duration.as_secs(), "bypass activated");
        until
    }

    /// [`activate_bypass`](Self::activate_bypass) with the configured duration.
    pub fn activate_default_bypass(&self) -> Instant {
        self.activate_bypass(self.shared.config.bypass_duration)
    }

    /// Current derived state, without touching the network.
    pub fn state(&self) -> ClientState {
        self.shared.mirror().derive(Instant::now())
    }

    /// Current derived state. While disconnected, first tries a bounded
    /// `/status` read; on success the mirror is refreshed and marked
    /// connected, on failure the last known state is returned as is.
    pub async fn current_state(&self) -> ClientState {
        let connected = self.shared.mirror().server_connected;
        if !connected {
            if let Some(snapshot) = self.shared.status.fetch_status().await {
                debug!(sessions = snapshot.sessions, "status fetched over http");
                self.shared.update(|m| {
                    m.server_connected = true;
                    m.apply_snapshot(&snapshot);
                });
            }
        }
        self.state()
    }

    /// Observe every republished state.
    pub fn subscribe(&self) -> watch::Receiver<ClientState> {
        self.shared.state_tx.subscribe()
    }

    /// Stop the connection and the bypass timer.
    pub fn shutdown(&self) {
        if let Some(handle) = lock(&self.supervisor).take() {
            handle.abort();
        }
        if let Some(handle) = lock(&self.bypass_expiry).take() {
            handle.abort();
        }
        self.shared.update(|m| m.server_connected = false);
        info!("sync manager stopped");
    }
}

impl Drop for SyncManager {
    fn drop(&mut self) {
        for slot in [&self.supervisor, &self.bypass_expiry] {
            if let Some(handle) = lock(slot).take() {
                handle.abort();
            }
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Connect, run until the connection ends, back off, repeat.
async fn supervise(shared: Arc<Shared>) {
    let url = shared.config.ws_url();
    let mut backoff = Backoff::new(shared.config.reconnect_base, shared.config.reconnect_max);
    loop {
        let attempt = time::timeout(
            shared.config.connect_timeout,
            tokio_tungstenite::connect_async(url.as_str()),
        )
        .await;
        match attempt {
            Ok(Ok((ws, _response))) => {
                info!(url = %url, "connected");
                backoff.reset();
                shared.update(|m| m.server_connected = true);
                let reason = run_connection(&shared, ws).await;
                info!(url = %url, reason = %reason, "disconnected");
            }
            Ok(Err(e)) => debug!(url = %url, error = %e, "connect failed"),
            Err(_) => debug!(url = %url, "connect timed out"),
        }

        shared.update(|m| m.server_connected = false);
        let delay = backoff.next_delay();
        debug!(delay_ms = delay.as_millis() as u64, "reconnect scheduled");
        time::sleep(delay).await;
    }
}

/// Pump one open connection: apply inbound state, send keepalive pings.
/// Returns why it ended.
async fn run_connection<S>(shared: &Shared, ws: WebSocketStream<S>) -> String
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = ws.split();
    let period = shared.config.keepalive_interval;
    let mut keepalive = time::interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = keepalive.tick() => {
                let ping = match encode(&ClientMessage::Ping) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "failed to encode ping");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(ping)).await {
                    return format!("ping failed: {e}");
                }
                trace!("ping sent");
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => shared.handle_text(&text),
                Some(Ok(Message::Close(_))) | None => return "closed by server".to_string(),
                Some(Ok(_)) => {}
                Some(Err(e)) => return format!("read error: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::tests::{closed_port, http_stub};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc;
    use webblock_core::{SessionStatus, Snapshot};

    const WAIT: Duration = Duration::from_secs(5);

    fn config(port: u16) -> SyncConfig {
        SyncConfig {
            port,
            keepalive_interval: Duration::from_millis(50),
            reconnect_base: Duration::from_millis(20),
            reconnect_max: Duration::from_millis(100),
            connect_timeout: Duration::from_secs(2),
            status_timeout: Duration::from_millis(500),
            ..SyncConfig::default()
        }
    }

    /// Accepts websocket upgrades and hands each accepted socket to the test.
    async fn ws_stub() -> (u16, mpsc::UnboundedReceiver<WebSocketStream<TcpStream>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                    if tx.send(ws).is_err() {
                        break;
                    }
                }
            }
        });
        (port, rx)
    }

    async fn next_conn(
        conns: &mut mpsc::UnboundedReceiver<WebSocketStream<TcpStream>>,
    ) -> WebSocketStream<TcpStream> {
        time::timeout(WAIT, conns.recv()).await.unwrap().unwrap()
    }

    async fn wait_for(
        rx: &mut watch::Receiver<ClientState>,
        pred: impl FnMut(&ClientState) -> bool,
    ) -> ClientState {
        time::timeout(WAIT, rx.wait_for(pred))
            .await
            .unwrap()
            .unwrap()
            .clone()
    }

    fn state_frame(statuses: &[SessionStatus]) -> Message {
        let msg = ServerMessage::State(Snapshot::from_statuses(statuses.iter().copied()));
        Message::Text(encode(&msg).unwrap())
    }

    #[tokio::test]
    async fn mirrors_server_state() {
        let (port, mut conns) = ws_stub().await;
        let manager = SyncManager::start(config(port));
        let mut rx = manager.subscribe();
        let mut server = next_conn(&mut conns).await;

        let connected = wait_for(&mut rx, |s| s.server_connected).await;
        assert!(connected.blocked);

        server
            .send(state_frame(&[SessionStatus::Working, SessionStatus::Idle]))
            .await
            .unwrap();
        let s = wait_for(&mut rx, |s| s.working == 1).await;
        assert_eq!(s.sessions, 2);
        assert!(!s.blocked);

        server
            .send(state_frame(&[SessionStatus::WaitingForInput]))
            .await
            .unwrap();
        let s = wait_for(&mut rx, |s| s.waiting_for_input == 1).await;
        assert_eq!(s.working, 0);
        assert!(!s.blocked);

        server.send(Message::Text("garbage".into())).await.unwrap();
        server.send(state_frame(&[SessionStatus::Idle])).await.unwrap();
        let s = wait_for(&mut rx, |s| s.waiting_for_input == 0).await;
        assert!(s.blocked);
        assert!(manager.state().server_connected);
    }

    #[tokio::test]
    async fn sends_keepalive_pings() {
        let (port, mut conns) = ws_stub().await;
        let _manager = SyncManager::start(config(port));
        let mut server = next_conn(&mut conns).await;
        let frame = time::timeout(WAIT, server.next()).await.unwrap().unwrap().unwrap();
        match frame {
            Message::Text(text) => {
                assert_eq!(decode::<ClientMessage>(&text).unwrap(), ClientMessage::Ping)
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[tokio::test]
    async fn reconnects_after_server_drops() {
        let (port, mut conns) = ws_stub().await;
        let manager = SyncManager::start(config(port));
        let mut rx = manager.subscribe();

        let first = next_conn(&mut conns).await;
        wait_for(&mut rx, |s| s.server_connected).await;
        drop(first);

        let mut second = next_conn(&mut conns).await;
        second
            .send(state_frame(&[SessionStatus::Working]))
            .await
            .unwrap();
        let s = wait_for(&mut rx, |s| s.server_connected && s.working == 1).await;
        assert!(!s.blocked);
    }

    #[tokio::test]
    async fn unreachable_server_means_blocked() {
        let manager = SyncManager::start(config(closed_port().await));
        time::sleep(Duration::from_millis(150)).await;
        let state = manager.state();
        assert!(!state.server_connected);
        assert!(state.blocked);
    }

    #[tokio::test]
    async fn retry_replaces_the_connection() {
        let (port, mut conns) = ws_stub().await;
        let manager = SyncManager::start(config(port));
        let mut rx = manager.subscribe();
        let mut first = next_conn(&mut conns).await;
        wait_for(&mut rx, |s| s.server_connected).await;

        manager.retry_connection().await;

        // The old socket is already closed; at most pings may be buffered.
        let ended = time::timeout(WAIT, async {
            loop {
                match first.next().await {
                    Some(Ok(Message::Text(_))) | Some(Ok(Message::Ping(_))) => continue,
                    _ => break,
                }
            }
        })
        .await;
        assert!(ended.is_ok());

        let _second = next_conn(&mut conns).await;
        wait_for(&mut rx, |s| s.server_connected).await;
        assert!(time::timeout(Duration::from_millis(200), conns.recv())
            .await
            .is_err());
    }

    /// Accepts TCP and records when; the `succeed_on`-th connection (1-based)
    /// completes the websocket handshake, every other one is dropped at once.
    async fn attempt_recorder(
        succeed_on: usize,
    ) -> (u16, mpsc::UnboundedReceiver<std::time::Instant>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut n = 0;
            while let Ok((stream, _)) = listener.accept().await {
                n += 1;
                let _ = tx.send(std::time::Instant::now());
                if n == succeed_on {
                    // Handshake, then hang up.
                    let _ = tokio_tungstenite::accept_async(stream).await;
                }
            }
        });
        (port, rx)
    }

    #[tokio::test]
    async fn reconnect_delays_double_and_reset_after_success() {
        let (port, mut attempts) = attempt_recorder(6).await;
        let _manager = SyncManager::start(SyncConfig {
            reconnect_base: Duration::from_millis(50),
            reconnect_max: Duration::from_millis(400),
            keepalive_interval: Duration::from_secs(60),
            ..config(port)
        });

        let mut at = Vec::new();
        for _ in 0..7 {
            at.push(time::timeout(WAIT, attempts.recv()).await.unwrap().unwrap());
        }
        let gaps: Vec<Duration> = at.windows(2).map(|w| w[1] - w[0]).collect();

        // Five failures: 50, 100, 200, 400, 400 ms.
        for (gap, expected) in gaps.iter().zip([50u64, 100, 200, 400, 400]) {
            let expected = Duration::from_millis(expected);
            assert!(*gap >= expected, "gap {gap:?} shorter than {expected:?}");
            assert!(
                *gap < expected + Duration::from_millis(300),
                "gap {gap:?} far beyond {expected:?}"
            );
        }
        // The sixth attempt connected, so the next wait is back to base.
        assert!(gaps[5] < Duration::from_millis(300), "gap {:?}", gaps[5]);
    }

    #[tokio::test]
    async fn zero_reconnect_base_does_not_spin() {
        let manager = SyncManager::start(SyncConfig {
            reconnect_base: Duration::ZERO,
            reconnect_max: Duration::from_millis(200),
            ..config(closed_port().await)
        });
        let mut rx = manager.subscribe();
        let mut published = 0;
        let _ = time::timeout(Duration::from_millis(500), async {
            while rx.changed().await.is_ok() {
                published += 1;
            }
        })
        .await;
        assert!(published < 20, "{published} state changes in 500ms");
    }

    #[tokio::test]
    async fn shutdown_disconnects() {
        let (port, mut conns) = ws_stub().await;
        let manager = SyncManager::start(config(port));
        let mut rx = manager.subscribe();
        let _server = next_conn(&mut conns).await;
        wait_for(&mut rx, |s| s.server_connected).await;

        manager.shutdown();
        let state = manager.state();
        assert!(!state.server_connected);
        assert!(state.blocked);
        // No further connection attempts.
        assert!(time::timeout(Duration::from_millis(200), conns.recv())
            .await
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn bypass_window_and_restart() {
        let manager = SyncManager::new(config(DEFAULT_PORT));
        let mut rx = manager.subscribe();
        assert!(manager.state().blocked);

        manager.activate_bypass(Duration::from_secs(10));
        let s = manager.state();
        assert!(!s.blocked);
        assert!(s.bypass_active);
        assert_eq!(s.bypass_remaining_secs, Some(10));
        assert!(rx.borrow_and_update().bypass_active);

        time::sleep(Duration::from_secs(5)).await;
        manager.activate_bypass(Duration::from_secs(10));

        // Past the first window, still inside the restarted one.
        time::sleep(Duration::from_secs(6)).await;
        assert!(manager.state().bypass_active);

        time::sleep(Duration::from_secs(5)).await;
        let s = wait_for(&mut rx, |s| !s.bypass_active).await;
        assert!(s.blocked);
        assert!(manager.state().blocked);
    }

    #[tokio::test(start_paused = true)]
    async fn default_bypass_uses_config() {
        let manager = SyncManager::new(SyncConfig {
            bypass_duration: Duration::from_secs(3),
            ..config(DEFAULT_PORT)
        });
        manager.activate_default_bypass();
        assert_eq!(manager.state().bypass_remaining_secs, Some(3));
        time::sleep(Duration::from_secs(3)).await;
        assert!(!manager.state().bypass_active);
    }

    #[tokio::test]
    async fn current_state_falls_back_to_http() {
        let (url, _requests) = http_stub(
            "200 OK",
            r#"{"blocked":false,"sessions":1,"working":1,"waitingForInput":0}"#,
        )
        .await;
        let port: u16 = url.rsplit(':').next().unwrap().parse().unwrap();
        let manager = SyncManager::new(config(port));
        assert!(manager.state().blocked);

        let s = manager.current_state().await;
        assert!(s.server_connected);
        assert_eq!(s.working, 1);
        assert!(!s.blocked);
    }

    #[tokio::test]
    async fn current_state_failure_keeps_last_known() {
        let manager = SyncManager::new(config(closed_port().await));
        let s = manager.current_state().await;
        assert!(!s.server_connected);
        assert!(s.blocked);
    }

    #[test]
    fn urls() {
        let cfg = SyncConfig {
            host: "localhost".into(),
            port: 9000,
            ..SyncConfig::default()
        };
        assert_eq!(cfg.ws_url(), "ws://localhost:9000/ws");
        assert_eq!(cfg.http_url(), "http://localhost:9000");
    }
}
