//! Fan-out of registry snapshots to realtime subscribers.
//!
//! Each subscriber holds only the latest snapshot: `publish` never awaits,
//! a slow subscriber skips intermediate snapshots but always ends on the
//! newest one, and a subscriber whose receiver is gone is dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::{debug, info};
use webblock_core::Snapshot;

/// Receiving end handed to a subscriber.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: watch::Receiver<Snapshot>,
    initial_pending: bool,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next snapshot. The first call returns the snapshot
    /// current at subscribe time (or newer). `None` once the hub dropped
    /// this subscriber.
    pub async fn recv(&mut self) -> Option<Snapshot> {
        if let Some(snapshot) = self.take_initial() {
            return Some(snapshot);
        }
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    /// Take an undelivered snapshot without waiting.
    pub fn try_recv(&mut self) -> Option<Snapshot> {
        if let Some(snapshot) = self.take_initial() {
            return Some(snapshot);
        }
        match self.rx.has_changed() {
            Ok(true) => Some(*self.rx.borrow_and_update()),
            _ => None,
        }
    }

    fn take_initial(&mut self) -> Option<Snapshot> {
        if !self.initial_pending {
            return None;
        }
        self.initial_pending = false;
        Some(*self.rx.borrow_and_update())
    }
}

struct HubInner {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<u64, watch::Sender<Snapshot>>>,
}

/// Observer registry for aggregate snapshots.
#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                next_id: AtomicU64::new(0),
                subscribers: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn subscribers(&self) -> MutexGuard<'_, HashMap<u64, watch::Sender<Snapshot>>> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a subscriber whose first `recv` yields `initial`.
    pub fn subscribe(&self, initial: Snapshot) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = watch::channel(initial);
        self.subscribers().insert(id, tx);
        info!(subscriber = id, "subscriber joined");
        Subscription {
            id,
            rx,
            initial_pending: true,
        }
    }

    pub fn unsubscribe(&self, id: u64) {
        if self.subscribers().remove(&id).is_some() {
            info!(subscriber = id, "subscriber left");
        }
    }

    /// Replace every subscriber's pending snapshot with `snapshot`.
    ///
    /// Returns the number of live subscribers it reached.
    pub fn publish(&self, snapshot: Snapshot) -> usize {
        let mut subscribers = self.subscribers();
        subscribers.retain(|id, tx| match tx.send(snapshot) {
            Ok(()) => true,
            Err(_) => {
                debug!(subscriber = *id, "subscriber gone, removing");
                false
            }
        });
        subscribers.len()
    }

    pub fn len(&self) -> usize {
        self.subscribers().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webblock_core::SessionStatus;

    fn snapshot(working: usize) -> Snapshot {
        Snapshot::from_statuses(std::iter::repeat(SessionStatus::Working).take(working))
    }

    #[tokio::test]
    async fn new_subscriber_gets_initial_snapshot_first() {
        let hub = BroadcastHub::new();
        let mut sub = hub.subscribe(snapshot(2));
        assert_eq!(sub.recv().await, Some(snapshot(2)));
        hub.publish(snapshot(3));
        assert_eq!(sub.recv().await, Some(snapshot(3)));
        assert_eq!(sub.try_recv(), None);
    }

    #[tokio::test]
    async fn publish_reaches_all_subscribers() {
        let hub = BroadcastHub::new();
        let mut a = hub.subscribe(Snapshot::default());
        let mut b = hub.subscribe(Snapshot::default());
        assert_ne!(a.id(), b.id());
        for sub in [&mut a, &mut b] {
            assert_eq!(sub.try_recv(), Some(Snapshot::default()));
        }
        assert_eq!(hub.publish(snapshot(1)), 2);
        for sub in [&mut a, &mut b] {
            assert_eq!(sub.try_recv(), Some(snapshot(1)));
            assert_eq!(sub.try_recv(), None);
        }
    }

    #[tokio::test]
    async fn republishing_same_snapshot_still_notifies() {
        let hub = BroadcastHub::new();
        let mut sub = hub.subscribe(snapshot(1));
        sub.try_recv();
        hub.publish(snapshot(1));
        assert_eq!(sub.try_recv(), Some(snapshot(1)));
    }

    #[tokio::test]
    async fn dropped_subscriber_is_pruned_without_affecting_others() {
        let hub = BroadcastHub::new();
        let gone = hub.subscribe(Snapshot::default());
        let mut kept = hub.subscribe(Snapshot::default());
        drop(gone);
        assert_eq!(hub.publish(snapshot(1)), 1);
        assert_eq!(hub.len(), 1);
        assert_eq!(kept.try_recv(), Some(snapshot(1)));
    }

    #[tokio::test]
    async fn slow_subscriber_ends_on_latest_snapshot() {
        let hub = BroadcastHub::new();
        let mut slow = hub.subscribe(Snapshot::default());
        for working in 1..=200 {
            hub.publish(snapshot(working));
        }
        assert_eq!(hub.len(), 1);
        let mut last = None;
        while let Some(s) = slow.try_recv() {
            last = Some(s);
        }
        assert_eq!(last, Some(snapshot(200)));
    }

    #[tokio::test]
    async fn unsubscribe_closes_stream() {
        let hub = BroadcastHub::new();
        let mut sub = hub.subscribe(Snapshot::default());
        hub.unsubscribe(sub.id());
        assert!(hub.is_empty());
        assert_eq!(sub.recv().await, Some(Snapshot::default()));
        assert_eq!(sub.recv().await, None);
    }
}
