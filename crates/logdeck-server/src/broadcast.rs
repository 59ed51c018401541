//! Event fan-out to observers
//!
//! One [`Broadcaster`] serves the whole process. Each observer registers an
//! unbounded channel; `broadcast` delivers to every observer independently,
//! and a failed delivery only evicts that observer. Per-producer ordering
//! holds because each session broadcasts from a single task and each
//! observer has exactly one ordered channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use logdeck_core::prelude::*;
use logdeck_core::ServerEvent;

/// Identifies one connected observer
pub type ObserverId = u64;

/// Fan-out set of connected observers.
///
/// Cheap to clone; all clones share the same observer set. The internal
/// lock is never held across an await point.
#[derive(Debug, Clone, Default)]
pub struct Broadcaster {
    observers: Arc<Mutex<HashMap<ObserverId, mpsc::UnboundedSender<ServerEvent>>>>,
    next_id: Arc<AtomicU64>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new observer. The returned receiver yields every event
    /// broadcast (or directly sent) after this call, in delivery order.
    pub fn add_observer(&self) -> (ObserverId, mpsc::UnboundedReceiver<ServerEvent>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut observers = self.observers.lock().expect("observer lock poisoned");
        observers.insert(id, tx);
        debug!("observer {} connected ({} total)", id, observers.len());

        (id, rx)
    }

    /// Remove an observer from the fan-out set. Idempotent.
    pub fn remove_observer(&self, id: ObserverId) {
        let mut observers = self.observers.lock().expect("observer lock poisoned");
        if observers.remove(&id).is_some() {
            debug!("observer {} disconnected ({} remain)", id, observers.len());
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.lock().expect("observer lock poisoned").len()
    }

    /// Deliver `event` to every observer. Failures are isolated: a closed
    /// receiver evicts that observer and never surfaces to the caller.
    pub fn broadcast(&self, event: ServerEvent) {
        let snapshot: Vec<(ObserverId, mpsc::UnboundedSender<ServerEvent>)> = {
            let observers = self.observers.lock().expect("observer lock poisoned");
            observers
                .iter()
                .map(|(id, tx)| (*id, tx.clone()))
                .collect()
        };

        let mut dead = Vec::new();
        for (id, tx) in snapshot {
            if tx.send(event.clone()).is_err() {
                dead.push(id);
            }
        }

        for id in dead {
            debug!("evicting dead observer {}", id);
            self.remove_observer(id);
        }
    }

    /// Direct reply to a single observer. Returns `false` if the observer
    /// is gone (the caller treats that as a no-op).
    pub fn send_to(&self, id: ObserverId, event: ServerEvent) -> bool {
        let tx = {
            let observers = self.observers.lock().expect("observer lock poisoned");
            observers.get(&id).cloned()
        };

        match tx {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logdeck_core::ScanState;

    fn scan_started() -> ServerEvent {
        ServerEvent::ScanStatus {
            status: ScanState::Started,
            subnet: "10.0.0.0/24".to_string(),
        }
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all_observers() {
        let broadcaster = Broadcaster::new();
        let (_a, mut rx_a) = broadcaster.add_observer();
        let (_b, mut rx_b) = broadcaster.add_observer();

        broadcaster.broadcast(scan_started());

        assert!(matches!(
            rx_a.recv().await,
            Some(ServerEvent::ScanStatus { .. })
        ));
        assert!(matches!(
            rx_b.recv().await,
            Some(ServerEvent::ScanStatus { .. })
        ));
    }

    #[tokio::test]
    async fn test_dead_observer_does_not_block_others() {
        let broadcaster = Broadcaster::new();
        let (_a, rx_a) = broadcaster.add_observer();
        let (_b, mut rx_b) = broadcaster.add_observer();

        // Observer A goes away without deregistering (forcibly closed)
        drop(rx_a);

        broadcaster.broadcast(scan_started());

        // B still gets the event, and A has been evicted
        assert!(matches!(
            rx_b.recv().await,
            Some(ServerEvent::ScanStatus { .. })
        ));
        assert_eq!(broadcaster.observer_count(), 1);
    }

    #[tokio::test]
    async fn test_send_to_targets_one_observer() {
        let broadcaster = Broadcaster::new();
        let (id_a, mut rx_a) = broadcaster.add_observer();
        let (_b, mut rx_b) = broadcaster.add_observer();

        assert!(broadcaster.send_to(id_a, scan_started()));

        assert!(matches!(
            rx_a.recv().await,
            Some(ServerEvent::ScanStatus { .. })
        ));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_to_unknown_observer_is_noop() {
        let broadcaster = Broadcaster::new();
        assert!(!broadcaster.send_to(42, scan_started()));
    }

    #[tokio::test]
    async fn test_remove_observer_is_idempotent() {
        let broadcaster = Broadcaster::new();
        let (id, _rx) = broadcaster.add_observer();

        broadcaster.remove_observer(id);
        broadcaster.remove_observer(id);
        assert_eq!(broadcaster.observer_count(), 0);
    }

    #[tokio::test]
    async fn test_delivery_order_preserved_per_observer() {
        let broadcaster = Broadcaster::new();
        let (_id, mut rx) = broadcaster.add_observer();

        for i in 0..10 {
            broadcaster.broadcast(ServerEvent::DeviceRemoved { id: i.to_string() });
        }

        for i in 0..10 {
            match rx.recv().await {
                Some(ServerEvent::DeviceRemoved { id }) => assert_eq!(id, i.to_string()),
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }
}
