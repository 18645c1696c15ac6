//! Connection hub: the set of live observers and best-effort fan-out.
//!
//! Broadcast takes a snapshot of the registry and writes to every
//! observer concurrently with the lock released, each write bounded by a
//! timeout. One failing or stalled observer is logged and skipped; it
//! never holds up the others and never surfaces as an error to the caller.
//! An observer whose write times out is dropped from the registry, so it
//! costs at most one timeout.

use crate::error::BroadcastWriteError;
use async_trait::async_trait;
use futures_util::future::join_all;
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Identity of one connected observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(Uuid);

impl ObserverId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A connected client the hub can write to.
#[async_trait]
pub trait Observer: Send + Sync {
    fn id(&self) -> ObserverId;

    /// Deliver one text message.
    async fn write_message(&self, message: &str) -> Result<(), BroadcastWriteError>;
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

impl BroadcastReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Registry of connected observers.
pub struct ConnectionHub {
    observers: RwLock<HashMap<ObserverId, Arc<dyn Observer>>>,
    write_timeout: Duration,
}

impl ConnectionHub {
    pub fn new(write_timeout: Duration) -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            write_timeout,
        }
    }

    /// Add an observer. Re-registering the same id replaces the handle.
    pub fn register(&self, observer: Arc<dyn Observer>) {
        let id = observer.id();
        let count = {
            let mut observers = self.observers.write();
            observers.insert(id, observer);
            observers.len()
        };
        info!("[Hub] Observer {} registered ({} connected)", id, count);
    }

    /// Remove an observer. Returns false if it was not registered.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let (removed, count) = {
            let mut observers = self.observers.write();
            let removed = observers.remove(&id).is_some();
            (removed, observers.len())
        };
        if removed {
            info!("[Hub] Observer {} unregistered ({} connected)", id, count);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    pub fn contains(&self, id: ObserverId) -> bool {
        self.observers.read().contains_key(&id)
    }

    /// Write `message` to every registered observer.
    pub async fn broadcast(&self, message: &str) -> BroadcastReport {
        let snapshot: Vec<Arc<dyn Observer>> = self.observers.read().values().cloned().collect();

        if snapshot.is_empty() {
            debug!("[Hub] No observers connected, dropping message");
            return BroadcastReport::default();
        }

        info!("[Hub] Sending message to {} observer(s)", snapshot.len());

        let writes = snapshot.iter().map(|observer| async move {
            let result = match tokio::time::timeout(
                self.write_timeout,
                observer.write_message(message),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(BroadcastWriteError::Timeout(self.write_timeout)),
            };
            (observer.id(), result)
        });

        let mut report = BroadcastReport::default();
        let mut stalled = Vec::new();
        for (id, result) in join_all(writes).await {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("[Hub] Error sending message to observer {}: {}", id, e);
                    if matches!(e, BroadcastWriteError::Timeout(_)) {
                        stalled.push(id);
                    }
                    report.failed += 1;
                }
            }
        }

        for id in stalled {
            if self.unregister(id) {
                warn!("[Hub] Dropped stalled observer {}", id);
            }
        }

        debug!(
            "[Hub] Broadcast finished: {} delivered, {} failed",
            report.delivered, report.failed
        );
        report
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Observer that records what it receives, or fails every write.
    pub(crate) struct RecordingObserver {
        id: ObserverId,
        fail: bool,
        stall: bool,
        received: Mutex<Vec<String>>,
    }

    impl RecordingObserver {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                id: ObserverId::new(),
                fail: false,
                stall: false,
                received: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn failing() -> Arc<Self> {
            Arc::new(Self {
                id: ObserverId::new(),
                fail: true,
                stall: false,
                received: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn stalled() -> Arc<Self> {
            Arc::new(Self {
                id: ObserverId::new(),
                fail: false,
                stall: true,
                received: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn received(&self) -> Vec<String> {
            self.received.lock().clone()
        }
    }

    #[async_trait]
    impl Observer for RecordingObserver {
        fn id(&self) -> ObserverId {
            self.id
        }

        async fn write_message(&self, message: &str) -> Result<(), BroadcastWriteError> {
            if self.fail {
                return Err(BroadcastWriteError::Closed);
            }
            if self.stall {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            self.received.lock().push(message.to_string());
            Ok(())
        }
    }

    fn hub() -> ConnectionHub {
        ConnectionHub::new(Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_broadcast_reaches_all() {
        let hub = hub();
        let observers: Vec<_> = (0..5).map(|_| RecordingObserver::new()).collect();
        for observer in &observers {
            hub.register(observer.clone());
        }

        let report = hub.broadcast("hello").await;
        assert_eq!(report.delivered, 5);
        assert_eq!(report.failed, 0);
        for observer in &observers {
            assert_eq!(observer.received(), vec!["hello".to_string()]);
        }
    }

    #[tokio::test]
    async fn test_broadcast_survives_failing_observers() {
        let hub = hub();
        let healthy: Vec<_> = (0..4).map(|_| RecordingObserver::new()).collect();
        let broken: Vec<_> = (0..3).map(|_| RecordingObserver::failing()).collect();

        // Interleave so failures sit between healthy observers
        for (h, b) in healthy.iter().zip(broken.iter()) {
            hub.register(h.clone());
            hub.register(b.clone());
        }
        hub.register(healthy[3].clone());

        let report = hub.broadcast("msg").await;
        assert_eq!(report.delivered, 4);
        assert_eq!(report.failed, 3);
        assert_eq!(report.attempted(), 7);
        for observer in &healthy {
            assert_eq!(observer.received(), vec!["msg".to_string()]);
        }
    }

    #[tokio::test]
    async fn test_stalled_observer_is_bounded() {
        let hub = hub();
        let healthy = RecordingObserver::new();
        let stalled = RecordingObserver::stalled();
        hub.register(healthy.clone());
        hub.register(stalled.clone());

        let started = std::time::Instant::now();
        let report = hub.broadcast("ping").await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(healthy.received(), vec!["ping".to_string()]);
        assert!(stalled.received().is_empty());
    }

    #[tokio::test]
    async fn test_stalled_observer_is_dropped_after_timeout() {
        let hub = hub();
        let healthy = RecordingObserver::new();
        let stalled = RecordingObserver::stalled();
        hub.register(healthy.clone());
        hub.register(stalled.clone());

        let report = hub.broadcast("first").await;
        assert_eq!(report.failed, 1);
        assert!(!hub.contains(stalled.id()));
        assert!(hub.contains(healthy.id()));

        // Later broadcasts no longer wait on it
        let started = std::time::Instant::now();
        let report = hub.broadcast("second").await;
        assert!(started.elapsed() < Duration::from_millis(50));
        assert_eq!(report, BroadcastReport { delivered: 1, failed: 0 });
        assert_eq!(
            healthy.received(),
            vec!["first".to_string(), "second".to_string()]
        );
    }

    #[tokio::test]
    async fn test_failing_observer_stays_registered() {
        let hub = hub();
        let broken = RecordingObserver::failing();
        hub.register(broken.clone());

        let report = hub.broadcast("msg").await;
        assert_eq!(report.failed, 1);
        assert!(hub.contains(broken.id()));
    }

    #[tokio::test]
    async fn test_register_then_unregister_leaves_empty() {
        let hub = hub();
        let observer = RecordingObserver::new();

        hub.register(observer.clone());
        assert!(hub.contains(observer.id()));
        assert!(hub.unregister(observer.id()));
        assert!(hub.is_empty());

        let report = hub.broadcast("nobody").await;
        assert_eq!(report.attempted(), 0);
        assert!(observer.received().is_empty());
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let hub = hub();
        let observer = RecordingObserver::new();
        hub.register(observer.clone());

        assert!(hub.unregister(observer.id()));
        assert!(!hub.unregister(observer.id()));
        assert!(!hub.unregister(ObserverId::new()));
        assert_eq!(hub.len(), 0);
    }

    #[test]
    fn test_register_same_observer_twice() {
        let hub = hub();
        let observer = RecordingObserver::new();
        hub.register(observer.clone());
        hub.register(observer.clone());
        assert_eq!(hub.len(), 1);
    }

    #[tokio::test]
    async fn test_unregister_during_broadcast() {
        let hub = Arc::new(hub());
        let stalled = RecordingObserver::stalled();
        let healthy = RecordingObserver::new();
        hub.register(stalled.clone());
        hub.register(healthy.clone());

        let broadcast = {
            let hub = hub.clone();
            tokio::spawn(async move { hub.broadcast("mid").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        hub.unregister(stalled.id());

        let report = broadcast.await.unwrap();
        assert_eq!(report.attempted(), 2);
        assert_eq!(healthy.received(), vec!["mid".to_string()]);
        assert_eq!(hub.len(), 1);
    }
}
