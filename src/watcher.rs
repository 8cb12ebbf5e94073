//! Namespace discovery.
//!
//! The watcher enumerates the server's namespaces and binds an
//! [`EventInterceptor`] to each one exactly once. A set of seen namespace
//! names is the idempotency gate: the name is inserted with an atomic
//! check-and-insert before `bind` runs, so overlapping scans can never bind
//! the same namespace twice. A namespace whose bind is refused (another
//! interceptor already owns it) is seen but not bound.
//!
//! Namespaces created after startup are picked up by periodic rescans (see
//! [`NamespaceWatcher::spawn_polling`]). A namespace created and removed
//! between two scans is never instrumented.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashSet;
use socket_transport::EventServer;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::interceptor::EventInterceptor;

/// Default rescan period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Whether a scan is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Scanning,
    Idle,
}

pub struct NamespaceWatcher {
    server: Arc<dyn EventServer>,
    interceptor: EventInterceptor,
    seen: DashSet<String>,
    bound: DashSet<String>,
    active_scans: AtomicUsize,
}

impl NamespaceWatcher {
    /// Create a watcher. No scan happens until [`scan`](Self::scan) is called.
    pub fn new(server: Arc<dyn EventServer>, interceptor: EventInterceptor) -> Self {
        Self {
            server,
            interceptor,
            seen: DashSet::new(),
            bound: DashSet::new(),
            active_scans: AtomicUsize::new(0),
        }
    }

    /// Bind every namespace not seen before. Returns how many were bound.
    pub fn scan(&self) -> usize {
        self.active_scans.fetch_add(1, Ordering::SeqCst);
        let mut newly_bound = 0;

        for namespace in self.server.namespaces() {
            let name = namespace.name().to_string();
            if !self.seen.insert(name.clone()) {
                continue;
            }
            if self.interceptor.bind(namespace.as_ref()) {
                info!(namespace = %name, "Namespace instrumented");
                self.bound.insert(name);
                newly_bound += 1;
            }
        }

        self.active_scans.fetch_sub(1, Ordering::SeqCst);
        newly_bound
    }

    pub fn is_bound(&self, namespace: &str) -> bool {
        self.bound.contains(namespace)
    }

    /// Names of the bound namespaces, sorted.
    pub fn bound(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bound.iter().map(|n| n.key().clone()).collect();
        names.sort();
        names
    }

    pub fn state(&self) -> WatcherState {
        if self.active_scans.load(Ordering::SeqCst) > 0 {
            WatcherState::Scanning
        } else {
            WatcherState::Idle
        }
    }

    /// Rescan every `period` until `shutdown` is cancelled.
    ///
    /// The first rescan happens one full period after the call.
    pub fn spawn_polling(
        self: &Arc<Self>,
        period: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let watcher = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Namespace polling stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        let bound = watcher.scan();
                        if bound > 0 {
                            debug!(bound, "Namespace rescan bound new namespaces");
                        }
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for NamespaceWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceWatcher")
            .field("bound", &self.bound())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{Metric, MetricSet};
    use crate::payload::PayloadSizer;
    use prometheus::Registry;
    use serde_json::json;
    use socket_transport::{MemoryServer, Socket};

    fn watcher_for(server: &MemoryServer) -> (Arc<NamespaceWatcher>, Arc<MetricSet>) {
        let handle: Arc<dyn EventServer> = Arc::new(server.clone());
        let metrics = Arc::new(MetricSet::register(&Registry::new()).unwrap());
        let interceptor =
            EventInterceptor::new(Arc::clone(&metrics), PayloadSizer::default(), &handle);
        (Arc::new(NamespaceWatcher::new(handle, interceptor)), metrics)
    }

    #[test]
    fn scan_binds_existing_namespaces() {
        let server = MemoryServer::new();
        server.of("/");
        server.of("/admin");
        let (watcher, _) = watcher_for(&server);

        assert_eq!(watcher.scan(), 2);
        assert_eq!(watcher.bound(), vec!["/", "/admin"]);
        assert_eq!(watcher.state(), WatcherState::Idle);
    }

    #[test]
    fn repeated_scans_bind_once() {
        let server = MemoryServer::new();
        let nsp = server.of("/");
        let (watcher, metrics) = watcher_for(&server);

        assert_eq!(watcher.scan(), 1);
        assert_eq!(watcher.scan(), 0);
        assert_eq!(watcher.scan(), 0);
        assert_eq!(nsp.connection_listener_count(), 1);

        let socket = nsp.connect("a").unwrap();
        socket.emit("ping", &[json!("hi")]);
        assert_eq!(metrics.value(Metric::EventsSentTotal, &["ping", "/"]), 1);
    }

    #[test]
    fn concurrent_scans_bind_once() {
        let server = MemoryServer::new();
        for i in 0..16 {
            server.of(&format!("/room-{i}"));
        }
        let (watcher, _) = watcher_for(&server);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let watcher = Arc::clone(&watcher);
                std::thread::spawn(move || watcher.scan())
            })
            .collect();
        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(total, 16);
        for i in 0..16 {
            let nsp = server.get(&format!("/room-{i}")).unwrap();
            assert_eq!(nsp.connection_listener_count(), 1);
        }
    }

    #[test]
    fn namespace_added_later_is_bound_by_next_scan() {
        let server = MemoryServer::new();
        let (watcher, _) = watcher_for(&server);
        assert_eq!(watcher.scan(), 0);

        server.of("/late");
        assert!(!watcher.is_bound("/late"));
        assert_eq!(watcher.scan(), 1);
        assert!(watcher.is_bound("/late"));
    }

    #[test]
    fn namespace_owned_by_another_interceptor_is_not_counted() {
        let server = MemoryServer::new();
        server.of("/");
        let (first, _) = watcher_for(&server);
        let (second, _) = watcher_for(&server);

        assert_eq!(first.scan(), 1);
        assert_eq!(second.scan(), 0);
        assert_eq!(second.scan(), 0);
        assert!(first.is_bound("/"));
        assert!(!second.is_bound("/"));
        assert!(second.bound().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn polling_picks_up_new_namespaces_and_stops_on_cancel() {
        let server = MemoryServer::new();
        let (watcher, _) = watcher_for(&server);
        let shutdown = CancellationToken::new();
        let task = watcher.spawn_polling(Duration::from_millis(100), shutdown.clone());

        // first tick at 100ms finds nothing
        tokio::time::sleep(Duration::from_millis(110)).await;
        assert!(watcher.bound().is_empty());

        server.of("/chat");
        assert!(!watcher.is_bound("/chat"));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(watcher.is_bound("/chat"));

        shutdown.cancel();
        task.await.unwrap();
    }
}
