//! Instrumented in-memory server.

use std::sync::Arc;

use socket_io_metrics::{Config, Metric, SocketIoMetrics};
use socket_transport::{EventServer, MemoryServer};

/// A [`MemoryServer`] with metrics started on it.
#[allow(dead_code)]
pub struct Harness {
    pub server: MemoryServer,
    pub metrics: SocketIoMetrics,
}

#[allow(dead_code)]
impl Harness {
    /// Create `namespaces` and start metrics without background polling, so
    /// the harness works outside a tokio runtime.
    pub fn start(namespaces: &[&str]) -> Self {
        Self::with_config(namespaces, &static_config())
    }

    pub fn with_config(namespaces: &[&str], config: &Config) -> Self {
        let server = MemoryServer::new();
        for name in namespaces {
            server.of(name);
        }
        let handle: Arc<dyn EventServer> = Arc::new(server.clone());
        let metrics = SocketIoMetrics::start(handle, config).expect("metrics should start");
        Self { server, metrics }
    }

    pub fn value(&self, metric: Metric, labels: &[&str]) -> u64 {
        self.metrics.metrics().value(metric, labels)
    }

    pub fn connected(&self) -> u64 {
        self.value(Metric::ConnectedSockets, &[])
    }
}

/// Default configuration with namespace polling turned off.
#[allow(dead_code)]
pub fn static_config() -> Config {
    let mut config = Config::default();
    config.instrumentation.check_for_new_namespaces = false;
    config
}
