//! socket-io-metrics - Prometheus instrumentation for socket.io style servers.
//!
//! [`SocketIoMetrics`] discovers the namespaces of an [`EventServer`], hooks
//! their connections and counts connects, disconnects, events, payload bytes
//! and error events into a [`prometheus::Registry`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use socket_io_metrics::{Config, SocketIoMetrics};
//! use socket_transport::{EventServer, MemoryServer};
//!
//! # async fn run() -> Result<(), socket_io_metrics::MetricsError> {
//! let server = MemoryServer::new();
//! server.of("/");
//!
//! let handle: Arc<dyn EventServer> = Arc::new(server.clone());
//! let metrics = SocketIoMetrics::start(handle, &Config::default())?;
//! println!("{}", metrics.gather_text());
//! metrics.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod interceptor;
pub mod metrics;
pub mod payload;
pub mod watcher;

use std::sync::Arc;

use axum::Router;
use prometheus::Registry;
use socket_transport::EventServer;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub use config::{Config, ConfigError, ExporterConfig, InstrumentationConfig};
pub use error::MetricsError;
pub use interceptor::EventInterceptor;
pub use metrics::{Metric, MetricSet};
pub use payload::PayloadSizer;
pub use watcher::NamespaceWatcher;

/// Running instrumentation for one server.
///
/// Background tasks (namespace polling, exporter) stop when the facade is
/// shut down or dropped. Hooks already installed on namespaces and sockets
/// keep counting into the registry for as long as those objects live.
pub struct SocketIoMetrics {
    registry: Registry,
    metrics: Arc<MetricSet>,
    watcher: Arc<NamespaceWatcher>,
    exporter_path: String,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SocketIoMetrics {
    /// Start instrumentation with a fresh registry.
    pub fn start(server: Arc<dyn EventServer>, config: &Config) -> Result<Self, MetricsError> {
        Self::start_with_registry(server, config, Registry::new())
    }

    /// Start instrumentation, registering metrics into `registry`.
    ///
    /// Fails if any metric name is already registered there. Namespaces that
    /// exist now are bound before this returns.
    pub fn start_with_registry(
        server: Arc<dyn EventServer>,
        config: &Config,
        registry: Registry,
    ) -> Result<Self, MetricsError> {
        if !config.exporter.path.starts_with('/') {
            return Err(MetricsError::InvalidPath(config.exporter.path.clone()));
        }
        let poll_interval = config.instrumentation.poll_interval();
        let exporter_addr = if config.exporter.enabled {
            Some(config.exporter.socket_addr()?)
        } else {
            None
        };

        let runtime = if poll_interval.is_some() || exporter_addr.is_some() {
            Some(tokio::runtime::Handle::try_current().map_err(|_| MetricsError::NoRuntime)?)
        } else {
            None
        };

        let metrics = Arc::new(MetricSet::register(&registry)?);
        if config.instrumentation.collect_default_metrics {
            if let Err(e) = register_process_metrics(&registry) {
                metrics.unregister(&registry);
                return Err(e);
            }
        }

        let sizer = PayloadSizer::new(config.instrumentation.max_payload_bytes);
        let interceptor = EventInterceptor::new(Arc::clone(&metrics), sizer, &server);
        let watcher = Arc::new(NamespaceWatcher::new(server, interceptor));
        let bound = watcher.scan();

        let shutdown = CancellationToken::new();
        let mut tasks = Vec::new();

        if let Some(runtime) = runtime {
            let _guard = runtime.enter();

            if let Some(period) = poll_interval {
                tasks.push(watcher.spawn_polling(period, shutdown.child_token()));
            }

            if let Some(addr) = exporter_addr {
                tasks.push(tokio::spawn(http::run_http_server(
                    addr,
                    config.exporter.path.clone(),
                    registry.clone(),
                    shutdown.child_token(),
                )));
            }
        }

        info!(
            namespaces = bound,
            poll_interval_ms = poll_interval.map(|p| p.as_millis() as u64).unwrap_or(0),
            exporter = config.exporter.enabled,
            "Socket.IO metrics started"
        );

        Ok(Self {
            registry,
            metrics,
            watcher,
            exporter_path: config.exporter.path.clone(),
            shutdown,
            tasks,
        })
    }

    pub fn metrics(&self) -> &Arc<MetricSet> {
        &self.metrics
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Names of the namespaces instrumented so far, sorted.
    pub fn bound_namespaces(&self) -> Vec<String> {
        self.watcher.bound()
    }

    /// Bind any namespace created since the last scan. Returns how many were
    /// bound.
    pub fn scan_now(&self) -> usize {
        self.watcher.scan()
    }

    /// Metrics in the Prometheus text format.
    pub fn gather_text(&self) -> String {
        metrics::gather_text(&self.registry)
    }

    /// Router serving the registry at the configured exporter path, for
    /// hosts that mount it into their own HTTP server.
    pub fn router(&self) -> Result<Router, MetricsError> {
        http::router(self.registry.clone(), &self.exporter_path)
    }

    /// Stop background tasks and wait for them to finish.
    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                warn!(error = %e, "Metrics task ended abnormally");
            }
        }
        info!("Socket.IO metrics stopped");
    }
}

impl Drop for SocketIoMetrics {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for SocketIoMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketIoMetrics")
            .field("watcher", &self.watcher)
            .field("exporter_path", &self.exporter_path)
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

#[cfg(target_os = "linux")]
fn register_process_metrics(registry: &Registry) -> Result<(), MetricsError> {
    let collector = prometheus::process_collector::ProcessCollector::for_self();
    registry.register(Box::new(collector))?;
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn register_process_metrics(_registry: &Registry) -> Result<(), MetricsError> {
    warn!("Process metrics are only available on Linux");
    Ok(())
}
