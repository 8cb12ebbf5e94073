//! Prometheus metric set for socket traffic.
//!
//! Eight fixed metrics, registered once against an explicit
//! [`prometheus::Registry`] and shared by every namespace interceptor.
//!
//! | Metric | Kind | Labels |
//! |---|---|---|
//! | `socket_io_connected` | Gauge | - |
//! | `socket_io_connect_total` | Counter | namespace |
//! | `socket_io_disconnect_total` | Counter | namespace |
//! | `socket_io_events_received_total` | Counter | event, namespace |
//! | `socket_io_events_sent_total` | Counter | event, namespace |
//! | `socket_io_receive_bytes` | Counter | event, namespace |
//! | `socket_io_transmit_bytes` | Counter | event, namespace |
//! | `socket_io_errors_total` | Counter | namespace |
//!
//! The connected gauge is only ever *set* from the transport's own client
//! count; it is never incremented or decremented locally.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use prometheus::core::Collector;
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::error::MetricsError;

/// Metric names. Part of the scrape contract.
pub mod names {
    pub const CONNECTED: &str = "socket_io_connected";
    pub const CONNECT_TOTAL: &str = "socket_io_connect_total";
    pub const DISCONNECT_TOTAL: &str = "socket_io_disconnect_total";
    pub const EVENTS_RECEIVED_TOTAL: &str = "socket_io_events_received_total";
    pub const EVENTS_SENT_TOTAL: &str = "socket_io_events_sent_total";
    pub const RECEIVE_BYTES: &str = "socket_io_receive_bytes";
    pub const TRANSMIT_BYTES: &str = "socket_io_transmit_bytes";
    pub const ERRORS_TOTAL: &str = "socket_io_errors_total";
}

const NAMESPACE: &[&str] = &["namespace"];
const EVENT_NAMESPACE: &[&str] = &["event", "namespace"];

/// Counter or gauge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
}

/// Static description of one metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricDefinition {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
    pub labels: &'static [&'static str],
}

/// Identifies one metric of the [`MetricSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    ConnectedSockets,
    ConnectTotal,
    DisconnectTotal,
    EventsReceivedTotal,
    EventsSentTotal,
    BytesReceived,
    BytesTransmitted,
    ErrorsTotal,
}

impl Metric {
    pub const ALL: [Metric; 8] = [
        Metric::ConnectedSockets,
        Metric::ConnectTotal,
        Metric::DisconnectTotal,
        Metric::EventsReceivedTotal,
        Metric::EventsSentTotal,
        Metric::BytesReceived,
        Metric::BytesTransmitted,
        Metric::ErrorsTotal,
    ];

    pub fn definition(self) -> MetricDefinition {
        use MetricKind::{Counter, Gauge};
        let (name, help, kind, labels) = match self {
            Metric::ConnectedSockets => (
                names::CONNECTED,
                "Number of currently connected sockets",
                Gauge,
                &[][..],
            ),
            Metric::ConnectTotal => (
                names::CONNECT_TOTAL,
                "Total count of socket.io connection requests",
                Counter,
                NAMESPACE,
            ),
            Metric::DisconnectTotal => (
                names::DISCONNECT_TOTAL,
                "Total count of socket.io disconnections",
                Counter,
                NAMESPACE,
            ),
            Metric::EventsReceivedTotal => (
                names::EVENTS_RECEIVED_TOTAL,
                "Total count of socket.io received events",
                Counter,
                EVENT_NAMESPACE,
            ),
            Metric::EventsSentTotal => (
                names::EVENTS_SENT_TOTAL,
                "Total count of socket.io sent events",
                Counter,
                EVENT_NAMESPACE,
            ),
            Metric::BytesReceived => (
                names::RECEIVE_BYTES,
                "Total socket.io bytes received",
                Counter,
                EVENT_NAMESPACE,
            ),
            Metric::BytesTransmitted => (
                names::TRANSMIT_BYTES,
                "Total socket.io bytes transmitted",
                Counter,
                EVENT_NAMESPACE,
            ),
            Metric::ErrorsTotal => (
                names::ERRORS_TOTAL,
                "Total socket.io errors",
                Counter,
                NAMESPACE,
            ),
        };
        MetricDefinition {
            name,
            help,
            kind,
            labels,
        }
    }
}

/// One labelled series read back from a metric.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

/// The shared metric handles.
///
/// Cloning is cheap; every clone updates the same underlying series.
#[derive(Debug, Clone)]
pub struct MetricSet {
    pub connected_sockets: IntGauge,
    pub connect_total: IntCounterVec,
    pub disconnect_total: IntCounterVec,
    pub events_received_total: IntCounterVec,
    pub events_sent_total: IntCounterVec,
    pub bytes_received: IntCounterVec,
    pub bytes_transmitted: IntCounterVec,
    pub errors_total: IntCounterVec,
    /// Serializes gauge refreshes so a stale count never overwrites a newer one.
    refresh_lock: Arc<Mutex<()>>,
}

/// Tracks what has been registered so a failed registration can be undone.
struct Registration<'a> {
    registry: &'a Registry,
    done: Vec<Box<dyn Collector>>,
}

impl Registration<'_> {
    fn add<C>(&mut self, collector: C) -> Result<C, prometheus::Error>
    where
        C: Collector + Clone + 'static,
    {
        self.registry.register(Box::new(collector.clone()))?;
        self.done.push(Box::new(collector.clone()));
        Ok(collector)
    }

    fn rollback(self) {
        for collector in self.done {
            if let Err(e) = self.registry.unregister(collector) {
                tracing::warn!(error = %e, "Failed to unregister metric during rollback");
            }
        }
    }
}

fn counter_vec(metric: Metric) -> Result<IntCounterVec, prometheus::Error> {
    let def = metric.definition();
    IntCounterVec::new(Opts::new(def.name, def.help), def.labels)
}

impl MetricSet {
    /// Create the eight metrics and register them in `registry`.
    ///
    /// Fails if any name is already registered. Metrics registered before
    /// the failure are removed again, leaving the registry as it was.
    pub fn register(registry: &Registry) -> Result<Self, MetricsError> {
        let mut reg = Registration {
            registry,
            done: Vec::with_capacity(Metric::ALL.len()),
        };
        match Self::register_all(&mut reg) {
            Ok(set) => Ok(set),
            Err(e) => {
                reg.rollback();
                Err(MetricsError::Registration(e))
            }
        }
    }

    fn register_all(reg: &mut Registration<'_>) -> Result<Self, prometheus::Error> {
        let gauge = Metric::ConnectedSockets.definition();
        Ok(Self {
            connected_sockets: reg.add(IntGauge::new(gauge.name, gauge.help)?)?,
            connect_total: reg.add(counter_vec(Metric::ConnectTotal)?)?,
            disconnect_total: reg.add(counter_vec(Metric::DisconnectTotal)?)?,
            events_received_total: reg.add(counter_vec(Metric::EventsReceivedTotal)?)?,
            events_sent_total: reg.add(counter_vec(Metric::EventsSentTotal)?)?,
            bytes_received: reg.add(counter_vec(Metric::BytesReceived)?)?,
            bytes_transmitted: reg.add(counter_vec(Metric::BytesTransmitted)?)?,
            errors_total: reg.add(counter_vec(Metric::ErrorsTotal)?)?,
            refresh_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Remove every metric of this set from `registry`.
    pub fn unregister(&self, registry: &Registry) {
        let collectors: [Box<dyn Collector>; 8] = [
            Box::new(self.connected_sockets.clone()),
            Box::new(self.connect_total.clone()),
            Box::new(self.disconnect_total.clone()),
            Box::new(self.events_received_total.clone()),
            Box::new(self.events_sent_total.clone()),
            Box::new(self.bytes_received.clone()),
            Box::new(self.bytes_transmitted.clone()),
            Box::new(self.errors_total.clone()),
        ];
        for collector in collectors {
            if let Err(e) = registry.unregister(collector) {
                tracing::warn!(error = %e, "Failed to unregister metric");
            }
        }
    }

    fn counter_vec(&self, metric: Metric) -> Option<&IntCounterVec> {
        match metric {
            Metric::ConnectedSockets => None,
            Metric::ConnectTotal => Some(&self.connect_total),
            Metric::DisconnectTotal => Some(&self.disconnect_total),
            Metric::EventsReceivedTotal => Some(&self.events_received_total),
            Metric::EventsSentTotal => Some(&self.events_sent_total),
            Metric::BytesReceived => Some(&self.bytes_received),
            Metric::BytesTransmitted => Some(&self.bytes_transmitted),
            Metric::ErrorsTotal => Some(&self.errors_total),
        }
    }

    /// Add `amount` to a counter.
    ///
    /// # Panics
    /// If `metric` is the gauge or `labels` does not match the metric's label
    /// schema. Both are programming errors.
    pub fn increment(&self, metric: Metric, labels: &[&str], amount: u64) {
        let def = metric.definition();
        assert_eq!(
            labels.len(),
            def.labels.len(),
            "label set for {} must be {:?}",
            def.name,
            def.labels
        );
        match self.counter_vec(metric) {
            Some(counter) => counter.with_label_values(labels).inc_by(amount),
            None => panic!("{} is a gauge; use set_gauge", def.name),
        }
    }

    /// Set a gauge to `value`.
    ///
    /// # Panics
    /// If `metric` is a counter.
    pub fn set_gauge(&self, metric: Metric, value: i64) {
        match metric {
            Metric::ConnectedSockets => self.connected_sockets.set(value),
            other => panic!("{} is a counter; use increment", other.definition().name),
        }
    }

    #[inline]
    pub fn set_connected(&self, count: usize) {
        self.connected_sockets
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Read the live connection count with `read` and store it in the gauge.
    ///
    /// Refreshes run one at a time, so the last refresh to finish always
    /// stores a count read after every earlier refresh.
    pub fn refresh_connected<F>(&self, read: F)
    where
        F: FnOnce() -> usize,
    {
        let _guard = self.refresh_lock.lock();
        self.set_connected(read());
    }

    #[inline]
    pub fn record_connect(&self, namespace: &str) {
        self.connect_total.with_label_values(&[namespace]).inc();
    }

    #[inline]
    pub fn record_disconnect(&self, namespace: &str) {
        self.disconnect_total.with_label_values(&[namespace]).inc();
    }

    #[inline]
    pub fn record_error(&self, namespace: &str) {
        self.errors_total.with_label_values(&[namespace]).inc();
    }

    /// Count one outbound event and its payload size.
    #[inline]
    pub fn record_sent(&self, event: &str, namespace: &str, bytes: u64) {
        let labels = [event, namespace];
        self.bytes_transmitted.with_label_values(&labels).inc_by(bytes);
        self.events_sent_total.with_label_values(&labels).inc();
    }

    /// Count one inbound event and its payload size.
    #[inline]
    pub fn record_received(&self, event: &str, namespace: &str, bytes: u64) {
        let labels = [event, namespace];
        self.bytes_received.with_label_values(&labels).inc_by(bytes);
        self.events_received_total.with_label_values(&labels).inc();
    }

    fn families(&self, metric: Metric) -> Vec<MetricFamily> {
        match self.counter_vec(metric) {
            Some(counter) => counter.collect(),
            None => self.connected_sockets.collect(),
        }
    }

    /// Every series currently present for `metric`.
    ///
    /// Reading never creates a series.
    pub fn series(&self, metric: Metric) -> Vec<Series> {
        let kind = metric.definition().kind;
        let families = self.families(metric);
        families
            .iter()
            .flat_map(|family| family.get_metric())
            .map(|m| Series {
                labels: m
                    .get_label()
                    .iter()
                    .map(|pair| (pair.get_name().to_string(), pair.get_value().to_string()))
                    .collect(),
                value: match kind {
                    MetricKind::Counter => m.get_counter().get_value(),
                    MetricKind::Gauge => m.get_gauge().get_value(),
                },
            })
            .collect()
    }

    /// Current value of the series with exactly `labels`, or 0 when absent.
    ///
    /// `labels` is given in the metric's declared label order.
    pub fn value(&self, metric: Metric, labels: &[&str]) -> u64 {
        let wanted: BTreeMap<String, String> = metric
            .definition()
            .labels
            .iter()
            .zip(labels)
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        self.series(metric)
            .into_iter()
            .find(|s| s.labels == wanted)
            .map(|s| s.value as u64)
            .unwrap_or(0)
    }

    /// Distinct values seen for label `label` on `metric`.
    pub fn label_values(&self, metric: Metric, label: &str) -> Vec<String> {
        let mut values: Vec<String> = self
            .series(metric)
            .into_iter()
            .filter_map(|s| s.labels.get(label).cloned())
            .collect();
        values.sort();
        values.dedup();
        values
    }
}

/// Encode everything in `registry` in the Prometheus text format.
pub fn gather_text(registry: &Registry) -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}
