//! Event interception for one namespace.
//!
//! [`EventInterceptor::bind`] installs the metrics hooks on a namespace:
//!
//! - an outbound hook on the namespace's broadcast path,
//! - a connection listener that, for every new socket, counts the connect,
//!   refreshes the connected gauge and attaches per-socket hooks:
//!   - an outbound hook on the socket's emit path,
//!   - a universal inbound listener,
//!   - a disconnect listener.
//!
//! Hooks are keyed with [`HOOK_KEY`], so binding or attaching the same
//! namespace or socket a second time is refused by the transport and never
//! stacks a second layer of counting.
//!
//! The connected gauge is always read from [`EventServer::clients_count`].

use std::sync::{Arc, Weak};

use socket_transport::{
    Args, EmitHook, EventServer, Namespace, Socket, reserved,
};
use tracing::{debug, trace};

use crate::metrics::MetricSet;
use crate::payload::PayloadSizer;

/// Key under which the metrics hooks are installed.
pub const HOOK_KEY: &str = "socket_io_metrics";

/// Event names never metered as ordinary traffic.
pub const BLACKLISTED_EVENTS: [&str; 6] = reserved::ALL;

/// Whether `event` is excluded from the per-event counters.
#[inline]
pub fn is_blacklisted(event: &str) -> bool {
    BLACKLISTED_EVENTS.contains(&event)
}

/// Installs metric hooks on namespaces and their connections.
///
/// Cloning is cheap; clones share the same metric handles.
#[derive(Clone)]
pub struct EventInterceptor {
    metrics: Arc<MetricSet>,
    sizer: PayloadSizer,
    server: Weak<dyn EventServer>,
}

impl EventInterceptor {
    /// `server` is only held weakly; the gauge stops refreshing once the
    /// server is gone.
    pub fn new(metrics: Arc<MetricSet>, sizer: PayloadSizer, server: &Arc<dyn EventServer>) -> Self {
        Self {
            metrics,
            sizer,
            server: Arc::downgrade(server),
        }
    }

    pub fn metrics(&self) -> &Arc<MetricSet> {
        &self.metrics
    }

    /// Instrument a namespace.
    ///
    /// Returns `false` without touching the namespace when it already
    /// carries the metrics hook.
    pub fn bind(&self, namespace: &dyn Namespace) -> bool {
        let name = namespace.name().to_string();
        if !namespace.install_emit_hook(HOOK_KEY, self.outbound_hook(&name)) {
            debug!(namespace = %name, "Namespace already instrumented");
            return false;
        }

        let this = self.clone();
        namespace.on_connection(Arc::new(move |socket: Arc<dyn Socket>| {
            this.on_connect(&name, socket.as_ref());
        }));
        true
    }

    /// Instrument one connection of `namespace`.
    ///
    /// Returns `false` when the socket already carries the metrics hook.
    pub fn attach(&self, namespace: &str, socket: &dyn Socket) -> bool {
        if !socket.install_emit_hook(HOOK_KEY, self.outbound_hook(namespace)) {
            return false;
        }

        {
            let this = self.clone();
            let namespace = namespace.to_string();
            socket.on_disconnect(Arc::new(move |_reason: &str| {
                this.metrics.record_disconnect(&namespace);
                this.refresh_connected();
            }));
        }

        {
            let this = self.clone();
            let namespace = namespace.to_string();
            socket.on_any(Arc::new(move |event: &str, args: &Args| {
                this.on_inbound(&namespace, event, args);
            }));
        }

        trace!(namespace = %namespace, socket = %socket.id(), "Connection instrumented");
        true
    }

    fn on_connect(&self, namespace: &str, socket: &dyn Socket) {
        self.metrics.record_connect(namespace);
        self.refresh_connected();
        self.attach(namespace, socket);
    }

    fn on_inbound(&self, namespace: &str, event: &str, args: &Args) {
        if event == reserved::ERROR {
            self.refresh_connected();
            self.metrics.record_error(namespace);
        } else if !is_blacklisted(event) {
            self.metrics
                .record_received(event, namespace, self.sizer.size_of_args(args));
        }
    }

    fn refresh_connected(&self) {
        if let Some(server) = self.server.upgrade() {
            self.metrics.refresh_connected(|| server.clients_count());
        }
    }

    fn outbound_hook(&self, namespace: &str) -> Arc<dyn EmitHook> {
        Arc::new(OutboundHook {
            metrics: Arc::clone(&self.metrics),
            sizer: self.sizer,
            namespace: namespace.to_string(),
        })
    }
}

impl std::fmt::Debug for EventInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventInterceptor")
            .field("sizer", &self.sizer)
            .field("server_alive", &(self.server.strong_count() > 0))
            .finish()
    }
}

/// Counts outbound events at namespace or socket scope.
struct OutboundHook {
    metrics: Arc<MetricSet>,
    sizer: PayloadSizer,
    namespace: String,
}

impl EmitHook for OutboundHook {
    fn on_emit(&self, event: &str, args: &Args) {
        if is_blacklisted(event) {
            return;
        }
        self.metrics
            .record_sent(event, &self.namespace, self.sizer.size_of_args(args));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metric;
    use prometheus::Registry;
    use serde_json::json;
    use socket_transport::MemoryServer;

    struct Rig {
        server: MemoryServer,
        handle: Arc<dyn EventServer>,
        metrics: Arc<MetricSet>,
        interceptor: EventInterceptor,
    }

    fn rig() -> Rig {
        let server = MemoryServer::new();
        let handle: Arc<dyn EventServer> = Arc::new(server.clone());
        let metrics = Arc::new(MetricSet::register(&Registry::new()).unwrap());
        let interceptor =
            EventInterceptor::new(Arc::clone(&metrics), PayloadSizer::default(), &handle);
        Rig {
            server,
            handle,
            metrics,
            interceptor,
        }
    }

    #[test]
    fn blacklist_covers_lifecycle_and_listener_events() {
        for event in ["error", "connect", "disconnect", "disconnecting", "newListener", "removeListener"] {
            assert!(is_blacklisted(event), "{event} should be blacklisted");
        }
        assert!(!is_blacklisted("ping"));
        assert!(!is_blacklisted("Connect"));
    }

    #[test]
    fn connect_counts_and_sets_gauge_from_transport() {
        let r = rig();
        let nsp = r.server.of("/");
        assert!(r.interceptor.bind(nsp.as_ref()));

        nsp.connect("a").unwrap();
        nsp.connect("b").unwrap();

        assert_eq!(r.metrics.value(Metric::ConnectTotal, &["/"]), 2);
        assert_eq!(r.metrics.value(Metric::ConnectedSockets, &[]), 2);
    }

    #[test]
    fn disconnect_counts_and_refreshes_gauge() {
        let r = rig();
        let nsp = r.server.of("/");
        r.interceptor.bind(nsp.as_ref());

        let a = nsp.connect("a").unwrap();
        nsp.connect("b").unwrap();
        a.disconnect("client namespace disconnect");

        assert_eq!(r.metrics.value(Metric::DisconnectTotal, &["/"]), 1);
        assert_eq!(r.metrics.value(Metric::ConnectedSockets, &[]), 1);
    }

    #[test]
    fn socket_emit_is_counted_and_delivered_unchanged() {
        let r = rig();
        let nsp = r.server.of("/");
        r.interceptor.bind(nsp.as_ref());
        let socket = nsp.connect("a").unwrap();

        let args = [json!({"id": 7}), json!("x")];
        assert!(socket.emit("update", &args));

        assert_eq!(r.metrics.value(Metric::EventsSentTotal, &["update", "/"]), 1);
        let expected = serde_json::to_string(&args).unwrap().len() as u64;
        assert_eq!(r.metrics.value(Metric::BytesTransmitted, &["update", "/"]), expected);

        let sent = socket.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event, "update");
        assert_eq!(sent[0].args, args.to_vec());
    }

    #[test]
    fn namespace_broadcast_is_counted_once() {
        let r = rig();
        let nsp = r.server.of("/chat");
        r.interceptor.bind(nsp.as_ref());
        nsp.connect("a").unwrap();
        nsp.connect("b").unwrap();

        nsp.emit("news", &[json!("hello")]);

        assert_eq!(r.metrics.value(Metric::EventsSentTotal, &["news", "/chat"]), 1);
        assert_eq!(r.metrics.value(Metric::BytesTransmitted, &["news", "/chat"]), 5);
    }

    #[test]
    fn inbound_events_are_counted_with_size() {
        let r = rig();
        let nsp = r.server.of("/");
        r.interceptor.bind(nsp.as_ref());
        let socket = nsp.connect("a").unwrap();

        let handled = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        {
            let handled = Arc::clone(&handled);
            socket.on("chat", move |_: &Args| {
                handled.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            });
        }

        socket.receive("chat", &[json!("hey")]);
        socket.receive("chat", &[json!("hey")]);

        assert_eq!(r.metrics.value(Metric::EventsReceivedTotal, &["chat", "/"]), 2);
        assert_eq!(r.metrics.value(Metric::BytesReceived, &["chat", "/"]), 6);
        assert_eq!(handled.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn inbound_error_counts_error_only() {
        let r = rig();
        let nsp = r.server.of("/");
        r.interceptor.bind(nsp.as_ref());
        let socket = nsp.connect("a").unwrap();

        socket.receive("error", &[json!("boom")]);

        assert_eq!(r.metrics.value(Metric::ErrorsTotal, &["/"]), 1);
        assert!(r.metrics.series(Metric::EventsReceivedTotal).is_empty());
        assert!(r.metrics.series(Metric::BytesReceived).is_empty());
    }

    #[test]
    fn blacklisted_events_never_become_labels() {
        let r = rig();
        let nsp = r.server.of("/");
        r.interceptor.bind(nsp.as_ref());
        let socket = nsp.connect("a").unwrap();

        for event in BLACKLISTED_EVENTS {
            socket.emit(event, &[json!(1)]);
            nsp.emit(event, &[json!(1)]);
            socket.receive(event, &[json!(1)]);
        }
        socket.emit("real", &[]);

        assert_eq!(r.metrics.label_values(Metric::EventsSentTotal, "event"), vec!["real"]);
        assert!(r.metrics.label_values(Metric::EventsReceivedTotal, "event").is_empty());
    }

    #[test]
    fn binding_twice_does_not_double_count() {
        let r = rig();
        let nsp = r.server.of("/");
        assert!(r.interceptor.bind(nsp.as_ref()));
        assert!(!r.interceptor.bind(nsp.as_ref()));
        assert_eq!(nsp.connection_listener_count(), 1);

        let socket = nsp.connect("a").unwrap();
        socket.emit("ping", &[json!("hi")]);
        nsp.emit("ping", &[json!("hi")]);

        assert_eq!(r.metrics.value(Metric::ConnectTotal, &["/"]), 1);
        assert_eq!(r.metrics.value(Metric::EventsSentTotal, &["ping", "/"]), 2);
    }

    #[test]
    fn attaching_a_socket_twice_is_refused() {
        let r = rig();
        let nsp = r.server.of("/");
        r.interceptor.bind(nsp.as_ref());
        let socket = nsp.connect("a").unwrap();

        assert!(!r.interceptor.attach("/", socket.as_ref()));
        assert_eq!(socket.any_listener_count(), 1);

        socket.receive("move", &[]);
        assert_eq!(r.metrics.value(Metric::EventsReceivedTotal, &["move", "/"]), 1);
    }

    #[test]
    fn unmeasurable_payload_still_counts_the_event() {
        let server = MemoryServer::new();
        let handle: Arc<dyn EventServer> = Arc::new(server.clone());
        let metrics = Arc::new(MetricSet::register(&Registry::new()).unwrap());
        let interceptor = EventInterceptor::new(Arc::clone(&metrics), PayloadSizer::new(4), &handle);
        let nsp = server.of("/");
        interceptor.bind(nsp.as_ref());
        let socket = nsp.connect("a").unwrap();

        socket.emit("blob", &[json!({"data": "far too large to measure"})]);

        assert_eq!(metrics.value(Metric::EventsSentTotal, &["blob", "/"]), 1);
        assert_eq!(metrics.value(Metric::BytesTransmitted, &["blob", "/"]), 0);
        assert_eq!(socket.sent().len(), 1);
    }

    #[test]
    fn gauge_stops_refreshing_once_server_is_dropped() {
        let r = rig();
        let nsp = r.server.of("/");
        r.interceptor.bind(nsp.as_ref());
        nsp.connect("a").unwrap();
        drop(r.handle);

        nsp.connect("b").unwrap();
        assert_eq!(r.metrics.value(Metric::ConnectTotal, &["/"]), 2);
        assert_eq!(r.metrics.value(Metric::ConnectedSockets, &[]), 1);
    }
}
