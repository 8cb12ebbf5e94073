//! In-memory reference transport.
//!
//! Implements the capability traits without any network I/O. Outbound events
//! land in a per-socket outbox that callers can inspect with
//! [`MemorySocket::sent`]; inbound events are injected with
//! [`MemorySocket::receive`].
//!
//! Listener callbacks are always invoked after the relevant lock guard has
//! been dropped, so a listener may freely call back into the transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use dashmap::{DashMap, DashSet};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::debug;

use crate::error::TransportError;
use crate::hook::{EmitHook, HookChain};
use crate::{AnyListener, Args, ConnectionListener, DisconnectListener, EventServer, Namespace, Socket};

/// One event as delivered to a client.
#[derive(Debug, Clone, PartialEq)]
pub struct SentEvent {
    /// Event name.
    pub event: String,
    /// Arguments exactly as passed to the dispatch call.
    pub args: Vec<Value>,
}

#[derive(Default)]
struct ServerShared {
    namespaces: DashMap<String, Arc<MemoryNamespace>>,
    socket_ids: DashSet<String>,
    clients: AtomicUsize,
}

/// In-memory server. Cloning yields another handle to the same server.
#[derive(Clone, Default)]
pub struct MemoryServer {
    shared: Arc<ServerShared>,
}

impl MemoryServer {
    /// Create a server with no namespaces.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the namespace at `name`.
    ///
    /// Names without a leading `/` are prefixed with one.
    pub fn of(&self, name: &str) -> Arc<MemoryNamespace> {
        let name = normalize(name);
        self.shared
            .namespaces
            .entry(name.clone())
            .or_insert_with(|| {
                debug!(namespace = %name, "Namespace created");
                Arc::new(MemoryNamespace {
                    name: name.clone(),
                    server: Arc::clone(&self.shared),
                    sockets: DashMap::new(),
                    connection_listeners: RwLock::new(Vec::new()),
                    hooks: HookChain::new(),
                    closed: AtomicBool::new(false),
                })
            })
            .value()
            .clone()
    }

    /// Look up an existing namespace.
    pub fn get(&self, name: &str) -> Option<Arc<MemoryNamespace>> {
        self.shared
            .namespaces
            .get(&normalize(name))
            .map(|n| Arc::clone(n.value()))
    }

    /// Remove a namespace, disconnecting its sockets.
    pub fn remove_namespace(&self, name: &str) -> Option<Arc<MemoryNamespace>> {
        let (_, nsp) = self.shared.namespaces.remove(&normalize(name))?;
        nsp.closed.store(true, Ordering::SeqCst);
        for socket in nsp.sockets() {
            socket.disconnect("namespace removed");
        }
        Some(nsp)
    }

    /// Names of all namespaces, sorted.
    pub fn namespace_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .shared
            .namespaces
            .iter()
            .map(|e| e.key().clone())
            .collect();
        names.sort();
        names
    }
}

impl EventServer for MemoryServer {
    fn namespaces(&self) -> Vec<Arc<dyn Namespace>> {
        self.shared
            .namespaces
            .iter()
            .map(|e| Arc::clone(e.value()) as Arc<dyn Namespace>)
            .collect()
    }

    fn clients_count(&self) -> usize {
        self.shared.clients.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for MemoryServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryServer")
            .field("namespaces", &self.namespace_names())
            .field("clients", &self.clients_count())
            .finish()
    }
}

fn normalize(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{name}")
    }
}

/// In-memory namespace.
pub struct MemoryNamespace {
    name: String,
    server: Arc<ServerShared>,
    sockets: DashMap<String, Arc<MemorySocket>>,
    connection_listeners: RwLock<Vec<ConnectionListener>>,
    hooks: HookChain,
    closed: AtomicBool,
}

impl MemoryNamespace {
    /// Connect a new client with the given id.
    ///
    /// The server-wide client count is updated before connection listeners
    /// run.
    pub fn connect(self: &Arc<Self>, id: &str) -> Result<Arc<MemorySocket>, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::NamespaceClosed(self.name.clone()));
        }
        if !self.server.socket_ids.insert(id.to_string()) {
            return Err(TransportError::DuplicateSocket(id.to_string()));
        }

        let socket = Arc::new(MemorySocket {
            id: id.to_string(),
            namespace: self.name.clone(),
            server: Arc::clone(&self.server),
            nsp: Arc::downgrade(self),
            connected: AtomicBool::new(true),
            hooks: HookChain::new(),
            any_listeners: RwLock::new(Vec::new()),
            handlers: RwLock::new(HashMap::new()),
            disconnect_listeners: Mutex::new(Vec::new()),
            outbox: Mutex::new(Vec::new()),
        });

        self.sockets.insert(id.to_string(), Arc::clone(&socket));
        self.server.clients.fetch_add(1, Ordering::SeqCst);

        let listeners = self.connection_listeners.read().clone();
        for listener in listeners {
            listener(Arc::clone(&socket) as Arc<dyn Socket>);
        }

        Ok(socket)
    }

    /// Sockets currently connected to this namespace.
    pub fn sockets(&self) -> Vec<Arc<MemorySocket>> {
        self.sockets.iter().map(|e| Arc::clone(e.value())).collect()
    }

    /// Whether an outbound hook is installed under `key`.
    pub fn has_emit_hook(&self, key: &str) -> bool {
        self.hooks.contains(key)
    }

    /// Number of registered connection listeners.
    pub fn connection_listener_count(&self) -> usize {
        self.connection_listeners.read().len()
    }

    /// Whether the namespace was removed from its server.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Namespace for MemoryNamespace {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_connection(&self, listener: ConnectionListener) {
        self.connection_listeners.write().push(listener);
    }

    fn emit(&self, event: &str, args: &Args) -> bool {
        self.hooks.run(event, args);
        for socket in self.sockets() {
            socket.deliver(event, args);
        }
        true
    }

    fn install_emit_hook(&self, key: &'static str, hook: Arc<dyn EmitHook>) -> bool {
        self.hooks.install(key, hook)
    }
}

impl std::fmt::Debug for MemoryNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryNamespace")
            .field("name", &self.name)
            .field("sockets", &self.sockets.len())
            .field("hooks", &self.hooks)
            .field("closed", &self.is_closed())
            .finish()
    }
}

type NamedHandler = Arc<dyn Fn(&Args) + Send + Sync>;

/// In-memory client session.
pub struct MemorySocket {
    id: String,
    namespace: String,
    server: Arc<ServerShared>,
    nsp: Weak<MemoryNamespace>,
    connected: AtomicBool,
    hooks: HookChain,
    any_listeners: RwLock<Vec<AnyListener>>,
    handlers: RwLock<HashMap<String, Vec<NamedHandler>>>,
    disconnect_listeners: Mutex<Vec<DisconnectListener>>,
    outbox: Mutex<Vec<SentEvent>>,
}

impl MemorySocket {
    /// Register a handler for one event name.
    pub fn on<F>(&self, event: &str, handler: F)
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .entry(event.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Deliver an inbound event from the client.
    ///
    /// Universal listeners run first, then handlers registered for `event`.
    /// Returns the number of name-specific handlers invoked. Events arriving
    /// after disconnect are dropped.
    pub fn receive(&self, event: &str, args: &Args) -> usize {
        if !self.is_connected() {
            return 0;
        }

        let any = self.any_listeners.read().clone();
        for listener in any {
            listener(event, args);
        }

        let named: Vec<NamedHandler> = self
            .handlers
            .read()
            .get(event)
            .cloned()
            .unwrap_or_default();
        for handler in &named {
            handler(args);
        }
        named.len()
    }

    /// Close the session.
    ///
    /// Only the first call has an effect. The socket leaves its namespace and
    /// the server-wide count is decremented before disconnect listeners run.
    pub fn disconnect(&self, reason: &str) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(nsp) = self.nsp.upgrade() {
            nsp.sockets.remove(&self.id);
        }
        self.server.socket_ids.remove(&self.id);
        self.server.clients.fetch_sub(1, Ordering::SeqCst);

        let listeners = std::mem::take(&mut *self.disconnect_listeners.lock());
        for listener in listeners {
            listener(reason);
        }
    }

    /// Whether the session is still open.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Events delivered to this client so far.
    pub fn sent(&self) -> Vec<SentEvent> {
        self.outbox.lock().clone()
    }

    /// Whether an outbound hook is installed under `key`.
    pub fn has_emit_hook(&self, key: &str) -> bool {
        self.hooks.contains(key)
    }

    /// Number of registered universal listeners.
    pub fn any_listener_count(&self) -> usize {
        self.any_listeners.read().len()
    }

    fn deliver(&self, event: &str, args: &Args) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.outbox.lock().push(SentEvent {
            event: event.to_string(),
            args: args.to_vec(),
        });
        true
    }
}

impl Socket for MemorySocket {
    fn id(&self) -> &str {
        &self.id
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn on_disconnect(&self, listener: DisconnectListener) {
        self.disconnect_listeners.lock().push(listener);
    }

    fn on_any(&self, listener: AnyListener) {
        self.any_listeners.write().push(listener);
    }

    fn emit(&self, event: &str, args: &Args) -> bool {
        self.hooks.run(event, args);
        self.deliver(event, args)
    }

    fn install_emit_hook(&self, key: &'static str, hook: Arc<dyn EmitHook>) -> bool {
        self.hooks.install(key, hook)
    }
}

impl std::fmt::Debug for MemorySocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySocket")
            .field("id", &self.id)
            .field("namespace", &self.namespace)
            .field("connected", &self.is_connected())
            .field("hooks", &self.hooks)
            .finish()
    }
}
