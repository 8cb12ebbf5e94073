//! # socket-transport
//!
//! Capability traits for a namespaced, bidirectional, event-based server,
//! plus an in-memory reference implementation.
//!
//! A server is partitioned into [`Namespace`]s. Clients connect to a
//! namespace and become [`Socket`]s. Both namespaces and sockets dispatch
//! named events carrying a list of JSON arguments.
//!
//! ## Observation points
//!
//! Instrumentation attaches to a transport through three explicit seams
//! instead of patching live objects:
//!
//! - **Emit hooks** ([`EmitHook`]): an ordered chain of observers that the
//!   transport runs before its own outbound dispatch. Hooks are keyed, and a
//!   key can only be installed once per namespace or socket.
//! - **Universal inbound listener** ([`Socket::on_any`]): called for every
//!   inbound event before name-specific listeners.
//! - **Lifecycle listeners** ([`Namespace::on_connection`],
//!   [`Socket::on_disconnect`]).
//!
//! ## Quick Start
//!
//! ```rust
//! use serde_json::json;
//! use socket_transport::{EventServer, MemoryServer, Socket};
//!
//! let server = MemoryServer::new();
//! let chat = server.of("/chat");
//! let socket = chat.connect("client-1").expect("namespace is open");
//!
//! socket.emit("welcome", &[json!("hello")]);
//! assert_eq!(server.clients_count(), 1);
//! assert_eq!(socket.sent().len(), 1);
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod hook;
pub mod memory;

use std::sync::Arc;

use serde_json::Value;

pub use error::TransportError;
pub use hook::{EmitHook, HookChain};
pub use memory::{MemoryNamespace, MemoryServer, MemorySocket, SentEvent};

/// Argument list carried by one event.
pub type Args = [Value];

/// Reserved event names used by the transport itself.
pub mod reserved {
    /// Connection established.
    pub const CONNECT: &str = "connect";
    /// Connection closed.
    pub const DISCONNECT: &str = "disconnect";
    /// Connection is about to close.
    pub const DISCONNECTING: &str = "disconnecting";
    /// Error surfaced on a connection.
    pub const ERROR: &str = "error";
    /// A listener was registered on an emitter.
    pub const NEW_LISTENER: &str = "newListener";
    /// A listener was removed from an emitter.
    pub const REMOVE_LISTENER: &str = "removeListener";

    /// All reserved names.
    pub const ALL: [&str; 6] = [
        CONNECT,
        DISCONNECT,
        DISCONNECTING,
        ERROR,
        NEW_LISTENER,
        REMOVE_LISTENER,
    ];
}

/// Callback fired when a client connects to a namespace.
pub type ConnectionListener = Arc<dyn Fn(Arc<dyn Socket>) + Send + Sync>;

/// Callback fired once when a socket disconnects. Receives the reason.
pub type DisconnectListener = Arc<dyn Fn(&str) + Send + Sync>;

/// Callback fired for every inbound event on a socket.
pub type AnyListener = Arc<dyn Fn(&str, &Args) + Send + Sync>;

/// A server hosting namespaces.
pub trait EventServer: Send + Sync {
    /// Snapshot of the namespaces currently known to the server.
    fn namespaces(&self) -> Vec<Arc<dyn Namespace>>;

    /// Authoritative number of live client connections across the server.
    fn clients_count(&self) -> usize;
}

/// A named partition of the server.
pub trait Namespace: Send + Sync {
    /// Namespace path (e.g. `/` or `/chat`).
    fn name(&self) -> &str;

    /// Register a connection listener.
    fn on_connection(&self, listener: ConnectionListener);

    /// Broadcast an event to every socket in the namespace.
    ///
    /// Returns `true` when the event was dispatched.
    fn emit(&self, event: &str, args: &Args) -> bool;

    /// Install an outbound hook under `key`.
    ///
    /// Returns `false`, leaving the chain untouched, when `key` is already
    /// installed on this namespace.
    fn install_emit_hook(&self, key: &'static str, hook: Arc<dyn EmitHook>) -> bool;
}

/// One client's session inside a namespace.
pub trait Socket: Send + Sync {
    /// Connection identifier, unique within the server.
    fn id(&self) -> &str;

    /// Path of the namespace the socket belongs to.
    fn namespace(&self) -> &str;

    /// Register a disconnect listener.
    fn on_disconnect(&self, listener: DisconnectListener);

    /// Register a listener for every inbound event.
    ///
    /// Universal listeners run before, and independently of, listeners
    /// registered for a specific event name.
    fn on_any(&self, listener: AnyListener);

    /// Send an event to this client.
    ///
    /// Returns `true` when the event was dispatched.
    fn emit(&self, event: &str, args: &Args) -> bool;

    /// Install an outbound hook under `key`.
    ///
    /// Returns `false`, leaving the chain untouched, when `key` is already
    /// installed on this socket.
    fn install_emit_hook(&self, key: &'static str, hook: Arc<dyn EmitHook>) -> bool;
}
