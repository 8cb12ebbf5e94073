//! Outbound hook chain.
//!
//! A [`HookChain`] is the decorator that sits in front of a transport's
//! outbound dispatch. The transport calls [`HookChain::run`] with the event
//! about to be sent, then performs its own dispatch unconditionally.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::Args;

/// Observer of outbound events.
///
/// Hooks only borrow the event; they cannot change, drop or reorder it.
pub trait EmitHook: Send + Sync {
    /// Called before the transport dispatches `event`.
    fn on_emit(&self, event: &str, args: &Args);
}

impl<F> EmitHook for F
where
    F: Fn(&str, &Args) + Send + Sync,
{
    fn on_emit(&self, event: &str, args: &Args) {
        self(event, args)
    }
}

/// Ordered, keyed list of [`EmitHook`]s.
#[derive(Default)]
pub struct HookChain {
    hooks: RwLock<Vec<(&'static str, Arc<dyn EmitHook>)>>,
}

impl HookChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `hook` under `key`.
    ///
    /// Returns `false` if `key` is already present. The check and the insert
    /// happen under one write lock.
    pub fn install(&self, key: &'static str, hook: Arc<dyn EmitHook>) -> bool {
        let mut hooks = self.hooks.write();
        if hooks.iter().any(|(k, _)| *k == key) {
            return false;
        }
        hooks.push((key, hook));
        true
    }

    /// Whether a hook is installed under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.hooks.read().iter().any(|(k, _)| *k == key)
    }

    /// Number of installed hooks.
    pub fn len(&self) -> usize {
        self.hooks.read().len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.hooks.read().is_empty()
    }

    /// Run every hook in installation order.
    ///
    /// The chain is snapshotted first so hooks run without the lock held.
    pub fn run(&self, event: &str, args: &Args) {
        let hooks: Vec<Arc<dyn EmitHook>> =
            self.hooks.read().iter().map(|(_, h)| Arc::clone(h)).collect();
        for hook in hooks {
            hook.on_emit(event, args);
        }
    }
}

impl std::fmt::Debug for HookChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<&'static str> = self.hooks.read().iter().map(|(k, _)| *k).collect();
        f.debug_struct("HookChain").field("keys", &keys).finish()
    }
}
