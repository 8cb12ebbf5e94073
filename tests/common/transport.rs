//! Transports with controlled misbehaviour.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use socket_transport::{EventServer, MemoryServer, Namespace};

/// Delegates to a [`MemoryServer`] but reports whatever client count the
/// test sets.
#[allow(dead_code)]
pub struct MisreportingServer {
    inner: MemoryServer,
    reported: AtomicUsize,
}

#[allow(dead_code)]
impl MisreportingServer {
    pub fn new(inner: MemoryServer, reported: usize) -> Self {
        Self {
            inner,
            reported: AtomicUsize::new(reported),
        }
    }

    pub fn report(&self, count: usize) {
        self.reported.store(count, Ordering::SeqCst);
    }
}

impl EventServer for MisreportingServer {
    fn namespaces(&self) -> Vec<Arc<dyn Namespace>> {
        self.inner.namespaces()
    }

    fn clients_count(&self) -> usize {
        self.reported.load(Ordering::SeqCst)
    }
}

/// Delegates to a [`MemoryServer`], taking `delay` to report the client
/// count. Widens the window between reading the count and storing it.
#[allow(dead_code)]
pub struct SlowCountServer {
    inner: MemoryServer,
    delay: Duration,
}

#[allow(dead_code)]
impl SlowCountServer {
    pub fn new(inner: MemoryServer, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

impl EventServer for SlowCountServer {
    fn namespaces(&self) -> Vec<Arc<dyn Namespace>> {
        self.inner.namespaces()
    }

    fn clients_count(&self) -> usize {
        let count = self.inner.clients_count();
        std::thread::sleep(self.delay);
        count
    }
}
