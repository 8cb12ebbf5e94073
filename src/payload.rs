//! Payload size measurement.
//!
//! Sizes are the UTF-8 byte length of an event's arguments in JSON form.
//! A lone string argument is measured raw, without JSON quoting.
//!
//! Serialization streams into a counting writer, so no buffer is allocated,
//! and it is aborted once the configured cap is passed. Any failure yields 0:
//! traffic accounting degrades, event delivery is never affected.

use std::io;

use serde::Serialize;
use serde_json::Value;

/// Default cap on measured payload size (1 MiB).
pub const DEFAULT_MAX_PAYLOAD_BYTES: u64 = 1024 * 1024;

/// Converts event payloads into byte counts.
#[derive(Debug, Clone, Copy)]
pub struct PayloadSizer {
    max_bytes: u64,
}

impl Default for PayloadSizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD_BYTES)
    }
}

impl PayloadSizer {
    /// Create a sizer that gives up on payloads larger than `max_bytes`.
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Size of an event's argument list.
    pub fn size_of_args(&self, args: &[Value]) -> u64 {
        match args {
            [Value::String(raw)] => self.size_of_str(raw),
            _ => self.size_of(args),
        }
    }

    /// Size of a raw string.
    pub fn size_of_str(&self, raw: &str) -> u64 {
        let len = raw.len() as u64;
        if len > self.max_bytes {
            tracing::debug!(len, cap = self.max_bytes, "Payload exceeds measurement cap");
            return 0;
        }
        len
    }

    /// Size of any serializable payload, or 0 when it cannot be serialized.
    pub fn size_of<T>(&self, payload: &T) -> u64
    where
        T: Serialize + ?Sized,
    {
        let mut counter = CountingWriter {
            written: 0,
            limit: self.max_bytes,
        };
        match serde_json::to_writer(&mut counter, payload) {
            Ok(()) => counter.written,
            Err(e) => {
                tracing::debug!(error = %e, "Payload size measurement failed");
                0
            }
        }
    }
}

/// Discards bytes, counting them, and errors once `limit` is exceeded.
struct CountingWriter {
    written: u64,
    limit: u64,
}

impl io::Write for CountingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written += buf.len() as u64;
        if self.written > self.limit {
            return Err(io::Error::other("payload exceeds measurement cap"));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
