//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

/// Returns `true` (for serde defaults).
pub fn default_true() -> bool {
    true
}

// =============================================================================
// Instrumentation Defaults
// =============================================================================

pub fn default_poll_interval_ms() -> u64 {
    2000
}

pub fn default_max_payload_bytes() -> u64 {
    crate::payload::DEFAULT_MAX_PAYLOAD_BYTES
}

// =============================================================================
// Exporter Defaults
// =============================================================================

pub fn default_exporter_bind() -> String {
    "0.0.0.0".to_string()
}

pub fn default_exporter_port() -> u16 {
    9090
}

pub fn default_exporter_path() -> String {
    "/metrics".to_string()
}
