//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("exporter.path must start with '/', got '{0}'")]
    InvalidExporterPath(String),
    #[error("exporter.port must be non-zero when the exporter is enabled")]
    ZeroExporterPort,
    #[error("exporter.bind is not a valid address: '{0}'")]
    InvalidExporterBind(String),
    #[error("instrumentation.max_payload_bytes must be greater than zero")]
    ZeroPayloadCap,
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.instrumentation.max_payload_bytes == 0 {
        errors.push(ValidationError::ZeroPayloadCap);
    }

    // Exporter validation
    let exporter = &config.exporter;
    if !exporter.path.starts_with('/') {
        errors.push(ValidationError::InvalidExporterPath(exporter.path.clone()));
    }
    if exporter.enabled && exporter.port == 0 {
        errors.push(ValidationError::ZeroExporterPort);
    }
    if exporter.socket_addr().is_err() {
        errors.push(ValidationError::InvalidExporterBind(exporter.bind.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
