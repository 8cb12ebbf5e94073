//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Config struct definitions (Config, InstrumentationConfig, ExporterConfig)
//! - [`defaults`]: Serde default value functions
//! - [`validation`]: Startup validation

mod defaults;
mod types;
mod validation;

pub use types::{Config, ConfigError, ExporterConfig, InstrumentationConfig};
pub use validation::{ValidationError, validate};
