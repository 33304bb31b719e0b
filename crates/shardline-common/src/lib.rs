//! # shardline-common
//!
//! Shared utilities including configuration, reconnect backoff, and telemetry.

pub mod config;
pub mod telemetry;

// Re-exports
pub use config::{
    AppSettings, AuthConfig, BackoffConfig, ClientConfig, ConfigError, Environment, GatewayConfig,
    RestConfig,
};
pub use telemetry::{
    try_init_tracing, try_init_tracing_with_config, TracingConfig, TracingError,
};
