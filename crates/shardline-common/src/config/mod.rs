//! Configuration structs

mod backoff;
mod client_config;

pub use backoff::BackoffConfig;
pub use client_config::{
    AppSettings, AuthConfig, ClientConfig, ConfigError, Environment, GatewayConfig, RestConfig,
};
