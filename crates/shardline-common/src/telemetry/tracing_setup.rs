//! Tracing subscriber setup
//!
//! Gateway and REST code log with structured fields (`shard`, `seq`, `route`,
//! `bucket`), so the JSON format is the one to ship to a log pipeline.
//! `RUST_LOG` overrides the configured filter entirely when set.

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter,
};

use crate::config::Environment;

/// Transport crates that are chatty at debug level
const QUIET_TARGETS: &[&str] = &["tokio_tungstenite", "tungstenite", "rustls", "hyper", "reqwest"];

#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level of this crate family when `RUST_LOG` is unset
    pub level: Level,
    /// Extra `target=level` directives, e.g. `shardline_gateway::session=trace`
    pub directives: Vec<String>,
    /// Keep transport crates at `warn` regardless of `level`
    pub quiet_transports: bool,
    pub json: bool,
    /// Log span open and close (one span per session run)
    pub span_events: bool,
    pub file_line: bool,
    pub thread_names: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            directives: Vec::new(),
            quiet_transports: true,
            json: false,
            span_events: false,
            file_line: true,
            thread_names: false,
        }
    }
}

impl TracingConfig {
    /// Debug output with session spans
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: Level::DEBUG,
            span_events: true,
            thread_names: true,
            ..Self::default()
        }
    }

    /// JSON lines at info
    #[must_use]
    pub fn production() -> Self {
        Self {
            json: true,
            file_line: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn for_environment(env: Environment) -> Self {
        if env.is_production() {
            Self::production()
        } else if env.is_development() {
            Self::development()
        } else {
            Self::default()
        }
    }

    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    /// Filter string used when `RUST_LOG` is unset
    pub fn filter(&self) -> String {
        let mut parts = vec![self.level.to_string().to_lowercase()];
        if self.quiet_transports {
            parts.extend(QUIET_TARGETS.iter().map(|target| format!("{target}=warn")));
        }
        parts.extend(self.directives.iter().cloned());
        parts.join(",")
    }

    fn span_events(&self) -> FmtSpan {
        if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.filter()))
    }
}

/// Install the global subscriber with default settings
pub fn try_init_tracing() -> Result<(), TracingError> {
    try_init_tracing_with_config(TracingConfig::default())
}

/// Install the global subscriber. Fails if one is already installed.
pub fn try_init_tracing_with_config(config: TracingConfig) -> Result<(), TracingError> {
    install(&config).map_err(|_| TracingError::AlreadyInitialized)
}

fn install(config: &TracingConfig) -> Result<(), TryInitError> {
    let base = fmt::layer()
        .with_file(config.file_line)
        .with_line_number(config.file_line)
        .with_thread_names(config.thread_names)
        .with_span_events(config.span_events());

    // json() changes the layer type
    if config.json {
        tracing_subscriber::registry()
            .with(config.env_filter())
            .with(base.json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(config.env_filter())
            .with(base)
            .try_init()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("Tracing subscriber already initialized")]
    AlreadyInitialized,
}
