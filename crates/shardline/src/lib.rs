//! # shardline
//!
//! Client for a sharded real-time gateway, with a rate-limited REST
//! transport and an in-memory entity cache kept in step with the gateway.
//!
//! ## Example
//!
//! ```ignore
//! use shardline::{Client, ClientConfig, Event, EventKind};
//!
//! let client = Client::new(ClientConfig::from_env()?)?;
//! client.on(EventKind::MessageCreate, |event| async move {
//!     if let Event::MessageCreate { data, .. } = &event.event {
//!         tracing::info!(content = %data["content"], "Message");
//!     }
//!     Ok(())
//! });
//! client.start().await?;
//! client.wait_until_ready(None).await?;
//! ```

mod cache_reader;
mod client;
mod error;

pub use cache_reader::CacheReader;
pub use client::Client;
pub use error::ClientError;

pub use shardline_cache::CacheStats;
pub use shardline_common::{ClientConfig, TracingConfig};
pub use shardline_core::{Channel, Guild, Intents, Member, Role, ShardId, Snowflake, User};
pub use shardline_gateway::{
    CloseReason, DispatchedEvent, Event, EventHandler, EventKind, FleetEvent, FleetPlan,
    GatewayError, ListenerId, SessionState, ShardStatus,
};
pub use shardline_rest::{Method, RestClient, RestError, Route};
