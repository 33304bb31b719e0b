//! # shardline-gateway
//!
//! Sharded gateway client: the per-shard session state machine, the fleet
//! coordinator with its identify queue, and the event pipeline that keeps the
//! entity cache in step with the gateway.
//!
//! ## Layers
//!
//! - [`protocol`]: opcodes, close codes and frame payloads
//! - [`session`]: one shard's connection lifecycle
//! - [`pipeline`]: dispatch decoding, cache application and listeners
//! - [`coordinator`]: fleet sizing, startup and readiness

pub mod coordinator;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod protocol;
pub mod session;

pub use coordinator::{FleetEvent, FleetPlan, ShardCoordinator};
pub use error::GatewayError;
pub use events::{DispatchedEvent, Event, EventKind};
pub use pipeline::{EventHandler, EventPipeline, FnHandler, ListenerId, PipelineConfig};
pub use session::{CloseReason, Connector, SessionState, ShardStatus, WsConnector};
