//! Per-shard gateway sessions
//!
//! A [`GatewaySession`] owns one shard's connection lifecycle. It paces its
//! IDENTIFY sends through the fleet's [`IdentifyQueue`], talks to the gateway
//! through a [`Connector`], and hands every accepted dispatch to a
//! [`DispatchSink`] in frame order.

mod config;
mod heartbeat;
mod identify;
mod session;
mod state;
mod transport;

pub use config::SessionConfig;
pub use heartbeat::{Beat, HeartbeatTracker};
pub use identify::{IdentifyPermit, IdentifyQueue};
pub use session::{DispatchSink, GatewaySession};
pub use state::{CloseReason, SessionState, ShardStatus};
pub use transport::{Connector, Frame, GatewayConnection, WsConnection, WsConnector};
