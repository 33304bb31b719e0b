//! Shard fleet coordination
//!
//! The [`ShardCoordinator`] sizes the fleet, runs one
//! [`GatewaySession`](crate::session::GatewaySession) task per shard behind a
//! shared [`IdentifyQueue`](crate::session::IdentifyQueue), and aggregates
//! shard status and readiness.

mod coordinator;
mod fleet;

pub use coordinator::ShardCoordinator;
pub use fleet::{FleetEvent, FleetPlan};
