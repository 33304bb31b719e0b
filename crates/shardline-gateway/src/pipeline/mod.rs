//! Event pipeline
//!
//! Dispatches flow from each [`GatewaySession`](crate::session::GatewaySession)
//! into the [`EventPipeline`], which applies them to the entity cache, tracks
//! guild readiness and hands typed events to registered listeners.

mod listeners;
mod pipeline;
mod readiness;

pub use listeners::{EventHandler, FnHandler, ListenerId, ListenerRegistry};
pub use pipeline::{EventPipeline, PipelineConfig};
pub use readiness::{Arrival, Begin, Readiness, Settled};
