//! Events
//!
//! Dispatch names understood by the pipeline and the typed events it hands
//! to listeners.

mod event;
mod event_types;

pub use event::{DispatchedEvent, Event, EventKind};
pub use event_types::DispatchType;
