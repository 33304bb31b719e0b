//! Integration test utilities
//!
//! An in-process WebSocket gateway and a scripted HTTP transport, used to run
//! real sessions and REST calls end to end.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
