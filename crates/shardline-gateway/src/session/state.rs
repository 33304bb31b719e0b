//! Observable session state

use std::fmt;
use std::time::Duration;

use shardline_core::ShardId;

use crate::protocol::CloseCode;

/// Where a shard's session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Waiting for an identify slot, opening the transport or waiting for HELLO
    Connecting,
    /// IDENTIFY sent, waiting for READY
    Identifying,
    /// RESUME sent, waiting for RESUMED
    Resuming,
    Connected,
    /// Connection lost, backing off before the next attempt
    Reconnecting,
    /// Terminal
    Closed,
}

impl SessionState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Identifying => "identifying",
            Self::Resuming => "resuming",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }

    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session reached [`SessionState::Closed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Shutdown,
    /// The gateway closed with a code that forbids reconnecting
    Fatal(CloseCode),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shutdown => f.write_str("shutdown"),
            Self::Fatal(code) => write!(f, "fatal close {code}"),
        }
    }
}

/// Snapshot of one shard, published on every state change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardStatus {
    pub shard: ShardId,
    pub state: SessionState,
    /// Last seen dispatch sequence
    pub sequence: Option<u64>,
    /// Whether the last completed handshake was an IDENTIFY (as opposed to a RESUME)
    pub fresh_identify: bool,
    /// Round trip of the last acknowledged heartbeat
    pub latency: Option<Duration>,
    /// Connections opened after the first one
    pub reconnects: u32,
    pub close_reason: Option<CloseReason>,
}

impl ShardStatus {
    pub fn new(shard: ShardId) -> Self {
        Self {
            shard,
            state: SessionState::Connecting,
            sequence: None,
            fresh_identify: false,
            latency: None,
            reconnects: 0,
            close_reason: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }
}
