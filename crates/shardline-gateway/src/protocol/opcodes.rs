//! Gateway opcodes

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Frame opcode (`op` field).
///
/// Opcode 6 and 8/9 are unused by this protocol version; frames carrying them
/// fail to decode and are skipped like any other malformed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// Event dispatch, carries `t` and `s` (receive)
    Dispatch = 0,
    /// Liveness ping (send, and receive as a request for an immediate one)
    Heartbeat = 1,
    /// Start a new session (send)
    Identify = 2,
    /// Update the client's presence (send)
    PresenceUpdate = 3,
    /// Continue a dropped session (send)
    Resume = 4,
    /// Server asks the client to reconnect and resume (receive)
    Reconnect = 5,
    /// Session rejected; `d` says whether it can be resumed (receive)
    InvalidSession = 7,
    /// First frame of every connection, carries the heartbeat interval (receive)
    Hello = 10,
    /// Heartbeat acknowledged (receive)
    HeartbeatAck = 11,
}

impl OpCode {
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Dispatch),
            1 => Some(Self::Heartbeat),
            2 => Some(Self::Identify),
            3 => Some(Self::PresenceUpdate),
            4 => Some(Self::Resume),
            5 => Some(Self::Reconnect),
            7 => Some(Self::InvalidSession),
            10 => Some(Self::Hello),
            11 => Some(Self::HeartbeatAck),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether a client may put this opcode on the wire
    #[must_use]
    pub const fn is_sendable(self) -> bool {
        matches!(
            self,
            Self::Heartbeat | Self::Identify | Self::PresenceUpdate | Self::Resume
        )
    }

    /// Whether the gateway may send this opcode to a client
    #[must_use]
    pub const fn is_receivable(self) -> bool {
        matches!(
            self,
            Self::Dispatch
                | Self::Heartbeat
                | Self::Reconnect
                | Self::InvalidSession
                | Self::Hello
                | Self::HeartbeatAck
        )
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Dispatch => "Dispatch",
            Self::Heartbeat => "Heartbeat",
            Self::Identify => "Identify",
            Self::PresenceUpdate => "PresenceUpdate",
            Self::Resume => "Resume",
            Self::Reconnect => "Reconnect",
            Self::InvalidSession => "InvalidSession",
            Self::Hello => "Hello",
            Self::HeartbeatAck => "HeartbeatAck",
        }
    }
}

impl Serialize for OpCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for OpCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u8::deserialize(deserializer)?;
        Self::from_u8(value)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown opcode: {value}")))
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_u8())
    }
}
