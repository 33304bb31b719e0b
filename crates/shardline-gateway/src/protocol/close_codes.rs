//! Gateway close codes and how a session reacts to each of them.

use std::fmt;

/// What a session does after the gateway closed the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseClass {
    /// Reconnect and RESUME the existing session
    Resumable,
    /// Reconnect, discard the session and IDENTIFY again
    Reidentify,
    /// Stop the shard for good
    Fatal,
}

/// Close code sent by the gateway.
///
/// Codes outside the documented range are kept as [`CloseCode::Other`] and
/// treated as resumable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseCode {
    UnknownError,
    UnknownOpcode,
    DecodeError,
    NotAuthenticated,
    AuthenticationFailed,
    AlreadyAuthenticated,
    InvalidSequence,
    RateLimited,
    SessionTimedOut,
    InvalidShard,
    ShardingRequired,
    InvalidApiVersion,
    InvalidIntents,
    DisallowedIntents,
    Other(u16),
}

impl CloseCode {
    #[must_use]
    pub const fn from_u16(value: u16) -> Self {
        match value {
            4000 => Self::UnknownError,
            4001 => Self::UnknownOpcode,
            4002 => Self::DecodeError,
            4003 => Self::NotAuthenticated,
            4004 => Self::AuthenticationFailed,
            4005 => Self::AlreadyAuthenticated,
            4007 => Self::InvalidSequence,
            4008 => Self::RateLimited,
            4009 => Self::SessionTimedOut,
            4010 => Self::InvalidShard,
            4011 => Self::ShardingRequired,
            4012 => Self::InvalidApiVersion,
            4013 => Self::InvalidIntents,
            4014 => Self::DisallowedIntents,
            other => Self::Other(other),
        }
    }

    #[must_use]
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::UnknownError => 4000,
            Self::UnknownOpcode => 4001,
            Self::DecodeError => 4002,
            Self::NotAuthenticated => 4003,
            Self::AuthenticationFailed => 4004,
            Self::AlreadyAuthenticated => 4005,
            Self::InvalidSequence => 4007,
            Self::RateLimited => 4008,
            Self::SessionTimedOut => 4009,
            Self::InvalidShard => 4010,
            Self::ShardingRequired => 4011,
            Self::InvalidApiVersion => 4012,
            Self::InvalidIntents => 4013,
            Self::DisallowedIntents => 4014,
            Self::Other(code) => code,
        }
    }

    #[must_use]
    pub const fn class(self) -> CloseClass {
        match self {
            Self::NotAuthenticated | Self::InvalidSequence | Self::SessionTimedOut => {
                CloseClass::Reidentify
            }
            Self::AuthenticationFailed
            | Self::InvalidShard
            | Self::ShardingRequired
            | Self::InvalidApiVersion
            | Self::InvalidIntents
            | Self::DisallowedIntents => CloseClass::Fatal,
            _ => CloseClass::Resumable,
        }
    }

    /// Class of an optional close code; a connection dropped without a close
    /// frame is resumable
    #[must_use]
    pub fn classify(code: Option<u16>) -> CloseClass {
        code.map_or(CloseClass::Resumable, |code| Self::from_u16(code).class())
    }

    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self.class(), CloseClass::Fatal)
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::UnknownError => "unknown error",
            Self::UnknownOpcode => "unknown opcode sent",
            Self::DecodeError => "invalid payload sent",
            Self::NotAuthenticated => "payload sent before identifying",
            Self::AuthenticationFailed => "invalid token",
            Self::AlreadyAuthenticated => "identified more than once",
            Self::InvalidSequence => "invalid sequence on resume",
            Self::RateLimited => "sending too fast",
            Self::SessionTimedOut => "session timed out",
            Self::InvalidShard => "invalid shard",
            Self::ShardingRequired => "sharding required",
            Self::InvalidApiVersion => "invalid gateway version",
            Self::InvalidIntents => "invalid intents",
            Self::DisallowedIntents => "privileged intents not enabled",
            Self::Other(_) => "unrecognised close code",
        }
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_u16(), self.description())
    }
}

impl From<u16> for CloseCode {
    fn from(value: u16) -> Self {
        Self::from_u16(value)
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.as_u16()
    }
}
