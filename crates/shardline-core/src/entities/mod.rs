//! Entity records - the identity-bearing objects kept by the cache
//!
//! Each record holds its stable identity (IDs and ownership) as typed fields and
//! everything else as an untyped [`Fields`] map that updates are merged into.

mod channel;
mod fields;
mod guild;
mod member;
mod role;
mod user;

pub use channel::Channel;
pub use fields::Fields;
pub use guild::{Guild, GuildParts};
pub use member::Member;
pub use role::Role;
pub use user::User;

use std::fmt;

/// Kind of cached entity, used in logs and cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Guild,
    Channel,
    Role,
    Member,
    User,
}

impl EntityKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Guild => "guild",
            Self::Channel => "channel",
            Self::Role => "role",
            Self::Member => "member",
            Self::User => "user",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
