use std::fmt;

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

snowflake!(
    /// Room group (server) owning rooms and at most one voice connection
    GuildId
);
snowflake!(
    /// Voice room
    RoomId
);
snowflake!(
    /// Text channel announcements are posted to
    ChannelId
);
snowflake!(UserId);
snowflake!(MessageId);

/// A voice room together with the guild it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoomRef {
    pub guild: GuildId,
    pub room: RoomId,
}

impl RoomRef {
    pub fn new(guild: impl Into<GuildId>, room: impl Into<RoomId>) -> Self {
        Self {
            guild: guild.into(),
            room: room.into(),
        }
    }
}

/// A message previously sent by the bot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub channel: ChannelId,
    pub message: MessageId,
}

/// Identity of one countdown: the room plus a per-room sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId {
    pub room: RoomId,
    pub sequence: u64,
}

impl TimerId {
    pub fn new(room: RoomId, sequence: u64) -> Self {
        Self { room, sequence }
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.room, self.sequence)
    }
}
