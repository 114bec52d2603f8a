//! Interfaces of the chat platform the timers run against
//!
//! The coordinator never talks to a bot library directly; an adaptor implements
//! these traits on top of whatever gateway the bot uses.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::error::{ChatError, PlaybackError, VoiceError};
use crate::ids::{ChannelId, GuildId, MessageRef, RoomId, RoomRef, UserId};

/// Membership lookups
#[async_trait]
pub trait RoomDirectory: Send + Sync {
    /// Users currently connected to a voice room
    async fn room_members(&self, room: RoomRef) -> Result<Vec<UserId>, ChatError>;

    /// Voice room a user currently sits in, if any
    async fn voice_room_of(&self, guild: GuildId, user: UserId) -> Option<RoomId>;
}

/// Text messages
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn send_message(&self, channel: ChannelId, content: &str) -> Result<MessageRef, ChatError>;

    async fn edit_message(&self, message: MessageRef, content: &str) -> Result<(), ChatError>;

    async fn delete_message(&self, message: MessageRef) -> Result<(), ChatError>;
}

/// The voice connection of a guild
///
/// Implementations report a closed websocket or an invalidated session with the
/// matching [`VoiceError`] variants so the caller can tell them apart from
/// playback failures.
#[async_trait]
pub trait VoiceGateway: Send + Sync {
    /// Room the guild's connection currently targets
    async fn current_room(&self, guild: GuildId) -> Option<RoomId>;

    async fn connect(&self, guild: GuildId, room: RoomId) -> Result<(), VoiceError>;

    async fn move_to(&self, guild: GuildId, room: RoomId) -> Result<(), VoiceError>;

    /// Tear the connection down; `force` skips the graceful leave handshake
    async fn disconnect(&self, guild: GuildId, force: bool) -> Result<(), VoiceError>;

    /// Begin rendering an asset on the guild's connection
    ///
    /// Returns once the audio is actually playing; completion is reported through
    /// the returned track.
    async fn start_playback(&self, guild: GuildId, asset: &AudioAsset) -> Result<PlaybackTrack, VoiceError>;
}

/// The collaborators a coordinator runs against
#[derive(Clone)]
pub struct Platform {
    pub directory: Arc<dyn RoomDirectory>,
    pub chat: Arc<dyn ChatGateway>,
    pub voice: Arc<dyn VoiceGateway>,
}

/// A lazily encoded audio file
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AudioAsset {
    path: PathBuf,
}

impl AudioAsset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Completion signal of one playback
#[derive(Debug)]
pub struct PlaybackTrack {
    done: oneshot::Receiver<Result<(), PlaybackError>>,
}

impl PlaybackTrack {
    /// Create a track and the sender the gateway resolves when playback ends
    pub fn channel() -> (oneshot::Sender<Result<(), PlaybackError>>, Self) {
        let (tx, done) = oneshot::channel();
        (tx, Self { done })
    }

    /// Wait for playback to end; a dropped sender counts as an interruption
    pub async fn finished(self) -> Result<(), PlaybackError> {
        match self.done.await {
            Ok(result) => result,
            Err(_) => Err(PlaybackError::Interrupted),
        }
    }
}
