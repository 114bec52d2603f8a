//! The per-guild voice connection

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{sleep, timeout};

use crate::config::TimerConfig;
use crate::error::VoiceError;
use crate::ids::{GuildId, RoomId};
use crate::platform::{AudioAsset, VoiceGateway};
use crate::playback::AudioDriver;
use crate::retry::RetryPolicy;

/// An established connection of a guild to a room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceSession {
    pub guild: GuildId,
    pub room: RoomId,
}

/// Owns the single voice connection of every guild
///
/// All voice operations of one guild run under that guild's lock. Tokio's
/// mutex hands the lock out in request order, so contending cues play first
/// come, first served.
pub struct VoiceSessionManager {
    gateway: Arc<dyn VoiceGateway>,
    driver: AudioDriver,
    locks: Mutex<HashMap<GuildId, Arc<AsyncMutex<()>>>>,
    connect_timeout: Duration,
    reset_settle: Duration,
    retry: RetryPolicy,
}

impl VoiceSessionManager {
    pub fn new(gateway: Arc<dyn VoiceGateway>, config: &TimerConfig) -> Self {
        Self {
            driver: AudioDriver::new(Arc::clone(&gateway), config.play_start_timeout),
            gateway,
            locks: Mutex::new(HashMap::new()),
            connect_timeout: config.connect_timeout,
            reset_settle: config.reset_settle,
            retry: RetryPolicy,
        }
    }

    fn guild_lock(&self, guild: GuildId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(guild).or_default())
    }

    /// Connect the guild to `room`, moving an existing connection if needed
    pub async fn ensure_connected(&self, guild: GuildId, room: RoomId) -> Result<VoiceSession, VoiceError> {
        let lock = self.guild_lock(guild);
        let _guard = lock.lock().await;
        self.connect_locked(guild, room).await
    }

    /// Tear down whatever connection the guild has and let it settle
    pub async fn hard_reset(&self, guild: GuildId) {
        let lock = self.guild_lock(guild);
        let _guard = lock.lock().await;
        self.reset_locked(guild).await;
    }

    /// Join `room`, play `asset`, leave
    ///
    /// A transient failure is followed by one hard reset and one more attempt.
    /// The connection is released afterwards whatever the outcome.
    pub async fn play_cue(&self, guild: GuildId, room: RoomId, asset: &AudioAsset) -> Result<(), VoiceError> {
        let lock = self.guild_lock(guild);
        let _guard = lock.lock().await;

        let label = format!("cue {} in room {}", asset.path().display(), room);
        let result = self
            .retry
            .run(
                &label,
                move || async move {
                    let session = self.connect_locked(guild, room).await?;
                    self.driver.play(&session, asset).await
                },
                move || self.reset_locked(guild),
            )
            .await;

        self.release_locked(guild).await;
        result
    }

    async fn connect_locked(&self, guild: GuildId, room: RoomId) -> Result<VoiceSession, VoiceError> {
        match self.gateway.current_room(guild).await {
            Some(current) if current == room => {}
            Some(current) => {
                log::debug!("Moving voice of guild {} from room {} to {}", guild, current, room);
                self.bounded("moving", self.gateway.move_to(guild, room)).await?;
            }
            None => {
                log::debug!("Connecting voice of guild {} to room {}", guild, room);
                self.bounded("connecting", self.gateway.connect(guild, room)).await?;
            }
        }
        Ok(VoiceSession { guild, room })
    }

    async fn bounded<F>(&self, operation: &'static str, fut: F) -> Result<(), VoiceError>
    where
        F: Future<Output = Result<(), VoiceError>>,
    {
        match timeout(self.connect_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(VoiceError::Timeout {
                operation,
                after: self.connect_timeout,
            }),
        }
    }

    async fn reset_locked(&self, guild: GuildId) {
        log::info!("Hard resetting voice connection of guild {}", guild);
        if let Err(e) = self.gateway.disconnect(guild, true).await {
            log::debug!("Forced disconnect of guild {} failed: {}", guild, e);
        }
        sleep(self.reset_settle).await;
    }

    async fn release_locked(&self, guild: GuildId) {
        if self.gateway.current_room(guild).await.is_none() {
            return;
        }
        if let Err(e) = self.gateway.disconnect(guild, true).await {
            log::warn!("Failed to leave voice in guild {}: {}", guild, e);
        }
    }
}
