use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::error::{PlaybackError, VoiceError};
use crate::platform::{AudioAsset, VoiceGateway};
use crate::session::VoiceSession;

/// Plays single assets over an established session
///
/// The driver never connects or disconnects; releasing the session after a
/// playback is up to the caller.
pub struct AudioDriver {
    gateway: Arc<dyn VoiceGateway>,
    start_timeout: Duration,
}

impl AudioDriver {
    pub fn new(gateway: Arc<dyn VoiceGateway>, start_timeout: Duration) -> Self {
        Self {
            gateway,
            start_timeout,
        }
    }

    /// Play `asset` and wait for it to finish
    ///
    /// Transport errors raised while starting (closed connection, invalid
    /// session) come back as their own [`VoiceError`] variants; everything that
    /// goes wrong with the audio itself is a [`PlaybackError`].
    pub async fn play(&self, session: &VoiceSession, asset: &AudioAsset) -> Result<(), VoiceError> {
        log::debug!(
            "Playing {} in room {} of guild {}",
            asset.path().display(),
            session.room,
            session.guild
        );
        let track = timeout(self.start_timeout, self.gateway.start_playback(session.guild, asset))
            .await
            .map_err(|_| PlaybackError::NeverStarted(self.start_timeout))??;
        track.finished().await?;
        Ok(())
    }
}
