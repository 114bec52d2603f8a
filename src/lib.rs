//! # Match Timer
//!
//! Asynchronous match timers for voice-chat bots, built on top of Tokio.
//!
//! A timer counts a match down in stages: an audio cue shortly before the main
//! phase ends, an announcement and cue when it ends, and a final "draw" call
//! once the conclusion window closes. Timers can be paused, resumed and
//! stopped by the players that were in the room when the timer started.
//!
//! ## Features
//!
//! - **Per-room timers**: Every start gets its own `room_sequence` identity
//! - **Pausable stages**: A paused timer resumes with each stage exactly as far ahead as it was
//! - **One voice connection per guild**: Cues of different rooms queue up instead of colliding
//! - **Recover once**: A dropped voice connection is reset and the cue retried a single time
//! - **Platform agnostic**: Chat and voice access go through the traits in [`platform`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use match_timer::{Platform, RoomRef, TimerConfig, TimerCoordinator, UserId, ChannelId, StopReason};
//! use tokio_util::sync::CancellationToken;
//!
//! async fn run(platform: Platform) -> Result<(), Box<dyn std::error::Error>> {
//!     let coordinator = TimerCoordinator::new(
//!         "my_bot".to_string(),
//!         TimerConfig::from_env()?,
//!         platform,
//!         CancellationToken::new(),
//!     )?;
//!
//!     let room = RoomRef::new(1, 10);
//!     let timer = coordinator.start_timer(room, UserId(7), ChannelId(500)).await?;
//!
//!     coordinator.pause_timer(timer, UserId(7)).await?;
//!     coordinator.resume_timer(timer, UserId(7)).await?;
//!     coordinator.stop_timer(timer, StopReason::Manual).await;
//!
//!     coordinator.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod ids;
pub mod notice;
pub mod plan;
pub mod platform;
pub mod playback;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod session;

#[cfg(test)]
mod fakes;

pub use config::{AudioAssets, TimerConfig};
pub use coordinator::{StopReason, TimerCoordinator};
pub use error::{ChatError, ConfigError, PlaybackError, TimerError, VoiceError};
pub use ids::{ChannelId, GuildId, MessageId, MessageRef, RoomId, RoomRef, TimerId, UserId};
pub use plan::{MatchVariant, StageKind};
pub use platform::{AudioAsset, ChatGateway, Platform, PlaybackTrack, RoomDirectory, VoiceGateway};
pub use registry::TimerState;

// Re-export commonly used types for convenience
pub use std::time::Duration;
pub use tokio_util::sync::CancellationToken;
