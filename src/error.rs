use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::ids::TimerId;

/// Errors surfaced to whoever asked for a timer transition
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimerError {
    #[error("requester is not in the voice room")]
    NotInRoom,

    #[error("requester is not a participant of timer {timer_id}")]
    NotAuthorized { timer_id: TimerId },

    #[error("timer {timer_id} is not running")]
    NoActiveTimer { timer_id: TimerId },

    #[error("timer {timer_id} is not paused")]
    NoPausedTimer { timer_id: TimerId },

    #[error("timer coordinator is shutting down")]
    ShuttingDown,
}

/// Failures of the voice transport
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VoiceError {
    #[error("voice connection closed (code {code})")]
    ConnectionClosed { code: u16 },

    #[error("voice session is no longer valid")]
    InvalidSession,

    #[error("timed out after {after:?} while {operation}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("voice connect failed: {0}")]
    Connect(String),

    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

impl VoiceError {
    /// Whether a hard reset and a second attempt may help
    pub fn is_transient(&self) -> bool {
        match self {
            VoiceError::ConnectionClosed { .. }
            | VoiceError::InvalidSession
            | VoiceError::Timeout { .. } => true,
            VoiceError::Connect(_) => false,
            VoiceError::Playback(e) => e.is_transient(),
        }
    }
}

/// Failures while rendering one audio asset
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("audio asset not found: {}", .0.display())]
    AssetMissing(PathBuf),

    #[error("failed to encode audio: {0}")]
    Encode(String),

    #[error("playback did not start within {0:?}")]
    NeverStarted(Duration),

    #[error("playback was interrupted")]
    Interrupted,
}

impl PlaybackError {
    pub fn is_transient(&self) -> bool {
        matches!(self, PlaybackError::NeverStarted(_) | PlaybackError::Interrupted)
    }
}

/// Failures of the chat collaborator; logged, never fatal for a timer
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("chat request failed: {0}")]
    Request(String),

    #[error("message no longer exists")]
    UnknownMessage,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("main phase must be longer than zero")]
    EmptyMainPhase,

    #[error("conclusion window must be longer than zero")]
    EmptyConclusionWindow,

    #[error("cue offset {cue_offset:?} must be shorter than the main phase {main:?}")]
    CueOutsideMainPhase { cue_offset: Duration, main: Duration },

    #[error("probability '{name}' must be within 0..=1, got {value}")]
    Probability { name: &'static str, value: f64 },

    #[error("variant probabilities add up to {0}, more than 1")]
    ProbabilitySum(f64),

    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: String, value: String },
}
