//! Announcement texts

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::coordinator::StopReason;
use crate::plan::MatchVariant;

/// Content of an announcement, rendered when it is posted
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Started { variant: MatchVariant, ends_in: Duration },
    Resumed { variant: MatchVariant, ends_in: Duration },
    /// Untimed final
    FinalGame,
    /// Main phase over; `window` left to reach a conclusion
    MainOver { window: Duration },
    Draw,
    Paused { remaining: Duration },
    Stopped { reason: StopReason },
}

impl Notice {
    pub fn render(&self, now: DateTime<Utc>) -> String {
        match self {
            Notice::Started { variant, ends_in } => match variant {
                MatchVariant::WinAndIn => format!(
                    "WIN & IN: Timer will start now and end {}. You have to win to make the final cut!",
                    relative(now, *ends_in)
                ),
                _ => format!(
                    "Timer will start now and end {}. Play to win and to your outs.",
                    relative(now, *ends_in)
                ),
            },
            Notice::Resumed { variant, ends_in } => match variant {
                MatchVariant::WinAndIn => format!(
                    "WIN & IN: Timer has been resumed and will end {}. You have to win to make the final cut!",
                    relative(now, *ends_in)
                ),
                _ => format!(
                    "Timer has been resumed and will end {}. Play to win and to your outs.",
                    relative(now, *ends_in)
                ),
            },
            Notice::FinalGame => "This is a final game with no time limit! You may ID and restart the match \
                in the same positions if you all have time, but in the end it has to have a winner. \
                Play accordingly."
                .to_string(),
            Notice::MainOver { window } => format!(
                "Time is over. You have {} minutes to reach a conclusion. Good luck! - {}.",
                window.as_secs() / 60,
                relative(now, *window)
            ),
            Notice::Draw => "If no one won until now, the game is a draw. Well Played.".to_string(),
            Notice::Paused { remaining } => {
                format!("⏸️ Timer paused – **{} minutes** remaining.", remaining.as_secs() / 60)
            }
            Notice::Stopped { reason } => format!("Timer was stopped {}.", reason.describe()),
        }
    }
}

/// Chat-client relative timestamp, e.g. `<t:1700000000:R>`
fn relative(now: DateTime<Utc>, after: Duration) -> String {
    let at = chrono::Duration::from_std(after)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(now);
    format!("<t:{}:R>", at.timestamp())
}
