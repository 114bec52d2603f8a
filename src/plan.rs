//! Stage plans and the pause/resume arithmetic on them

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use crate::config::TimerConfig;
use crate::ids::MessageRef;
use crate::notice::Notice;
use crate::platform::AudioAsset;

/// Kind of match a timer was started for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchVariant {
    Standard,
    /// Timed; the winner makes the cut
    WinAndIn,
    /// No time limit; a winner is required
    Final,
}

impl MatchVariant {
    /// Map a uniform roll in `[0, 1)` onto a variant
    pub fn from_roll(config: &TimerConfig, roll: f64) -> Self {
        if roll < config.finals_probability {
            MatchVariant::Final
        } else if roll < config.finals_probability + config.win_and_in_probability {
            MatchVariant::WinAndIn
        } else {
            MatchVariant::Standard
        }
    }

    pub fn pick(config: &TimerConfig) -> Self {
        match config.forced_variant {
            Some(variant) => variant,
            None => Self::from_roll(config, rand::thread_rng().gen::<f64>()),
        }
    }

    pub fn is_timed(self) -> bool {
        !matches!(self, MatchVariant::Final)
    }
}

impl fmt::Display for MatchVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchVariant::Standard => "standard",
            MatchVariant::WinAndIn => "win-and-in",
            MatchVariant::Final => "final",
        })
    }
}

impl FromStr for MatchVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "standard" => Ok(MatchVariant::Standard),
            "win-and-in" => Ok(MatchVariant::WinAndIn),
            "final" => Ok(MatchVariant::Final),
            other => Err(format!("unknown match variant '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageKind {
    /// Audio cue shortly before the main phase ends
    Cue,
    /// End of the main phase; the conclusion window opens
    MainEnd,
    /// End of the conclusion window
    Conclusion,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StageKind::Cue => "cue",
            StageKind::MainEnd => "main-end",
            StageKind::Conclusion => "conclusion",
        })
    }
}

/// One scheduled event of a timer
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub kind: StageKind,
    /// Offset from the activation instant
    pub delay: Duration,
    /// Replaces the announcement text when the stage fires
    pub notice: Option<Notice>,
    pub audio: Option<AudioAsset>,
    /// Delete the announcement this long after the stage fired
    pub delete_after: Option<Duration>,
}

/// Ordered stages of one activation of a timer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StagePlan {
    stages: Vec<Stage>,
}

impl StagePlan {
    /// Cue at `main - cue_offset`, main end at `main`, conclusion at `main + extra`
    ///
    /// Untimed variants get an empty plan.
    pub fn for_match(config: &TimerConfig, variant: MatchVariant) -> Self {
        if !variant.is_timed() {
            return Self::default();
        }
        let assets = &config.assets;
        Self {
            stages: vec![
                Stage {
                    kind: StageKind::Cue,
                    delay: config.main.saturating_sub(config.cue_offset),
                    notice: None,
                    audio: Some(AudioAsset::new(&assets.cue)),
                    delete_after: None,
                },
                Stage {
                    kind: StageKind::MainEnd,
                    delay: config.main,
                    notice: Some(Notice::MainOver {
                        window: config.extra,
                    }),
                    audio: Some(AudioAsset::new(&assets.main_end)),
                    delete_after: None,
                },
                Stage {
                    kind: StageKind::Conclusion,
                    delay: config.main + config.extra,
                    notice: Some(Notice::Draw),
                    audio: Some(AudioAsset::new(&assets.conclusion)),
                    delete_after: Some(config.conclusion_delete_after),
                },
            ],
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn delay_of(&self, kind: StageKind) -> Option<Duration> {
        self.stages
            .iter()
            .find(|stage| stage.kind == kind)
            .map(|stage| stage.delay)
    }

    /// Absolute deadline of every stage for a given activation instant
    pub fn deadlines(&self, activation: Instant) -> Vec<(StageKind, Instant)> {
        self.stages
            .iter()
            .map(|stage| (stage.kind, activation + stage.delay))
            .collect()
    }

    /// When the countdown players see ends: the main phase if still ahead,
    /// otherwise the last stage
    pub fn projected_end(&self) -> Option<Duration> {
        self.delay_of(StageKind::MainEnd)
            .or_else(|| self.stages.iter().map(|stage| stage.delay).max())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PausedStage {
    pub stage: Stage,
    /// Time left until the stage's deadline when the timer was paused
    pub remaining: Duration,
    pub fired: bool,
}

/// Frozen clock of a paused timer
#[derive(Debug, Clone, PartialEq)]
pub struct PausedSnapshot {
    pub stages: Vec<PausedStage>,
    /// The "paused" message shown while frozen
    pub indicator: Option<MessageRef>,
}

impl PausedSnapshot {
    /// Freeze a plan: each stage keeps `max(deadline - now, 0)`
    ///
    /// Every remaining value comes from the stage's own absolute deadline, so
    /// the conclusion window stays anchored to total elapsed time.
    pub fn capture(plan: &StagePlan, activation: Instant, now: Instant, fired: &[StageKind]) -> Self {
        let stages = plan
            .stages
            .iter()
            .map(|stage| PausedStage {
                stage: stage.clone(),
                remaining: (activation + stage.delay).saturating_duration_since(now),
                fired: fired.contains(&stage.kind),
            })
            .collect();
        Self {
            stages,
            indicator: None,
        }
    }

    pub fn remaining(&self, kind: StageKind) -> Option<Duration> {
        self.stages
            .iter()
            .find(|paused| paused.stage.kind == kind)
            .map(|paused| paused.remaining)
    }

    pub fn all_fired(&self) -> bool {
        self.stages.iter().all(|paused| paused.fired)
    }

    /// Plan for the next activation: unfired stages, delayed by what they had left
    pub fn resume_plan(&self) -> StagePlan {
        StagePlan {
            stages: self
                .stages
                .iter()
                .filter(|paused| !paused.fired)
                .map(|paused| Stage {
                    delay: paused.remaining,
                    ..paused.stage.clone()
                })
                .collect(),
        }
    }

    /// Time shown on the pause indicator
    pub fn time_left(&self) -> Duration {
        self.resume_plan().projected_end().unwrap_or_default()
    }
}
