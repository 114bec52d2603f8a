//! Timer configuration

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::plan::MatchVariant;

const ENV_PREFIX: &str = "MATCH_TIMER_";

/// Audio cues played by the timer
#[derive(Debug, Clone, PartialEq)]
pub struct AudioAssets {
    /// Intro for a standard match
    pub intro_standard: PathBuf,
    /// Intro for a win-and-in match
    pub intro_win_and_in: PathBuf,
    /// Played instead of a countdown for an untimed final
    pub final_game: PathBuf,
    /// Played `cue_offset` before the main phase ends
    pub cue: PathBuf,
    /// Played when the main phase ends
    pub main_end: PathBuf,
    /// Played when the conclusion window closes
    pub conclusion: PathBuf,
}

impl Default for AudioAssets {
    fn default() -> Self {
        Self {
            intro_standard: PathBuf::from("./timer/timer80.mp3"),
            intro_win_and_in: PathBuf::from("./timer/timer75.mp3"),
            final_game: PathBuf::from("./timer/final.mp3"),
            cue: PathBuf::from("./timer/brasileira10novo.mp3"),
            main_end: PathBuf::from("./timer/ap15minutes.mp3"),
            conclusion: PathBuf::from("./timer/ggboyz.mp3"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimerConfig {
    /// Length of the main phase
    pub main: Duration,
    /// Conclusion window following the main phase
    pub extra: Duration,
    /// How long before the end of the main phase the cue plays
    pub cue_offset: Duration,
    pub finals_probability: f64,
    pub win_and_in_probability: f64,
    /// Skip the roll and always use this variant
    pub forced_variant: Option<MatchVariant>,
    /// Lifetime of the draw message after the conclusion window closes
    pub conclusion_delete_after: Duration,
    /// Lifetime of the "stopped" message
    pub stop_delete_after: Duration,
    pub connect_timeout: Duration,
    pub play_start_timeout: Duration,
    /// Pause after a hard reset before reconnecting
    pub reset_settle: Duration,
    pub assets: AudioAssets,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            main: Duration::from_secs(75 * 60),
            extra: Duration::from_secs(15 * 60),
            cue_offset: Duration::from_secs(10 * 60),
            finals_probability: 0.15,
            win_and_in_probability: 0.35,
            forced_variant: None,
            conclusion_delete_after: Duration::from_secs(60),
            stop_delete_after: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            play_start_timeout: Duration::from_secs(6),
            reset_settle: Duration::from_millis(250),
            assets: AudioAssets::default(),
        }
    }
}

impl TimerConfig {
    /// Check the invariants stage plans rely on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.main.is_zero() {
            return Err(ConfigError::EmptyMainPhase);
        }
        if self.extra.is_zero() {
            return Err(ConfigError::EmptyConclusionWindow);
        }
        if self.cue_offset >= self.main {
            return Err(ConfigError::CueOutsideMainPhase {
                cue_offset: self.cue_offset,
                main: self.main,
            });
        }
        for (name, value) in [
            ("finals_probability", self.finals_probability),
            ("win_and_in_probability", self.win_and_in_probability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Probability { name, value });
            }
        }
        let sum = self.finals_probability + self.win_and_in_probability;
        if sum > 1.0 {
            return Err(ConfigError::ProbabilitySum(sum));
        }
        Ok(())
    }

    /// Defaults overlaid with `MATCH_TIMER_*` environment variables
    ///
    /// Durations are read in seconds (`MATCH_TIMER_MAIN_SECS`, ...), asset paths from
    /// `MATCH_TIMER_ASSET_*` and the forced variant from `MATCH_TIMER_VARIANT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        let secs = |name: &str, target: &mut Duration| -> Result<(), ConfigError> {
            if let Some(raw) = get(name) {
                *target = Duration::from_secs(parse(name, &raw)?);
            }
            Ok(())
        };
        secs("MAIN_SECS", &mut config.main)?;
        secs("EXTRA_SECS", &mut config.extra)?;
        secs("CUE_OFFSET_SECS", &mut config.cue_offset)?;
        secs("CONCLUSION_DELETE_SECS", &mut config.conclusion_delete_after)?;
        secs("STOP_DELETE_SECS", &mut config.stop_delete_after)?;
        secs("CONNECT_TIMEOUT_SECS", &mut config.connect_timeout)?;
        secs("PLAY_START_TIMEOUT_SECS", &mut config.play_start_timeout)?;

        if let Some(raw) = get("RESET_SETTLE_MS") {
            config.reset_settle = Duration::from_millis(parse("RESET_SETTLE_MS", &raw)?);
        }
        if let Some(raw) = get("FINALS_PROBABILITY") {
            config.finals_probability = parse("FINALS_PROBABILITY", &raw)?;
        }
        if let Some(raw) = get("WIN_AND_IN_PROBABILITY") {
            config.win_and_in_probability = parse("WIN_AND_IN_PROBABILITY", &raw)?;
        }
        if let Some(raw) = get("VARIANT") {
            config.forced_variant = Some(parse("VARIANT", &raw)?);
        }

        let assets = &mut config.assets;
        for (name, target) in [
            ("ASSET_INTRO_STANDARD", &mut assets.intro_standard),
            ("ASSET_INTRO_WIN_AND_IN", &mut assets.intro_win_and_in),
            ("ASSET_FINAL_GAME", &mut assets.final_game),
            ("ASSET_CUE", &mut assets.cue),
            ("ASSET_MAIN_END", &mut assets.main_end),
            ("ASSET_CONCLUSION", &mut assets.conclusion),
        ] {
            if let Some(path) = get(name) {
                *target = PathBuf::from(path);
            }
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse<T: FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: format!("{ENV_PREFIX}{name}"),
        value: raw.to_string(),
    })
}
