//! The timer state machine

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::TimerConfig;
use crate::error::{ConfigError, TimerError};
use crate::ids::{ChannelId, GuildId, MessageRef, RoomId, RoomRef, TimerId, UserId};
use crate::notice::Notice;
use crate::plan::{MatchVariant, PausedSnapshot, Stage, StageKind, StagePlan};
use crate::platform::{AudioAsset, ChatGateway, Platform, RoomDirectory};
use crate::registry::{TimerRegistry, TimerState};
use crate::scheduler::{ScheduleHandle, StageScheduler, StageSink};
use crate::session::VoiceSessionManager;

/// Why a timer was stopped; only changes the displayed text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A participant ended the timer
    Manual,
    /// The match result was recorded elsewhere
    MatchRecorded,
}

impl StopReason {
    pub(crate) fn describe(self) -> &'static str {
        match self {
            StopReason::Manual => "manually",
            StopReason::MatchRecorded => "because the match result was recorded",
        }
    }
}

/// The message a timer keeps editing, shared with its stage jobs
#[derive(Debug, Clone, Default)]
struct AnnouncementSlot(Arc<Mutex<Option<MessageRef>>>);

impl AnnouncementSlot {
    fn new(message: Option<MessageRef>) -> Self {
        Self(Arc::new(Mutex::new(message)))
    }

    fn guard(&self) -> MutexGuard<'_, Option<MessageRef>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn get(&self) -> Option<MessageRef> {
        *self.guard()
    }

    fn set(&self, message: Option<MessageRef>) {
        *self.guard() = message;
    }

    fn take(&self) -> Option<MessageRef> {
        self.guard().take()
    }
}

struct TimerRecord {
    room: RoomRef,
    reply_channel: ChannelId,
    variant: MatchVariant,
    /// Stages of the current activation
    plan: StagePlan,
    activation: Instant,
    schedule: Option<ScheduleHandle>,
    paused: Option<PausedSnapshot>,
    announcement: AnnouncementSlot,
}

/// State shared between the coordinator and the stage jobs it arms
struct Shared {
    name: String,
    config: TimerConfig,
    registry: TimerRegistry,
    chat: Arc<dyn ChatGateway>,
    voice: VoiceSessionManager,
    tracker: TaskTracker,
    cancel_token: CancellationToken,
}

impl Shared {
    async fn post(&self, channel: ChannelId, notice: &Notice) -> Option<MessageRef> {
        match self.chat.send_message(channel, &notice.render(Utc::now())).await {
            Ok(message) => Some(message),
            Err(e) => {
                log::warn!("Timer coordinator '{}' failed to send message: {}", self.name, e);
                None
            }
        }
    }

    /// Edit the announcement, or post a new one if there is none to edit
    async fn announce(&self, channel: ChannelId, slot: &AnnouncementSlot, notice: &Notice) -> Option<MessageRef> {
        if let Some(message) = slot.get() {
            match self.chat.edit_message(message, &notice.render(Utc::now())).await {
                Ok(()) => return Some(message),
                Err(e) => log::warn!(
                    "Timer coordinator '{}' failed to edit announcement: {}",
                    self.name,
                    e
                ),
            }
        }
        let message = self.post(channel, notice).await;
        slot.set(message);
        message
    }

    async fn delete(&self, message: MessageRef) {
        if let Err(e) = self.chat.delete_message(message).await {
            log::debug!("Timer coordinator '{}' failed to delete message: {}", self.name, e);
        }
    }

    fn delete_later(self: &Arc<Self>, message: MessageRef, after: Duration) {
        let shared = Arc::clone(self);
        self.tracker.spawn(async move {
            tokio::select! {
                _ = shared.cancel_token.cancelled() => {}
                _ = sleep(after) => shared.delete(message).await,
            }
        });
    }

    /// Best effort: failures are logged and swallowed
    async fn play_cue(&self, room: RoomRef, asset: &AudioAsset) {
        if let Err(e) = self.voice.play_cue(room.guild, room.room, asset).await {
            log::error!(
                "Timer coordinator '{}' could not play {} in room {}: {}",
                self.name,
                asset.path().display(),
                room.room,
                e
            );
        }
    }

    /// Not cancelled by shutdown, which waits for it instead
    fn spawn_cue(self: &Arc<Self>, room: RoomRef, asset: AudioAsset) {
        let shared = Arc::clone(self);
        self.tracker.spawn(async move { shared.play_cue(room, &asset).await });
    }
}

/// Fires the stages of one arming of one timer
struct StageRunner {
    shared: Arc<Shared>,
    timer_id: TimerId,
    epoch: u64,
    room: RoomRef,
    reply_channel: ChannelId,
    announcement: AnnouncementSlot,
}

#[async_trait]
impl StageSink for StageRunner {
    async fn fire(&self, stage: &Stage) {
        let message = match &stage.notice {
            Some(notice) => {
                self.shared
                    .announce(self.reply_channel, &self.announcement, notice)
                    .await
            }
            None => None,
        };
        if let Some(asset) = &stage.audio {
            self.shared.play_cue(self.room, asset).await;
        }
        if let (Some(after), Some(message)) = (stage.delete_after, message) {
            self.shared.delete_later(message, after);
        }
    }

    fn completed(&self) {
        if self.shared.registry.complete(&self.timer_id, self.epoch) {
            log::info!(
                "Timer {} completed in coordinator '{}'",
                self.timer_id,
                self.shared.name
            );
        }
    }
}

/// Runs every match timer of a bot
///
/// Each timer is looked up by its [`TimerId`]; pause, resume and stop of one
/// timer are serialized on that timer's record, while stage jobs only touch
/// the registry and the chat/voice collaborators.
pub struct TimerCoordinator {
    shared: Arc<Shared>,
    directory: Arc<dyn RoomDirectory>,
    scheduler: StageScheduler,
    records: Mutex<HashMap<TimerId, Arc<AsyncMutex<TimerRecord>>>>,
}

impl TimerCoordinator {
    /// Create a coordinator
    ///
    /// # Arguments
    /// * `name` - Instance name for logging
    /// * `config` - Timer durations, probabilities and audio assets
    /// * `platform` - Chat, membership and voice collaborators
    /// * `cancel_token` - Cancelling it stops every timer
    pub fn new(
        name: String,
        config: TimerConfig,
        platform: Platform,
        cancel_token: CancellationToken,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let voice = VoiceSessionManager::new(platform.voice, &config);
        let scheduler = StageScheduler::new(name.clone(), cancel_token.clone());
        log::info!("Timer coordinator '{}' started", name);

        Ok(Self {
            shared: Arc::new(Shared {
                name,
                config,
                registry: TimerRegistry::new(),
                chat: platform.chat,
                voice,
                tracker: TaskTracker::new(),
                cancel_token,
            }),
            directory: platform.directory,
            scheduler,
            records: Mutex::new(HashMap::new()),
        })
    }

    fn records(&self) -> MutexGuard<'_, HashMap<TimerId, Arc<AsyncMutex<TimerRecord>>>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, timer_id: &TimerId) -> Option<Arc<AsyncMutex<TimerRecord>>> {
        self.records().get(timer_id).cloned()
    }

    fn arm(&self, timer_id: TimerId, record: &mut TimerRecord) {
        let Some(epoch) = self.shared.registry.next_epoch(&timer_id) else {
            return;
        };
        let runner = StageRunner {
            shared: Arc::clone(&self.shared),
            timer_id,
            epoch,
            room: record.room,
            reply_channel: record.reply_channel,
            announcement: record.announcement.clone(),
        };
        record.schedule = Some(self.scheduler.arm(timer_id, &record.plan, record.activation, runner));
    }

    /// Start a new timer in `room` on behalf of `requester`
    ///
    /// The requester must currently be in the room. Everyone in the room at this
    /// moment becomes a participant.
    pub async fn start_timer(
        &self,
        room: RoomRef,
        requester: UserId,
        reply_channel: ChannelId,
    ) -> Result<TimerId, TimerError> {
        if self.shared.cancel_token.is_cancelled() {
            return Err(TimerError::ShuttingDown);
        }

        let registry = &self.shared.registry;
        let participants = match registry
            .snapshot_participants(self.directory.as_ref(), room)
            .await
        {
            Ok(participants) => participants,
            Err(e) => {
                log::warn!(
                    "Timer coordinator '{}' could not list members of room {}: {}",
                    self.shared.name,
                    room.room,
                    e
                );
                HashSet::new()
            }
        };
        if !participants.contains(&requester) {
            return Err(TimerError::NotInRoom);
        }

        let timer_id = registry.allocate(room.room);
        let config = &self.shared.config;
        let variant = MatchVariant::pick(config);

        // Lookups must find the record as soon as the timer is visible as active
        let record = Arc::new(AsyncMutex::new(TimerRecord {
            room,
            reply_channel,
            variant,
            plan: StagePlan::for_match(config, variant),
            activation: Instant::now(),
            schedule: None,
            paused: None,
            announcement: AnnouncementSlot::default(),
        }));
        let mut guard = record.lock().await;
        self.records().insert(timer_id, Arc::clone(&record));
        registry.register(timer_id, participants);

        let (notice, intro) = match variant {
            MatchVariant::Final => (Notice::FinalGame, &config.assets.final_game),
            MatchVariant::WinAndIn => (
                Notice::Started {
                    variant,
                    ends_in: config.main,
                },
                &config.assets.intro_win_and_in,
            ),
            MatchVariant::Standard => (
                Notice::Started {
                    variant,
                    ends_in: config.main,
                },
                &config.assets.intro_standard,
            ),
        };
        let announcement = self.shared.post(reply_channel, &notice).await;
        guard.announcement.set(announcement);

        if variant.is_timed() {
            guard.activation = Instant::now();
            self.arm(timer_id, &mut guard);
        } else {
            // Untimed finals have nothing to count down
            registry.stop(&timer_id);
        }
        drop(guard);

        self.shared.spawn_cue(room, AudioAsset::new(intro));
        log::info!(
            "Timer coordinator '{}' started {} timer {} with {} participant(s)",
            self.shared.name,
            variant,
            timer_id,
            registry.participant_count(&timer_id)
        );
        Ok(timer_id)
    }

    /// Freeze a running timer
    pub async fn pause_timer(&self, timer_id: TimerId, requester: UserId) -> Result<(), TimerError> {
        let registry = &self.shared.registry;
        if !registry.knows_participant(&timer_id, requester) {
            return Err(TimerError::NotAuthorized { timer_id });
        }
        let record = self
            .record(&timer_id)
            .ok_or(TimerError::NoActiveTimer { timer_id })?;
        let mut record = record.lock().await;
        if registry.state(&timer_id) != Some(TimerState::Active) {
            return Err(TimerError::NoActiveTimer { timer_id });
        }

        let fired = match record.schedule.take() {
            Some(schedule) => schedule.cancel().await,
            None => Vec::new(),
        };
        let now = Instant::now();

        let mut snapshot = PausedSnapshot::capture(&record.plan, record.activation, now, &fired);
        if snapshot.all_fired() {
            // Last stage fired while we were cancelling
            registry.stop(&timer_id);
            return Err(TimerError::NoActiveTimer { timer_id });
        }
        if !registry.transition(&timer_id, TimerState::Active, TimerState::Paused) {
            return Err(TimerError::NoActiveTimer { timer_id });
        }

        if let Some(message) = record.announcement.take() {
            self.shared.delete(message).await;
        }
        let indicator = Notice::Paused {
            remaining: snapshot.time_left(),
        };
        snapshot.indicator = self.shared.post(record.reply_channel, &indicator).await;
        record.paused = Some(snapshot);

        log::info!(
            "Timer coordinator '{}' paused timer {} (fired: {:?})",
            self.shared.name,
            timer_id,
            fired
        );
        Ok(())
    }

    /// Unfreeze a paused timer; every stage is due as far ahead as it was when
    /// the timer was paused
    pub async fn resume_timer(&self, timer_id: TimerId, requester: UserId) -> Result<(), TimerError> {
        let registry = &self.shared.registry;
        if !registry.knows_participant(&timer_id, requester) {
            return Err(TimerError::NotAuthorized { timer_id });
        }
        let record = self
            .record(&timer_id)
            .ok_or(TimerError::NoPausedTimer { timer_id })?;
        let mut record = record.lock().await;
        if registry.state(&timer_id) != Some(TimerState::Paused) {
            return Err(TimerError::NoPausedTimer { timer_id });
        }
        let snapshot = record
            .paused
            .take()
            .ok_or(TimerError::NoPausedTimer { timer_id })?;

        if let Some(indicator) = snapshot.indicator {
            self.shared.delete(indicator).await;
        }

        record.plan = snapshot.resume_plan();
        record.activation = Instant::now();

        let notice = Notice::Resumed {
            variant: record.variant,
            ends_in: record.plan.projected_end().unwrap_or_default(),
        };
        let announcement = self.shared.post(record.reply_channel, &notice).await;
        record.announcement.set(announcement);

        registry.transition(&timer_id, TimerState::Paused, TimerState::Active);
        self.arm(timer_id, &mut record);

        log::info!(
            "Timer coordinator '{}' resumed timer {} with {} stage(s) left",
            self.shared.name,
            timer_id,
            record.plan.stages().len()
        );
        Ok(())
    }

    /// Stop a timer for good
    ///
    /// Returns false when the timer was unknown or already stopped, in which
    /// case nothing happens.
    pub async fn stop_timer(&self, timer_id: TimerId, reason: StopReason) -> bool {
        let Some(record) = self.record(&timer_id) else {
            return false;
        };
        let mut record = record.lock().await;
        if !self.shared.registry.stop(&timer_id) {
            return false;
        }

        if let Some(schedule) = record.schedule.take() {
            schedule.cancel().await;
        }

        let visible = match record.paused.take() {
            Some(snapshot) => snapshot.indicator,
            None => record.announcement.take(),
        };
        if let Some(message) = visible {
            let notice = Notice::Stopped { reason };
            match self
                .shared
                .chat
                .edit_message(message, &notice.render(Utc::now()))
                .await
            {
                Ok(()) => self
                    .shared
                    .delete_later(message, self.shared.config.stop_delete_after),
                Err(e) => log::warn!(
                    "Timer coordinator '{}' failed to edit message of stopped timer {}: {}",
                    self.shared.name,
                    timer_id,
                    e
                ),
            }
        }

        log::info!(
            "Timer coordinator '{}' stopped timer {} ({:?})",
            self.shared.name,
            timer_id,
            reason
        );
        true
    }

    /// Stop the timer of the room `user` sits in, if the user takes part in it
    ///
    /// Used when a match result is recorded. Returns whether a timer was stopped.
    pub async fn stop_for_recorded_match(&self, guild: GuildId, user: UserId) -> bool {
        let Some(room) = self.directory.voice_room_of(guild, user).await else {
            return false;
        };
        let Some(timer_id) = self.shared.registry.current(room) else {
            return false;
        };
        if !self.shared.registry.is_participant(&timer_id, user) {
            return false;
        }
        self.stop_timer(timer_id, StopReason::MatchRecorded).await
    }

    /// Whether `user` was in the room when the timer started and the timer is
    /// not stopped
    pub fn is_participant(&self, timer_id: &TimerId, user: UserId) -> bool {
        self.shared.registry.is_participant(timer_id, user)
    }

    /// Most recent timer started in a room
    pub fn current_timer(&self, room: RoomId) -> Option<TimerId> {
        self.shared.registry.current(room)
    }

    pub fn state(&self, timer_id: &TimerId) -> Option<TimerState> {
        self.shared.registry.state(timer_id)
    }

    /// Remaining time per stage of a paused timer
    pub async fn paused_remaining(&self, timer_id: &TimerId) -> Option<Vec<(StageKind, Duration)>> {
        let record = self.record(timer_id)?;
        let record = record.lock().await;
        record.paused.as_ref().map(|snapshot| {
            snapshot
                .stages
                .iter()
                .map(|paused| (paused.stage.kind, paused.remaining))
                .collect()
        })
    }

    /// Forget stopped timers
    pub fn prune_stopped(&self) -> usize {
        let pruned = self.shared.registry.prune_stopped();
        let mut records = self.records();
        for timer_id in &pruned {
            records.remove(timer_id);
        }
        pruned.len()
    }

    /// Cancel every timer and wait for background work to end
    pub async fn shutdown(&self) {
        log::info!("Timer coordinator '{}' shutting down", self.shared.name);
        self.shared.cancel_token.cancel();

        let records: Vec<_> = self.records().values().cloned().collect();
        for record in records {
            let mut record = record.lock().await;
            if let Some(schedule) = record.schedule.take() {
                schedule.cancel().await;
            }
        }

        self.shared.tracker.close();
        self.shared.tracker.wait().await;
        log::info!("Timer coordinator '{}' stopped", self.shared.name);
    }
}
