//! In-memory platform used by the unit tests

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::{ChatError, PlaybackError, VoiceError};
use crate::ids::{ChannelId, GuildId, MessageId, MessageRef, RoomId, RoomRef, UserId};
use crate::platform::{AudioAsset, ChatGateway, PlaybackTrack, RoomDirectory, VoiceGateway};

#[derive(Default)]
pub struct FakeDirectory {
    rooms: Mutex<HashMap<RoomId, Vec<UserId>>>,
}

impl FakeDirectory {
    pub fn set_members(&self, room: RoomId, users: &[u64]) {
        self.rooms
            .lock()
            .unwrap()
            .insert(room, users.iter().copied().map(UserId).collect());
    }

    pub fn remove_room(&self, room: RoomId) {
        self.rooms.lock().unwrap().remove(&room);
    }
}

#[async_trait]
impl RoomDirectory for FakeDirectory {
    async fn room_members(&self, room: RoomRef) -> Result<Vec<UserId>, ChatError> {
        self.rooms
            .lock()
            .unwrap()
            .get(&room.room)
            .cloned()
            .ok_or_else(|| ChatError::Request(format!("unknown room {}", room.room)))
    }

    async fn voice_room_of(&self, _guild: GuildId, user: UserId) -> Option<RoomId> {
        self.rooms
            .lock()
            .unwrap()
            .iter()
            .find(|(_, members)| members.contains(&user))
            .map(|(room, _)| *room)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    Sent(MessageRef, String),
    Edited(MessageRef, String),
    Deleted(MessageRef),
}

#[derive(Default)]
pub struct FakeChat {
    next_id: AtomicU64,
    live: Mutex<HashMap<MessageRef, String>>,
    events: Mutex<Vec<(Instant, ChatEvent)>>,
    /// How long every send takes
    send_delay: Duration,
}

impl FakeChat {
    pub fn with_send_delay(send_delay: Duration) -> Self {
        Self {
            send_delay,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<ChatEvent> {
        self.events.lock().unwrap().iter().map(|(_, e)| e.clone()).collect()
    }

    pub fn timed_events(&self) -> Vec<(Instant, ChatEvent)> {
        self.events.lock().unwrap().clone()
    }

    /// Texts of messages that still exist
    pub fn live_texts(&self) -> Vec<String> {
        self.live.lock().unwrap().values().cloned().collect()
    }

    pub fn text_of(&self, message: MessageRef) -> Option<String> {
        self.live.lock().unwrap().get(&message).cloned()
    }

    fn record(&self, event: ChatEvent) {
        self.events.lock().unwrap().push((Instant::now(), event));
    }
}

#[async_trait]
impl ChatGateway for FakeChat {
    async fn send_message(&self, channel: ChannelId, content: &str) -> Result<MessageRef, ChatError> {
        if !self.send_delay.is_zero() {
            tokio::time::sleep(self.send_delay).await;
        }
        let message = MessageRef {
            channel,
            message: MessageId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
        };
        self.live.lock().unwrap().insert(message, content.to_string());
        self.record(ChatEvent::Sent(message, content.to_string()));
        Ok(message)
    }

    async fn edit_message(&self, message: MessageRef, content: &str) -> Result<(), ChatError> {
        match self.live.lock().unwrap().get_mut(&message) {
            Some(text) => *text = content.to_string(),
            None => return Err(ChatError::UnknownMessage),
        }
        self.record(ChatEvent::Edited(message, content.to_string()));
        Ok(())
    }

    async fn delete_message(&self, message: MessageRef) -> Result<(), ChatError> {
        if self.live.lock().unwrap().remove(&message).is_none() {
            return Err(ChatError::UnknownMessage);
        }
        self.record(ChatEvent::Deleted(message));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VoiceEvent {
    Connect(GuildId, RoomId),
    Move(GuildId, RoomId),
    Disconnect { guild: GuildId, force: bool },
    PlayStart(GuildId, AudioAsset),
    PlayEnd(GuildId, AudioAsset),
}

#[derive(Default)]
struct Shared {
    events: Mutex<Vec<(Instant, VoiceEvent)>>,
    playing: AtomicUsize,
    max_playing: AtomicUsize,
}

impl Shared {
    fn record(&self, event: VoiceEvent) {
        self.events.lock().unwrap().push((Instant::now(), event));
    }
}

pub struct FakeVoice {
    connections: Mutex<HashMap<GuildId, RoomId>>,
    shared: Arc<Shared>,
    playback_failures: Mutex<VecDeque<VoiceError>>,
    connect_failures: Mutex<VecDeque<VoiceError>>,
    /// Connect attempts that never answer
    hanging_connects: AtomicUsize,
    /// Playbacks whose track is dropped half way
    interrupted_plays: AtomicUsize,
    pub playback_length: Duration,
}

impl Default for FakeVoice {
    fn default() -> Self {
        Self {
            connections: Mutex::default(),
            shared: Arc::default(),
            playback_failures: Mutex::default(),
            connect_failures: Mutex::default(),
            hanging_connects: AtomicUsize::new(0),
            interrupted_plays: AtomicUsize::new(0),
            playback_length: Duration::from_secs(3),
        }
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl FakeVoice {
    pub fn with_playback_length(playback_length: Duration) -> Self {
        Self {
            playback_length,
            ..Self::default()
        }
    }

    pub fn fail_next_playback(&self, error: VoiceError) {
        self.playback_failures.lock().unwrap().push_back(error);
    }

    pub fn fail_next_connect(&self, error: VoiceError) {
        self.connect_failures.lock().unwrap().push_back(error);
    }

    pub fn hang_next_connect(&self) {
        self.hanging_connects.fetch_add(1, Ordering::SeqCst);
    }

    pub fn interrupt_next_playback(&self) {
        self.interrupted_plays.fetch_add(1, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<VoiceEvent> {
        self.timed_events().into_iter().map(|(_, e)| e).collect()
    }

    pub fn timed_events(&self) -> Vec<(Instant, VoiceEvent)> {
        self.shared.events.lock().unwrap().clone()
    }

    /// Assets whose playback ran to the end
    pub fn completed_plays(&self) -> Vec<AudioAsset> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                VoiceEvent::PlayEnd(_, asset) => Some(asset),
                _ => None,
            })
            .collect()
    }

    pub fn play_attempts(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, VoiceEvent::PlayStart(..)))
            .count()
    }

    /// Most playbacks ever observed at the same time
    pub fn max_concurrent_playback(&self) -> usize {
        self.shared.max_playing.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self, guild: GuildId) -> bool {
        self.connections.lock().unwrap().contains_key(&guild)
    }
}

#[async_trait]
impl VoiceGateway for FakeVoice {
    async fn current_room(&self, guild: GuildId) -> Option<RoomId> {
        self.connections.lock().unwrap().get(&guild).copied()
    }

    async fn connect(&self, guild: GuildId, room: RoomId) -> Result<(), VoiceError> {
        if take_one(&self.hanging_connects) {
            std::future::pending::<()>().await;
        }
        if let Some(error) = self.connect_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.connections.lock().unwrap().insert(guild, room);
        self.shared.record(VoiceEvent::Connect(guild, room));
        Ok(())
    }

    async fn move_to(&self, guild: GuildId, room: RoomId) -> Result<(), VoiceError> {
        self.connections.lock().unwrap().insert(guild, room);
        self.shared.record(VoiceEvent::Move(guild, room));
        Ok(())
    }

    async fn disconnect(&self, guild: GuildId, force: bool) -> Result<(), VoiceError> {
        self.connections.lock().unwrap().remove(&guild);
        self.shared.record(VoiceEvent::Disconnect { guild, force });
        Ok(())
    }

    async fn start_playback(&self, guild: GuildId, asset: &AudioAsset) -> Result<PlaybackTrack, VoiceError> {
        if !self.is_connected(guild) {
            return Err(VoiceError::InvalidSession);
        }
        self.shared.record(VoiceEvent::PlayStart(guild, asset.clone()));
        if let Some(error) = self.playback_failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        let now_playing = self.shared.playing.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.max_playing.fetch_max(now_playing, Ordering::SeqCst);

        let (done, track) = PlaybackTrack::channel();
        let interrupted = take_one(&self.interrupted_plays);
        let shared = Arc::clone(&self.shared);
        let length = self.playback_length;
        let asset = asset.clone();
        tokio::spawn(async move {
            if interrupted {
                tokio::time::sleep(length / 2).await;
                shared.playing.fetch_sub(1, Ordering::SeqCst);
                drop(done);
                return;
            }
            tokio::time::sleep(length).await;
            shared.playing.fetch_sub(1, Ordering::SeqCst);
            shared.record(VoiceEvent::PlayEnd(guild, asset));
            let _ = done.send(Ok::<(), PlaybackError>(()));
        });
        Ok(track)
    }
}
