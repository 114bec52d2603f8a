//! Runs a shortened match timer against a console "platform"

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use match_timer::{
    AudioAsset, CancellationToken, ChannelId, ChatError, ChatGateway, Duration, GuildId, MessageId,
    MessageRef, Platform, PlaybackError, PlaybackTrack, RoomDirectory, RoomId, RoomRef, StopReason,
    TimerConfig, TimerCoordinator, UserId, VoiceError, VoiceGateway,
};

struct ConsoleDirectory;

#[async_trait]
impl RoomDirectory for ConsoleDirectory {
    async fn room_members(&self, _room: RoomRef) -> Result<Vec<UserId>, ChatError> {
        Ok(vec![UserId(1), UserId(2)])
    }

    async fn voice_room_of(&self, _guild: GuildId, user: UserId) -> Option<RoomId> {
        (user.0 <= 2).then_some(RoomId(10))
    }
}

#[derive(Default)]
struct ConsoleChat {
    next_id: AtomicU64,
}

#[async_trait]
impl ChatGateway for ConsoleChat {
    async fn send_message(&self, channel: ChannelId, content: &str) -> Result<MessageRef, ChatError> {
        let message = MessageId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        println!("[chat] #{} +{}: {}", channel, message, content);
        Ok(MessageRef { channel, message })
    }

    async fn edit_message(&self, message: MessageRef, content: &str) -> Result<(), ChatError> {
        println!("[chat] #{} ~{}: {}", message.channel, message.message, content);
        Ok(())
    }

    async fn delete_message(&self, message: MessageRef) -> Result<(), ChatError> {
        println!("[chat] #{} -{}", message.channel, message.message);
        Ok(())
    }
}

#[derive(Default)]
struct ConsoleVoice {
    connections: Mutex<HashMap<GuildId, RoomId>>,
}

#[async_trait]
impl VoiceGateway for ConsoleVoice {
    async fn current_room(&self, guild: GuildId) -> Option<RoomId> {
        self.connections.lock().unwrap().get(&guild).copied()
    }

    async fn connect(&self, guild: GuildId, room: RoomId) -> Result<(), VoiceError> {
        println!("[voice] guild {} joins room {}", guild, room);
        self.connections.lock().unwrap().insert(guild, room);
        Ok(())
    }

    async fn move_to(&self, guild: GuildId, room: RoomId) -> Result<(), VoiceError> {
        println!("[voice] guild {} moves to room {}", guild, room);
        self.connections.lock().unwrap().insert(guild, room);
        Ok(())
    }

    async fn disconnect(&self, guild: GuildId, _force: bool) -> Result<(), VoiceError> {
        println!("[voice] guild {} leaves", guild);
        self.connections.lock().unwrap().remove(&guild);
        Ok(())
    }

    async fn start_playback(&self, guild: GuildId, asset: &AudioAsset) -> Result<PlaybackTrack, VoiceError> {
        println!("[voice] guild {} plays {}", guild, asset.path().display());
        let (done, track) = PlaybackTrack::channel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            let _ = done.send(Ok::<(), PlaybackError>(()));
        });
        Ok(track)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init();

    let config = TimerConfig {
        main: Duration::from_secs(8),
        extra: Duration::from_secs(4),
        cue_offset: Duration::from_secs(2),
        conclusion_delete_after: Duration::from_secs(1),
        stop_delete_after: Duration::from_secs(1),
        forced_variant: Some(match_timer::MatchVariant::Standard),
        ..TimerConfig::default()
    };
    let platform = Platform {
        directory: Arc::new(ConsoleDirectory),
        chat: Arc::new(ConsoleChat::default()),
        voice: Arc::new(ConsoleVoice::default()),
    };
    let coordinator = TimerCoordinator::new(
        "demo_coordinator".to_string(),
        config,
        platform,
        CancellationToken::new(),
    )?;

    let room = RoomRef::new(1, 10);
    let timer = coordinator.start_timer(room, UserId(1), ChannelId(500)).await?;
    println!("Started timer {}", timer);

    tokio::time::sleep(Duration::from_secs(3)).await;
    coordinator.pause_timer(timer, UserId(2)).await?;
    println!("Paused: {:?}", coordinator.paused_remaining(&timer).await);

    tokio::time::sleep(Duration::from_secs(2)).await;
    coordinator.resume_timer(timer, UserId(1)).await?;
    println!("Resumed timer {}", timer);

    // Let it run to the end
    tokio::time::sleep(Duration::from_secs(12)).await;
    println!("State after the run: {:?}", coordinator.state(&timer));

    // A second timer ended by a recorded match
    let second = coordinator.start_timer(room, UserId(2), ChannelId(500)).await?;
    tokio::time::sleep(Duration::from_secs(1)).await;
    if coordinator.stop_for_recorded_match(room.guild, UserId(2)).await {
        println!("Timer {} stopped: {:?}", second, StopReason::MatchRecorded);
    }

    coordinator.shutdown().await;
    println!("Coordinator shut down successfully!");
    Ok(())
}
