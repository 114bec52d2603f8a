//! Timer identities, participant snapshots and lifecycle state

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::error::ChatError;
use crate::ids::{RoomId, RoomRef, TimerId, UserId};
use crate::platform::RoomDirectory;

/// Lifecycle state of a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Active,
    Paused,
    Stopped,
}

#[derive(Debug)]
struct Entry {
    participants: HashSet<UserId>,
    state: TimerState,
    epoch: u64,
}

#[derive(Debug, Default)]
struct Inner {
    /// room -> last issued sequence number
    sequences: HashMap<RoomId, u64>,
    timers: HashMap<TimerId, Entry>,
}

/// Issues timer identities and holds the authoritative state of each timer
///
/// Every operation is a short critical section on a std mutex; nothing here ever
/// awaits while holding it, so stage jobs may call in freely.
#[derive(Debug, Default)]
pub struct TimerRegistry {
    inner: Mutex<Inner>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Issue the next identity for a room
    pub fn allocate(&self, room: RoomId) -> TimerId {
        let mut inner = self.lock();
        let sequence = inner.sequences.entry(room).or_insert(0);
        *sequence += 1;
        TimerId::new(room, *sequence)
    }

    /// Capture who is in the room right now
    pub async fn snapshot_participants(
        &self,
        directory: &dyn RoomDirectory,
        room: RoomRef,
    ) -> Result<HashSet<UserId>, ChatError> {
        Ok(directory.room_members(room).await?.into_iter().collect())
    }

    /// Record a freshly started timer
    pub fn register(&self, timer_id: TimerId, participants: HashSet<UserId>) {
        let entry = Entry {
            participants,
            state: TimerState::Active,
            epoch: 0,
        };
        self.lock().timers.insert(timer_id, entry);
    }

    /// Latest identity issued for a room
    pub fn current(&self, room: RoomId) -> Option<TimerId> {
        self.lock()
            .sequences
            .get(&room)
            .map(|sequence| TimerId::new(room, *sequence))
    }

    pub fn is_participant(&self, timer_id: &TimerId, user: UserId) -> bool {
        self.lock()
            .timers
            .get(timer_id)
            .is_some_and(|entry| {
                entry.state != TimerState::Stopped && entry.participants.contains(&user)
            })
    }

    /// Participant check that ignores the state, for authorization errors
    pub(crate) fn knows_participant(&self, timer_id: &TimerId, user: UserId) -> bool {
        self.lock()
            .timers
            .get(timer_id)
            .is_some_and(|entry| entry.participants.contains(&user))
    }

    pub fn participant_count(&self, timer_id: &TimerId) -> usize {
        self.lock()
            .timers
            .get(timer_id)
            .map_or(0, |entry| entry.participants.len())
    }

    pub fn state(&self, timer_id: &TimerId) -> Option<TimerState> {
        self.lock().timers.get(timer_id).map(|entry| entry.state)
    }

    /// Move a timer from `from` to `to`; false if it was not in `from`
    pub(crate) fn transition(&self, timer_id: &TimerId, from: TimerState, to: TimerState) -> bool {
        match self.lock().timers.get_mut(timer_id) {
            Some(entry) if entry.state == from => {
                entry.state = to;
                true
            }
            _ => false,
        }
    }

    /// Mark a timer stopped; false if it was unknown or already stopped
    pub(crate) fn stop(&self, timer_id: &TimerId) -> bool {
        match self.lock().timers.get_mut(timer_id) {
            Some(entry) if entry.state != TimerState::Stopped => {
                entry.state = TimerState::Stopped;
                true
            }
            _ => false,
        }
    }

    /// Start a new arming generation and return it
    pub(crate) fn next_epoch(&self, timer_id: &TimerId) -> Option<u64> {
        self.lock().timers.get_mut(timer_id).map(|entry| {
            entry.epoch += 1;
            entry.epoch
        })
    }

    /// Natural completion: only an active timer still on the same arming
    /// generation may complete
    pub(crate) fn complete(&self, timer_id: &TimerId, epoch: u64) -> bool {
        match self.lock().timers.get_mut(timer_id) {
            Some(entry) if entry.state == TimerState::Active && entry.epoch == epoch => {
                entry.state = TimerState::Stopped;
                true
            }
            _ => false,
        }
    }

    /// Forget stopped timers; sequence counters are kept so identities are
    /// never reused
    pub fn prune_stopped(&self) -> Vec<TimerId> {
        let mut inner = self.lock();
        let stopped: Vec<TimerId> = inner
            .timers
            .iter()
            .filter(|(_, entry)| entry.state == TimerState::Stopped)
            .map(|(id, _)| *id)
            .collect();
        for id in &stopped {
            inner.timers.remove(id);
        }
        stopped
    }
}
