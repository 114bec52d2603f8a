use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::ids::TimerId;
use crate::plan::{Stage, StageKind, StagePlan};

/// Receiver of fired stages
#[async_trait]
pub trait StageSink: Send + Sync + 'static {
    /// Called once per stage when its delay has elapsed
    async fn fire(&self, stage: &Stage);

    /// Called when the last stage of an arming has fired without cancellation
    ///
    /// Runs inside the scheduler's critical section: must not block or await.
    fn completed(&self);
}

/// Terminal state of one stage job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobOutcome {
    Fired,
    Cancelled,
}

/// Arms stage jobs for timers
pub struct StageScheduler {
    /// Instance name for logging
    name: String,

    /// Parent of every job's token; cancelling it stops all timers
    cancel_token: CancellationToken,
}

#[derive(Default)]
struct JobTable {
    pending: HashMap<StageKind, JoinHandle<JobOutcome>>,
    fired: Vec<StageKind>,
}

/// The jobs of one arming of one timer
pub struct ScheduleHandle {
    timer_id: TimerId,
    cancel_token: CancellationToken,
    jobs: Arc<Mutex<JobTable>>,
}

fn lock(jobs: &Mutex<JobTable>) -> MutexGuard<'_, JobTable> {
    jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl StageScheduler {
    pub fn new(name: String, cancel_token: CancellationToken) -> Self {
        Self { name, cancel_token }
    }

    /// Spawn one delayed job per stage, each due at `activation + delay`
    pub fn arm<S: StageSink>(
        &self,
        timer_id: TimerId,
        plan: &StagePlan,
        activation: Instant,
        sink: S,
    ) -> ScheduleHandle {
        let cancel_token = self.cancel_token.child_token();
        let jobs = Arc::new(Mutex::new(JobTable::default()));
        let sink = Arc::new(sink);

        // Jobs that are already due must not look at the table before it is filled
        let mut table = lock(&jobs);
        for stage in plan.stages() {
            let job = StageJob {
                scheduler: self.name.clone(),
                timer_id,
                deadline: activation + stage.delay,
                stage: stage.clone(),
                cancel_token: cancel_token.clone(),
                jobs: Arc::clone(&jobs),
                sink: Arc::clone(&sink),
            };
            table.pending.insert(stage.kind, tokio::spawn(job.run()));
        }
        drop(table);

        log::debug!(
            "Stage scheduler '{}' armed {} stage(s) for timer {}",
            self.name,
            plan.stages().len(),
            timer_id
        );

        ScheduleHandle {
            timer_id,
            cancel_token,
            jobs,
        }
    }
}

struct StageJob<S> {
    scheduler: String,
    timer_id: TimerId,
    deadline: Instant,
    stage: Stage,
    cancel_token: CancellationToken,
    jobs: Arc<Mutex<JobTable>>,
    sink: Arc<S>,
}

impl<S: StageSink> StageJob<S> {
    async fn run(self) -> JobOutcome {
        tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => {
                log::debug!(
                    "Stage '{}' of timer {} cancelled in scheduler '{}'",
                    self.stage.kind, self.timer_id, self.scheduler
                );
                return JobOutcome::Cancelled;
            }
            _ = sleep_until(self.deadline) => {}
        }

        log::debug!("Stage '{}' of timer {} fired", self.stage.kind, self.timer_id);
        self.sink.fire(&self.stage).await;

        let mut table = lock(&self.jobs);
        table.pending.remove(&self.stage.kind);
        table.fired.push(self.stage.kind);
        if table.pending.is_empty() && !self.cancel_token.is_cancelled() {
            self.sink.completed();
        }
        JobOutcome::Fired
    }
}

impl ScheduleHandle {
    /// Stages whose jobs have not finished yet
    pub fn pending(&self) -> Vec<StageKind> {
        let mut kinds: Vec<StageKind> = lock(&self.jobs).pending.keys().copied().collect();
        kinds.sort();
        kinds
    }

    /// Stages that have fired, in firing order
    pub fn fired(&self) -> Vec<StageKind> {
        lock(&self.jobs).fired.clone()
    }

    /// Cancel every pending job and wait until each one is cancelled or has
    /// finished firing
    ///
    /// Returns the stages that fired. No stage fires after this returns.
    pub async fn cancel(&self) -> Vec<StageKind> {
        self.cancel_token.cancel();
        let pending: Vec<(StageKind, JoinHandle<JobOutcome>)> =
            lock(&self.jobs).pending.drain().collect();

        let (kinds, handles): (Vec<_>, Vec<_>) = pending.into_iter().unzip();
        for (kind, result) in kinds.into_iter().zip(join_all(handles).await) {
            match result {
                Ok(outcome) => {
                    log::debug!("Stage '{}' of timer {} ended: {:?}", kind, self.timer_id, outcome)
                }
                Err(e) => log::error!("Stage '{}' of timer {} failed: {}", kind, self.timer_id, e),
            }
        }

        self.fired()
    }
}

impl Drop for ScheduleHandle {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimerConfig;
    use crate::ids::RoomId;
    use crate::plan::MatchVariant;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::{advance, sleep};

    #[derive(Default)]
    struct Recorder {
        fired: Mutex<Vec<(StageKind, Instant)>>,
        finished: Mutex<Vec<StageKind>>,
        completions: AtomicUsize,
        fire_takes: Duration,
    }

    #[derive(Clone)]
    struct RecordingSink(Arc<Recorder>);

    #[async_trait]
    impl StageSink for RecordingSink {
        async fn fire(&self, stage: &Stage) {
            self.0.fired.lock().unwrap().push((stage.kind, Instant::now()));
            if !self.0.fire_takes.is_zero() {
                sleep(self.0.fire_takes).await;
            }
            self.0.finished.lock().unwrap().push(stage.kind);
        }

        fn completed(&self) {
            self.0.completions.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn plan() -> StagePlan {
        let config = TimerConfig {
            main: Duration::from_secs(80),
            extra: Duration::from_secs(20),
            cue_offset: Duration::from_secs(10),
            ..TimerConfig::default()
        };
        StagePlan::for_match(&config, MatchVariant::Standard)
    }

    fn scheduler() -> (StageScheduler, CancellationToken) {
        let _ = env_logger::builder().is_test(true).try_init();
        let token = CancellationToken::new();
        (StageScheduler::new("test".to_string(), token.clone()), token)
    }

    fn timer() -> TimerId {
        TimerId::new(RoomId(1), 1)
    }

    #[tokio::test(start_paused = true)]
    async fn test_stages_fire_at_their_deadlines() {
        let (scheduler, _token) = scheduler();
        let recorder = Arc::new(Recorder::default());
        let start = Instant::now();
        let handle = scheduler.arm(timer(), &plan(), start, RecordingSink(Arc::clone(&recorder)));

        sleep(Duration::from_secs(101)).await;

        let fired = recorder.fired.lock().unwrap().clone();
        assert_eq!(
            fired,
            vec![
                (StageKind::Cue, start + Duration::from_secs(70)),
                (StageKind::MainEnd, start + Duration::from_secs(80)),
                (StageKind::Conclusion, start + Duration::from_secs(100)),
            ]
        );
        assert_eq!(recorder.completions.load(Ordering::SeqCst), 1);
        assert!(handle.pending().is_empty());
        assert_eq!(handle.fired().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_any_stage() {
        let (scheduler, _token) = scheduler();
        let recorder = Arc::new(Recorder::default());
        let handle = scheduler.arm(timer(), &plan(), Instant::now(), RecordingSink(Arc::clone(&recorder)));

        sleep(Duration::from_secs(40)).await;
        assert_eq!(handle.pending().len(), 3);
        assert!(handle.cancel().await.is_empty());

        sleep(Duration::from_secs(200)).await;
        assert!(recorder.fired.lock().unwrap().is_empty());
        assert_eq!(recorder.completions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_reports_fired_stages() {
        let (scheduler, _token) = scheduler();
        let recorder = Arc::new(Recorder::default());
        let handle = scheduler.arm(timer(), &plan(), Instant::now(), RecordingSink(Arc::clone(&recorder)));

        sleep(Duration::from_secs(75)).await;
        assert_eq!(handle.pending(), vec![StageKind::MainEnd, StageKind::Conclusion]);
        assert_eq!(handle.cancel().await, vec![StageKind::Cue]);

        sleep(Duration::from_secs(200)).await;
        assert_eq!(recorder.fired.lock().unwrap().len(), 1);
        assert_eq!(recorder.completions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_waits_for_in_flight_stage() {
        let (scheduler, _token) = scheduler();
        let recorder = Arc::new(Recorder {
            fire_takes: Duration::from_secs(5),
            ..Recorder::default()
        });
        let handle = scheduler.arm(timer(), &plan(), Instant::now(), RecordingSink(Arc::clone(&recorder)));

        // Cue has started firing but is still busy
        sleep(Duration::from_secs(72)).await;
        assert_eq!(recorder.fired.lock().unwrap().len(), 1);
        assert!(recorder.finished.lock().unwrap().is_empty());

        let fired = handle.cancel().await;
        assert_eq!(fired, vec![StageKind::Cue]);
        assert_eq!(*recorder.finished.lock().unwrap(), vec![StageKind::Cue]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_token_stops_jobs() {
        let (scheduler, token) = scheduler();
        let recorder = Arc::new(Recorder::default());
        let _handle = scheduler.arm(timer(), &plan(), Instant::now(), RecordingSink(Arc::clone(&recorder)));

        token.cancel();
        advance(Duration::from_secs(200)).await;
        tokio::task::yield_now().await;

        assert!(recorder.fired.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_cancels_jobs() {
        let (scheduler, _token) = scheduler();
        let recorder = Arc::new(Recorder::default());
        drop(scheduler.arm(timer(), &plan(), Instant::now(), RecordingSink(Arc::clone(&recorder))));

        sleep(Duration::from_secs(200)).await;
        assert!(recorder.fired.lock().unwrap().is_empty());
    }
}
