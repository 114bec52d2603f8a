//! Recover-once retry policy for voice operations

use std::future::Future;

use crate::error::VoiceError;

/// Progress of one operation under the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    FirstAttempt,
    Recovering,
    SecondAttempt,
}

/// Attempt; on a transient failure run the recovery action once and attempt
/// again; any further failure is permanent
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryPolicy;

impl RetryPolicy {
    pub async fn run<T, Op, OpFut, Recover, RecoverFut>(
        &self,
        label: &str,
        mut op: Op,
        mut recover: Recover,
    ) -> Result<T, VoiceError>
    where
        Op: FnMut() -> OpFut,
        OpFut: Future<Output = Result<T, VoiceError>>,
        Recover: FnMut() -> RecoverFut,
        RecoverFut: Future<Output = ()>,
    {
        let mut state = RetryState::FirstAttempt;
        loop {
            state = match state {
                RetryState::FirstAttempt => match op().await {
                    Ok(value) => return Ok(value),
                    Err(e) if e.is_transient() => {
                        log::warn!("{} failed ({}); resetting and retrying once", label, e);
                        RetryState::Recovering
                    }
                    Err(e) => return Err(e),
                },
                RetryState::Recovering => {
                    recover().await;
                    RetryState::SecondAttempt
                }
                RetryState::SecondAttempt => {
                    return op().await.inspect_err(|e| {
                        log::warn!("{} failed again after reset: {}", label, e);
                    });
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlaybackError;
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct Script {
        results: Mutex<VecDeque<Result<u32, VoiceError>>>,
        attempts: Cell<usize>,
        recoveries: Cell<usize>,
    }

    impl Script {
        fn new(results: Vec<Result<u32, VoiceError>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                attempts: Cell::new(0),
                recoveries: Cell::new(0),
            }
        }

        async fn run(&self) -> Result<u32, VoiceError> {
            RetryPolicy
                .run(
                    "test op",
                    || {
                        self.attempts.set(self.attempts.get() + 1);
                        let next = self.results.lock().unwrap().pop_front();
                        async move { next.expect("script exhausted") }
                    },
                    || {
                        self.recoveries.set(self.recoveries.get() + 1);
                        async {}
                    },
                )
                .await
        }
    }

    #[tokio::test]
    async fn test_success_needs_no_recovery() {
        let script = Script::new(vec![Ok(1)]);
        assert_eq!(script.run().await, Ok(1));
        assert_eq!((script.attempts.get(), script.recoveries.get()), (1, 0));
    }

    #[tokio::test]
    async fn test_transient_failure_recovers_once() {
        let script = Script::new(vec![Err(VoiceError::ConnectionClosed { code: 4006 }), Ok(2)]);
        assert_eq!(script.run().await, Ok(2));
        assert_eq!((script.attempts.get(), script.recoveries.get()), (2, 1));
    }

    #[tokio::test]
    async fn test_second_failure_is_permanent() {
        let script = Script::new(vec![
            Err(VoiceError::InvalidSession),
            Err(VoiceError::ConnectionClosed { code: 4006 }),
            Ok(3),
        ]);
        assert_eq!(
            script.run().await,
            Err(VoiceError::ConnectionClosed { code: 4006 })
        );
        assert_eq!((script.attempts.get(), script.recoveries.get()), (2, 1));
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let missing = VoiceError::Playback(PlaybackError::AssetMissing("cue.mp3".into()));
        let script = Script::new(vec![Err(missing.clone()), Ok(4)]);
        assert_eq!(script.run().await, Err(missing));
        assert_eq!((script.attempts.get(), script.recoveries.get()), (1, 0));
    }
}
