//! Fetch-retry scheduling.
//!
//! After every cycle the scheduler decides when the next one runs:
//!
//! - success, with or without events: reset the failure counter and wait
//!   the reload interval
//! - failure: increment the counter and retry after [`RETRY_DELAY`]; once
//!   the counter reaches [`MAX_FAILED_RETRIEVALS`] it is reset and the
//!   reload interval is used instead
//!
//! The scheduler owns the only pending timer. Re-arming or cancelling drops
//! the previous one, so two timers can never be pending at once.

use std::future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::time::Sleep;
use tracing::debug;

/// Delay before retrying a failed retrieval.
pub const RETRY_DELAY: Duration = Duration::from_secs(10);

/// Consecutive failures after which the scheduler falls back to the
/// reload interval.
pub const MAX_FAILED_RETRIEVALS: u32 = 3;

/// What a cycle produced, as far as scheduling is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Transport error or non-200 status.
    Failed,
    /// Retrieved, but no event survived filtering.
    Empty,
    /// Retrieved and published this many events.
    Received(usize),
}

/// The scheduler's decision after a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Delay until the next cycle.
    pub delay: Duration,
    /// Failure counter after this cycle.
    pub failed_retrievals: u32,
    /// This failure hit the threshold and the counter was reset.
    pub threshold_reached: bool,
}

/// The pure delay/counter rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub reload_interval: Duration,
    pub retry_delay: Duration,
    pub max_failed_retrievals: u32,
}

impl RetryPolicy {
    pub fn new(reload_interval: Duration) -> Self {
        Self {
            reload_interval,
            retry_delay: RETRY_DELAY,
            max_failed_retrievals: MAX_FAILED_RETRIEVALS,
        }
    }

    /// Applies `outcome` to a counter currently at `failed_retrievals`.
    pub fn decide(&self, failed_retrievals: u32, outcome: FetchOutcome) -> Decision {
        match outcome {
            FetchOutcome::Failed => {
                let failed = failed_retrievals.saturating_add(1);
                if failed < self.max_failed_retrievals {
                    Decision {
                        delay: self.retry_delay,
                        failed_retrievals: failed,
                        threshold_reached: false,
                    }
                } else {
                    Decision {
                        delay: self.reload_interval,
                        failed_retrievals: 0,
                        threshold_reached: true,
                    }
                }
            }
            FetchOutcome::Empty | FetchOutcome::Received(_) => Decision {
                delay: self.reload_interval,
                failed_retrievals: 0,
                threshold_reached: false,
            },
        }
    }
}

/// Holds the failure counter and the pending timer of one fetcher.
#[derive(Debug)]
pub struct Scheduler {
    policy: RetryPolicy,
    failed_retrievals: Arc<AtomicU32>,
    timer: Option<Pin<Box<Sleep>>>,
}

impl Scheduler {
    /// `failed_retrievals` is shared so the fetcher can report it.
    pub fn new(policy: RetryPolicy, failed_retrievals: Arc<AtomicU32>) -> Self {
        Self {
            policy,
            failed_retrievals,
            timer: None,
        }
    }

    /// Records a cycle outcome and re-arms the timer accordingly.
    pub fn record(&mut self, outcome: FetchOutcome) -> Decision {
        let current = self.failed_retrievals.load(Ordering::Acquire);
        let decision = self.policy.decide(current, outcome);
        self.failed_retrievals
            .store(decision.failed_retrievals, Ordering::Release);
        self.arm(decision.delay);
        debug!(
            ?outcome,
            failures = decision.failed_retrievals,
            delay_secs = decision.delay.as_secs(),
            "Next fetch scheduled"
        );
        decision
    }

    /// Replaces the pending timer with one firing after `delay`.
    pub fn arm(&mut self, delay: Duration) {
        self.cancel();
        self.timer = Some(Box::pin(tokio::time::sleep(delay)));
    }

    /// Drops the pending timer, if any.
    pub fn cancel(&mut self) {
        self.timer = None;
    }

    /// Resolves when the pending timer fires; never resolves when disarmed.
    pub async fn wait(&mut self) {
        match self.timer.as_mut() {
            Some(timer) => timer.as_mut().await,
            None => future::pending::<()>().await,
        }
        self.timer = None;
    }
}

#[cfg(test)]
impl Scheduler {
    fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    fn deadline(&self) -> Option<tokio::time::Instant> {
        self.timer.as_ref().map(|t| t.deadline())
    }

    fn failed_retrievals(&self) -> u32 {
        self.failed_retrievals.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    const RELOAD: Duration = Duration::from_secs(300);

    fn scheduler() -> Scheduler {
        Scheduler::new(RetryPolicy::new(RELOAD), Arc::new(AtomicU32::new(0)))
    }

    #[test]
    fn success_resets_counter_and_uses_reload_interval() {
        let policy = RetryPolicy::new(RELOAD);

        for outcome in [FetchOutcome::Empty, FetchOutcome::Received(4)] {
            let decision = policy.decide(2, outcome);
            assert_eq!(decision.delay, RELOAD);
            assert_eq!(decision.failed_retrievals, 0);
            assert!(!decision.threshold_reached);
        }
    }

    #[test]
    fn failures_retry_quickly_then_fall_back() {
        let policy = RetryPolicy::new(RELOAD);
        let mut counter = 0;
        let mut delays = Vec::new();
        let mut counters = Vec::new();

        for _ in 0..4 {
            let decision = policy.decide(counter, FetchOutcome::Failed);
            counter = decision.failed_retrievals;
            delays.push(decision.delay);
            counters.push(counter);
        }

        assert_eq!(delays, [RETRY_DELAY, RETRY_DELAY, RELOAD, RETRY_DELAY]);
        assert_eq!(counters, [1, 2, 0, 1]);
    }

    #[test]
    fn only_the_third_failure_reaches_threshold() {
        let policy = RetryPolicy::new(RELOAD);
        assert!(!policy.decide(0, FetchOutcome::Failed).threshold_reached);
        assert!(!policy.decide(1, FetchOutcome::Failed).threshold_reached);
        assert!(policy.decide(2, FetchOutcome::Failed).threshold_reached);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_the_timer() {
        let mut scheduler = scheduler();
        let start = Instant::now();

        scheduler.record(FetchOutcome::Failed);
        assert_eq!(scheduler.deadline(), Some(start + RETRY_DELAY));

        scheduler.record(FetchOutcome::Received(1));
        assert_eq!(scheduler.deadline(), Some(start + RELOAD));
        assert_eq!(scheduler.failed_retrievals(), 0);

        scheduler.wait().await;
        assert!(Instant::now() >= start + RELOAD);
        assert!(!scheduler.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_scheduler_never_fires() {
        let mut scheduler = scheduler();
        scheduler.arm(Duration::from_secs(1));
        scheduler.cancel();

        let fired = tokio::time::timeout(Duration::from_secs(3600), scheduler.wait()).await;
        assert!(fired.is_err());
    }
}
