//! Property-based tests for rust-common crate.
//!
//! These tests verify retry and polling properties across generated inputs
//! using proptest, on a paused tokio clock.

use proptest::prelude::*;
use rust_common::{
    BoundedPoll, DelayListener, ExponentialBackoffListener, PollError, Probe, Retrier,
    RetrierEventListener, RetryConfig,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
#[error("not yet propagated")]
struct NotPropagated;

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
}

#[derive(Default)]
struct SuccessRecorder {
    retry: AtomicU32,
}

#[async_trait::async_trait]
impl RetrierEventListener for SuccessRecorder {
    fn on_success(&self, retry: u32) {
        self.retry.store(retry, Ordering::SeqCst);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// An operation failing N-1 times then succeeding within the budget
    /// returns its value and reports N-1 retries.
    #[test]
    fn prop_eventual_success_within_budget(n in 1u32..20) {
        let rt = paused_runtime();
        rt.block_on(async {
            let recorder = Arc::new(SuccessRecorder::default());
            let retrier = Retrier::with_timeout_secs(30)
                .register_listener(DelayListener::from_millis(1000))
                .register_shared_listener(recorder.clone());

            let calls = AtomicU32::new(0);
            let value = retrier
                .execute(|| async {
                    let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if attempt < n { Err(NotPropagated) } else { Ok(attempt) }
                })
                .await
                .unwrap();

            assert_eq!(value, n);
            assert_eq!(recorder.retry.load(Ordering::SeqCst), n - 1);
        });
    }

    /// An always-failing operation gives up within the budget plus one delay.
    #[test]
    fn prop_always_failing_respects_budget(budget_secs in 0u64..60, delay_ms in 100u64..5000) {
        let rt = paused_runtime();
        rt.block_on(async {
            let retrier = Retrier::with_timeout_secs(budget_secs)
                .register_listener(DelayListener::from_millis(delay_ms));
            let started = tokio::time::Instant::now();

            let result: Result<(), _> = retrier.execute(|| async { Err(NotPropagated) }).await;

            let elapsed = started.elapsed();
            assert!(result.is_err());
            assert!(elapsed >= Duration::from_secs(budget_secs));
            assert!(elapsed <= Duration::from_secs(budget_secs) + Duration::from_millis(delay_ms));
        });
    }

    /// Backoff delays never exceed the configured cap plus jitter.
    #[test]
    fn prop_backoff_capped(retry in 1u32..64, cap_ms in 100u64..10_000) {
        let listener = ExponentialBackoffListener::new(
            RetryConfig::default().with_max_delay(Duration::from_millis(cap_ms)),
        );
        let delay = listener.delay_for_retry(retry);
        prop_assert!(delay <= Duration::from_millis(cap_ms + cap_ms / 4 + 1));
    }

    /// A poll whose condition never holds stops once the budget is spent.
    #[test]
    fn prop_poll_times_out(interval_secs in 1u64..5, budget_secs in 0u64..40) {
        let rt = paused_runtime();
        rt.block_on(async {
            let poll = BoundedPoll::new(
                Duration::from_secs(interval_secs),
                Duration::from_secs(budget_secs),
            );

            let result: Result<(), PollError<NotPropagated>> =
                poll.until(|| async { Ok(Probe::pending("stale")) }).await;

            match result {
                Err(PollError::TimedOut { elapsed, .. }) => {
                    assert!(elapsed >= Duration::from_secs(budget_secs));
                    assert!(elapsed <= Duration::from_secs(budget_secs + interval_secs));
                }
                other => panic!("unexpected result: {other:?}"),
            }
        });
    }
}
