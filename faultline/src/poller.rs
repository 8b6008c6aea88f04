//! Fixed-interval convergence polling.
//!
//! Every "wait until the world reaches state X" in the engine goes through
//! [`converge`]: the attempt budget is `floor(timeout / interval)`, attempts
//! are separated by exactly one interval (no sleep after the last), and an
//! observation error is propagated immediately rather than retried, because
//! continuing to act on a target we cannot observe is unsafe.

use faultline_common::ChaosError;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Poll `observe` until it reports `expected` or the attempt budget runs out.
pub async fn converge<S, F, Fut>(
    subject: &str,
    expected: S,
    interval: Duration,
    timeout: Duration,
    mut observe: F,
) -> Result<(), ChaosError>
where
    S: PartialEq + Copy + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<S, ChaosError>>,
{
    let attempts = (timeout.as_secs_f64() / interval.as_secs_f64()).floor() as u32;

    for attempt in 1..=attempts {
        let state = observe().await?;
        if state == expected {
            debug!(%subject, %expected, attempt, "state reached");
            return Ok(());
        }
        debug!(%subject, current = %state, %expected, attempt, "state not yet reached");
        if attempt < attempts {
            tokio::time::sleep(interval).await;
        }
    }

    Err(ChaosError::ConvergenceTimeout {
        subject: subject.to_string(),
        expected: expected.to_string(),
        attempts,
        timeout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_common::DiskAttachment;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn counter() -> Arc<AtomicU32> {
        Arc::new(AtomicU32::new(0))
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_exactly_k_observations() {
        let calls = counter();
        let seen = calls.clone();

        let result = converge(
            "disk 2001 of vm-42",
            DiskAttachment::Detached,
            Duration::from_secs(2),
            Duration::from_secs(180),
            || {
                let calls = seen.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    Ok(if n >= 4 {
                        DiskAttachment::Detached
                    } else {
                        DiskAttachment::Attached
                    })
                }
            },
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_floor_of_timeout_over_interval_attempts() {
        let calls = counter();
        let seen = calls.clone();
        let started = Instant::now();

        // floor(10s / 3s) = 3 attempts, 2 sleeps: 6s elapsed, not 10.
        let err = converge(
            "host esx-1",
            faultline_common::HostConnectionState::Connected,
            Duration::from_secs(3),
            Duration::from_secs(10),
            || {
                let calls = seen.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(faultline_common::HostConnectionState::NotResponding)
                }
            },
        )
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(6));
        match err {
            ChaosError::ConvergenceTimeout {
                subject,
                expected,
                attempts,
                timeout,
            } => {
                assert_eq!(subject, "host esx-1");
                assert_eq!(expected, "CONNECTED");
                assert_eq!(attempts, 3);
                assert_eq!(timeout, Duration::from_secs(10));
            }
            other => panic!("expected ConvergenceTimeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn observation_error_propagates_without_retry() {
        let calls = counter();
        let seen = calls.clone();

        let err = converge(
            "disk 2001 of vm-42",
            DiskAttachment::Detached,
            Duration::from_secs(2),
            Duration::from_secs(180),
            || {
                let calls = seen.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<DiskAttachment, _>(ChaosError::observation(
                        "disk 2001 of vm-42",
                        "http 503",
                    ))
                }
            },
        )
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, ChaosError::ObservationFailed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn no_sleep_after_the_final_attempt() {
        let started = Instant::now();

        let _ = converge(
            "disk 2001 of vm-42",
            DiskAttachment::Detached,
            Duration::from_secs(5),
            Duration::from_secs(5),
            || async { Ok(DiskAttachment::Attached) },
        )
        .await;

        // One attempt in the budget, so no interval is slept at all.
        assert_eq!(started.elapsed(), Duration::ZERO);
    }
}
