//! Fixed-interval retry, used for store connection setup (§4.A: "5 x 5s
//! by default") and for the slot-allocator's gap-scan-on-conflict loop.
//!
//! This is deliberately simpler than a general backoff policy: the spec
//! calls for a single fixed sleep between attempts, not exponential or
//! jittered backoff.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Invoke `f` up to `attempts` times, sleeping `interval` between
/// failures, returning the last error if every attempt fails.
pub async fn with_fixed_interval_retry<T, E, F, Fut>(
    mut f: F,
    attempts: u32,
    interval: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut last_err = None;
    for attempt in 0..attempts.max(1) {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                warn!(attempt = attempt + 1, %e, "attempt failed");
                last_err = Some(e);
                if attempt + 1 < attempts {
                    debug!(?interval, "sleeping before retry");
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }
    Err(last_err.expect("at least one attempt always runs"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = with_fixed_interval_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(42) }
            },
            5,
            Duration::from_millis(1),
        )
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = with_fixed_interval_retry(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("transient")
                    } else {
                        Ok(7)
                    }
                }
            },
            5,
            Duration::from_millis(1),
        )
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = with_fixed_interval_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("nope") }
            },
            3,
            Duration::from_millis(1),
        )
        .await;
        assert_eq!(result, Err("nope"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
