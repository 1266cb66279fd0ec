//! Bounded polling.
//!
//! Besides fixed retry backoffs, this is the only place the crate suspends.
//! Time is taken from `tokio::time` so paused-clock tests advance instantly.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::trace;

/// Default poll cadence for DOM waits.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Something a matcher produced that may still count as "nothing yet".
pub trait Found {
    fn is_found(&self) -> bool;
}

impl<T> Found for Option<T> {
    fn is_found(&self) -> bool {
        self.is_some()
    }
}

impl<T> Found for Vec<T> {
    fn is_found(&self) -> bool {
        !self.is_empty()
    }
}

impl Found for bool {
    fn is_found(&self) -> bool {
        *self
    }
}

/// Poll `matcher` every `interval` until it yields `Some`, or give up after
/// `timeout`. The matcher always runs at least once, even with a zero timeout.
pub async fn wait_for<T, F>(mut matcher: F, timeout: Duration, interval: Duration) -> Option<T>
where
    F: FnMut() -> Option<T>,
{
    let deadline = Instant::now() + timeout;
    let mut polls = 0u32;
    loop {
        polls += 1;
        if let Some(value) = matcher() {
            trace!(polls, "wait_for satisfied");
            return Some(value);
        }
        let now = Instant::now();
        if now >= deadline {
            trace!(polls, ?timeout, "wait_for timed out");
            return None;
        }
        sleep(interval.min(deadline - now)).await;
    }
}

/// [`wait_for`] for matchers returning collections or flags: the last value
/// is returned once it is non-empty / true, `None` on timeout.
pub async fn wait_for_found<T, F>(mut matcher: F, timeout: Duration, interval: Duration) -> Option<T>
where
    T: Found,
    F: FnMut() -> T,
{
    wait_for(
        || {
            let value = matcher();
            value.is_found().then_some(value)
        },
        timeout,
        interval,
    )
    .await
}

/// Async-matcher variant, for checks that themselves need to await.
pub async fn wait_for_result<T, F, Fut>(mut matcher: F, timeout: Duration, interval: Duration) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = matcher().await {
            return Some(value);
        }
        let now = Instant::now();
        if now >= deadline {
            return None;
        }
        sleep(interval.min(deadline - now)).await;
    }
}
