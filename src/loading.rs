//! Minimum display duration for loading indicators.
//!
//! A spinner that flashes for 40ms reads as a glitch. `with_min_duration`
//! holds the result of a fast call back until the configured minimum has
//! elapsed, then hands it over untouched, errors included.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::time::{Instant, sleep};

/// Await `fut`, resolving no earlier than `min` after the call started.
pub async fn with_min_duration<F: Future>(min: Duration, fut: F) -> F::Output {
    let started = Instant::now();
    let output = fut.await;
    let remaining = min.saturating_sub(started.elapsed());
    if !remaining.is_zero() {
        sleep(remaining).await;
    }
    output
}

/// Loading flag shared by overlapping operations.
#[derive(Debug, Default)]
pub struct LoadingState {
    active: AtomicUsize,
}

impl LoadingState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.active.load(Ordering::Acquire) > 0
    }

    /// Run `fut` under the minimum duration with the flag raised. The flag
    /// drops even if the caller abandons the future.
    pub async fn track<F: Future>(&self, min: Duration, fut: F) -> F::Output {
        let _active = ActiveGuard::enter(&self.active);
        with_min_duration(min, fut).await
    }
}

struct ActiveGuard<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> ActiveGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self { counter }
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
#[path = "loading_test.rs"]
mod tests;
