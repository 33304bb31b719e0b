//! One rate-limit bucket: remaining budget, reset instant and a FIFO queue.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::RateLimitHeaders;
use crate::error::RateLimitError;

/// A later reset within this margin belongs to the same window (clock jitter)
const RESET_TOLERANCE: Duration = Duration::from_millis(500);

/// Window assumed when the server never said how long one lasts
const FALLBACK_WINDOW: Duration = Duration::from_secs(1);

/// Outcome of [`RateLimitBucket::admit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// One request slot was taken
    Granted,
    /// The bucket was merged into a shared one; resolve the route again
    Retired,
}

#[derive(Debug)]
struct BucketState {
    limit: Option<u32>,
    remaining: u32,
    reset_at: Option<Instant>,
    /// Length of the last window the server announced
    window: Option<Duration>,
    /// Set once any response for this bucket has been seen
    discovered: bool,
    /// The route answered without rate-limit headers
    unlimited: bool,
    retired: bool,
}

/// Rate-limit bucket.
///
/// An undiscovered bucket admits a single probe request; the probe's
/// response headers then set the real budget. Waiters are admitted strictly
/// in arrival order: the async mutex is fair, and only the head of the queue
/// inspects the budget.
#[derive(Debug)]
pub struct RateLimitBucket {
    queue: AsyncMutex<()>,
    state: Mutex<BucketState>,
    changed: Notify,
}

impl Default for RateLimitBucket {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitBucket {
    pub fn new() -> Self {
        Self {
            queue: AsyncMutex::new(()),
            state: Mutex::new(BucketState {
                limit: None,
                remaining: 1,
                reset_at: None,
                window: None,
                discovered: false,
                unlimited: false,
                retired: false,
            }),
            changed: Notify::new(),
        }
    }

    /// Wait for this bucket's turn and budget, then take one request slot.
    /// Every wait is bounded by a reset deadline, except the one for an
    /// in-flight probe, which ends with its release or refund.
    pub async fn admit(&self, cancel: &CancellationToken) -> Result<Admission, RateLimitError> {
        let _turn = tokio::select! {
            turn = self.queue.lock() => turn,
            () = cancel.cancelled() => return Err(RateLimitError::Cancelled),
        };

        loop {
            let changed = self.changed.notified();
            tokio::pin!(changed);
            // Register before inspecting the state so a release in between is not missed
            changed.as_mut().enable();

            let wait_until = {
                let mut state = self.state.lock();
                let now = Instant::now();
                if state.retired {
                    return Ok(Admission::Retired);
                }

                if let Some(reset_at) = state.reset_at {
                    if reset_at <= now {
                        // Local rollover into a window of the last announced length;
                        // the next response corrects both count and deadline
                        state.remaining = state.limit.unwrap_or(1).max(1);
                        state.reset_at = Some(now + state.window.unwrap_or(FALLBACK_WINDOW));
                    }
                }

                if state.unlimited {
                    return Ok(Admission::Granted);
                }
                if state.remaining > 0 {
                    state.remaining -= 1;
                    return Ok(Admission::Granted);
                }
                if state.discovered && state.reset_at.is_none() {
                    // Exhausted without a reset header
                    state.reset_at = Some(now + state.window.unwrap_or(FALLBACK_WINDOW));
                }
                state.reset_at
            };

            match wait_until {
                Some(deadline) => {
                    tracing::debug!(
                        wait_ms = deadline.saturating_duration_since(Instant::now()).as_millis() as u64,
                        "Bucket exhausted, waiting for reset"
                    );
                    tokio::select! {
                        () = tokio::time::sleep_until(deadline) => {}
                        () = &mut changed => {}
                        () = cancel.cancelled() => return Err(RateLimitError::Cancelled),
                    }
                }
                // Probe in flight: wait for its response
                None => {
                    tokio::select! {
                        () = &mut changed => {}
                        () = cancel.cancelled() => return Err(RateLimitError::Cancelled),
                    }
                }
            }
        }
    }

    /// Apply a response's headers to the budget
    pub fn update(&self, headers: &RateLimitHeaders) {
        {
            let mut state = self.state.lock();
            let first_response = !state.discovered;
            state.discovered = true;

            if !headers.has_bucket_info() {
                state.unlimited = true;
            } else {
                state.unlimited = false;
                if headers.limit.is_some() {
                    state.limit = headers.limit;
                }

                let now = Instant::now();
                let new_reset = headers.reset_after.map(|after| now + after);
                let new_window = match (state.reset_at, new_reset) {
                    (Some(current), Some(new)) => new > current + RESET_TOLERANCE,
                    (None, _) => first_response,
                    (Some(_), None) => false,
                };

                if let Some(remaining) = headers.remaining {
                    state.remaining = if new_window {
                        remaining
                    } else {
                        state.remaining.min(remaining)
                    };
                }
                if new_window {
                    if let Some(after) = headers.reset_after {
                        state.window = Some(after);
                    }
                }
                state.reset_at = if new_window || state.reset_at.is_none() {
                    new_reset.or(state.reset_at)
                } else {
                    // Same window: a later deadline is the safer one
                    state.reset_at.max(new_reset)
                };
            }
        }
        self.changed.notify_waiters();
    }

    /// Block the bucket for `retry_after` (per-route 429)
    pub fn defer(&self, retry_after: Duration) {
        {
            let mut state = self.state.lock();
            let until = Instant::now() + retry_after;
            state.remaining = 0;
            state.unlimited = false;
            state.reset_at = Some(state.reset_at.map_or(until, |current| current.max(until)));
        }
        self.changed.notify_waiters();
    }

    /// Give back the probe slot of a request that never got a response.
    /// Discovered buckets keep the slot spent, since the request may have reached the server.
    pub fn refund(&self) {
        let refunded = {
            let mut state = self.state.lock();
            if state.discovered {
                false
            } else {
                state.remaining = 1;
                true
            }
        };
        if refunded {
            self.changed.notify_waiters();
        }
    }

    /// Stop admitting; current and future waiters get [`Admission::Retired`]
    pub fn retire(&self) {
        self.state.lock().retired = true;
        self.changed.notify_waiters();
    }

    /// Remaining budget as currently known
    pub fn remaining(&self) -> u32 {
        self.state.lock().remaining
    }

    pub fn reset_at(&self) -> Option<Instant> {
        self.state.lock().reset_at
    }

    pub fn is_discovered(&self) -> bool {
        self.state.lock().discovered
    }

    pub fn is_unlimited(&self) -> bool {
        self.state.lock().unlimited
    }

    pub fn is_retired(&self) -> bool {
        self.state.lock().retired
    }
}
