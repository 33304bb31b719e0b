//! Global request gate: server-imposed suspension plus a client-side ceiling.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter as Governor};
use parking_lot::Mutex;
use std::num::NonZeroU32;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::RateLimitError;

/// Gate every request passes after bucket admission.
///
/// A global 429 sets a suspension deadline; every waiter re-reads the deadline
/// after waking, so extensions made while it slept are honoured.
#[derive(Debug)]
pub struct GlobalGate {
    suspended_until: Mutex<Option<Instant>>,
    ceiling: Option<DefaultDirectRateLimiter>,
}

impl GlobalGate {
    /// `per_second` of `None` disables the client-side ceiling
    pub fn new(per_second: Option<u32>) -> Self {
        Self {
            suspended_until: Mutex::new(None),
            ceiling: per_second
                .and_then(NonZeroU32::new)
                .map(|rps| Governor::direct(Quota::per_second(rps))),
        }
    }

    /// Hold every request for `retry_after` from now (never shortens an existing suspension)
    pub fn suspend(&self, retry_after: Duration) {
        let until = Instant::now() + retry_after;
        let mut suspended = self.suspended_until.lock();
        if suspended.map_or(true, |current| current < until) {
            *suspended = Some(until);
            tracing::warn!(
                retry_after_ms = retry_after.as_millis() as u64,
                "Global rate limit hit, suspending all requests"
            );
        }
    }

    /// When the current suspension ends, if any
    pub fn suspended_until(&self) -> Option<Instant> {
        let suspended = *self.suspended_until.lock();
        suspended.filter(|until| *until > Instant::now())
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended_until().is_some()
    }

    /// Wait until no suspension is active and the ceiling has room
    pub async fn pass(&self, cancel: &CancellationToken) -> Result<(), RateLimitError> {
        self.wait_suspension(cancel).await?;
        if let Some(ceiling) = &self.ceiling {
            tokio::select! {
                () = ceiling.until_ready() => {}
                () = cancel.cancelled() => return Err(RateLimitError::Cancelled),
            }
            // A suspension may have started while waiting on the ceiling
            self.wait_suspension(cancel).await?;
        }
        Ok(())
    }

    async fn wait_suspension(&self, cancel: &CancellationToken) -> Result<(), RateLimitError> {
        while let Some(until) = self.suspended_until() {
            tokio::select! {
                () = tokio::time::sleep_until(until) => {}
                () = cancel.cancelled() => return Err(RateLimitError::Cancelled),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_pass_without_suspension_is_immediate() {
        let gate = GlobalGate::new(None);
        let start = Instant::now();
        gate.pass(&CancellationToken::new()).await.unwrap();
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_suspension_holds_requests() {
        let gate = GlobalGate::new(None);
        gate.suspend(Duration::from_secs(3));
        assert!(gate.is_suspended());

        let start = Instant::now();
        gate.pass(&CancellationToken::new()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(!gate.is_suspended());
    }

    #[tokio::test(start_paused = true)]
    async fn test_extension_is_seen_by_sleeping_waiter() {
        let gate = Arc::new(GlobalGate::new(None));
        gate.suspend(Duration::from_secs(1));

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                let start = Instant::now();
                gate.pass(&CancellationToken::new()).await.unwrap();
                start.elapsed()
            })
        };
        tokio::task::yield_now().await;
        gate.suspend(Duration::from_secs(5));

        assert!(waiter.await.unwrap() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shorter_suspension_does_not_shorten() {
        let gate = GlobalGate::new(None);
        gate.suspend(Duration::from_secs(10));
        let long = gate.suspended_until().unwrap();
        gate.suspend(Duration::from_secs(1));
        assert_eq!(gate.suspended_until(), Some(long));
    }

    #[tokio::test]
    async fn test_ceiling_zero_disables() {
        let gate = GlobalGate::new(Some(0));
        assert!(gate.ceiling.is_none());
        gate.pass(&CancellationToken::new()).await.unwrap();
    }
}
