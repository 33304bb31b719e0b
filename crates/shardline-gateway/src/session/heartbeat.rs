//! Heartbeat liveness tracking

use std::time::Duration;
use tokio::time::Instant;

/// Heartbeats sent without an acknowledgement before the connection counts as dead
const MAX_MISSED_ACKS: u32 = 2;

/// Decision for one heartbeat tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Beat {
    Send,
    /// Previous heartbeats went unacknowledged; the connection is a zombie
    Zombie,
}

/// Per-connection heartbeat bookkeeping
#[derive(Debug, Clone)]
pub struct HeartbeatTracker {
    interval: Duration,
    missed: u32,
    last_sent: Option<Instant>,
    last_ack: Option<Instant>,
    latency: Option<Duration>,
}

impl HeartbeatTracker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            missed: 0,
            last_sent: None,
            last_ack: None,
            latency: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Delay before the first heartbeat; `jitter` is clamped to `[0, 1)`
    pub fn first_delay(&self, jitter: f64) -> Duration {
        self.interval.mul_f64(jitter.clamp(0.0, 0.999_999))
    }

    /// Called at every scheduled tick
    pub fn tick(&mut self) -> Beat {
        if self.missed >= MAX_MISSED_ACKS {
            return Beat::Zombie;
        }
        self.missed += 1;
        self.last_sent = Some(Instant::now());
        Beat::Send
    }

    pub fn ack(&mut self) {
        let now = Instant::now();
        self.missed = 0;
        self.last_ack = Some(now);
        self.latency = self.last_sent.map(|sent| now.saturating_duration_since(sent));
    }

    pub fn missed(&self) -> u32 {
        self.missed
    }

    pub fn last_sent(&self) -> Option<Instant> {
        self.last_sent
    }

    pub fn last_ack(&self) -> Option<Instant> {
        self.last_ack
    }

    pub fn latency(&self) -> Option<Duration> {
        self.latency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_unacked_heartbeats_make_a_zombie() {
        let mut tracker = HeartbeatTracker::new(Duration::from_secs(1));
        assert_eq!(tracker.tick(), Beat::Send);
        assert_eq!(tracker.tick(), Beat::Send);
        assert_eq!(tracker.tick(), Beat::Zombie);
    }

    #[test]
    fn test_ack_resets_missed() {
        let mut tracker = HeartbeatTracker::new(Duration::from_secs(1));
        for _ in 0..10 {
            assert_eq!(tracker.tick(), Beat::Send);
            tracker.ack();
        }
        assert_eq!(tracker.missed(), 0);
        assert!(tracker.last_ack().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_measured_from_last_send() {
        let mut tracker = HeartbeatTracker::new(Duration::from_secs(40));
        tracker.tick();
        tokio::time::advance(Duration::from_millis(120)).await;
        tracker.ack();
        assert_eq!(tracker.latency(), Some(Duration::from_millis(120)));
    }

    #[test]
    fn test_first_delay_within_interval() {
        let tracker = HeartbeatTracker::new(Duration::from_millis(41_250));
        assert_eq!(tracker.first_delay(0.0), Duration::ZERO);
        assert!(tracker.first_delay(1.0) < tracker.interval());
        assert_eq!(tracker.first_delay(0.5), Duration::from_millis(20_625));
    }
}
