//! Guild availability tracking
//!
//! After READY a shard streams a GUILD_CREATE for each guild it announced.
//! The shard is settled once every announced guild arrived, or once no
//! GUILD_CREATE came for the configured timeout. The fleet is ready when every
//! expected shard has settled.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use shardline_core::Snowflake;

/// Result of a shard settling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled {
    /// Announced guilds that never arrived, sorted
    pub unavailable: Vec<Snowflake>,
    /// Whether this settle completed the fleet
    pub fleet_ready: bool,
}

/// What [`Readiness::begin`] started
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Begin {
    /// Nothing to wait for
    Settled(Settled),
    /// Waiting for guilds; the generation identifies this wait
    Pending { generation: u64 },
}

/// What a GUILD_CREATE meant for readiness
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Arrival {
    /// The guild was announced in READY and had not arrived yet
    pub was_pending: bool,
    pub settled: Option<Settled>,
}

#[derive(Debug)]
struct Progress {
    generation: u64,
    pending: HashSet<Snowflake>,
    deadline: Instant,
}

#[derive(Debug, Default)]
struct State {
    expected: u32,
    waiting: HashMap<u32, Progress>,
    settled: HashSet<u32>,
    next_generation: u64,
}

impl State {
    fn fleet_ready(&self) -> bool {
        self.expected > 0 && (0..self.expected).all(|id| self.settled.contains(&id))
    }
}

/// Per-shard and fleet-wide readiness
#[derive(Debug)]
pub struct Readiness {
    timeout: Duration,
    state: Mutex<State>,
    ready: watch::Sender<bool>,
}

impl Readiness {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            state: Mutex::new(State::default()),
            ready: watch::Sender::new(false),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Set the fleet size. Shards `0..total` must all settle.
    pub fn expect_shards(&self, total: u32) {
        let mut state = self.state.lock();
        state.expected = total;
        self.ready.send_replace(state.fleet_ready());
    }

    /// A shard received READY announcing `guilds`
    pub fn begin(&self, shard: u32, guilds: impl IntoIterator<Item = Snowflake>) -> Begin {
        let mut state = self.state.lock();
        state.settled.remove(&shard);
        let pending: HashSet<Snowflake> = guilds.into_iter().collect();

        if pending.is_empty() {
            state.waiting.remove(&shard);
            return Begin::Settled(self.finish(&mut state, shard, Vec::new()));
        }

        state.next_generation += 1;
        let generation = state.next_generation;
        state.waiting.insert(
            shard,
            Progress {
                generation,
                pending,
                deadline: Instant::now() + self.timeout,
            },
        );
        self.ready.send_replace(false);
        Begin::Pending { generation }
    }

    /// A GUILD_CREATE arrived on `shard`. Any arrival on an unsettled shard
    /// pushes its deadline back.
    pub fn guild_arrived(&self, shard: u32, guild_id: Snowflake) -> Arrival {
        let mut state = self.state.lock();
        let Some(progress) = state.waiting.get_mut(&shard) else {
            return Arrival::default();
        };
        let was_pending = progress.pending.remove(&guild_id);
        progress.deadline = Instant::now() + self.timeout;

        if !progress.pending.is_empty() {
            return Arrival {
                was_pending,
                settled: None,
            };
        }
        state.waiting.remove(&shard);
        Arrival {
            was_pending,
            settled: Some(self.finish(&mut state, shard, Vec::new())),
        }
    }

    /// Current deadline of a wait, or `None` once it settled or was replaced
    pub fn deadline(&self, shard: u32, generation: u64) -> Option<Instant> {
        let state = self.state.lock();
        state
            .waiting
            .get(&shard)
            .filter(|p| p.generation == generation)
            .map(|p| p.deadline)
    }

    /// Settle a wait whose deadline passed. Returns `None` if it already
    /// settled or was replaced.
    pub fn settle(&self, shard: u32, generation: u64) -> Option<Settled> {
        let mut state = self.state.lock();
        if state.waiting.get(&shard)?.generation != generation {
            return None;
        }
        let progress = state.waiting.remove(&shard)?;
        let mut unavailable: Vec<Snowflake> = progress.pending.into_iter().collect();
        unavailable.sort_unstable();
        Some(self.finish(&mut state, shard, unavailable))
    }

    /// Forget a shard's progress; the fleet is no longer ready
    pub fn reset(&self, shard: u32) {
        let mut state = self.state.lock();
        state.waiting.remove(&shard);
        state.settled.remove(&shard);
        self.ready.send_replace(false);
    }

    pub fn expected(&self) -> u32 {
        self.state.lock().expected
    }

    pub fn is_settled(&self, shard: u32) -> bool {
        self.state.lock().settled.contains(&shard)
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Watch fleet readiness
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }

    fn finish(&self, state: &mut State, shard: u32, unavailable: Vec<Snowflake>) -> Settled {
        state.settled.insert(shard);
        let fleet_ready = state.fleet_ready();
        self.ready.send_replace(fleet_ready);
        Settled {
            unavailable,
            fleet_ready,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u64]) -> Vec<Snowflake> {
        raw.iter().copied().map(Snowflake::new).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_settles_when_all_guilds_arrive() {
        let readiness = Readiness::new(Duration::from_secs(2));
        readiness.expect_shards(1);
        let Begin::Pending { .. } = readiness.begin(0, ids(&[1, 2])) else {
            panic!("expected a pending wait");
        };

        let first = readiness.guild_arrived(0, Snowflake::new(1));
        assert!(first.was_pending);
        assert!(first.settled.is_none());
        assert!(!readiness.is_ready());

        let stranger = readiness.guild_arrived(0, Snowflake::new(9));
        assert!(!stranger.was_pending);

        let last = readiness.guild_arrived(0, Snowflake::new(2));
        assert_eq!(
            last.settled,
            Some(Settled {
                unavailable: Vec::new(),
                fleet_ready: true
            })
        );
        assert!(readiness.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_missing_guilds() {
        let readiness = Readiness::new(Duration::from_secs(2));
        readiness.expect_shards(2);
        let Begin::Pending { generation } = readiness.begin(1, ids(&[5, 3, 4])) else {
            panic!("expected a pending wait");
        };
        let start = Instant::now();
        assert_eq!(readiness.deadline(1, generation), Some(start + Duration::from_secs(2)));

        tokio::time::advance(Duration::from_secs(1)).await;
        readiness.guild_arrived(1, Snowflake::new(4));
        assert_eq!(readiness.deadline(1, generation), Some(start + Duration::from_secs(3)));

        let settled = readiness.settle(1, generation).unwrap();
        assert_eq!(settled.unavailable, ids(&[3, 5]));
        assert!(!settled.fleet_ready);
        assert!(readiness.settle(1, generation).is_none());
        assert_eq!(readiness.deadline(1, generation), None);

        let Begin::Settled(last) = readiness.begin(0, Vec::new()) else {
            panic!("empty READY should settle at once");
        };
        assert!(last.fleet_ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_generation_is_ignored() {
        let readiness = Readiness::new(Duration::from_secs(2));
        readiness.expect_shards(1);
        let Begin::Pending { generation: old } = readiness.begin(0, ids(&[1])) else {
            panic!("expected a pending wait");
        };
        readiness.reset(0);
        let Begin::Pending { generation: new } = readiness.begin(0, ids(&[1])) else {
            panic!("expected a pending wait");
        };
        assert_ne!(old, new);
        assert!(readiness.settle(0, old).is_none());
        assert!(readiness.settle(0, new).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_fleet_readiness() {
        let readiness = Readiness::new(Duration::from_secs(2));
        let mut ready = readiness.subscribe();
        readiness.expect_shards(1);
        readiness.begin(0, Vec::new());
        assert!(*ready.borrow_and_update());
        assert!(readiness.is_settled(0));

        readiness.reset(0);
        assert!(ready.has_changed().unwrap());
        assert!(!*ready.borrow_and_update());
        assert!(!readiness.is_settled(0));
    }
}
