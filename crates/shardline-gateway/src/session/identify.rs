//! Fleet-wide IDENTIFY pacing.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use shardline_core::ShardId;

use crate::error::GatewayError;

/// Serialises IDENTIFY sends.
///
/// Shards are split into `max_concurrency` partitions by `shard_id %
/// max_concurrency`. Within a partition, two IDENTIFY sends are at least
/// `spacing` apart. The partition stays locked from `acquire` until the
/// permit is dropped, so the whole handshake of one shard happens inside
/// its slot.
#[derive(Debug)]
pub struct IdentifyQueue {
    spacing: Duration,
    partitions: Vec<Arc<Mutex<Option<Instant>>>>,
}

/// Exclusive right to send one IDENTIFY in a partition
#[derive(Debug)]
pub struct IdentifyPermit {
    partition: usize,
    last_sent: OwnedMutexGuard<Option<Instant>>,
}

impl IdentifyPermit {
    pub fn partition(&self) -> usize {
        self.partition
    }

    /// Record that IDENTIFY went out; the next permit of this partition is
    /// delayed by the queue spacing from now
    pub fn sent(mut self) {
        *self.last_sent = Some(Instant::now());
    }
}

impl IdentifyQueue {
    pub fn new(spacing: Duration, max_concurrency: u32) -> Self {
        let partitions = (0..max_concurrency.max(1))
            .map(|_| Arc::new(Mutex::new(None)))
            .collect();
        Self {
            spacing,
            partitions,
        }
    }

    pub fn spacing(&self) -> Duration {
        self.spacing
    }

    pub fn max_concurrency(&self) -> usize {
        self.partitions.len()
    }

    fn partition_of(&self, shard: ShardId) -> usize {
        shard.id() as usize % self.partitions.len()
    }

    /// Wait for the shard's partition and its spacing
    pub async fn acquire(
        &self,
        shard: ShardId,
        cancel: &CancellationToken,
    ) -> Result<IdentifyPermit, GatewayError> {
        let partition = self.partition_of(shard);
        let slot = Arc::clone(&self.partitions[partition]);

        let last_sent = tokio::select! {
            guard = slot.lock_owned() => guard,
            () = cancel.cancelled() => return Err(GatewayError::Shutdown),
        };

        if let Some(last) = *last_sent {
            let ready_at = last + self.spacing;
            if ready_at > Instant::now() {
                tracing::debug!(
                    shard = %shard,
                    partition,
                    wait_ms = ready_at.saturating_duration_since(Instant::now()).as_millis() as u64,
                    "Waiting for identify slot"
                );
                tokio::select! {
                    () = tokio::time::sleep_until(ready_at) => {}
                    () = cancel.cancelled() => return Err(GatewayError::Shutdown),
                }
            }
        }

        Ok(IdentifyPermit {
            partition,
            last_sent,
        })
    }
}
