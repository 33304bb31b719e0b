//! Route-to-bucket resolution and request admission.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{Admission, GlobalGate, RateLimitBucket, RateLimitHeaders, Route};
use crate::error::RateLimitError;

/// Permission to send one request.
///
/// Hand it back with [`RateLimiter::release`] once the response arrived.
/// Dropping it instead refunds the probe slot of an undiscovered bucket.
#[derive(Debug)]
pub struct RateLimitPermit {
    route_key: String,
    major: String,
    bucket: Arc<RateLimitBucket>,
    released: bool,
}

impl RateLimitPermit {
    /// Route-scoped key this permit was acquired for
    pub fn route_key(&self) -> &str {
        &self.route_key
    }

    #[cfg(test)]
    fn bucket_addr(&self) -> usize {
        Arc::as_ptr(&self.bucket) as usize
    }
}

impl Drop for RateLimitPermit {
    fn drop(&mut self) {
        if !self.released {
            self.bucket.refund();
        }
    }
}

/// REST rate limiter shared by every request of a client
#[derive(Debug)]
pub struct RateLimiter {
    /// Route key -> discovered bucket key (`hash:major`)
    routes: DashMap<String, String>,
    /// Bucket key (route key until discovered) -> bucket
    buckets: DashMap<String, Arc<RateLimitBucket>>,
    global: GlobalGate,
    cancel: CancellationToken,
}

impl RateLimiter {
    pub fn new(global_per_second: Option<u32>, cancel: CancellationToken) -> Self {
        Self {
            routes: DashMap::new(),
            buckets: DashMap::new(),
            global: GlobalGate::new(global_per_second),
            cancel,
        }
    }

    /// Key of the bucket currently serving `route`
    pub fn bucket_key(&self, route: &Route) -> String {
        let route_key = route.bucket_key();
        self.routes
            .get(&route_key)
            .map_or(route_key, |key| key.clone())
    }

    fn bucket(&self, route: &Route) -> Arc<RateLimitBucket> {
        let key = self.bucket_key(route);
        Arc::clone(
            self.buckets
                .entry(key)
                .or_insert_with(|| Arc::new(RateLimitBucket::new()))
                .value(),
        )
    }

    /// Wait for the route's bucket (in FIFO order) and then the global gate
    pub async fn acquire(&self, route: &Route) -> Result<RateLimitPermit, RateLimitError> {
        let bucket = loop {
            let bucket = self.bucket(route);
            match bucket.admit(&self.cancel).await? {
                Admission::Granted => break bucket,
                Admission::Retired => {
                    tracing::trace!(route = %route, "Bucket merged while waiting, resolving again");
                }
            }
        };

        let permit = RateLimitPermit {
            route_key: route.bucket_key(),
            major: route.major(),
            bucket,
            released: false,
        };
        // Dropping the permit on cancellation refunds the slot
        self.global.pass(&self.cancel).await?;

        tracing::trace!(route = %route, "Rate limit permit acquired");
        Ok(permit)
    }

    /// Apply a response's headers and return the permit
    pub fn release(&self, mut permit: RateLimitPermit, headers: &RateLimitHeaders) {
        permit.released = true;

        if let Some(hash) = &headers.bucket {
            self.remap(&permit.route_key, &format!("{hash}:{}", permit.major));
        }

        permit.bucket.update(headers);

        // The route may now be served by a different (shared) bucket
        if let Some(current) = self.current_bucket(&permit.route_key) {
            if !Arc::ptr_eq(&current, &permit.bucket) {
                current.update(headers);
            }
        }
    }

    /// Block the route's bucket for `retry_after` (per-route 429)
    pub fn defer(&self, route: &Route, retry_after: Duration) {
        tracing::warn!(
            route = %route,
            bucket = %self.bucket_key(route),
            retry_after_ms = retry_after.as_millis() as u64,
            "Rate limit hit, deferring bucket"
        );
        self.bucket(route).defer(retry_after);
    }

    /// Hold all requests on every route for `retry_after` (global 429)
    pub fn suspend_global(&self, retry_after: Duration) {
        self.global.suspend(retry_after);
    }

    pub fn global(&self) -> &GlobalGate {
        &self.global
    }

    /// Number of distinct buckets
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    fn current_bucket(&self, route_key: &str) -> Option<Arc<RateLimitBucket>> {
        let key = self
            .routes
            .get(route_key)
            .map_or_else(|| route_key.to_string(), |k| k.clone());
        self.buckets.get(&key).map(|b| Arc::clone(b.value()))
    }

    fn remap(&self, route_key: &str, bucket_key: &str) {
        if self
            .routes
            .get(route_key)
            .is_some_and(|current| current.as_str() == bucket_key)
        {
            return;
        }
        self.routes
            .insert(route_key.to_string(), bucket_key.to_string());

        // Move the route-scoped bucket under the discovered key, unless another
        // route already shares a bucket there. Its waiters then move over.
        if let Some((_, route_bucket)) = self.buckets.remove(route_key) {
            let merged = match self.buckets.entry(bucket_key.to_string()) {
                Entry::Occupied(_) => true,
                Entry::Vacant(slot) => {
                    slot.insert(Arc::clone(&route_bucket));
                    false
                }
            };
            if merged {
                route_bucket.retire();
            }
        }
        tracing::debug!(route = route_key, bucket = bucket_key, "Discovered rate limit bucket");
    }
}
