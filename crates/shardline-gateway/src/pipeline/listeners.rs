//! Listener registry
//!
//! Maps event kinds to handlers using `DashMap` so listeners can be added and
//! removed while events are flowing.

use async_trait::async_trait;
use dashmap::DashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::events::{DispatchedEvent, EventKind};

/// An application callback.
///
/// Each invocation runs in its own task; an error or panic is logged and
/// does not affect other listeners or the session.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, event: Arc<DispatchedEvent>) -> anyhow::Result<()>;
}

/// Adapter turning an async closure into an [`EventHandler`]
pub struct FnHandler<F>(F);

impl<F, Fut> FnHandler<F>
where
    F: Fn(Arc<DispatchedEvent>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Arc<DispatchedEvent>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, event: Arc<DispatchedEvent>) -> anyhow::Result<()> {
        (self.0)(event).await
    }
}

/// Handle returned by a subscription, used to remove it again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

type Entry = (ListenerId, Arc<dyn EventHandler>);

/// Registered listeners by event kind
#[derive(Default)]
pub struct ListenerRegistry {
    by_kind: DashMap<EventKind, Vec<Entry>>,
    kinds: DashMap<ListenerId, EventKind>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.by_kind.entry(kind).or_default().push((id, handler));
        self.kinds.insert(id, kind);
        tracing::debug!(listener = %id, kind = %kind, "Listener subscribed");
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let Some((_, kind)) = self.kinds.remove(&id) else {
            return false;
        };
        self.by_kind.alter(&kind, |_, mut entries| {
            entries.retain(|(entry_id, _)| *entry_id != id);
            entries
        });
        self.by_kind.retain(|_, entries| !entries.is_empty());
        tracing::debug!(listener = %id, kind = %kind, "Listener removed");
        true
    }

    /// Snapshot of the handlers for `kind`, in subscription order
    pub fn handlers_for(&self, kind: EventKind) -> Vec<Arc<dyn EventHandler>> {
        self.by_kind
            .get(&kind)
            .map(|entries| entries.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    }

    pub fn has_listeners(&self, kind: EventKind) -> bool {
        self.by_kind.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.kinds.len())
            .finish()
    }
}
