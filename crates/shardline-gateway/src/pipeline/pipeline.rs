//! Event pipeline
//!
//! Turns accepted dispatches into cache mutations and typed events. Cache
//! application happens synchronously on the calling session's task, so each
//! shard's events are applied in frame order; listeners run as tracked tasks.

use futures::FutureExt;
use parking_lot::RwLock;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use shardline_cache::EntityCache;
use shardline_common::ClientConfig;
use shardline_core::{Channel, Guild, Member, ModelError, Role, ShardId, Snowflake, User};

use super::listeners::{EventHandler, ListenerId, ListenerRegistry};
use super::readiness::{Begin, Readiness, Settled};
use crate::events::{DispatchType, DispatchedEvent, Event, EventKind};
use crate::protocol::ReadyPayload;
use crate::session::DispatchSink;

/// Pipeline settings
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// How long a shard waits for the next GUILD_CREATE before settling
    pub guild_ready_timeout: Duration,
    /// Emit `GatewayDispatch` for every dispatch
    pub debug_events: bool,
}

impl PipelineConfig {
    pub fn from_client(config: &ClientConfig) -> Self {
        Self {
            guild_ready_timeout: config.gateway.guild_ready_timeout,
            debug_events: config.gateway.debug_events,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            guild_ready_timeout: Duration::from_secs(2),
            debug_events: false,
        }
    }
}

struct Inner {
    cache: Arc<EntityCache>,
    listeners: ListenerRegistry,
    readiness: Readiness,
    tasks: TaskTracker,
    cancel: CancellationToken,
    debug_events: bool,
    current_user: RwLock<Option<User>>,
}

/// Shared handle to the pipeline
#[derive(Clone)]
pub struct EventPipeline {
    inner: Arc<Inner>,
}

impl EventPipeline {
    pub fn new(cache: Arc<EntityCache>, config: PipelineConfig, cancel: CancellationToken) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache,
                listeners: ListenerRegistry::new(),
                readiness: Readiness::new(config.guild_ready_timeout),
                tasks: TaskTracker::new(),
                cancel,
                debug_events: config.debug_events,
                current_user: RwLock::new(None),
            }),
        }
    }

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.inner.cache
    }

    pub fn readiness(&self) -> &Readiness {
        &self.inner.readiness
    }

    /// The account this client is logged in as, once a READY arrived
    pub fn current_user(&self) -> Option<User> {
        self.inner.current_user.read().clone()
    }

    pub fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) -> ListenerId {
        self.inner.listeners.subscribe(kind, handler)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.listeners.unsubscribe(id)
    }

    /// Apply one dispatch and emit its event.
    ///
    /// Undecodable payloads are logged and skipped; unknown names are ignored.
    pub fn ingest(&self, shard: ShardId, name: &str, data: Value) {
        if self.inner.debug_events {
            self.emit(
                shard,
                Event::GatewayDispatch {
                    name: name.to_string(),
                    data: data.clone(),
                },
            );
        }

        let Some(kind) = DispatchType::from_name(name) else {
            tracing::trace!(shard = %shard, event = name, "Ignoring unhandled dispatch");
            return;
        };
        if let Err(e) = self.apply(shard, kind, data) {
            tracing::warn!(
                shard = %shard,
                event = name,
                error = %e,
                code = e.code(),
                "Skipping undecodable dispatch"
            );
        }
    }

    /// Stop accepting listener tasks and wait for the running ones
    pub async fn close(&self) {
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
    }

    fn apply(&self, shard: ShardId, kind: DispatchType, data: Value) -> Result<(), ModelError> {
        let cache = &self.inner.cache;
        match kind {
            DispatchType::Ready => self.on_ready(shard, data)?,
            DispatchType::Resumed => {}
            DispatchType::GuildCreate => self.on_guild_create(shard, data)?,
            DispatchType::GuildUpdate => {
                let patch = Guild::from_payload(data)?;
                let event = match cache.merge_guild(&patch) {
                    Some(updated) => Event::GuildUpdate {
                        before: Some(updated.before),
                        after: updated.after,
                    },
                    None => Event::GuildUpdate {
                        before: None,
                        after: patch,
                    },
                };
                self.emit(shard, event);
            }
            DispatchType::GuildDelete => {
                let guild_id = snowflake(&data, "id")?;
                let outage = data.get("unavailable").and_then(Value::as_bool) == Some(true);
                let event = if outage {
                    Event::GuildUnavailable {
                        guild_id,
                        before: cache.mark_guild_unavailable(guild_id),
                    }
                } else {
                    Event::GuildLeave {
                        guild_id,
                        before: cache.remove_guild(guild_id),
                    }
                };
                self.emit(shard, event);
            }
            DispatchType::GuildRoleCreate | DispatchType::GuildRoleUpdate => {
                let guild_id = snowflake(&data, "guild_id")?;
                let role = Role::from_payload(take(data, "role")?, guild_id)?;
                let event = if kind == DispatchType::GuildRoleCreate {
                    cache.insert_role(role.clone());
                    Event::RoleCreate(role)
                } else {
                    match cache.merge_role(&role) {
                        Some(updated) => Event::RoleUpdate {
                            before: Some(updated.before),
                            after: updated.after,
                        },
                        None => Event::RoleUpdate {
                            before: None,
                            after: role,
                        },
                    }
                };
                self.emit(shard, event);
            }
            DispatchType::GuildRoleDelete => {
                let guild_id = snowflake(&data, "guild_id")?;
                let role_id = snowflake(&data, "role_id")?;
                let before = cache.remove_role(role_id);
                self.emit(
                    shard,
                    Event::RoleDelete {
                        guild_id,
                        role_id,
                        before,
                    },
                );
            }
            DispatchType::GuildMemberAdd => {
                let (member, user) = Member::from_payload(data, None)?;
                cache.insert_member(member.clone(), user.clone());
                self.emit(shard, Event::MemberAdd { member, user });
            }
            DispatchType::GuildMemberUpdate => {
                let (patch, user) = Member::from_payload(data, None)?;
                let event = match cache.merge_member(&patch, Some(&user)) {
                    Some(updated) => Event::MemberUpdate {
                        before: Some(updated.before),
                        after: updated.after,
                        user: cache.user(user.id).unwrap_or(user),
                    },
                    None => Event::MemberUpdate {
                        before: None,
                        after: patch,
                        user,
                    },
                };
                self.emit(shard, event);
            }
            DispatchType::GuildMemberRemove => {
                let guild_id = snowflake(&data, "guild_id")?;
                let user = User::from_payload(take(data, "user")?)?;
                let before = cache.remove_member(guild_id, user.id);
                self.emit(
                    shard,
                    Event::MemberRemove {
                        guild_id,
                        user,
                        before,
                    },
                );
            }
            DispatchType::ChannelCreate => {
                let channel = Channel::from_payload(data, None)?;
                cache.insert_channel(channel.clone());
                self.emit(shard, Event::ChannelCreate(channel));
            }
            DispatchType::ChannelUpdate => {
                let patch = Channel::from_payload(data, None)?;
                let event = match cache.merge_channel(&patch) {
                    Some(updated) => Event::ChannelUpdate {
                        before: Some(updated.before),
                        after: updated.after,
                    },
                    None => Event::ChannelUpdate {
                        before: None,
                        after: patch,
                    },
                };
                self.emit(shard, event);
            }
            DispatchType::ChannelDelete => {
                let channel = Channel::from_payload(data, None)?;
                let removed = cache.remove_channel(channel.id).unwrap_or(channel);
                self.emit(shard, Event::ChannelDelete(removed));
            }
            DispatchType::MessageCreate => {
                let author = match data.get("author") {
                    Some(author) => Some(User::from_payload(author.clone())?),
                    None => None,
                };
                let event = Event::MessageCreate {
                    message_id: snowflake(&data, "id")?,
                    channel_id: snowflake(&data, "channel_id")?,
                    guild_id: optional_snowflake(&data, "guild_id")?,
                    author,
                    data,
                };
                self.emit(shard, event);
            }
            DispatchType::MessageUpdate => {
                let event = Event::MessageUpdate {
                    message_id: snowflake(&data, "id")?,
                    channel_id: snowflake(&data, "channel_id")?,
                    guild_id: optional_snowflake(&data, "guild_id")?,
                    data,
                };
                self.emit(shard, event);
            }
            DispatchType::MessageDelete => {
                let event = Event::MessageDelete {
                    message_id: snowflake(&data, "id")?,
                    channel_id: snowflake(&data, "channel_id")?,
                    guild_id: optional_snowflake(&data, "guild_id")?,
                };
                self.emit(shard, event);
            }
            DispatchType::UserUpdate => {
                let patch = User::from_payload(data)?;
                let (before, after) = match cache.merge_user(&patch) {
                    Some(updated) => (Some(updated.before), updated.after),
                    None => {
                        cache.upsert_user(patch.clone());
                        (None, patch)
                    }
                };
                {
                    let mut current = self.inner.current_user.write();
                    if current.as_ref().is_some_and(|u| u.id == after.id) {
                        *current = Some(after.clone());
                    }
                }
                self.emit(shard, Event::UserUpdate { before, after });
            }
        }
        Ok(())
    }

    fn on_ready(&self, shard: ShardId, data: Value) -> Result<(), ModelError> {
        let ready: ReadyPayload = serde_json::from_value(data)?;
        let user = User::from_payload(ready.user)?;
        self.inner.cache.upsert_user(user.clone());
        *self.inner.current_user.write() = Some(user);

        for guild in &ready.guilds {
            self.inner.cache.insert_unavailable_guild(guild.id);
        }
        tracing::debug!(shard = %shard, guilds = ready.guilds.len(), "Waiting for initial guilds");

        match self
            .inner
            .readiness
            .begin(shard.id(), ready.guilds.iter().map(|g| g.id))
        {
            Begin::Settled(settled) => self.on_settled(shard, settled),
            Begin::Pending { generation } => self.spawn_settle_timer(shard, generation),
        }
        Ok(())
    }

    fn on_guild_create(&self, shard: ShardId, data: Value) -> Result<(), ModelError> {
        if data.get("unavailable").and_then(Value::as_bool) == Some(true) {
            let guild_id = snowflake(&data, "id")?;
            self.inner.cache.insert_unavailable_guild(guild_id);
            return Ok(());
        }

        let parts = Guild::split_payload(data)?;
        let Some(mut guild) = parts.guild.clone() else {
            return Ok(());
        };
        guild.unavailable = false;
        let previous = self.inner.cache.insert_guild(parts);
        let arrival = self.inner.readiness.guild_arrived(shard.id(), guild.id);

        let recovered = previous.is_some_and(|g| g.unavailable);
        if arrival.was_pending || recovered {
            self.emit(shard, Event::GuildAvailable(guild));
        } else {
            self.emit(shard, Event::GuildJoin(guild));
        }

        if let Some(settled) = arrival.settled {
            self.on_settled(shard, settled);
        }
        Ok(())
    }

    fn on_settled(&self, shard: ShardId, settled: Settled) {
        self.inner.cache.mark_reconciled(shard.id());
        tracing::info!(
            shard = %shard,
            unavailable = settled.unavailable.len(),
            fleet_ready = settled.fleet_ready,
            "Shard guilds settled"
        );

        self.emit(
            shard,
            Event::ShardReady {
                unavailable: settled.unavailable,
            },
        );
        if settled.fleet_ready {
            let shards = self.inner.readiness.expected();
            tracing::info!(shards, "All shards ready");
            self.emit(
                shard,
                Event::Ready {
                    user: self.current_user(),
                    shards,
                },
            );
        }
    }

    fn spawn_settle_timer(&self, shard: ShardId, generation: u64) {
        let pipeline = self.clone();
        self.inner.tasks.spawn(async move {
            let readiness = &pipeline.inner.readiness;
            while let Some(deadline) = readiness.deadline(shard.id(), generation) {
                if deadline <= Instant::now() {
                    if let Some(settled) = readiness.settle(shard.id(), generation) {
                        pipeline.on_settled(shard, settled);
                    }
                    return;
                }
                tokio::select! {
                    () = pipeline.inner.cancel.cancelled() => return,
                    () = tokio::time::sleep_until(deadline) => {}
                }
            }
        });
    }

    fn emit(&self, shard: ShardId, event: Event) {
        let kind = event.kind();
        let handlers = self.inner.listeners.handlers_for(kind);
        if handlers.is_empty() {
            return;
        }

        let event = Arc::new(DispatchedEvent { shard, event });
        for handler in handlers {
            let event = Arc::clone(&event);
            self.inner.tasks.spawn(async move {
                match AssertUnwindSafe(handler.handle(event)).catch_unwind().await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::warn!(shard = %shard, kind = %kind, error = %e, "Listener failed");
                    }
                    Err(_) => {
                        tracing::error!(shard = %shard, kind = %kind, "Listener panicked");
                    }
                }
            });
        }
    }
}

impl DispatchSink for EventPipeline {
    fn session_started(&self, shard: ShardId) {
        let purged = self.inner.cache.purge_shard(shard);
        self.inner.cache.mark_needs_refresh(shard.id());
        self.inner.readiness.reset(shard.id());
        tracing::debug!(shard = %shard, purged = purged.len(), "Fresh session, cache purged");
    }

    fn dispatch(&self, shard: ShardId, name: &str, data: Value) {
        self.ingest(shard, name, data);
    }
}

impl std::fmt::Debug for EventPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPipeline")
            .field("listeners", &self.inner.listeners)
            .field("debug_events", &self.inner.debug_events)
            .field("ready", &self.inner.readiness.is_ready())
            .finish()
    }
}

fn snowflake(data: &Value, key: &'static str) -> Result<Snowflake, ModelError> {
    let value = data.get(key).ok_or(ModelError::MissingField(key))?;
    Snowflake::from_json(value).ok_or(ModelError::InvalidSnowflake(key))
}

fn optional_snowflake(data: &Value, key: &'static str) -> Result<Option<Snowflake>, ModelError> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Snowflake::from_json(value)
            .map(Some)
            .ok_or(ModelError::InvalidSnowflake(key)),
    }
}

fn take(mut data: Value, key: &'static str) -> Result<Value, ModelError> {
    data.get_mut(key)
        .map(Value::take)
        .ok_or(ModelError::MissingField(key))
}
