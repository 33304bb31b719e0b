//! Shard coordinator

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use shardline_common::ClientConfig;
use shardline_core::ShardId;
use shardline_rest::RestClient;

use super::fleet::{FleetEvent, FleetPlan};
use crate::error::GatewayError;
use crate::pipeline::EventPipeline;
use crate::protocol::CloseCode;
use crate::session::{
    CloseReason, Connector, DispatchSink, GatewaySession, IdentifyQueue, SessionConfig,
    ShardStatus,
};

const FLEET_EVENT_BUFFER: usize = 64;

/// Owns the shard sessions of one client
pub struct ShardCoordinator {
    config: ClientConfig,
    rest: RestClient,
    connector: Arc<dyn Connector>,
    pipeline: EventPipeline,
    cancel: CancellationToken,
    tasks: TaskTracker,
    started: AtomicBool,
    plan: RwLock<Option<FleetPlan>>,
    statuses: RwLock<Vec<watch::Receiver<ShardStatus>>>,
    fleet_events: broadcast::Sender<FleetEvent>,
    /// First shard that closed with a fatal code
    failed: Arc<watch::Sender<Option<(ShardId, CloseCode)>>>,
}

impl ShardCoordinator {
    pub fn new(
        config: ClientConfig,
        rest: RestClient,
        connector: Arc<dyn Connector>,
        pipeline: EventPipeline,
        cancel: CancellationToken,
    ) -> Self {
        let (fleet_events, _) = broadcast::channel(FLEET_EVENT_BUFFER);
        Self {
            config,
            rest,
            connector,
            pipeline,
            cancel,
            tasks: TaskTracker::new(),
            started: AtomicBool::new(false),
            plan: RwLock::new(None),
            statuses: RwLock::new(Vec::new()),
            fleet_events,
            failed: Arc::new(watch::Sender::new(None)),
        }
    }

    /// Size the fleet and start every shard.
    ///
    /// An explicit `shard_count` is used as is with the configured URL;
    /// otherwise the recommendation of `GET /gateway/bot` is fetched.
    pub async fn start(&self) -> Result<FleetPlan, GatewayError> {
        if self.started.load(Ordering::SeqCst) {
            return Err(GatewayError::AlreadyStarted);
        }
        let plan = self.discover().await?;
        self.start_with(plan.clone())?;
        Ok(plan)
    }

    /// Start every shard of `plan`
    pub fn start_with(&self, plan: FleetPlan) -> Result<(), GatewayError> {
        // Rejects an empty fleet before anything is spawned
        ShardId::new(0, plan.shard_count)?;
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(GatewayError::AlreadyStarted);
        }

        tracing::info!(
            shards = plan.shard_count,
            max_concurrency = plan.max_concurrency,
            url = %plan.url,
            "Starting shard fleet"
        );

        let session_config = Arc::new(SessionConfig::from_client(&self.config, plan.url.clone()));
        let identify_queue = Arc::new(IdentifyQueue::new(
            self.config.gateway.identify_spacing,
            plan.max_concurrency,
        ));
        let sink: Arc<dyn DispatchSink> = Arc::new(self.pipeline.clone());
        self.pipeline.readiness().expect_shards(plan.shard_count);

        let mut statuses = Vec::with_capacity(plan.shard_count as usize);
        for shard in plan.shards() {
            let (session, status) = GatewaySession::new(
                shard,
                Arc::clone(&session_config),
                Arc::clone(&self.connector),
                Arc::clone(&identify_queue),
                Arc::clone(&sink),
                self.cancel.clone(),
            );
            statuses.push(status);

            let fleet_events = self.fleet_events.clone();
            let failed = Arc::clone(&self.failed);
            self.tasks.spawn(async move {
                let reason = session.run().await;
                if let CloseReason::Fatal(code) = reason {
                    failed.send_if_modified(|first| {
                        if first.is_some() {
                            return false;
                        }
                        *first = Some((shard, code));
                        true
                    });
                }
                // Nobody listening is fine
                let _ = fleet_events.send(FleetEvent::ShardClosed { shard, reason });
            });
        }

        *self.statuses.write() = statuses;
        *self.plan.write() = Some(plan);
        Ok(())
    }

    async fn discover(&self) -> Result<FleetPlan, GatewayError> {
        if let Some(count) = self.config.gateway.shard_count {
            return Ok(FleetPlan::new(self.config.gateway.url.clone(), count));
        }

        let info = tokio::select! {
            info = self.rest.get_gateway_bot() => info?,
            () = self.cancel.cancelled() => return Err(GatewayError::Shutdown),
        };
        let limit = &info.session_start_limit;
        tracing::info!(
            shards = info.shards,
            remaining = limit.remaining,
            total = limit.total,
            reset_after_ms = limit.reset_after,
            "Fetched gateway recommendation"
        );
        if limit.remaining < info.shards {
            tracing::warn!(
                remaining = limit.remaining,
                shards = info.shards,
                "Session start budget is lower than the shard count"
            );
        }
        Ok(FleetPlan::new(info.url, info.shards.max(1)).with_max_concurrency(limit.max_concurrency))
    }

    /// Wait until every shard is connected and its initial guilds settled.
    ///
    /// Fails as soon as any shard closes with a fatal code. `None` waits for
    /// the configured startup timeout.
    pub async fn wait_until_ready(&self, timeout: Option<Duration>) -> Result<(), GatewayError> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(GatewayError::NotStarted);
        }
        let timeout = timeout.unwrap_or(self.config.gateway.startup_timeout);
        let mut ready = self.pipeline.readiness().subscribe();
        let mut failed = self.failed.subscribe();

        let wait = async {
            loop {
                let closed = *failed.borrow_and_update();
                if let Some((shard, code)) = closed {
                    return Err(GatewayError::ShardClosed { shard, code });
                }
                if *ready.borrow_and_update() {
                    return Ok(());
                }
                tokio::select! {
                    changed = ready.changed() => changed.map_err(|_| GatewayError::Shutdown)?,
                    changed = failed.changed() => changed.map_err(|_| GatewayError::Shutdown)?,
                    () = self.cancel.cancelled() => return Err(GatewayError::Shutdown),
                }
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| GatewayError::ReadyTimeout(timeout))?
    }

    pub fn plan(&self) -> Option<FleetPlan> {
        self.plan.read().clone()
    }

    pub fn shard_status(&self, shard_id: u32) -> Option<ShardStatus> {
        self.statuses
            .read()
            .get(shard_id as usize)
            .map(|rx| rx.borrow().clone())
    }

    /// Current status of every shard, by shard id
    pub fn statuses(&self) -> Vec<ShardStatus> {
        self.statuses
            .read()
            .iter()
            .map(|rx| rx.borrow().clone())
            .collect()
    }

    /// Watch one shard's status
    pub fn watch_shard(&self, shard_id: u32) -> Option<watch::Receiver<ShardStatus>> {
        self.statuses.read().get(shard_id as usize).cloned()
    }

    pub fn subscribe_fleet(&self) -> broadcast::Receiver<FleetEvent> {
        self.fleet_events.subscribe()
    }

    pub fn pipeline(&self) -> &EventPipeline {
        &self.pipeline
    }

    /// Cancel every session and wait for the shard and listener tasks
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down shard fleet");
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        self.pipeline.close().await;
        tracing::info!("Shard fleet stopped");
    }
}

impl std::fmt::Debug for ShardCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardCoordinator")
            .field("plan", &*self.plan.read())
            .field("started", &self.started.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use shardline_cache::EntityCache;
    use shardline_rest::{HttpTransport, RestRequest, RestResponse, TransportError};
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    use crate::pipeline::PipelineConfig;
    use crate::session::{Frame, GatewayConnection, SessionState};

    /// Answers the handshake on its own: READY after IDENTIFY, ACK after
    /// each heartbeat. Shards listed in `reject` get a 4004 close instead.
    struct ScriptedConnection {
        incoming: mpsc::UnboundedReceiver<Frame>,
        replies: mpsc::UnboundedSender<Frame>,
        reject: Vec<u32>,
        identifies: Arc<Mutex<Vec<(u32, Instant)>>>,
    }

    impl ScriptedConnection {
        fn reply(&self, value: Value) {
            let _ = self.replies.send(Frame::Text(value.to_string()));
        }
    }

    #[async_trait]
    impl GatewayConnection for ScriptedConnection {
        async fn send(&mut self, text: String) -> Result<(), GatewayError> {
            let frame: Value = serde_json::from_str(&text)?;
            match frame["op"].as_u64() {
                Some(1) => self.reply(json!({"op": 11})),
                Some(2) => {
                    let shard = frame["d"]["shard"][0].as_u64().unwrap_or_default() as u32;
                    self.identifies.lock().push((shard, Instant::now()));
                    if self.reject.contains(&shard) {
                        let _ = self.replies.send(Frame::Close(Some(4004)));
                    } else {
                        self.reply(json!({
                            "op": 0, "t": "READY", "s": 1,
                            "d": {
                                "session_id": format!("session-{shard}"),
                                "user": {"id": "1", "username": "bot"},
                                "guilds": [],
                            },
                        }));
                    }
                }
                _ => {}
            }
            Ok(())
        }

        async fn next_frame(&mut self) -> Option<Result<Frame, GatewayError>> {
            self.incoming.recv().await.map(Ok)
        }

        async fn close(&mut self, _code: u16) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct ScriptedGateway {
        reject: Vec<u32>,
        identifies: Arc<Mutex<Vec<(u32, Instant)>>>,
        urls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Connector for ScriptedGateway {
        async fn connect(&self, url: &str) -> Result<Box<dyn GatewayConnection>, GatewayError> {
            self.urls.lock().push(url.to_string());
            let (replies, incoming) = mpsc::unbounded_channel();
            let conn = ScriptedConnection {
                incoming,
                replies,
                reject: self.reject.clone(),
                identifies: Arc::clone(&self.identifies),
            };
            conn.reply(json!({"op": 10, "d": {"heartbeat_interval": 41_250}}));
            Ok(Box::new(conn))
        }
    }

    struct GatewayBotTransport {
        paths: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HttpTransport for GatewayBotTransport {
        async fn send(&self, request: RestRequest) -> Result<RestResponse, TransportError> {
            self.paths.lock().push(request.url.clone());
            Ok(RestResponse::new(200).with_json(&json!({
                "url": "wss://discovered.test",
                "shards": 2,
                "session_start_limit": {
                    "total": 1000, "remaining": 998, "reset_after": 1000, "max_concurrency": 1
                },
            })))
        }
    }

    fn coordinator(
        config: ClientConfig,
        gateway: Arc<ScriptedGateway>,
        transport: Arc<GatewayBotTransport>,
    ) -> ShardCoordinator {
        let cancel = CancellationToken::new();
        let pipeline = EventPipeline::new(
            Arc::new(EntityCache::new()),
            PipelineConfig::from_client(&config),
            cancel.clone(),
        );
        let rest = RestClient::with_transport(&config, transport, cancel.clone());
        ShardCoordinator::new(config, rest, gateway, pipeline, cancel)
    }

    fn transport() -> Arc<GatewayBotTransport> {
        Arc::new(GatewayBotTransport {
            paths: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_fleet_becomes_ready_with_spaced_identifies() {
        let gateway = Arc::new(ScriptedGateway::default());
        let coordinator = coordinator(ClientConfig::new("token"), Arc::clone(&gateway), transport());

        coordinator
            .start_with(FleetPlan::new("wss://gateway.test", 3))
            .unwrap();
        coordinator
            .wait_until_ready(Some(Duration::from_secs(60)))
            .await
            .unwrap();

        let identifies = gateway.identifies.lock().clone();
        assert_eq!(identifies.len(), 3);
        for pair in identifies.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= Duration::from_secs(5));
        }
        assert!(coordinator
            .statuses()
            .iter()
            .all(|s| s.state == SessionState::Connected));
        assert_eq!(coordinator.shard_status(2).unwrap().shard.id(), 2);
        assert!(coordinator.shard_status(3).is_none());

        coordinator.shutdown().await;
        assert!(coordinator
            .statuses()
            .iter()
            .all(|s| s.state == SessionState::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_close_fails_readiness() {
        let gateway = Arc::new(ScriptedGateway {
            reject: vec![1],
            ..ScriptedGateway::default()
        });
        let coordinator = coordinator(ClientConfig::new("token"), gateway, transport());
        let mut fleet = coordinator.subscribe_fleet();

        coordinator
            .start_with(FleetPlan::new("wss://gateway.test", 2))
            .unwrap();
        let err = coordinator
            .wait_until_ready(Some(Duration::from_secs(60)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::ShardClosed { shard, code: CloseCode::AuthenticationFailed } if shard.id() == 1
        ));

        let event = fleet.recv().await.unwrap();
        assert_eq!(
            event,
            FleetEvent::ShardClosed {
                shard: ShardId::new(1, 2).unwrap(),
                reason: CloseReason::Fatal(CloseCode::AuthenticationFailed),
            }
        );
        coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_discovers_fleet_size() {
        let gateway = Arc::new(ScriptedGateway::default());
        let transport = transport();
        let coordinator = coordinator(
            ClientConfig::new("token"),
            Arc::clone(&gateway),
            Arc::clone(&transport),
        );

        let plan = coordinator.start().await.unwrap();
        assert_eq!(plan, FleetPlan::new("wss://discovered.test", 2));
        assert!(transport.paths.lock()[0].ends_with("/gateway/bot"));
        assert!(matches!(
            coordinator.start().await,
            Err(GatewayError::AlreadyStarted)
        ));

        coordinator.wait_until_ready(None).await.unwrap();
        assert!(gateway.urls.lock()[0].starts_with("wss://discovered.test?v=10"));
        coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_shard_count_skips_discovery() {
        let mut config = ClientConfig::new("token");
        config.gateway.shard_count = Some(1);
        let transport = transport();
        let coordinator = coordinator(config, Arc::new(ScriptedGateway::default()), Arc::clone(&transport));

        assert!(matches!(
            coordinator.wait_until_ready(None).await,
            Err(GatewayError::NotStarted)
        ));
        let plan = coordinator.start().await.unwrap();
        assert_eq!(plan.shard_count, 1);
        assert!(transport.paths.lock().is_empty());
        coordinator.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_fleet_is_rejected() {
        let coordinator = coordinator(
            ClientConfig::new("token"),
            Arc::new(ScriptedGateway::default()),
            transport(),
        );
        assert!(matches!(
            coordinator.start_with(FleetPlan::new("wss://gateway.test", 0)),
            Err(GatewayError::Model(_))
        ));
        assert!(coordinator.plan().is_none());
    }
}
