//! Client facade
//!
//! Wires the REST client, the event pipeline and the shard coordinator
//! around one cancellation token.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use shardline_cache::EntityCache;
use shardline_common::ClientConfig;
use shardline_core::User;
use shardline_gateway::{
    Connector, DispatchedEvent, EventHandler, EventKind, EventPipeline, FleetEvent, FleetPlan,
    FnHandler, ListenerId, PipelineConfig, ShardCoordinator, ShardStatus, WsConnector,
};
use shardline_rest::{HttpTransport, ReqwestTransport, RestClient};

use crate::cache_reader::CacheReader;
use crate::error::ClientError;

struct ClientInner {
    config: ClientConfig,
    rest: RestClient,
    pipeline: EventPipeline,
    coordinator: ShardCoordinator,
    cancel: CancellationToken,
}

/// Gateway client. Cheap to clone; clones share one fleet.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Client over a real WebSocket gateway and `reqwest`
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let transport = ReqwestTransport::new(config.rest.timeout)?;
        Ok(Self::with_parts(
            config,
            Arc::new(transport),
            Arc::new(WsConnector),
        ))
    }

    /// Client over the given HTTP transport and gateway connector
    pub fn with_parts(
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let rest = RestClient::with_transport(&config, transport, cancel.clone());
        let pipeline = EventPipeline::new(
            Arc::new(EntityCache::new()),
            PipelineConfig::from_client(&config),
            cancel.clone(),
        );
        let coordinator = ShardCoordinator::new(
            config.clone(),
            rest.clone(),
            connector,
            pipeline.clone(),
            cancel.clone(),
        );

        tracing::debug!(app = %config.app.name, "Client created");
        Self {
            inner: Arc::new(ClientInner {
                config,
                rest,
                pipeline,
                coordinator,
                cancel,
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Size the fleet and connect every shard
    pub async fn start(&self) -> Result<FleetPlan, ClientError> {
        Ok(self.inner.coordinator.start().await?)
    }

    /// Connect a fleet of a known shape, skipping gateway discovery
    pub fn start_with(&self, plan: FleetPlan) -> Result<(), ClientError> {
        Ok(self.inner.coordinator.start_with(plan)?)
    }

    pub fn subscribe(&self, kind: EventKind, handler: Arc<dyn EventHandler>) -> ListenerId {
        self.inner.pipeline.subscribe(kind, handler)
    }

    /// Subscribe an async closure
    pub fn on<F, Fut>(&self, kind: EventKind, f: F) -> ListenerId
    where
        F: Fn(Arc<DispatchedEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.subscribe(kind, Arc::new(FnHandler::new(f)))
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.pipeline.unsubscribe(id)
    }

    pub fn cache(&self) -> CacheReader {
        CacheReader::new(Arc::clone(self.inner.pipeline.cache()))
    }

    pub fn current_user(&self) -> Option<User> {
        self.inner.pipeline.current_user()
    }

    /// Wait until every shard is connected and its guilds settled.
    /// `None` uses the configured startup timeout.
    pub async fn wait_until_ready(&self, timeout: Option<Duration>) -> Result<(), ClientError> {
        Ok(self.inner.coordinator.wait_until_ready(timeout).await?)
    }

    pub fn fleet_events(&self) -> broadcast::Receiver<FleetEvent> {
        self.inner.coordinator.subscribe_fleet()
    }

    pub fn shard_status(&self, shard_id: u32) -> Option<ShardStatus> {
        self.inner.coordinator.shard_status(shard_id)
    }

    pub fn statuses(&self) -> Vec<ShardStatus> {
        self.inner.coordinator.statuses()
    }

    pub fn rest(&self) -> &RestClient {
        &self.inner.rest
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Close every session, abandon pending REST requests and wait for
    /// running listeners
    pub async fn shutdown(&self) {
        self.inner.coordinator.shutdown().await;
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("coordinator", &self.inner.coordinator)
            .field("pipeline", &self.inner.pipeline)
            .finish_non_exhaustive()
    }
}
