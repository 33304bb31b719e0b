//! Gateway sessions against an in-process WebSocket server.
//!
//! These run on real time: the sockets need the runtime to drive I/O, so
//! intervals and timeouts are kept short instead.

use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use integration_tests::{
    eventually, guild_create, message_create, ready, test_config, TestGateway,
};
use shardline::{
    Client, ClientError, CloseReason, Event, EventKind, FleetEvent, GatewayError, SessionState,
    ShardId, Snowflake,
};
use shardline_gateway::protocol::CloseCode;

const QUIET: Duration = Duration::from_secs(45);
const WAIT: Duration = Duration::from_secs(5);

fn client(gateway: &TestGateway, shards: u32) -> Client {
    let mut config = test_config(&gateway.url);
    config.gateway.shard_count = Some(shards);
    Client::new(config).unwrap()
}

/// Message ids seen by MESSAGE_CREATE listeners, in delivery order
fn record_messages(client: &Client) -> Arc<Mutex<Vec<u64>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    client.on(EventKind::MessageCreate, move |event| {
        let sink = Arc::clone(&sink);
        async move {
            if let Event::MessageCreate { message_id, .. } = &event.event {
                sink.lock().push(message_id.get());
            }
            Ok(())
        }
    });
    seen
}

#[tokio::test]
async fn test_identifies_are_spaced_across_shards() {
    let mut gateway = TestGateway::start().await.unwrap();
    let client = client(&gateway, 3);
    client.start().await.unwrap();

    let mut peers = Vec::new();
    let mut identified: Vec<(Instant, Value)> = Vec::new();
    for n in 0..3u64 {
        let mut peer = gateway.accept().await.unwrap();
        assert!(peer.uri.ends_with("/gateway?v=10&encoding=json"), "{}", peer.uri);
        peer.hello(QUIET).await.unwrap();
        let identify = peer.expect_op(2).await.unwrap();
        identified.push((Instant::now(), identify["d"]["shard"].clone()));
        assert_eq!(identify["d"]["token"], "test-token");
        peer.dispatch("READY", 1, ready(&format!("session-{n}"), &[]))
            .await
            .unwrap();
        peers.push(peer);
    }

    for pair in identified.windows(2) {
        let gap = pair[1].0 - pair[0].0;
        assert!(gap >= Duration::from_millis(150), "identifies only {gap:?} apart");
    }
    let mut shards: Vec<u64> = identified
        .iter()
        .map(|(_, shard)| shard[0].as_u64().unwrap())
        .collect();
    shards.sort_unstable();
    assert_eq!(shards, vec![0, 1, 2]);
    assert!(identified.iter().all(|(_, shard)| shard[1] == 3));

    client.wait_until_ready(Some(WAIT)).await.unwrap();
    assert!(client.statuses().iter().all(|s| s.is_connected()));

    client.shutdown().await;
    for mut peer in peers {
        assert_eq!(peer.drain().await.unwrap(), vec![1000]);
    }
    assert!(client
        .statuses()
        .iter()
        .all(|s| s.close_reason == Some(CloseReason::Shutdown)));
}

#[tokio::test]
async fn test_zombie_connection_resumes_and_drops_replays() {
    let mut gateway = TestGateway::start().await.unwrap();
    let client = client(&gateway, 1);
    let seen = record_messages(&client);
    client.start().await.unwrap();

    let mut first = gateway.accept().await.unwrap();
    first.hello(Duration::from_millis(100)).await.unwrap();
    first.expect_op(2).await.unwrap();
    first.dispatch("READY", 1, ready("zombie", &[])).await.unwrap();
    first.dispatch("MESSAGE_CREATE", 2, message_create(10, 5, "hi"))
        .await
        .unwrap();

    // Stop acknowledging; the client gives up on the connection
    first.ack_heartbeats = false;
    assert_eq!(first.drain().await.unwrap(), vec![4000]);
    assert!(first.heartbeats >= 2);

    let mut second = gateway.accept().await.unwrap();
    second.hello(QUIET).await.unwrap();
    let resume = second.expect_op(4).await.unwrap();
    assert_eq!(resume["d"]["session_id"], "zombie");
    assert_eq!(resume["d"]["seq"], 2);

    second.dispatch("MESSAGE_CREATE", 2, message_create(10, 5, "hi"))
        .await
        .unwrap();
    second.dispatch("MESSAGE_CREATE", 3, message_create(11, 5, "again"))
        .await
        .unwrap();
    second.dispatch("RESUMED", 4, Value::Null).await.unwrap();

    assert!(
        eventually(WAIT, || {
            client
                .shard_status(0)
                .is_some_and(|s| s.is_connected() && s.sequence == Some(4))
        })
        .await
    );
    let status = client.shard_status(0).unwrap();
    assert!(!status.fresh_identify);
    assert_eq!(status.reconnects, 1);
    assert!(eventually(WAIT, || seen.lock().len() >= 2).await);
    assert_eq!(*seen.lock(), vec![10, 11]);

    client.shutdown().await;
}

#[tokio::test]
async fn test_invalid_session_starts_fresh_and_refreshes_cache() {
    let mut gateway = TestGateway::start().await.unwrap();
    let client = client(&gateway, 1);
    client.start().await.unwrap();
    let guild_id = Snowflake::new(100);

    let mut first = gateway.accept().await.unwrap();
    first.hello(QUIET).await.unwrap();
    first.expect_op(2).await.unwrap();
    first.dispatch("READY", 1, ready("first", &[100])).await.unwrap();
    first.dispatch("GUILD_CREATE", 2, guild_create(100, "lounge"))
        .await
        .unwrap();
    client.wait_until_ready(Some(WAIT)).await.unwrap();

    let cache = client.cache();
    assert_eq!(cache.guild_channels(guild_id).len(), 1);
    assert!(!cache.needs_refresh(ShardId::ONE));

    first.invalid_session(false).await.unwrap();
    assert_eq!(first.drain().await.unwrap(), vec![1000]);

    let mut second = gateway.accept().await.unwrap();
    second.hello(QUIET).await.unwrap();
    let identify = second.expect_op(2).await.unwrap();
    assert_eq!(identify["d"]["shard"][0], 0);
    second.dispatch("READY", 1, ready("second", &[100])).await.unwrap();

    // Until the guild streams in again the cache holds nothing for the shard
    assert!(
        eventually(WAIT, || {
            cache.needs_refresh(ShardId::ONE)
                && client
                    .shard_status(0)
                    .is_some_and(|s| s.is_connected() && s.fresh_identify)
        })
        .await
    );
    assert!(cache.guild_channels(guild_id).is_empty());
    assert_eq!(client.shard_status(0).unwrap().sequence, Some(1));

    second.dispatch("GUILD_CREATE", 2, guild_create(100, "lounge"))
        .await
        .unwrap();
    assert!(
        eventually(WAIT, || {
            !cache.needs_refresh(ShardId::ONE) && cache.guild_channels(guild_id).len() == 1
        })
        .await
    );
    client.wait_until_ready(Some(WAIT)).await.unwrap();
    assert!(cache.is_available(guild_id));

    client.shutdown().await;
}

#[tokio::test]
async fn test_heartbeats_carry_last_sequence() {
    let mut gateway = TestGateway::start().await.unwrap();
    let client = client(&gateway, 1);
    client.start().await.unwrap();

    let mut peer = gateway.accept().await.unwrap();
    peer.hello(Duration::from_millis(100)).await.unwrap();
    peer.expect_op(2).await.unwrap();
    peer.dispatch("READY", 1, ready("seq", &[])).await.unwrap();
    for seq in 2..=5 {
        peer.dispatch("MESSAGE_CREATE", seq, message_create(seq, 5, "x"))
            .await
            .unwrap();
    }
    // Out-of-order replay of an earlier sequence
    peer.dispatch("MESSAGE_CREATE", 3, message_create(3, 5, "x"))
        .await
        .unwrap();

    assert!(
        eventually(WAIT, || {
            client.shard_status(0).and_then(|s| s.sequence) == Some(5)
        })
        .await
    );
    let mut beat = peer.expect_op(1).await.unwrap();
    while beat["d"] != 5 {
        beat = peer.expect_op(1).await.unwrap();
    }
    assert!(
        eventually(WAIT, || {
            client.shard_status(0).is_some_and(|s| s.latency.is_some())
        })
        .await
    );

    client.shutdown().await;
}

#[tokio::test]
async fn test_fatal_close_fails_startup() {
    let mut gateway = TestGateway::start().await.unwrap();
    let client = client(&gateway, 1);
    let mut fleet = client.fleet_events();
    client.start().await.unwrap();

    let mut peer = gateway.accept().await.unwrap();
    peer.hello(QUIET).await.unwrap();
    peer.expect_op(2).await.unwrap();
    peer.close(4004).await.unwrap();

    let err = client.wait_until_ready(Some(WAIT)).await.unwrap_err();
    assert!(
        matches!(
            err,
            ClientError::Gateway(GatewayError::ShardClosed {
                code: CloseCode::AuthenticationFailed,
                ..
            })
        ),
        "{err}"
    );

    let event = tokio::time::timeout(WAIT, fleet.recv()).await.unwrap().unwrap();
    let FleetEvent::ShardClosed { shard, reason } = event;
    assert_eq!(shard, ShardId::ONE);
    assert_eq!(reason, CloseReason::Fatal(CloseCode::AuthenticationFailed));

    let status = client.shard_status(0).unwrap();
    assert_eq!(status.state, SessionState::Closed);
    assert!(gateway.try_accept(Duration::from_millis(300)).await.is_none());

    client.shutdown().await;
}
