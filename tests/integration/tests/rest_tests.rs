//! REST rate limiting over a scripted transport, on paused time

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use integration_tests::{global_rate_limited, ok_with_bucket, ScriptedTransport};
use shardline_common::ClientConfig;
use shardline_rest::{Method, RestClient, Route};

fn rest(transport: &Arc<ScriptedTransport>) -> RestClient {
    let mut config = ClientConfig::new("test-token");
    config.rest.base_url = "https://api.test".to_string();
    config.rest.global_rps = None;
    RestClient::with_transport(&config, transport.clone(), CancellationToken::new())
}

fn channel_messages(channel_id: u64) -> Route {
    Route::new(Method::Get, "/channels/{channel_id}/messages").param("channel_id", channel_id)
}

/// Send times of requests whose URL contains `needle`
fn sent_to(transport: &ScriptedTransport, needle: &str) -> Vec<Instant> {
    transport
        .requests()
        .into_iter()
        .filter(|(_, url)| url.contains(needle))
        .map(|(at, _)| at)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_bucket_holds_requests_until_reset() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push(ok_with_bucket("msgs", 0, Duration::from_secs(3)));
    let client = rest(&transport);
    let start = Instant::now();

    client
        .request(&channel_messages(1), None, None)
        .await
        .unwrap();

    let held = tokio::spawn({
        let client = client.clone();
        async move { client.request(&channel_messages(1), None, None).await }
    });
    // Another channel is another bucket
    client
        .request(&channel_messages(2), None, None)
        .await
        .unwrap();
    held.await.unwrap().unwrap();

    let first = sent_to(&transport, "/channels/1/");
    assert_eq!(first.len(), 2);
    assert_eq!(first[0], start);
    assert!(first[1] >= start + Duration::from_secs(3));

    let other = sent_to(&transport, "/channels/2/");
    assert_eq!(other, vec![start]);
}

#[tokio::test(start_paused = true)]
async fn test_global_limit_holds_every_route() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push(global_rate_limited(Duration::from_secs(2)));
    let client = rest(&transport);
    let start = Instant::now();

    let limited = tokio::spawn({
        let client = client.clone();
        async move { client.request(&channel_messages(1), None, None).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    client
        .request(&channel_messages(2), None, None)
        .await
        .unwrap();
    limited.await.unwrap().unwrap();

    let requests = transport.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].0, start);
    assert!(requests[0].1.contains("/channels/1/"));
    for (at, url) in &requests[1..] {
        assert!(*at >= start + Duration::from_secs(2), "{url} sent early");
    }
}

#[tokio::test(start_paused = true)]
async fn test_gateway_discovery_uses_configured_base_url() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push(
        shardline_rest::RestResponse::new(200)
            .with_json(&serde_json::json!({"url": "wss://gateway.test"})),
    );
    let client = rest(&transport);

    let info = client.get_gateway().await.unwrap();
    assert_eq!(info.url, "wss://gateway.test");
    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].1, "https://api.test/gateway");
}
