//! REST client: request building, the retry loop and the gateway discovery endpoints.

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use shardline_common::{BackoffConfig, ClientConfig, RestConfig};

use crate::error::{RateLimitError, RestError, TransportError};
use crate::http::{HttpTransport, ReqwestTransport, RestRequest, RestResponse};
use crate::ratelimit::{Method, RateLimitHeaders, RateLimiter, Route};

/// Used when a 429 names no wait at all
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// `GET /gateway`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayInfo {
    pub url: String,
}

/// `GET /gateway/bot`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayBotInfo {
    pub url: String,
    /// Recommended shard count
    pub shards: u32,
    pub session_start_limit: SessionStartLimit,
}

/// Identify budget for the current day
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionStartLimit {
    pub total: u32,
    pub remaining: u32,
    /// Milliseconds until `remaining` resets
    pub reset_after: u64,
    /// Shards that may identify in parallel
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,
}

fn default_max_concurrency() -> u32 {
    1
}

/// Body of a 429 response
#[derive(Debug, Default, Deserialize)]
struct RateLimitedBody {
    #[serde(default)]
    retry_after: Option<f64>,
    #[serde(default)]
    global: bool,
}

/// Rate-limited REST client
#[derive(Clone)]
pub struct RestClient {
    transport: Arc<dyn HttpTransport>,
    limiter: Arc<RateLimiter>,
    config: RestConfig,
    authorization: String,
    retry_backoff: BackoffConfig,
    cancel: CancellationToken,
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.config.base_url)
            .field("max_retries", &self.config.max_retries)
            .finish_non_exhaustive()
    }
}

impl RestClient {
    /// Client over a `reqwest` transport
    pub fn new(config: &ClientConfig, cancel: CancellationToken) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::new(config.rest.timeout)?;
        Ok(Self::with_transport(config, Arc::new(transport), cancel))
    }

    /// Client over any transport
    pub fn with_transport(
        config: &ClientConfig,
        transport: Arc<dyn HttpTransport>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            limiter: Arc::new(RateLimiter::new(config.rest.global_rps, cancel.clone())),
            config: config.rest.clone(),
            authorization: config.auth.authorization(),
            retry_backoff: BackoffConfig {
                initial_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(10),
                ..BackoffConfig::default()
            },
            cancel,
        }
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    fn build_request(&self, route: &Route, body: Option<Value>, reason: Option<&str>) -> RestRequest {
        let mut headers = vec![("User-Agent", self.config.user_agent.clone())];
        if route.requires_auth() {
            headers.push(("Authorization", self.authorization.clone()));
        }
        if let Some(reason) = reason {
            headers.push(("X-Audit-Log-Reason", encode_reason(reason)));
        }
        RestRequest {
            method: route.method(),
            url: format!("{}{}", self.config.base_url, route.path()),
            headers,
            body,
        }
    }

    /// Send a request through the rate limiter, retrying 429s, 502/503/504
    /// and transport failures up to `max_retries` times.
    ///
    /// Returns the decoded JSON body, or `None` for empty responses.
    pub async fn request(
        &self,
        route: &Route,
        body: Option<Value>,
        reason: Option<&str>,
    ) -> Result<Option<Value>, RestError> {
        let request = self.build_request(route, body, reason);
        let max_retries = self.config.max_retries;
        let mut attempt: u32 = 0;

        loop {
            let permit = self.limiter.acquire(route).await?;

            let sent = tokio::select! {
                sent = self.transport.send(request.clone()) => sent,
                () = self.cancel.cancelled() => return Err(RateLimitError::Cancelled.into()),
            };
            let response = match sent {
                Ok(response) => response,
                Err(err) => {
                    // No response: the permit refunds itself
                    drop(permit);
                    if attempt >= max_retries {
                        return Err(err.into());
                    }
                    tracing::warn!(route = %route, attempt, error = %err, "Request failed, retrying");
                    self.backoff(attempt).await?;
                    attempt += 1;
                    continue;
                }
            };

            let headers = RateLimitHeaders::from_headers(&response.headers);
            if response.status == 429 && !headers.has_bucket_info() {
                // Says nothing about the bucket; the retry-after below decides the wait
                drop(permit);
            } else {
                self.limiter.release(permit, &headers);
            }

            match response.status {
                204 => return Ok(None),
                200..=299 => return decode_body(&response),
                429 => {
                    if !headers.via {
                        tracing::error!(route = %route, "429 without Via header, likely an edge ban");
                        return Err(RestError::EdgeBanned);
                    }

                    let parsed: RateLimitedBody =
                        serde_json::from_slice(&response.body).unwrap_or_default();
                    let retry_after = parsed
                        .retry_after
                        .filter(|s| s.is_finite() && *s >= 0.0)
                        .map(Duration::from_secs_f64)
                        .or(headers.retry_after)
                        .unwrap_or(DEFAULT_RETRY_AFTER);
                    let global = parsed.global || headers.global;

                    if global {
                        self.limiter.suspend_global(retry_after);
                    } else {
                        self.limiter.defer(route, retry_after);
                    }

                    if attempt >= max_retries {
                        return Err(RestError::RateLimited {
                            retry_after,
                            global,
                        });
                    }
                    attempt += 1;
                }
                502..=504 => {
                    if attempt >= max_retries {
                        return Err(RestError::from_status(response.status, &response.body));
                    }
                    tracing::warn!(route = %route, status = response.status, attempt, "Gateway error, retrying");
                    self.backoff(attempt).await?;
                    attempt += 1;
                }
                status => return Err(RestError::from_status(status, &response.body)),
            }
        }
    }

    async fn backoff(&self, attempt: u32) -> Result<(), RestError> {
        tokio::select! {
            () = tokio::time::sleep(self.retry_backoff.delay_for(attempt)) => Ok(()),
            () = self.cancel.cancelled() => Err(RateLimitError::Cancelled.into()),
        }
    }

    /// `GET /gateway` (no authorization)
    pub async fn get_gateway(&self) -> Result<GatewayInfo, RestError> {
        let route = Route::new(Method::Get, "/gateway").unauthenticated();
        self.request_json(&route).await
    }

    /// `GET /gateway/bot`: URL, recommended shards and identify budget
    pub async fn get_gateway_bot(&self) -> Result<GatewayBotInfo, RestError> {
        let route = Route::new(Method::Get, "/gateway/bot");
        self.request_json(&route).await
    }

    async fn request_json<T: serde::de::DeserializeOwned>(&self, route: &Route) -> Result<T, RestError> {
        let value = self.request(route, None, None).await?.unwrap_or(Value::Null);
        Ok(serde_json::from_value(value)?)
    }
}

fn decode_body(response: &RestResponse) -> Result<Option<Value>, RestError> {
    if response.body.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(&response.body)?))
}

/// Percent-encode an audit log reason for use as a header value
fn encode_reason(reason: &str) -> String {
    let mut encoded = String::with_capacity(reason.len());
    for byte in reason.bytes() {
        if byte.is_ascii_alphanumeric() || b" -_.~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}
