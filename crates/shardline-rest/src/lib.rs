//! # shardline-rest
//!
//! Rate-limited REST transport.
//!
//! Every request goes through [`RateLimiter`]: requests are queued FIFO per
//! bucket, buckets are discovered from `X-RateLimit-Bucket` response headers,
//! and a global gate holds back all traffic after a global 429. [`RestClient`]
//! drives the request/retry loop on top of a pluggable [`HttpTransport`].
//!
//! ## Example
//!
//! ```ignore
//! use shardline_rest::{RestClient, Route, Method};
//!
//! let rest = RestClient::new(&config, cancel.clone())?;
//! let roles = rest
//!     .request(&Route::new(Method::Get, "/guilds/{guild_id}/roles").param("guild_id", guild_id), None, None)
//!     .await?;
//! ```

pub mod client;
pub mod error;
pub mod http;
pub mod ratelimit;

pub use client::{GatewayBotInfo, GatewayInfo, RestClient, SessionStartLimit};
pub use error::{ApiError, RateLimitError, RestError, TransportError};
pub use http::{HttpTransport, ReqwestTransport, RestRequest, RestResponse};
pub use ratelimit::{
    Admission, GlobalGate, Method, RateLimitBucket, RateLimitHeaders, RateLimitPermit,
    RateLimitScope, RateLimiter, Route,
};
