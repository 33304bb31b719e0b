//! Rate-limit response headers

use reqwest::header::HeaderMap;
use std::time::Duration;

/// Which limit a 429 came from (`X-RateLimit-Scope`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitScope {
    User,
    Global,
    Shared,
}

/// The rate-limit related headers of one response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitHeaders {
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    pub reset_after: Option<Duration>,
    pub bucket: Option<String>,
    pub global: bool,
    pub scope: Option<RateLimitScope>,
    pub retry_after: Option<Duration>,
    /// A `Via` header is present; its absence on a 429 means an edge ban
    pub via: bool,
}

impl RateLimitHeaders {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let text = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
        };
        let seconds = |name: &str| {
            text(name)
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|s| s.is_finite() && *s >= 0.0)
                .map(Duration::from_secs_f64)
        };

        Self {
            limit: text("x-ratelimit-limit").and_then(|s| s.parse().ok()),
            remaining: text("x-ratelimit-remaining").and_then(|s| s.parse().ok()),
            reset_after: seconds("x-ratelimit-reset-after"),
            bucket: text("x-ratelimit-bucket")
                .filter(|s| !s.is_empty())
                .map(String::from),
            global: text("x-ratelimit-global").is_some_and(|s| s.eq_ignore_ascii_case("true")),
            scope: text("x-ratelimit-scope").and_then(|s| match s {
                "user" => Some(RateLimitScope::User),
                "global" => Some(RateLimitScope::Global),
                "shared" => Some(RateLimitScope::Shared),
                _ => None,
            }),
            retry_after: seconds("retry-after"),
            via: headers.contains_key("via"),
        }
    }

    /// Whether the response carried any bucket information at all.
    /// Routes answering without it are not rate limited.
    pub fn has_bucket_info(&self) -> bool {
        self.limit.is_some()
            || self.remaining.is_some()
            || self.reset_after.is_some()
            || self.bucket.is_some()
    }
}
