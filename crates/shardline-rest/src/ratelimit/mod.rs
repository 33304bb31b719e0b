//! Rate-limit bucket scheduling.

mod bucket;
mod global;
mod headers;
mod limiter;
mod route;

pub use bucket::{Admission, RateLimitBucket};
pub use global::GlobalGate;
pub use headers::{RateLimitHeaders, RateLimitScope};
pub use limiter::{RateLimitPermit, RateLimiter};
pub use route::{Method, Route};
