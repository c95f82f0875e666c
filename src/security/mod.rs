pub mod events;
pub mod headers;
pub mod rate_limit;

pub use rate_limit::{RateDecision, RateLimiter, SlidingWindowLimiter};
