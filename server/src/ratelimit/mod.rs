//! Per-actor rate limiting for level-changing commands.

mod error;
mod limiter;

pub use error::RateLimitError;
pub use limiter::{ActorRateLimiter, DEFAULT_RATE_PER_SECOND};
