//! Rate limit errors.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    /// The actor used up its allowance.
    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    Exceeded { retry_after: Duration },
}

impl RateLimitError {
    pub const fn retry_after(&self) -> Duration {
        match self {
            Self::Exceeded { retry_after } => *retry_after,
        }
    }
}
