//! Common Errors

use thiserror::Error;

/// Result alias for shared parsing helpers.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while parsing shared types from untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Level name is not one of PLAYER, LOWOP, OP.
    #[error("Unknown permission level: {0}")]
    UnknownLevel(String),

    /// User identifier is not a UUID.
    #[error("Invalid user id: {0}")]
    InvalidUserId(String),
}
