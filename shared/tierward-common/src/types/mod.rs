//! Shared Types

mod actor;
mod level;

pub use actor::Actor;
pub use level::{LevelTable, PermissionLevel};

/// Parse a user identifier.
///
/// ```
/// use tierward_common::parse_user_id;
///
/// assert!(parse_user_id("not-a-uuid").is_err());
/// ```
pub fn parse_user_id(value: &str) -> crate::Result<uuid::Uuid> {
    uuid::Uuid::parse_str(value.trim()).map_err(|_| crate::Error::InvalidUserId(value.to_string()))
}
