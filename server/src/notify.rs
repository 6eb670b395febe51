//! User-facing notifications.
//!
//! Tierward does not talk to users directly; it emits keyed notifications that
//! the hosting runtime renders in the user's locale.

use std::fmt;

use serde::Serialize;
use tierward_common::{LevelTable, PermissionLevel};
use uuid::Uuid;

/// Message key understood by the hosting runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKey {
    AdminEnabled,
    LowopEnabled,
    AdminDisabled,
    AdminWelcome,
    LowopWelcome,
    PermissionRestored,
    PermissionRestoreFailed,
}

/// Sent after a successful apply, keyed by the granted level.
const GRANTED: LevelTable<MessageKey> = LevelTable::new(
    MessageKey::AdminDisabled,
    MessageKey::LowopEnabled,
    MessageKey::AdminEnabled,
);

/// Sent on join when enforcement already matches.
const WELCOME: LevelTable<Option<MessageKey>> =
    LevelTable::new(None, Some(MessageKey::LowopWelcome), Some(MessageKey::AdminWelcome));

/// Sent on join after enforcement was repaired.
const RESTORED: LevelTable<Option<MessageKey>> = LevelTable::new(
    None,
    Some(MessageKey::LowopWelcome),
    Some(MessageKey::PermissionRestored),
);

impl MessageKey {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AdminEnabled => "admin-enabled",
            Self::LowopEnabled => "lowop-enabled",
            Self::AdminDisabled => "admin-disabled",
            Self::AdminWelcome => "admin-welcome",
            Self::LowopWelcome => "lowop-welcome",
            Self::PermissionRestored => "permission-restored",
            Self::PermissionRestoreFailed => "permission-restore-failed",
        }
    }

    pub fn for_granted(level: PermissionLevel) -> Self {
        *GRANTED.get(level)
    }

    pub fn for_welcome(level: PermissionLevel) -> Option<Self> {
        *WELCOME.get(level)
    }

    pub fn for_restored(level: PermissionLevel) -> Option<Self> {
        *RESTORED.get(level)
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivers notifications to users.
pub trait Notifier: Send + Sync {
    fn notify(&self, user: Uuid, key: MessageKey);
}

/// Emits each notification as a structured log event for the hosting
/// runtime's log shipper.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, user: Uuid, key: MessageKey) {
        tracing::info!(target: "tierward::notify", user = %user, key = %key, "User notification");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_granted_keys() {
        assert_eq!(
            MessageKey::for_granted(PermissionLevel::Op),
            MessageKey::AdminEnabled
        );
        assert_eq!(
            MessageKey::for_granted(PermissionLevel::Lowop),
            MessageKey::LowopEnabled
        );
        assert_eq!(
            MessageKey::for_granted(PermissionLevel::Player),
            MessageKey::AdminDisabled
        );
    }

    #[test]
    fn test_players_get_no_welcome() {
        assert_eq!(MessageKey::for_welcome(PermissionLevel::Player), None);
        assert_eq!(MessageKey::for_restored(PermissionLevel::Player), None);
        assert_eq!(
            MessageKey::for_restored(PermissionLevel::Op),
            Some(MessageKey::PermissionRestored)
        );
        assert_eq!(
            MessageKey::for_restored(PermissionLevel::Lowop),
            Some(MessageKey::LowopWelcome)
        );
    }

    #[test]
    fn test_keys_serialize_kebab_case() {
        let json = serde_json::to_string(&MessageKey::PermissionRestoreFailed).unwrap();
        assert_eq!(json, "\"permission-restore-failed\"");
    }
}
