//! Session-lifecycle events sent by the hosting runtime.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle stage reported for a user session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventKind {
    /// User joined the server.
    Start,
    /// User left normally.
    End,
    /// User was removed by the server (kick).
    Disconnect,
}

impl SessionEventKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
            Self::Disconnect => "disconnect",
        }
    }
}

/// A session-lifecycle event for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub user: Uuid,
    #[serde(default)]
    pub reason: Option<String>,
}
