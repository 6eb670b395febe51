//! Audit entry type and its text line format.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tierward_common::Actor;
use uuid::Uuid;

use crate::util::{format_timestamp, parse_timestamp};

/// Kind of action an audit entry describes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    /// Stored level changed (including no-op transitions).
    StateChange,
    /// Operator or engine command executed.
    Command,
    /// A failed operation.
    Error,
    /// Summary of a multi-user operation.
    Batch,
    /// Level detected from the permission engine.
    Detection,
    /// Enforcement mismatch found, repair started.
    Fix,
    /// Enforcement repaired.
    Restore,
    /// Stored intent disagreed with the detected level.
    Drift,
    /// Session lifecycle (join, quit, kick).
    Session,
}

impl AuditCategory {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::StateChange => "state_change",
            Self::Command => "command",
            Self::Error => "error",
            Self::Batch => "batch",
            Self::Detection => "detection",
            Self::Fix => "fix",
            Self::Restore => "restore",
            Self::Drift => "drift",
            Self::Session => "session",
        }
    }

    pub const fn all() -> &'static [Self] {
        &[
            Self::StateChange,
            Self::Command,
            Self::Error,
            Self::Batch,
            Self::Detection,
            Self::Fix,
            Self::Restore,
            Self::Drift,
            Self::Session,
        ]
    }
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditCategory {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or(())
    }
}

/// One immutable audit record.
///
/// The timestamp is kept in its formatted form so that entries loaded from
/// disk with an unreadable timestamp survive untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub timestamp: String,
    pub actor: String,
    pub category: AuditCategory,
    pub subject: Option<Uuid>,
    pub detail: String,
}

impl AuditEntry {
    /// Create an entry stamped with the current time.
    pub fn new(
        actor: &Actor,
        category: AuditCategory,
        subject: Option<Uuid>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: format_timestamp(Utc::now()),
            actor: actor.to_string(),
            category,
            subject,
            detail: detail.into(),
        }
    }

    /// Override the timestamp.
    #[must_use]
    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp = format_timestamp(at);
        self
    }

    /// Parsed timestamp, `None` if the stored text is not a valid timestamp.
    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }

    /// Render as `[timestamp] actor category subject: detail`.
    pub fn to_line(&self) -> String {
        let subject = self
            .subject
            .map_or_else(|| "-".to_string(), |id| id.to_string());
        format!(
            "[{}] {} {} {}: {}",
            self.timestamp, self.actor, self.category, subject, self.detail
        )
    }

    /// Parse a line produced by [`AuditEntry::to_line`].
    ///
    /// Only the structure is checked; the timestamp text is kept verbatim.
    pub fn parse_line(line: &str) -> Option<Self> {
        let rest = line.trim_end().strip_prefix('[')?;
        let (timestamp, rest) = rest.split_once("] ")?;
        let (head, detail) = rest.split_once(": ").unwrap_or((rest.trim_end_matches(':'), ""));

        let mut tokens = head.split_whitespace();
        let actor = tokens.next()?;
        let category = tokens.next()?.parse().ok()?;
        let subject = match tokens.next()? {
            "-" => None,
            id => Some(Uuid::parse_str(id).ok()?),
        };
        if tokens.next().is_some() {
            return None;
        }

        Some(Self {
            timestamp: timestamp.to_string(),
            actor: actor.to_string(),
            category,
            subject,
            detail: detail.to_string(),
        })
    }
}

impl fmt::Display for AuditEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_line_format() {
        let user = Uuid::parse_str("5b1e9a44-3f2d-4c44-9d7e-2a8f6a1b9c00").unwrap();
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap();
        let entry = AuditEntry::new(
            &Actor::Console,
            AuditCategory::StateChange,
            Some(user),
            "PLAYER -> OP",
        )
        .at(at);

        assert_eq!(
            entry.to_line(),
            "[2026-10-19 08:00:00] CONSOLE state_change 5b1e9a44-3f2d-4c44-9d7e-2a8f6a1b9c00: PLAYER -> OP"
        );
        assert_eq!(AuditEntry::parse_line(&entry.to_line()), Some(entry));
    }

    #[test]
    fn test_parse_keeps_colons_in_detail() {
        let entry =
            AuditEntry::parse_line("[2026-10-19 08:00:00] System error -: apply: add group: failed")
                .unwrap();
        assert_eq!(entry.category, AuditCategory::Error);
        assert_eq!(entry.subject, None);
        assert_eq!(entry.detail, "apply: add group: failed");
    }

    #[test]
    fn test_parse_keeps_unreadable_timestamp() {
        let entry = AuditEntry::parse_line("[sometime] CONSOLE command -: lp info").unwrap();
        assert_eq!(entry.timestamp, "sometime");
        assert_eq!(entry.recorded_at(), None);
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        assert!(AuditEntry::parse_line("no brackets here").is_none());
        assert!(AuditEntry::parse_line("[2026-10-19 08:00:00] CONSOLE bogus -: x").is_none());
        assert!(AuditEntry::parse_line("[2026-10-19 08:00:00] CONSOLE command not-a-uuid: x").is_none());
        assert!(AuditEntry::parse_line("[2026-10-19 08:00:00] CONSOLE").is_none());
    }

    #[test]
    fn test_category_names_round_trip() {
        for category in AuditCategory::all() {
            assert_eq!(category.as_str().parse::<AuditCategory>(), Ok(*category));
        }
    }
}
