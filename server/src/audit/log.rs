//! Bounded, persisted audit log.

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tierward_common::{Actor, PermissionLevel};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::entry::{AuditCategory, AuditEntry};
use crate::storage::{self, StorageError};

/// Default number of entries kept in memory.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Longest retention window accepted from operators (about a century).
pub const MAX_RETENTION_DAYS: i64 = 36_500;

/// On-disk form: the retained window as formatted lines.
#[derive(Debug, Default, Serialize)]
struct AuditFile {
    entries: Vec<String>,
}

/// Read-side form; non-string elements are skipped individually.
#[derive(Debug, Default, Deserialize)]
struct RawAuditFile {
    #[serde(default)]
    entries: Vec<serde_json::Value>,
}

/// Construction options for [`AuditLog`].
#[derive(Debug, Clone)]
pub struct AuditLogOptions {
    /// Backing file. `None` keeps the log in memory only.
    pub path: Option<PathBuf>,
    /// Retention cap.
    pub max_entries: usize,
    /// When false, `record` and `flush` do nothing.
    pub enabled: bool,
    /// Flush after every recorded entry.
    pub persist_on_write: bool,
}

impl Default for AuditLogOptions {
    fn default() -> Self {
        Self {
            path: None,
            max_entries: DEFAULT_MAX_ENTRIES,
            enabled: true,
            persist_on_write: false,
        }
    }
}

/// Filter for [`AuditLog::search`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditQuery {
    /// Entries recorded by this actor (case-insensitive).
    Actor(String),
    /// Entries about this user.
    Subject(Uuid),
    /// Case-insensitive substring of the formatted line.
    Keyword(String),
}

impl AuditQuery {
    fn matches(&self, entry: &AuditEntry) -> bool {
        match self {
            Self::Actor(actor) => entry.actor.eq_ignore_ascii_case(actor),
            Self::Subject(user) => entry.subject == Some(*user),
            Self::Keyword(keyword) => entry
                .to_line()
                .to_lowercase()
                .contains(&keyword.to_lowercase()),
        }
    }
}

/// Append-only audit trail with a bounded in-memory window.
#[derive(Debug)]
pub struct AuditLog {
    entries: VecDeque<AuditEntry>,
    options: AuditLogOptions,
}

impl AuditLog {
    /// Open the log, loading the most recent `max_entries` persisted lines.
    ///
    /// Lines that cannot be parsed are skipped. An unreadable file leaves the
    /// log empty; it will be overwritten on the next flush.
    pub fn open(options: AuditLogOptions) -> Self {
        let mut log = Self {
            entries: VecDeque::with_capacity(options.max_entries.min(4096)),
            options,
        };

        let Some(path) = log.options.path.clone() else {
            return log;
        };

        match storage::load_json::<RawAuditFile>(&path) {
            Ok(Some(file)) => {
                let skip = file.entries.len().saturating_sub(log.options.max_entries);
                for value in file.entries.into_iter().skip(skip) {
                    match value.as_str().and_then(AuditEntry::parse_line) {
                        Some(entry) => log.entries.push_back(entry),
                        None => warn!(line = %value, "Skipping malformed audit line"),
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "Could not load audit log, starting empty");
            }
        }

        info!(entries = log.entries.len(), "Loaded audit log");
        log
    }

    /// In-memory log with the given cap, used by tests and dry runs.
    pub fn in_memory(max_entries: usize) -> Self {
        Self::open(AuditLogOptions {
            max_entries,
            ..AuditLogOptions::default()
        })
    }

    pub const fn is_enabled(&self) -> bool {
        self.options.enabled
    }

    pub const fn max_entries(&self) -> usize {
        self.options.max_entries
    }

    /// Append an entry, dropping the oldest beyond the cap.
    pub fn record(&mut self, entry: AuditEntry) {
        if !self.options.enabled {
            return;
        }
        debug!(entry = %entry, "Audit");
        self.entries.push_back(entry);
        while self.entries.len() > self.options.max_entries {
            self.entries.pop_front();
        }
        if self.options.persist_on_write {
            self.persist();
        }
    }

    /// Record a stored-level transition.
    pub fn state_change(
        &mut self,
        actor: &Actor,
        user: Uuid,
        from: PermissionLevel,
        to: PermissionLevel,
    ) {
        self.record(AuditEntry::new(
            actor,
            AuditCategory::StateChange,
            Some(user),
            format!("{from} -> {to}"),
        ));
    }

    /// Record an executed command and whether it succeeded.
    pub fn command(&mut self, actor: &Actor, command: &str, success: bool) {
        self.record(AuditEntry::new(
            actor,
            AuditCategory::Command,
            None,
            format!("{command} (success: {success})"),
        ));
    }

    /// Record a failed operation.
    pub fn error(&mut self, actor: &Actor, operation: &str, subject: Option<Uuid>, error: &str) {
        warn!(actor = %actor, operation, error, "Audit error");
        self.record(AuditEntry::new(
            actor,
            AuditCategory::Error,
            subject,
            format!("{operation}: {error}"),
        ));
    }

    /// Record the outcome of a multi-user operation.
    pub fn batch(&mut self, actor: &Actor, operation: &str, total: usize, succeeded: usize) {
        self.record(AuditEntry::new(
            actor,
            AuditCategory::Batch,
            None,
            format!("{operation} - {succeeded}/{total} successful"),
        ));
    }

    /// Record a level read from the permission engine.
    pub fn detection(&mut self, actor: &Actor, user: Uuid, level: PermissionLevel) {
        self.record(AuditEntry::new(
            actor,
            AuditCategory::Detection,
            Some(user),
            format!("detected {level}"),
        ));
    }

    /// Record disagreement between stored and detected level.
    pub fn drift(&mut self, user: Uuid, stored: PermissionLevel, detected: PermissionLevel) {
        self.record(AuditEntry::new(
            &Actor::System,
            AuditCategory::Drift,
            Some(user),
            format!("stored {stored}, detected {detected}"),
        ));
    }

    /// Record that enforcement is being repaired.
    pub fn fix(&mut self, user: Uuid, detail: &str) {
        self.record(AuditEntry::new(
            &Actor::System,
            AuditCategory::Fix,
            Some(user),
            detail,
        ));
    }

    /// Record a completed repair.
    pub fn restore(&mut self, user: Uuid, detail: &str) {
        self.record(AuditEntry::new(
            &Actor::System,
            AuditCategory::Restore,
            Some(user),
            detail,
        ));
    }

    /// Record a session lifecycle event.
    pub fn session(&mut self, user: Uuid, event: &str, level: PermissionLevel, reason: Option<&str>) {
        let detail = match reason {
            Some(reason) => format!("{event} as {level} ({reason})"),
            None => format!("{event} as {level}"),
        };
        self.record(AuditEntry::new(
            &Actor::System,
            AuditCategory::Session,
            Some(user),
            detail,
        ));
    }

    /// The most recent `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<AuditEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Up to `max_results` newest entries matching `query`, oldest first.
    pub fn search(&self, query: &AuditQuery, max_results: usize) -> Vec<AuditEntry> {
        self.search_by(|entry| query.matches(entry), max_results)
    }

    /// Up to `max_results` newest entries matching `predicate`, oldest first.
    pub fn search_by(
        &self,
        predicate: impl Fn(&AuditEntry) -> bool,
        max_results: usize,
    ) -> Vec<AuditEntry> {
        let mut found: Vec<AuditEntry> = self
            .entries
            .iter()
            .rev()
            .filter(|e| predicate(e))
            .take(max_results)
            .cloned()
            .collect();
        found.reverse();
        found
    }

    /// Entry count per actor.
    pub fn actor_stats(&self) -> BTreeMap<String, usize> {
        let mut stats = BTreeMap::new();
        for entry in &self.entries {
            *stats.entry(entry.actor.clone()).or_insert(0) += 1;
        }
        stats
    }

    /// Entry count per category.
    pub fn category_stats(&self) -> BTreeMap<AuditCategory, usize> {
        let mut stats = BTreeMap::new();
        for entry in &self.entries {
            *stats.entry(entry.category).or_insert(0) += 1;
        }
        stats
    }

    /// Drop entries older than `days_to_keep` days. Returns the number removed.
    ///
    /// A window reaching past the representable time range removes nothing.
    pub fn prune(&mut self, days_to_keep: i64) -> usize {
        if days_to_keep <= 0 {
            return 0;
        }
        let cutoff = Duration::try_days(days_to_keep)
            .and_then(|window| Utc::now().checked_sub_signed(window));
        match cutoff {
            Some(cutoff) => self.prune_before(cutoff),
            None => 0,
        }
    }

    /// Drop entries stamped before `cutoff`.
    ///
    /// Entries whose timestamp cannot be parsed are kept.
    pub fn prune_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| match entry.recorded_at() {
            Some(at) => at >= cutoff,
            None => {
                warn!(entry = %entry, "Unreadable audit timestamp, keeping entry");
                true
            }
        });
        let removed = before - self.entries.len();
        if removed > 0 {
            info!(removed, "Pruned old audit entries");
            self.persist();
        }
        removed
    }

    /// Overwrite the backing file with the current window.
    pub fn flush(&self) -> Result<(), StorageError> {
        if !self.options.enabled {
            return Ok(());
        }
        let Some(path) = &self.options.path else {
            return Ok(());
        };
        let file = AuditFile {
            entries: self.entries.iter().map(AuditEntry::to_line).collect(),
        };
        storage::save_json(path, &file)
    }

    /// Flush, logging instead of returning failures.
    pub fn persist(&self) {
        if let Err(e) = self.flush() {
            tracing::error!(error = %e, "Could not save audit log");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over retained entries, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &AuditEntry> {
        self.entries.iter()
    }

    pub fn oldest_timestamp(&self) -> Option<&str> {
        self.entries.front().map(|e| e.timestamp.as_str())
    }

    pub fn newest_timestamp(&self) -> Option<&str> {
        self.entries.back().map(|e| e.timestamp.as_str())
    }
}
