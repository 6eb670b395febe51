//! In-memory level map with JSON persistence.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tierward_common::{Actor, PermissionLevel};
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::storage::{self, StorageError};

#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    level: String,
}

/// On-disk form, keyed by user id.
#[derive(Debug, Default, Serialize)]
struct StateFile {
    players: BTreeMap<String, StoredRecord>,
}

/// Loose read-side form; records are validated one at a time.
#[derive(Debug, Default, Deserialize)]
struct RawStateFile {
    #[serde(default)]
    players: BTreeMap<String, serde_json::Value>,
}

fn parse_record(id: &str, record: serde_json::Value) -> Option<(Uuid, PermissionLevel)> {
    let user = Uuid::parse_str(id).ok()?;
    let record: StoredRecord = serde_json::from_value(record).ok()?;
    let level = record.level.parse::<PermissionLevel>().ok()?;
    Some((user, level))
}

/// Construction options for [`StateStore`].
#[derive(Debug, Clone, Default)]
pub struct StateStoreOptions {
    /// Backing file. `None` keeps state in memory only.
    pub path: Option<PathBuf>,
    /// Flush after every single-user write.
    pub persist_on_write: bool,
}

/// Mapping of user → intended [`PermissionLevel`].
///
/// Users without an entry are `Player`. Writes record exactly one audit entry
/// each; persistence failures are logged and the in-memory map stays
/// authoritative until the next successful flush.
#[derive(Debug)]
pub struct StateStore {
    levels: HashMap<Uuid, PermissionLevel>,
    options: StateStoreOptions,
}

impl StateStore {
    /// Open the store, loading every valid record from the backing file.
    pub fn open(options: StateStoreOptions) -> Self {
        let mut store = Self {
            levels: HashMap::new(),
            options,
        };

        let Some(path) = store.options.path.clone() else {
            return store;
        };

        match storage::load_json::<RawStateFile>(&path) {
            Ok(Some(file)) => {
                for (id, record) in file.players {
                    let raw = record.to_string();
                    match parse_record(&id, record) {
                        Some((user, level)) => {
                            store.levels.insert(user, level);
                        }
                        None => {
                            warn!(id = %id, record = %raw, "Skipping invalid player state record");
                        }
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(error = %e, "Could not load player states, starting empty");
            }
        }

        info!(players = store.levels.len(), "Loaded player states");
        store
    }

    /// In-memory store, used by tests and dry runs.
    pub fn in_memory() -> Self {
        Self::open(StateStoreOptions::default())
    }

    /// Stored level, `Player` when unknown.
    pub fn get(&self, user: Uuid) -> PermissionLevel {
        self.levels.get(&user).copied().unwrap_or_default()
    }

    /// Whether the user has an explicit entry.
    pub fn contains(&self, user: Uuid) -> bool {
        self.levels.contains_key(&user)
    }

    /// Overwrite the stored level and return the one it replaced.
    pub fn set(
        &mut self,
        user: Uuid,
        level: PermissionLevel,
        actor: &Actor,
        audit: &mut AuditLog,
    ) -> PermissionLevel {
        let previous = self.put(user, level, actor, audit);
        if self.options.persist_on_write {
            self.persist();
        }
        previous
    }

    /// Apply `set` to every user in order, persisting once at the end.
    pub fn set_many(
        &mut self,
        users: &[Uuid],
        level: PermissionLevel,
        actor: &Actor,
        audit: &mut AuditLog,
    ) -> usize {
        for user in users {
            self.put(*user, level, actor, audit);
        }
        self.persist();
        users.len()
    }

    fn put(
        &mut self,
        user: Uuid,
        level: PermissionLevel,
        actor: &Actor,
        audit: &mut AuditLog,
    ) -> PermissionLevel {
        let previous = self.levels.insert(user, level).unwrap_or_default();
        audit.state_change(actor, user, previous, level);
        previous
    }

    /// Delete the user's entry, returning them to `Player`.
    ///
    /// Absent users are a no-op and are not audited.
    pub fn remove(
        &mut self,
        user: Uuid,
        actor: &Actor,
        audit: &mut AuditLog,
    ) -> Option<PermissionLevel> {
        let removed = self.levels.remove(&user)?;
        audit.state_change(actor, user, removed, PermissionLevel::Player);
        if self.options.persist_on_write {
            self.persist();
        }
        Some(removed)
    }

    pub fn count_by_level(&self, level: PermissionLevel) -> usize {
        self.levels.values().filter(|l| **l == level).count()
    }

    pub fn total(&self) -> usize {
        self.levels.len()
    }

    /// Users stored at exactly `level`, sorted for stable output.
    pub fn list_by_level(&self, level: PermissionLevel) -> Vec<Uuid> {
        let mut users: Vec<Uuid> = self
            .levels
            .iter()
            .filter(|(_, l)| **l == level)
            .map(|(user, _)| *user)
            .collect();
        users.sort_unstable();
        users
    }

    /// Copy of every stored entry.
    pub fn snapshot(&self) -> HashMap<Uuid, PermissionLevel> {
        self.levels.clone()
    }

    /// Legacy boolean admin view.
    pub fn is_admin(&self, user: Uuid) -> bool {
        self.get(user).is_admin()
    }

    pub fn admin_count(&self) -> usize {
        self.count_by_level(PermissionLevel::Op)
    }

    /// Overwrite the backing file with the current map.
    pub fn flush(&self) -> Result<(), StorageError> {
        let Some(path) = &self.options.path else {
            return Ok(());
        };
        let file = StateFile {
            players: self
                .levels
                .iter()
                .map(|(user, level)| {
                    (
                        user.to_string(),
                        StoredRecord {
                            level: level.as_str().to_string(),
                        },
                    )
                })
                .collect(),
        };
        storage::save_json(path, &file)
    }

    /// Flush, logging instead of returning failures.
    pub fn persist(&self) {
        if let Err(e) = self.flush() {
            tracing::error!(error = %e, "Could not save player states");
        }
    }
}
