//! Level → engine group mapping and the command vocabulary.

use tierward_common::{LevelTable, PermissionLevel};
use uuid::Uuid;

use super::EngineError;

pub const DEFAULT_PLAYER_GROUP: &str = "default";
pub const DEFAULT_LOWOP_GROUP: &str = "otherop";
pub const DEFAULT_OP_GROUP: &str = "op";
pub const DEFAULT_COMMAND_PREFIX: &str = "lp";

/// Validated, total mapping from level to engine group name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMapping {
    groups: LevelTable<String>,
}

impl GroupMapping {
    /// Build a mapping, rejecting empty, whitespace-containing or duplicate
    /// group names.
    pub fn new(groups: LevelTable<String>) -> Result<Self, EngineError> {
        for (level, name) in groups.iter() {
            if name.is_empty() {
                return Err(EngineError::InvalidMapping(format!(
                    "group for {level} is empty"
                )));
            }
            if name.chars().any(char::is_whitespace) {
                return Err(EngineError::InvalidMapping(format!(
                    "group `{name}` for {level} contains whitespace"
                )));
            }
        }
        if groups.player == groups.lowop || groups.player == groups.op || groups.lowop == groups.op
        {
            return Err(EngineError::InvalidMapping(
                "each level needs a distinct group".into(),
            ));
        }
        Ok(Self { groups })
    }

    pub fn group(&self, level: PermissionLevel) -> &str {
        self.groups.get(level)
    }

    /// Level whose group is `group`, if any.
    pub fn level_of(&self, group: &str) -> Option<PermissionLevel> {
        self.groups
            .iter()
            .find(|(_, name)| name.as_str() == group)
            .map(|(level, _)| level)
    }

    pub const fn table(&self) -> &LevelTable<String> {
        &self.groups
    }
}

impl Default for GroupMapping {
    fn default() -> Self {
        Self {
            groups: LevelTable::new(
                DEFAULT_PLAYER_GROUP.to_string(),
                DEFAULT_LOWOP_GROUP.to_string(),
                DEFAULT_OP_GROUP.to_string(),
            ),
        }
    }
}

/// Builds the textual commands understood by the permission engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSet {
    prefix: String,
}

impl CommandSet {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn clear_parents(&self, user: Uuid) -> String {
        format!("{} user {user} parent clear", self.prefix)
    }

    pub fn add_parent(&self, user: Uuid, group: &str) -> String {
        format!("{} user {user} parent add {group}", self.prefix)
    }

    pub fn apply_edits(&self) -> String {
        format!("{} applyedits", self.prefix)
    }

    pub fn check_parent(&self, user: Uuid, group: &str) -> String {
        format!("{} user {user} parent check {group}", self.prefix)
    }

    pub fn info(&self) -> String {
        format!("{} info", self.prefix)
    }

    pub fn version(&self) -> String {
        format!("{} version", self.prefix)
    }

    /// The three commands that move `user` to `group`, in execution order.
    pub fn assign(&self, user: Uuid, group: &str) -> [String; 3] {
        [
            self.clear_parents(user),
            self.add_parent(user, group),
            self.apply_edits(),
        ]
    }
}

impl Default for CommandSet {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_PREFIX)
    }
}
