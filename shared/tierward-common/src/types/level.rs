//! Permission Levels

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Administrative tier of a user.
///
/// Ordered by privilege: `Player < Lowop < Op`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum PermissionLevel {
    /// Regular user without administrative rights.
    #[default]
    Player,
    /// Limited operator.
    Lowop,
    /// Full operator.
    Op,
}

impl PermissionLevel {
    /// All levels from lowest to highest privilege.
    pub const ALL: [Self; 3] = [Self::Player, Self::Lowop, Self::Op];

    /// Canonical upper-case name, as persisted.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Player => "PLAYER",
            Self::Lowop => "LOWOP",
            Self::Op => "OP",
        }
    }

    /// Legacy boolean admin view of the level.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self, Self::Op)
    }

    /// Level corresponding to the legacy boolean admin flag.
    #[must_use]
    pub const fn from_admin_flag(is_admin: bool) -> Self {
        if is_admin {
            Self::Op
        } else {
            Self::Player
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PLAYER" => Ok(Self::Player),
            "LOWOP" => Ok(Self::Lowop),
            "OP" => Ok(Self::Op),
            _ => Err(Error::UnknownLevel(s.to_string())),
        }
    }
}

/// Total mapping from every [`PermissionLevel`] to a value.
///
/// Replaces per-call `match` dispatch: a table is built once (and validated
/// by its owner) and then looked up by level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelTable<T> {
    pub player: T,
    pub lowop: T,
    pub op: T,
}

impl<T> LevelTable<T> {
    pub const fn new(player: T, lowop: T, op: T) -> Self {
        Self { player, lowop, op }
    }

    /// Value mapped to `level`.
    pub const fn get(&self, level: PermissionLevel) -> &T {
        match level {
            PermissionLevel::Player => &self.player,
            PermissionLevel::Lowop => &self.lowop,
            PermissionLevel::Op => &self.op,
        }
    }

    /// Iterate `(level, value)` pairs from lowest to highest privilege.
    pub fn iter(&self) -> impl Iterator<Item = (PermissionLevel, &T)> {
        PermissionLevel::ALL.into_iter().map(move |l| (l, self.get(l)))
    }

    /// Apply `f` to every entry.
    pub fn map<U>(&self, mut f: impl FnMut(PermissionLevel, &T) -> U) -> LevelTable<U> {
        LevelTable {
            player: f(PermissionLevel::Player, &self.player),
            lowop: f(PermissionLevel::Lowop, &self.lowop),
            op: f(PermissionLevel::Op, &self.op),
        }
    }
}
