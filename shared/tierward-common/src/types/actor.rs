//! Audit Actors

use std::fmt;

use serde::{Deserialize, Serialize};

/// Party that initiated an action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Actor {
    /// Server console / operator API without a named operator.
    Console,
    /// Tierward itself (reconciliation, timers).
    System,
    /// A named operator or user.
    Named(String),
}

impl Actor {
    /// Build an actor from a free-form name.
    ///
    /// Whitespace and the audit line delimiters (`:`, `[`, `]`) are replaced
    /// with `_` so the name stays a single token in formatted audit lines.
    ///
    /// ```
    /// use tierward_common::Actor;
    ///
    /// assert_eq!(Actor::from_name("console"), Actor::Console);
    /// assert_eq!(Actor::from_name("Steve the Admin").to_string(), "Steve_the_Admin");
    /// assert_eq!(Actor::from_name("ops:").to_string(), "ops_");
    /// ```
    pub fn from_name(name: &str) -> Self {
        let name = name.trim();
        if name.is_empty() || name.eq_ignore_ascii_case("console") {
            Self::Console
        } else if name.eq_ignore_ascii_case("system") {
            Self::System
        } else {
            Self::Named(
                name.chars()
                    .map(|c| {
                        if c.is_whitespace() || matches!(c, ':' | '[' | ']') {
                            '_'
                        } else {
                            c
                        }
                    })
                    .collect(),
            )
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Console => f.write_str("CONSOLE"),
            Self::System => f.write_str("System"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

impl From<String> for Actor {
    fn from(value: String) -> Self {
        Self::from_name(&value)
    }
}

impl From<Actor> for String {
    fn from(value: Actor) -> Self {
        value.to_string()
    }
}
