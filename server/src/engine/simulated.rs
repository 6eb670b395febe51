//! In-process model of a group-based permission engine.
//!
//! Parent edits are staged per command and only become visible after
//! `applyedits`, like the real engine. Used for dry-run deployments
//! (`ENGINE_MODE=simulated`) and throughout the test suite.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use super::groups::DEFAULT_COMMAND_PREFIX;
use super::{CommandExecutor, EngineError};

const SIMULATED_VERSION: &str = "Tierward simulated engine";

#[derive(Debug, Clone)]
enum Edit {
    Clear(Uuid),
    Add(Uuid, String),
}

#[derive(Debug)]
pub struct SimulatedEngine {
    prefix: String,
    parents: DashMap<Uuid, BTreeSet<String>>,
    staged: Mutex<Vec<Edit>>,
    failures: Mutex<Vec<String>>,
    history: Mutex<Vec<String>>,
    offline: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimulatedEngine {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            parents: DashMap::new(),
            staged: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            history: Mutex::new(Vec::new()),
            offline: AtomicBool::new(false),
        }
    }

    /// Make every command containing `pattern` report failure.
    pub fn fail_commands_containing(&self, pattern: impl Into<String>) {
        lock(&self.failures).push(pattern.into());
    }

    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    /// While offline, every command returns [`EngineError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Overwrite a user's committed parents, bypassing staging.
    ///
    /// Models changes made to the engine outside Tierward.
    pub fn set_parents<I, S>(&self, user: Uuid, groups: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parents
            .insert(user, groups.into_iter().map(Into::into).collect());
    }

    /// Committed parents of `user`, sorted.
    pub fn parents(&self, user: Uuid) -> Vec<String> {
        self.parents
            .get(&user)
            .map(|groups| groups.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every command received so far, in order.
    pub fn history(&self) -> Vec<String> {
        lock(&self.history).clone()
    }

    fn should_fail(&self, command: &str) -> bool {
        lock(&self.failures)
            .iter()
            .any(|pattern| command.contains(pattern.as_str()))
    }

    fn commit(&self) {
        let edits = std::mem::take(&mut *lock(&self.staged));
        for edit in edits {
            match edit {
                Edit::Clear(user) => {
                    self.parents.remove(&user);
                }
                Edit::Add(user, group) => {
                    self.parents.entry(user).or_default().insert(group);
                }
            }
        }
    }

    fn execute(&self, command: &str) -> Result<Option<String>, EngineError> {
        lock(&self.history).push(command.to_string());

        if self.offline.load(Ordering::SeqCst) {
            return Err(EngineError::Unavailable("simulated engine offline".into()));
        }
        if self.should_fail(command) {
            debug!(command, "Injected engine failure");
            return Ok(None);
        }

        let tokens: Vec<&str> = command.split_whitespace().collect();
        let Some((prefix, rest)) = tokens.split_first() else {
            return Ok(None);
        };
        if *prefix != self.prefix {
            return Ok(None);
        }

        let reply = match rest {
            ["info"] => Some(format!("{SIMULATED_VERSION} ({} users)", self.parents.len())),
            ["version"] => Some(format!("{SIMULATED_VERSION} {}", env!("CARGO_PKG_VERSION"))),
            ["applyedits"] => {
                self.commit();
                Some("applied".to_string())
            }
            ["user", user, "parent", action, args @ ..] => {
                let Ok(user) = Uuid::parse_str(user) else {
                    return Ok(None);
                };
                match (*action, args) {
                    ("clear", []) => {
                        lock(&self.staged).push(Edit::Clear(user));
                        Some("cleared".to_string())
                    }
                    ("add", [group]) => {
                        lock(&self.staged).push(Edit::Add(user, (*group).to_string()));
                        Some("added".to_string())
                    }
                    ("check", [group]) => self
                        .parents
                        .get(&user)
                        .filter(|groups| groups.contains(*group))
                        .map(|_| format!("{user} inherits {group}")),
                    _ => None,
                }
            }
            _ => None,
        };
        Ok(reply)
    }
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_PREFIX)
    }
}

impl CommandExecutor for SimulatedEngine {
    fn dispatch(&self, command: &str) -> Result<bool, EngineError> {
        self.execute(command).map(|reply| reply.is_some())
    }

    fn query(&self, command: &str) -> Result<Option<String>, EngineError> {
        self.execute(command)
    }
}
