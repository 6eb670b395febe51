//! Permission Engine Adapter
//!
//! Translates level changes into engine commands, runs them on the blocking
//! pool, and hands results back to the control context. Every apply ends in
//! exactly one audit entry: a state change on success or an error on failure.

mod error;
mod executor;
mod groups;
mod simulated;

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tierward_common::{Actor, PermissionLevel};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use error::EngineError;
pub use executor::{CommandExecutor, ProcessExecutor};
pub use groups::{
    CommandSet, GroupMapping, DEFAULT_COMMAND_PREFIX, DEFAULT_LOWOP_GROUP, DEFAULT_OP_GROUP,
    DEFAULT_PLAYER_GROUP,
};
pub use simulated::SimulatedEngine;

use crate::control::ControlHandle;
use crate::notify::{MessageKey, Notifier};

/// Default pause between users in [`PermissionEngine::apply_many`].
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(100);

/// Result of [`PermissionEngine::probe`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineProbe {
    pub reachable: bool,
    pub version: Option<String>,
}

pub struct PermissionEngine {
    executor: Arc<dyn CommandExecutor>,
    commands: CommandSet,
    groups: RwLock<Arc<GroupMapping>>,
    control: ControlHandle,
    notifier: Arc<dyn Notifier>,
    user_locks: DashMap<Uuid, Arc<tokio::sync::Mutex<()>>>,
    batch_delay: Duration,
}

impl std::fmt::Debug for PermissionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionEngine")
            .field("commands", &self.commands)
            .field("groups", &self.groups())
            .field("batch_delay", &self.batch_delay)
            .finish_non_exhaustive()
    }
}

impl PermissionEngine {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        commands: CommandSet,
        groups: GroupMapping,
        control: ControlHandle,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            executor,
            commands,
            groups: RwLock::new(Arc::new(groups)),
            control,
            notifier,
            user_locks: DashMap::new(),
            batch_delay: DEFAULT_BATCH_DELAY,
        }
    }

    #[must_use]
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    /// Current level → group mapping.
    pub fn groups(&self) -> Arc<GroupMapping> {
        Arc::clone(&self.groups.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Swap in a new mapping. In-flight applies keep the one they started with.
    pub fn reload_groups(&self, groups: GroupMapping) {
        info!(
            player = groups.group(PermissionLevel::Player),
            lowop = groups.group(PermissionLevel::Lowop),
            op = groups.group(PermissionLevel::Op),
            "Reloaded group mapping"
        );
        *self.groups.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(groups);
    }

    pub const fn commands(&self) -> &CommandSet {
        &self.commands
    }

    /// Move `user` to `level` in the engine and record the new intent.
    ///
    /// Returns `false` when any engine command fails; the store is then left
    /// unchanged. On success the user is notified once, keyed by `level`.
    #[tracing::instrument(skip_all, fields(user = %user, level = %level, actor = %actor))]
    pub async fn apply_level(&self, user: Uuid, level: PermissionLevel, actor: &Actor) -> bool {
        let applied = self.apply(user, level, actor).await;
        if applied {
            self.notifier.notify(user, MessageKey::for_granted(level));
        }
        applied
    }

    /// Like [`apply_level`](Self::apply_level) but without notifying the user.
    ///
    /// Used by reconciliation, which sends its own restore notification.
    pub async fn repair_level(&self, user: Uuid, level: PermissionLevel, actor: &Actor) -> bool {
        self.apply(user, level, actor).await
    }

    async fn apply(&self, user: Uuid, level: PermissionLevel, actor: &Actor) -> bool {
        let lock = self.user_lock(user);
        let guard = lock.lock().await;

        let groups = self.groups();
        let commands = self.commands.assign(user, groups.group(level));
        let executor = Arc::clone(&self.executor);
        let result = tokio::task::spawn_blocking(move || run_sequence(executor.as_ref(), &commands))
            .await
            .map_err(EngineError::from)
            .and_then(|inner| inner);

        let actor = actor.clone();
        let applied = match result {
            Ok(()) => {
                let recorded = self
                    .control
                    .call(move |core| core.store.set(user, level, &actor, &mut core.audit))
                    .await;
                match recorded {
                    Ok(previous) => {
                        info!(from = %previous, to = %level, "Applied permission level");
                        true
                    }
                    Err(e) => {
                        warn!(error = %e, "Applied in engine but could not record state");
                        false
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to apply permission level");
                let detail = format!("{level}: {e}");
                let recorded = self
                    .control
                    .call(move |core| {
                        core.audit.error(&actor, "apply_level", Some(user), &detail);
                    })
                    .await;
                if let Err(e) = recorded {
                    warn!(error = %e, "Could not record failed apply in audit log");
                }
                false
            }
        };

        drop(guard);
        drop(lock);
        self.user_locks
            .remove_if(&user, |_, lock| Arc::strong_count(lock) == 1);
        applied
    }

    fn user_lock(&self, user: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(&self.user_locks.entry(user).or_default())
    }

    /// Apply `level` to each user in turn, pausing between users.
    ///
    /// Failures do not stop the batch. Returns the number of successes.
    #[tracing::instrument(skip_all, fields(total = users.len(), level = %level))]
    pub async fn apply_many(&self, users: &[Uuid], level: PermissionLevel, actor: &Actor) -> usize {
        let mut succeeded = 0;
        for (index, user) in users.iter().enumerate() {
            if index > 0 && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
            if self.apply_level(*user, level, actor).await {
                succeeded += 1;
            }
        }
        info!(succeeded, "Batch apply finished");
        succeeded
    }

    /// Level the engine currently enforces for `user`.
    ///
    /// OP's group is checked first, so OP wins when both admin groups are
    /// present. Query errors count as "not a member".
    #[tracing::instrument(skip_all, fields(user = %user))]
    pub async fn detect_level(&self, user: Uuid) -> PermissionLevel {
        for level in [PermissionLevel::Op, PermissionLevel::Lowop] {
            if self.verify_level(user, level).await {
                debug!(level = %level, "Detected permission level");
                return level;
            }
        }
        PermissionLevel::Player
    }

    /// Whether the engine confirms `user` is in the group mapped to `level`.
    pub async fn verify_level(&self, user: Uuid, level: PermissionLevel) -> bool {
        let command = self.commands.check_parent(user, self.groups().group(level));
        match self.run_blocking(move |executor| executor.dispatch(&command)).await {
            Ok(member) => member,
            Err(e) => {
                warn!(user = %user, level = %level, error = %e, "Membership query failed");
                false
            }
        }
    }

    /// Reachability and version of the engine.
    pub async fn probe(&self) -> EngineProbe {
        let info = self.commands.info();
        let version = self.commands.version();
        let result = self
            .run_blocking(move |executor| {
                let reachable = executor.dispatch(&info)?;
                let version = if reachable {
                    executor.query(&version)?
                } else {
                    None
                };
                Ok((reachable, version))
            })
            .await;
        match result {
            Ok((reachable, version)) => EngineProbe { reachable, version },
            Err(e) => {
                warn!(error = %e, "Engine probe failed");
                EngineProbe {
                    reachable: false,
                    version: None,
                }
            }
        }
    }

    async fn run_blocking<R, F>(&self, f: F) -> Result<R, EngineError>
    where
        F: FnOnce(&dyn CommandExecutor) -> Result<R, EngineError> + Send + 'static,
        R: Send + 'static,
    {
        let executor = Arc::clone(&self.executor);
        tokio::task::spawn_blocking(move || f(executor.as_ref())).await?
    }
}

/// Run commands in order, stopping at the first failure.
fn run_sequence(executor: &dyn CommandExecutor, commands: &[String]) -> Result<(), EngineError> {
    for command in commands {
        if !executor.dispatch(command)? {
            return Err(EngineError::CommandFailed(command.clone()));
        }
    }
    Ok(())
}
