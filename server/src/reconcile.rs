//! Session workflow: reconcile stored intent with the engine when a user joins.

use std::sync::Arc;

use serde::Serialize;
use tierward_common::protocol::SessionEventKind;
use tierward_common::{Actor, PermissionLevel};
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::control::{ControlError, ControlHandle};
use crate::engine::PermissionEngine;
use crate::notify::{MessageKey, Notifier};

/// What a join-time reconciliation found and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub user: Uuid,
    /// Level the engine reported.
    pub detected: PermissionLevel,
    /// Level stored before reconciliation.
    pub stored: PermissionLevel,
    /// Stored and detected levels disagreed.
    pub drift: bool,
    /// The engine confirmed the detected level's group.
    pub verified: bool,
    /// `Some(success)` when a repair was attempted.
    pub repaired: Option<bool>,
}

#[derive(Clone)]
pub struct SessionWorkflow {
    engine: Arc<PermissionEngine>,
    control: ControlHandle,
    notifier: Arc<dyn Notifier>,
}

impl SessionWorkflow {
    pub fn new(
        engine: Arc<PermissionEngine>,
        control: ControlHandle,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            engine,
            control,
            notifier,
        }
    }

    /// Start reconciliation for a joining user without waiting for it.
    ///
    /// Failures are logged here, so dropping the handle loses nothing.
    pub fn on_session_start(&self, user: Uuid) -> JoinHandle<Result<ReconcileOutcome, ControlError>> {
        let workflow = self.clone();
        tokio::spawn(async move {
            let result = workflow.reconcile(user).await;
            if let Err(e) = &result {
                warn!(user = %user, error = %e, "Join reconciliation failed");
            }
            result
        })
    }

    /// Detect, compare, verify and repair a joining user's level.
    ///
    /// The engine's current level wins: drift overwrites the stored level
    /// with what was detected, then enforcement is re-applied if the
    /// engine cannot confirm it.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self, user: Uuid) -> Result<ReconcileOutcome, ControlError> {
        let detected = self.engine.detect_level(user).await;
        let stored = self.control.call(move |core| core.store.get(user)).await?;

        let drift = stored != detected;
        if drift {
            info!(stored = %stored, detected = %detected, "Stored level drifted from engine");
            self.control
                .call(move |core| {
                    core.store
                        .set(user, detected, &Actor::System, &mut core.audit);
                    core.audit.drift(user, stored, detected);
                })
                .await?;
        }

        let verified = self.engine.verify_level(user, detected).await;
        let repaired = if verified {
            if let Some(key) = MessageKey::for_welcome(detected) {
                self.notifier.notify(user, key);
            }
            None
        } else {
            Some(self.repair(user, detected).await?)
        };

        self.control
            .call(move |core| core.audit.session(user, "join", detected, None))
            .await?;

        Ok(ReconcileOutcome {
            user,
            detected,
            stored,
            drift,
            verified,
            repaired,
        })
    }

    async fn repair(&self, user: Uuid, level: PermissionLevel) -> Result<bool, ControlError> {
        warn!(user = %user, level = %level, "Engine does not confirm level, repairing");
        self.control
            .call(move |core| {
                core.audit
                    .fix(user, &format!("re-applying {level} on join"));
            })
            .await?;

        let restored = self.engine.repair_level(user, level, &Actor::System).await;
        if restored {
            if let Some(key) = MessageKey::for_restored(level) {
                self.notifier.notify(user, key);
            }
            self.control
                .call(move |core| {
                    core.audit
                        .restore(user, &format!("restored {level} on join"));
                })
                .await?;
        } else {
            self.notifier
                .notify(user, MessageKey::PermissionRestoreFailed);
            self.control
                .call(move |core| {
                    core.audit.error(
                        &Actor::System,
                        "reconcile",
                        Some(user),
                        &format!("could not restore {level}"),
                    );
                })
                .await?;
        }
        Ok(restored)
    }

    /// Record a normal session end.
    pub async fn on_session_end(&self, user: Uuid) -> Result<PermissionLevel, ControlError> {
        self.record_session(user, SessionEventKind::End, None).await
    }

    /// Record a server-initiated disconnect.
    pub async fn on_forced_disconnect(
        &self,
        user: Uuid,
        reason: Option<String>,
    ) -> Result<PermissionLevel, ControlError> {
        self.record_session(user, SessionEventKind::Disconnect, reason)
            .await
    }

    async fn record_session(
        &self,
        user: Uuid,
        kind: SessionEventKind,
        reason: Option<String>,
    ) -> Result<PermissionLevel, ControlError> {
        self.control
            .call(move |core| {
                let level = core.store.get(user);
                core.audit
                    .session(user, kind.as_str(), level, reason.as_deref());
                level
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::audit::{AuditCategory, AuditLog};
    use crate::control::{spawn_control, Core};
    use crate::engine::{CommandSet, GroupMapping, SimulatedEngine};
    use crate::state::StateStore;

    #[derive(Default)]
    struct Recorded(Mutex<Vec<MessageKey>>);

    impl Notifier for Recorded {
        fn notify(&self, _user: Uuid, key: MessageKey) {
            self.0.lock().unwrap().push(key);
        }
    }

    struct Fixture {
        workflow: SessionWorkflow,
        simulated: Arc<SimulatedEngine>,
        notes: Arc<Recorded>,
        control: ControlHandle,
    }

    fn fixture() -> Fixture {
        let (control, _task) = spawn_control(Core::new(
            StateStore::in_memory(),
            AuditLog::in_memory(100),
        ));
        let simulated = Arc::new(SimulatedEngine::default());
        let notes = Arc::new(Recorded::default());
        let engine = Arc::new(PermissionEngine::new(
            simulated.clone(),
            CommandSet::default(),
            GroupMapping::default(),
            control.clone(),
            notes.clone(),
        ));
        Fixture {
            workflow: SessionWorkflow::new(engine, control.clone(), notes.clone()),
            simulated,
            notes,
            control,
        }
    }

    async fn categories(control: &ControlHandle) -> Vec<AuditCategory> {
        control
            .call(|core| core.audit.entries().map(|e| e.category).collect())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_matching_admin_gets_welcome() {
        let f = fixture();
        let user = Uuid::new_v4();
        f.simulated.set_parents(user, ["op"]);
        f.control
            .call(move |core| {
                core.store
                    .set(user, PermissionLevel::Op, &Actor::Console, &mut core.audit);
            })
            .await
            .unwrap();

        let outcome = f.workflow.reconcile(user).await.unwrap();

        assert!(!outcome.drift);
        assert!(outcome.verified);
        assert_eq!(outcome.repaired, None);
        assert_eq!(*f.notes.0.lock().unwrap(), [MessageKey::AdminWelcome]);
        assert_eq!(
            categories(&f.control).await,
            [AuditCategory::StateChange, AuditCategory::Session]
        );
    }

    #[tokio::test]
    async fn test_drift_adopts_detected_level() {
        let f = fixture();
        let user = Uuid::new_v4();
        f.simulated.set_parents(user, ["op"]);

        let outcome = f.workflow.reconcile(user).await.unwrap();

        assert_eq!(outcome.stored, PermissionLevel::Player);
        assert_eq!(outcome.detected, PermissionLevel::Op);
        assert!(outcome.drift);
        let (level, drift_entries, system_changes) = f
            .control
            .call(move |core| {
                (
                    core.store.get(user),
                    core.audit
                        .entries()
                        .filter(|e| e.category == AuditCategory::Drift)
                        .count(),
                    core.audit
                        .entries()
                        .filter(|e| e.category == AuditCategory::StateChange && e.actor == "System")
                        .count(),
                )
            })
            .await
            .unwrap();
        assert_eq!(level, PermissionLevel::Op);
        assert_eq!(drift_entries, 1);
        assert_eq!(system_changes, 1);
    }

    #[tokio::test]
    async fn test_plain_player_gets_nothing() {
        let f = fixture();
        let user = Uuid::new_v4();
        f.simulated.set_parents(user, ["default"]);

        let outcome = f.workflow.reconcile(user).await.unwrap();

        assert!(!outcome.drift);
        assert!(outcome.verified);
        assert!(f.notes.0.lock().unwrap().is_empty());
        assert_eq!(categories(&f.control).await, [AuditCategory::Session]);
    }

    #[tokio::test]
    async fn test_unverified_player_is_repaired() {
        let f = fixture();
        let user = Uuid::new_v4();

        let outcome = f.workflow.reconcile(user).await.unwrap();

        assert!(!outcome.verified);
        assert_eq!(outcome.repaired, Some(true));
        assert_eq!(f.simulated.parents(user), ["default"]);
        assert!(f.notes.0.lock().unwrap().is_empty());
        assert_eq!(
            categories(&f.control).await,
            [
                AuditCategory::Fix,
                AuditCategory::StateChange,
                AuditCategory::Restore,
                AuditCategory::Session,
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_repair_notifies_and_records_error() {
        let f = fixture();
        let user = Uuid::new_v4();
        f.simulated.fail_commands_containing("parent add");

        let outcome = f.workflow.reconcile(user).await.unwrap();

        assert_eq!(outcome.repaired, Some(false));
        assert_eq!(
            *f.notes.0.lock().unwrap(),
            [MessageKey::PermissionRestoreFailed]
        );
        assert_eq!(
            categories(&f.control).await,
            [
                AuditCategory::Fix,
                AuditCategory::Error,
                AuditCategory::Error,
                AuditCategory::Session,
            ]
        );
    }

    #[tokio::test]
    async fn test_session_end_is_observational() {
        let f = fixture();
        let user = Uuid::new_v4();

        let level = f.workflow.on_session_end(user).await.unwrap();
        assert_eq!(level, PermissionLevel::Player);

        let level = f
            .workflow
            .on_forced_disconnect(user, Some("idle".into()))
            .await
            .unwrap();
        assert_eq!(level, PermissionLevel::Player);

        let lines = f
            .control
            .call(|core| core.audit.entries().map(|e| e.to_line()).collect::<Vec<_>>())
            .await
            .unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("idle"));
        assert!(f.simulated.history().is_empty());
    }

    #[tokio::test]
    async fn test_session_start_runs_in_background() {
        let f = fixture();
        let user = Uuid::new_v4();
        f.simulated.set_parents(user, ["otherop"]);

        let outcome = f.workflow.on_session_start(user).await.unwrap().unwrap();

        assert_eq!(outcome.detected, PermissionLevel::Lowop);
        assert_eq!(*f.notes.0.lock().unwrap(), [MessageKey::LowopWelcome]);
    }

    #[tokio::test]
    async fn test_session_start_reports_stopped_control_context() {
        let f = fixture();
        let user = Uuid::new_v4();
        f.simulated.set_parents(user, ["op"]);
        f.control.shutdown().await.unwrap();

        let result = f.workflow.on_session_start(user).await.unwrap();

        assert!(result.is_err());
        assert!(f.notes.0.lock().unwrap().is_empty());
    }
}
