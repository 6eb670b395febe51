//! End-to-end enforcement scenarios over the simulated engine.

mod helpers;

use helpers::TestApp;
use tierward_common::{Actor, PermissionLevel};
use tierward_server::audit::{AuditCategory, AuditLog, AuditLogOptions};
use tierward_server::notify::MessageKey;
use tierward_server::state::{StateStore, StateStoreOptions};
use uuid::Uuid;

#[tokio::test]
async fn test_apply_then_detect_then_healthy() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();

    assert!(
        app.engine
            .apply_level(user, PermissionLevel::Lowop, &Actor::Console)
            .await
    );
    assert_eq!(app.engine.detect_level(user).await, PermissionLevel::Lowop);

    let snapshot = app.health.run().await;
    assert!(snapshot.components["engine"].healthy);
    assert!(snapshot.healthy, "{}", snapshot.summary());
    assert_eq!(
        app.notifier.for_user(user),
        [MessageKey::LowopEnabled]
    );
}

#[tokio::test]
async fn test_failed_add_group_leaves_store_untouched() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    app.simulated.fail_commands_containing("parent add");

    let applied = app
        .engine
        .apply_level(user, PermissionLevel::Op, &Actor::Console)
        .await;

    assert!(!applied);
    assert_eq!(app.stored_level(user).await, PermissionLevel::Player);
    assert_eq!(app.audit_categories().await, [AuditCategory::Error]);
    assert_eq!(app.notifier.count(), 0);
}

#[tokio::test]
async fn test_batch_with_one_failure() {
    let app = TestApp::new().await;
    let users: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
    app.simulated
        .fail_commands_containing(format!("user {} parent add", users[2]));

    let succeeded = app
        .engine
        .apply_many(&users, PermissionLevel::Op, &Actor::Console)
        .await;

    assert_eq!(succeeded, 4);
    for user in &users {
        let prefix = format!("lp user {user} parent clear");
        assert!(
            app.simulated.history().contains(&prefix),
            "{user} was not attempted"
        );
    }

    let entries = app.audit_entries().await;
    assert_eq!(entries.len(), 5);
    let errors: Vec<_> = entries
        .iter()
        .filter(|e| e.category == AuditCategory::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].subject, Some(users[2]));
    assert_eq!(
        entries
            .iter()
            .filter(|e| e.category == AuditCategory::StateChange)
            .count(),
        4
    );
    assert_eq!(app.stored_level(users[2]).await, PermissionLevel::Player);
}

#[tokio::test]
async fn test_join_with_drift_produces_one_drift_entry() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    app.simulated.set_parents(user, ["op"]);

    let outcome = app.workflow.reconcile(user).await.unwrap();

    assert!(outcome.drift);
    assert_eq!(app.stored_level(user).await, PermissionLevel::Op);
    let drift = app
        .audit_categories()
        .await
        .into_iter()
        .filter(|c| *c == AuditCategory::Drift)
        .count();
    assert_eq!(drift, 1);
    assert_eq!(app.notifier.for_user(user), [MessageKey::AdminWelcome]);
}

#[tokio::test]
async fn test_join_repairs_missing_enforcement() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    // Engine lost both groups, so the user is detected as a plain player
    // without the player group.
    app.store_level(user, PermissionLevel::Lowop).await;

    let outcome = app.workflow.reconcile(user).await.unwrap();

    assert_eq!(outcome.detected, PermissionLevel::Player);
    assert!(outcome.drift);
    assert_eq!(outcome.repaired, Some(true));
    assert_eq!(app.simulated.parents(user), ["default"]);
    assert_eq!(app.stored_level(user).await, PermissionLevel::Player);
}

#[tokio::test]
async fn test_shutdown_persists_state_and_audit() {
    let app = TestApp::with_config(|config| config.persist_on_write = false).await;
    let user = Uuid::new_v4();
    assert!(
        app.engine
            .apply_level(user, PermissionLevel::Op, &Actor::from_name("alice"))
            .await
    );

    app.control.shutdown().await.unwrap();

    let store = StateStore::open(StateStoreOptions {
        path: Some(app.config.state_path()),
        persist_on_write: false,
    });
    assert_eq!(store.get(user), PermissionLevel::Op);

    let audit = AuditLog::open(AuditLogOptions {
        path: Some(app.config.audit_path()),
        ..AuditLogOptions::default()
    });
    assert_eq!(audit.len(), 1);
    assert_eq!(audit.recent(1)[0].actor, "alice");
}

#[tokio::test]
async fn test_disabled_audit_log_records_nothing() {
    let app = TestApp::with_config(|config| config.audit_log_enabled = false).await;
    let user = Uuid::new_v4();

    assert!(
        app.engine
            .apply_level(user, PermissionLevel::Op, &Actor::Console)
            .await
    );

    assert_eq!(app.stored_level(user).await, PermissionLevel::Op);
    assert!(app.audit_entries().await.is_empty());
}
