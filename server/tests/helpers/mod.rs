//! Reusable test helpers for integration tests.
//!
//! Provides `TestApp`, which builds the full stack (control context, engine
//! adapter over a [`SimulatedEngine`], session workflow, health monitor and
//! axum router) in a temporary data directory.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{self, header, Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tierward_common::PermissionLevel;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use uuid::Uuid;

use tierward_server::api::{create_router, AppState};
use tierward_server::audit::{AuditCategory, AuditEntry, AuditLog, AuditLogOptions};
use tierward_server::config::Config;
use tierward_server::control::{spawn_control, ControlHandle, Core};
use tierward_server::engine::{CommandSet, PermissionEngine, SimulatedEngine};
use tierward_server::health::{HealthMonitor, MemoryReading};
use tierward_server::notify::{MessageKey, Notifier};
use tierward_server::reconcile::SessionWorkflow;
use tierward_server::state::{StateStore, StateStoreOptions};

// ============================================================================
// Recording notifier
// ============================================================================

/// Notifier that keeps every notification for assertions.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Uuid, MessageKey)>>,
}

impl RecordingNotifier {
    /// Keys sent to `user`, in order.
    pub fn for_user(&self, user: Uuid) -> Vec<MessageKey> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| *u == user)
            .map(|(_, key)| *key)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, user: Uuid, key: MessageKey) {
        self.sent.lock().unwrap().push((user, key));
    }
}

// ============================================================================
// TestApp
// ============================================================================

pub struct TestApp {
    pub router: Router,
    pub config: Arc<Config>,
    pub control: ControlHandle,
    pub control_task: JoinHandle<Core>,
    pub engine: Arc<PermissionEngine>,
    pub simulated: Arc<SimulatedEngine>,
    pub notifier: Arc<RecordingNotifier>,
    pub workflow: SessionWorkflow,
    pub health: Arc<HealthMonitor>,
    pub data_dir: TempDir,
}

impl TestApp {
    /// Create a new test app with the default test config.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test app, adjusting the test config first.
    pub async fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let data_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut config = Config::default_for_test(data_dir.path());
        adjust(&mut config);

        let store = StateStore::open(StateStoreOptions {
            path: Some(config.state_path()),
            persist_on_write: config.persist_on_write,
        });
        let audit = AuditLog::open(AuditLogOptions {
            path: Some(config.audit_path()),
            max_entries: config.audit_max_entries,
            enabled: config.audit_log_enabled,
            persist_on_write: config.persist_on_write,
        });
        let (control, control_task) = spawn_control(Core::new(store, audit));

        let simulated = Arc::new(SimulatedEngine::new(config.engine_command_prefix.clone()));
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = Arc::new(
            PermissionEngine::new(
                simulated.clone(),
                CommandSet::new(config.engine_command_prefix.clone()),
                config.group_mapping().expect("Invalid test group mapping"),
                control.clone(),
                notifier.clone(),
            )
            .with_batch_delay(config.batch_delay()),
        );
        let workflow = SessionWorkflow::new(engine.clone(), control.clone(), notifier.clone());
        let health = Arc::new(
            HealthMonitor::new(engine.clone(), control.clone(), config.data_dir.clone())
                .with_memory_threshold(config.memory_threshold_percent)
                .with_memory_probe(|| Some(MemoryReading::new(64 << 20, 1 << 30))),
        );

        let state = AppState::new(
            config.clone(),
            control.clone(),
            engine.clone(),
            workflow.clone(),
            health.clone(),
        );
        let router = create_router(state);

        Self {
            router,
            config: Arc::new(config),
            control,
            control_task,
            engine,
            simulated,
            notifier,
            workflow,
            health,
            data_dir,
        }
    }

    /// Build an HTTP request with the given method and URI.
    pub fn request(method: Method, uri: &str) -> http::request::Builder {
        Request::builder().method(method).uri(uri)
    }

    /// Send a request through the router via `tower::ServiceExt::oneshot`.
    pub async fn oneshot(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot request failed")
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.oneshot(
            Self::request(Method::GET, uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// Send `body` as JSON.
    pub async fn send_json(
        &self,
        method: Method,
        uri: &str,
        body: serde_json::Value,
    ) -> Response<Body> {
        self.oneshot(
            Self::request(method, uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn stored_level(&self, user: Uuid) -> PermissionLevel {
        self.control
            .call(move |core| core.store.get(user))
            .await
            .unwrap()
    }

    /// Store a level directly, bypassing the engine.
    pub async fn store_level(&self, user: Uuid, level: PermissionLevel) {
        self.control
            .call(move |core| {
                core.store.set(
                    user,
                    level,
                    &tierward_common::Actor::Console,
                    &mut core.audit,
                );
            })
            .await
            .unwrap();
    }

    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.control
            .call(|core| core.audit.entries().cloned().collect())
            .await
            .unwrap()
    }

    pub async fn audit_categories(&self) -> Vec<AuditCategory> {
        self.audit_entries()
            .await
            .into_iter()
            .map(|e| e.category)
            .collect()
    }
}

/// Collect a response body and parse it as JSON.
pub async fn body_to_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to collect response body")
        .to_bytes();
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        let preview = String::from_utf8_lossy(&bytes);
        panic!("Failed to parse response as JSON: {e}\nBody: {preview}")
    })
}
