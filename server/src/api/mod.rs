//! API Router and Application State
//!
//! Operator commands and hosting-runtime session events over HTTP.

mod audit;
mod error;
mod levels;
mod sessions;
mod system;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tierward_common::Actor;
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ApiResult};

use crate::{
    config::Config, control::ControlHandle, engine::PermissionEngine, health::HealthMonitor,
    ratelimit::ActorRateLimiter, reconcile::SessionWorkflow,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: Arc<Config>,
    /// Handle to the single-writer control context
    pub control: ControlHandle,
    /// Permission engine adapter
    pub engine: Arc<PermissionEngine>,
    /// Join/leave workflow
    pub workflow: SessionWorkflow,
    /// Health monitor
    pub health: Arc<HealthMonitor>,
    /// Per-actor limiter for level-changing commands
    pub rate_limiter: ActorRateLimiter,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        config: Config,
        control: ControlHandle,
        engine: Arc<PermissionEngine>,
        workflow: SessionWorkflow,
        health: Arc<HealthMonitor>,
    ) -> Self {
        let rate_limiter = ActorRateLimiter::new(config.rate_limit);
        Self {
            config: Arc::new(config),
            control,
            engine,
            workflow,
            health,
            rate_limiter,
        }
    }

    /// Take a rate-limit token for `actor`, auditing rejections.
    pub(crate) async fn limit(&self, actor: &Actor, command: &str) -> ApiResult<()> {
        if let Err(e) = self.rate_limiter.check(actor).await {
            let actor = actor.clone();
            let command = format!("{command} (rate limited)");
            self.control
                .call(move |core| core.audit.command(&actor, &command, false))
                .await?;
            return Err(e.into());
        }
        Ok(())
    }
}

/// Build the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/status", get(levels::status))
        .route("/api/levels", get(levels::list_levels))
        .route("/api/levels/batch", post(levels::set_batch))
        .route(
            "/api/levels/{user}",
            get(levels::get_level)
                .put(levels::set_level)
                .delete(levels::remove_level),
        )
        .route("/api/levels/{user}/detect", get(levels::detect_level))
        .route("/api/audit", get(audit::query_audit))
        .route("/api/audit/stats", get(audit::audit_stats))
        .route("/api/audit/prune", post(audit::prune_audit))
        .route(
            "/api/system/health",
            get(system::last_health).post(system::run_health),
        )
        .route("/api/system/reload", post(system::reload))
        .route("/api/system/version", get(system::version))
        .route("/api/sessions/start", post(sessions::session_start))
        .route("/api/sessions/end", post(sessions::session_end))
        .route("/api/sessions/disconnect", post(sessions::session_disconnect))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    /// Whether rate limiting is enabled
    rate_limiting: bool,
}

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        rate_limiting: state.rate_limiter.is_enabled(),
    })
}

/// Actor named in a request body, `CONSOLE` when omitted.
fn actor_or_console(actor: Option<&str>) -> Actor {
    actor.map_or(Actor::Console, Actor::from_name)
}
