//! System handlers: health, reload and version.

use axum::{extract::State, Json};
use serde::Serialize;
use tierward_common::Actor;

use super::{ApiError, ApiResult, AppState};
use crate::config::groups_from_env;
use crate::engine::GroupMapping;
use crate::health::HealthSnapshot;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    #[serde(flatten)]
    pub snapshot: HealthSnapshot,
    pub summary: String,
}

impl From<HealthSnapshot> for HealthReport {
    fn from(snapshot: HealthSnapshot) -> Self {
        let summary = snapshot.summary();
        Self { snapshot, summary }
    }
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub player: String,
    pub lowop: String,
    pub op: String,
}

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
    pub engine_reachable: bool,
    pub engine_version: Option<String>,
}

/// `GET /api/system/health`: last snapshot, running a check if none exists.
pub async fn last_health(State(state): State<AppState>) -> Json<HealthReport> {
    let snapshot = match state.health.last().await {
        Some(snapshot) => snapshot,
        None => state.health.run().await,
    };
    Json(snapshot.into())
}

/// `POST /api/system/health`
pub async fn run_health(State(state): State<AppState>) -> Json<HealthReport> {
    Json(state.health.run().await.into())
}

/// `POST /api/system/reload`
///
/// Re-reads the group variables and swaps the mapping when valid.
pub async fn reload(State(state): State<AppState>) -> ApiResult<Json<ReloadResponse>> {
    let result = GroupMapping::new(groups_from_env());
    let success = result.is_ok();
    state
        .control
        .call(move |core| core.audit.command(&Actor::Console, "reload groups", success))
        .await?;

    let mapping = result.map_err(ApiError::from)?;
    let table = mapping.table().clone();
    state.engine.reload_groups(mapping);
    Ok(Json(ReloadResponse {
        player: table.player,
        lowop: table.lowop,
        op: table.op,
    }))
}

/// `GET /api/system/version`
pub async fn version(State(state): State<AppState>) -> Json<VersionResponse> {
    let probe = state.engine.probe().await;
    Json(VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        engine_reachable: probe.reachable,
        engine_version: probe.version,
    })
}
