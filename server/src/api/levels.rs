//! Level handlers: read, apply, remove, batch, detect and list.

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tierward_common::{parse_user_id, Actor, PermissionLevel};
use uuid::Uuid;

use super::{actor_or_console, ApiError, ApiResult, AppState};

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SetLevelRequest {
    pub level: String,
    pub actor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub users: Vec<String>,
    pub level: String,
    pub actor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub level: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RemoveParams {
    pub actor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LevelResponse {
    pub user: Uuid,
    pub level: PermissionLevel,
    pub is_admin: bool,
}

impl LevelResponse {
    fn new(user: Uuid, level: PermissionLevel) -> Self {
        Self {
            user,
            level,
            is_admin: level.is_admin(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RemoveResponse {
    pub user: Uuid,
    pub removed: Option<PermissionLevel>,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub level: PermissionLevel,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Serialize)]
pub struct DetectResponse {
    pub user: Uuid,
    pub detected: PermissionLevel,
    pub stored: PermissionLevel,
    pub drift: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub total: usize,
    pub player: usize,
    pub lowop: usize,
    pub op: usize,
    pub audit_entries: usize,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub users: Vec<LevelResponse>,
}

fn parse_level(value: &str) -> ApiResult<PermissionLevel> {
    Ok(value.parse()?)
}

// ============================================================================
// Handlers
// ============================================================================

/// `GET /api/levels/{user}`
pub async fn get_level(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> ApiResult<Json<LevelResponse>> {
    let user = parse_user_id(&user)?;
    let level = state.control.call(move |core| core.store.get(user)).await?;
    Ok(Json(LevelResponse::new(user, level)))
}

/// `PUT /api/levels/{user}`
#[tracing::instrument(skip(state, payload))]
pub async fn set_level(
    State(state): State<AppState>,
    Path(user): Path<String>,
    payload: Result<Json<SetLevelRequest>, JsonRejection>,
) -> ApiResult<Json<LevelResponse>> {
    let user = parse_user_id(&user)?;
    let Json(request) = payload?;
    let level = parse_level(&request.level)?;
    let actor = actor_or_console(request.actor.as_deref());

    state.limit(&actor, &format!("set {user} {level}")).await?;

    if state.engine.apply_level(user, level, &actor).await {
        Ok(Json(LevelResponse::new(user, level)))
    } else {
        Err(ApiError::ApplyFailed(user))
    }
}

/// `DELETE /api/levels/{user}`
///
/// Forgets the stored intent without touching the engine.
pub async fn remove_level(
    State(state): State<AppState>,
    Path(user): Path<String>,
    params: Result<Query<RemoveParams>, QueryRejection>,
) -> ApiResult<Json<RemoveResponse>> {
    let user = parse_user_id(&user)?;
    let Query(params) = params?;
    let actor = actor_or_console(params.actor.as_deref());

    let removed = state
        .control
        .call(move |core| core.store.remove(user, &actor, &mut core.audit))
        .await?;
    Ok(Json(RemoveResponse { user, removed }))
}

/// `POST /api/levels/batch`
#[tracing::instrument(skip(state, payload))]
pub async fn set_batch(
    State(state): State<AppState>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> ApiResult<Json<BatchResponse>> {
    let Json(request) = payload?;
    let level = parse_level(&request.level)?;
    let actor = actor_or_console(request.actor.as_deref());

    let max = state.config.batch_max_users;
    if request.users.is_empty() {
        return Err(ApiError::Validation("Batch needs at least one user".into()));
    }
    if request.users.len() > max {
        return Err(ApiError::Validation(format!(
            "Batch is limited to {max} users, got {}",
            request.users.len()
        )));
    }
    let users = request
        .users
        .iter()
        .map(|u| parse_user_id(u))
        .collect::<Result<Vec<Uuid>, _>>()?;

    state.limit(&actor, &format!("batch {level}")).await?;

    let succeeded = state.engine.apply_many(&users, level, &actor).await;
    let total = users.len();
    state
        .control
        .call(move |core| core.audit.batch(&actor, &format!("set {level}"), total, succeeded))
        .await?;

    Ok(Json(BatchResponse {
        level,
        total,
        succeeded,
        failed: total - succeeded,
    }))
}

/// `GET /api/levels/{user}/detect`
pub async fn detect_level(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> ApiResult<Json<DetectResponse>> {
    let user = parse_user_id(&user)?;
    let detected = state.engine.detect_level(user).await;
    let stored = state
        .control
        .call(move |core| {
            core.audit.detection(&Actor::Console, user, detected);
            core.store.get(user)
        })
        .await?;

    Ok(Json(DetectResponse {
        user,
        detected,
        stored,
        drift: detected != stored,
    }))
}

/// `GET /api/levels?level=OP`
pub async fn list_levels(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> ApiResult<Json<ListResponse>> {
    let Query(params) = params?;
    let filter = params.level.as_deref().map(parse_level).transpose()?;

    let users = state
        .control
        .call(move |core| match filter {
            Some(level) => core
                .store
                .list_by_level(level)
                .into_iter()
                .map(|user| LevelResponse::new(user, level))
                .collect(),
            None => {
                let mut all: Vec<LevelResponse> = core
                    .store
                    .snapshot()
                    .into_iter()
                    .map(|(user, level)| LevelResponse::new(user, level))
                    .collect();
                all.sort_unstable_by_key(|r| r.user);
                all
            }
        })
        .await?;

    Ok(Json(ListResponse { users }))
}

/// `GET /api/status`
pub async fn status(State(state): State<AppState>) -> ApiResult<Json<StatusResponse>> {
    let status = state
        .control
        .call(|core| StatusResponse {
            total: core.store.total(),
            player: core.store.count_by_level(PermissionLevel::Player),
            lowop: core.store.count_by_level(PermissionLevel::Lowop),
            op: core.store.count_by_level(PermissionLevel::Op),
            audit_entries: core.audit.len(),
        })
        .await?;
    Ok(Json(status))
}
