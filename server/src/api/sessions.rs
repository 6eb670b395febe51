//! Session events from the hosting runtime.

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tierward_common::protocol::{SessionEvent, SessionEventKind};
use tierward_common::PermissionLevel;
use uuid::Uuid;

use super::{ApiResult, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct StartParams {
    /// Wait for reconciliation and return its outcome.
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: Uuid,
    pub event: SessionEventKind,
    pub level: PermissionLevel,
}

#[derive(Debug, Serialize)]
struct Accepted {
    user: Uuid,
    event: SessionEventKind,
}

/// `POST /api/sessions/start`
///
/// Reconciliation runs in the background; `?wait=true` awaits it.
pub async fn session_start(
    State(state): State<AppState>,
    params: Result<Query<StartParams>, QueryRejection>,
    payload: Result<Json<SessionEvent>, JsonRejection>,
) -> ApiResult<Response> {
    let Query(params) = params?;
    let Json(event) = payload?;

    let task = state.workflow.on_session_start(event.user);
    if params.wait {
        let outcome = task.await??;
        return Ok(Json(outcome).into_response());
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(Accepted {
            user: event.user,
            event: SessionEventKind::Start,
        }),
    )
        .into_response())
}

/// `POST /api/sessions/end`
pub async fn session_end(
    State(state): State<AppState>,
    payload: Result<Json<SessionEvent>, JsonRejection>,
) -> ApiResult<Json<SessionResponse>> {
    let Json(event) = payload?;
    let level = state.workflow.on_session_end(event.user).await?;
    Ok(Json(SessionResponse {
        user: event.user,
        event: SessionEventKind::End,
        level,
    }))
}

/// `POST /api/sessions/disconnect`
pub async fn session_disconnect(
    State(state): State<AppState>,
    payload: Result<Json<SessionEvent>, JsonRejection>,
) -> ApiResult<Json<SessionResponse>> {
    let Json(event) = payload?;
    let level = state
        .workflow
        .on_forced_disconnect(event.user, event.reason)
        .await?;
    Ok(Json(SessionResponse {
        user: event.user,
        event: SessionEventKind::Disconnect,
        level,
    }))
}
