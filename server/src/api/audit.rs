//! Audit log handlers.

use std::collections::BTreeMap;

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tierward_common::parse_user_id;

use super::{actor_or_console, ApiError, ApiResult, AppState};
use crate::audit::{AuditCategory, AuditEntry, AuditQuery, MAX_RETENTION_DAYS};

const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct AuditParams {
    pub limit: Option<usize>,
    /// Entries recorded by this actor.
    pub actor: Option<String>,
    /// Entries about this user.
    pub user: Option<String>,
    /// Keyword anywhere in the entry.
    pub q: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuditResponse {
    pub entries: Vec<AuditEntry>,
}

#[derive(Debug, Serialize)]
pub struct AuditStatsResponse {
    pub total: usize,
    pub max_entries: usize,
    pub enabled: bool,
    pub oldest: Option<String>,
    pub newest: Option<String>,
    pub actors: BTreeMap<String, usize>,
    pub categories: BTreeMap<AuditCategory, usize>,
}

#[derive(Debug, Deserialize)]
pub struct PruneRequest {
    pub days: i64,
    pub actor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PruneResponse {
    pub removed: usize,
}

/// `GET /api/audit?limit&actor&user&q`
///
/// Without a filter returns the most recent entries. Filters are exclusive;
/// `user` wins over `actor`, which wins over `q`.
pub async fn query_audit(
    State(state): State<AppState>,
    params: Result<Query<AuditParams>, QueryRejection>,
) -> ApiResult<Json<AuditResponse>> {
    let Query(params) = params?;
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    if limit == 0 || limit > MAX_LIMIT {
        return Err(ApiError::Validation(format!(
            "limit must be between 1 and {MAX_LIMIT}"
        )));
    }

    let query = if let Some(user) = params.user.as_deref() {
        Some(AuditQuery::Subject(parse_user_id(user)?))
    } else if let Some(actor) = params.actor {
        Some(AuditQuery::Actor(actor))
    } else {
        params.q.map(AuditQuery::Keyword)
    };

    let entries = state
        .control
        .call(move |core| match query {
            Some(query) => core.audit.search(&query, limit),
            None => core.audit.recent(limit),
        })
        .await?;
    Ok(Json(AuditResponse { entries }))
}

/// `GET /api/audit/stats`
pub async fn audit_stats(State(state): State<AppState>) -> ApiResult<Json<AuditStatsResponse>> {
    let stats = state
        .control
        .call(|core| AuditStatsResponse {
            total: core.audit.len(),
            max_entries: core.audit.max_entries(),
            enabled: core.audit.is_enabled(),
            oldest: core.audit.oldest_timestamp().map(str::to_string),
            newest: core.audit.newest_timestamp().map(str::to_string),
            actors: core.audit.actor_stats(),
            categories: core.audit.category_stats(),
        })
        .await?;
    Ok(Json(stats))
}

/// `POST /api/audit/prune`
pub async fn prune_audit(
    State(state): State<AppState>,
    payload: Result<Json<PruneRequest>, JsonRejection>,
) -> ApiResult<Json<PruneResponse>> {
    let Json(request) = payload?;
    if !(0..=MAX_RETENTION_DAYS).contains(&request.days) {
        return Err(ApiError::Validation(format!(
            "days must be between 0 and {MAX_RETENTION_DAYS}"
        )));
    }
    let actor = actor_or_console(request.actor.as_deref());
    let days = request.days;

    let removed = state
        .control
        .call(move |core| {
            let removed = core.audit.prune(days);
            core.audit.command(
                &actor,
                &format!("prune {days} days, removed {removed}"),
                true,
            );
            removed
        })
        .await?;
    Ok(Json(PruneResponse { removed }))
}
