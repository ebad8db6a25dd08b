use axum::{
    extract::{Query, State},
    Json,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::AuditLog;
use crate::schema::audit_logs;
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

#[derive(Deserialize)]
pub struct AuditListQuery {
    pub limit: Option<i64>,
    pub action: Option<String>,
}

#[derive(Serialize)]
pub struct AuditEntryResponse {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub user_email: Option<String>,
    pub action: String,
    pub details: Value,
    pub created_at: String,
}

pub async fn list_audit_log(
    State(state): State<AppState>,
    Query(params): Query<AuditListQuery>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<AuditEntryResponse>>> {
    if !user.capabilities().can_view_audit {
        return Err(AppError::forbidden(
            "viewing the audit log requires an admin role",
        ));
    }
    let bank_id = user.require_bank()?;

    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIMIT)
        .clamp(1, MAX_LIMIT);

    let mut conn = state.conn()?;
    let mut query = audit_logs::table
        .filter(audit_logs::bank_id.eq(Some(bank_id)))
        .into_boxed();

    if let Some(action) = params.action.as_deref().filter(|a| !a.is_empty()) {
        query = query.filter(audit_logs::action.eq(action.to_string()));
    }

    let rows: Vec<AuditLog> = query
        .order(audit_logs::created_at.desc())
        .limit(limit)
        .load(&mut conn)?;

    Ok(Json(
        rows.into_iter()
            .map(|entry| AuditEntryResponse {
                id: entry.id,
                user_id: entry.user_id,
                user_email: entry.user_email,
                action: entry.action,
                details: entry.details,
                created_at: super::contracts::to_iso(entry.created_at),
            })
            .collect(),
    ))
}
