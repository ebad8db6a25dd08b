use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::Notification;
use crate::schema::notifications;
use crate::state::AppState;

#[derive(Serialize)]
pub struct NotificationResponse {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub severity: String,
    pub read: bool,
    pub contract_id: Option<Uuid>,
    pub created_at: String,
}

fn to_notification_response(notification: Notification) -> NotificationResponse {
    NotificationResponse {
        id: notification.id,
        title: notification.title,
        message: notification.message,
        severity: notification.severity,
        read: notification.read,
        contract_id: notification.contract_id,
        created_at: super::contracts::to_iso(notification.created_at),
    }
}

pub async fn list_notifications(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<NotificationResponse>>> {
    let mut conn = state.conn()?;

    let rows: Vec<Notification> = notifications::table
        .filter(notifications::user_id.eq(user.user_id))
        .order(notifications::created_at.desc())
        .limit(100)
        .load(&mut conn)?;

    Ok(Json(
        rows.into_iter().map(to_notification_response).collect(),
    ))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(notification_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<StatusCode> {
    let mut conn = state.conn()?;

    let updated = diesel::update(
        notifications::table
            .find(notification_id)
            .filter(notifications::user_id.eq(user.user_id)),
    )
    .set(notifications::read.eq(true))
    .execute(&mut conn)?;

    if updated == 0 {
        return Err(AppError::not_found());
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<StatusCode> {
    let mut conn = state.conn()?;

    diesel::update(
        notifications::table
            .filter(notifications::user_id.eq(user.user_id))
            .filter(notifications::read.eq(false)),
    )
    .set(notifications::read.eq(true))
    .execute(&mut conn)?;

    Ok(StatusCode::NO_CONTENT)
}
