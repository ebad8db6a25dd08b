use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use diesel::{prelude::*, result::DatabaseErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::audit;
use crate::auth::{is_valid_role, password, AuthenticatedUser, ROLES};
use crate::error::{AppError, AppResult};
use crate::models::{NewUser, User};
use crate::schema::users;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub role: String,
}

#[derive(Deserialize)]
pub struct SetRoleRequest {
    pub role: String,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub bank_id: Option<Uuid>,
    pub created_at: String,
}

fn to_user_response(user: User) -> UserResponse {
    UserResponse {
        id: user.id,
        email: user.email,
        full_name: user.full_name,
        role: user.role,
        bank_id: user.bank_id,
        created_at: super::contracts::to_iso(user.created_at),
    }
}

/// Admin roles can only be handed out by a super admin; everything else
/// only needs the manage-users capability.
fn check_role_assignment(actor: &AuthenticatedUser, role: &str) -> AppResult<()> {
    let caps = actor.capabilities();
    if !caps.can_manage_users {
        return Err(AppError::forbidden("managing users requires an admin role"));
    }

    if !is_valid_role(role) {
        return Err(AppError::bad_request(format!(
            "invalid role '{role}'. Allowed roles: {}",
            ROLES.join(", ")
        )));
    }

    if matches!(role, "admin" | "super_admin") && !caps.can_assign_admin {
        return Err(AppError::forbidden(
            "only a super admin may assign the admin role",
        ));
    }

    Ok(())
}

pub async fn list_users(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<UserResponse>>> {
    if !user.capabilities().can_manage_users {
        return Err(AppError::forbidden("managing users requires an admin role"));
    }
    let bank_id = user.require_bank()?;

    let mut conn = state.conn()?;
    let rows: Vec<User> = users::table
        .filter(users::bank_id.eq(Some(bank_id)))
        .order(users::email.asc())
        .load(&mut conn)?;

    Ok(Json(rows.into_iter().map(to_user_response).collect()))
}

pub async fn create_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    check_role_assignment(&user, &payload.role)?;
    let bank_id = user.require_bank()?;

    let email = payload.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::bad_request("a valid email is required"));
    }
    if payload.full_name.trim().is_empty() {
        return Err(AppError::bad_request("full_name must not be empty"));
    }
    if payload.password.len() < 8 {
        return Err(AppError::bad_request(
            "password must be at least 8 characters",
        ));
    }

    let password_hash = password::hash_password(&payload.password)?;

    let mut conn = state.conn()?;
    let new_user = NewUser {
        id: Uuid::new_v4(),
        email,
        password_hash,
        full_name: payload.full_name.trim().to_string(),
        role: payload.role,
        bank_id: Some(bank_id),
    };

    match diesel::insert_into(users::table)
        .values(&new_user)
        .execute(&mut conn)
    {
        Ok(_) => {}
        Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
            return Err(AppError::bad_request("email already registered"));
        }
        Err(err) => return Err(AppError::from(err)),
    }

    let created: User = users::table.find(new_user.id).first(&mut conn)?;

    audit::record(
        &mut conn,
        &user,
        "user.created",
        json!({ "user_id": created.id, "email": created.email, "role": created.role }),
    );

    Ok((StatusCode::CREATED, Json(to_user_response(created))))
}

pub async fn set_role(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<SetRoleRequest>,
) -> AppResult<Json<UserResponse>> {
    check_role_assignment(&user, &payload.role)?;
    let bank_id = user.require_bank()?;

    let mut conn = state.conn()?;
    let target: User = users::table
        .find(user_id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(AppError::not_found)?;

    if target.bank_id != Some(bank_id) {
        return Err(AppError::not_found());
    }

    let previous_role = target.role.clone();
    let now = chrono::Utc::now().naive_utc();
    diesel::update(users::table.find(target.id))
        .set((users::role.eq(&payload.role), users::updated_at.eq(now)))
        .execute(&mut conn)?;

    let updated: User = users::table.find(target.id).first(&mut conn)?;

    audit::record(
        &mut conn,
        &user,
        "user.role_changed",
        json!({
            "user_id": updated.id,
            "from": previous_role,
            "to": updated.role,
        }),
    );

    Ok(Json(to_user_response(updated)))
}
