use std::fmt::Write as _;

use axum::extract::State;
use axum::http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode};
use axum::Json;
use axum_extra::{headers::Cookie, typed_header::TypedHeader};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::auth::{password, AuthenticatedUser};
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::models::{NewRefreshToken, RefreshToken, User};
use crate::schema::refresh_tokens::dsl as refresh_dsl;
use crate::schema::{refresh_tokens, users};
use crate::state::AppState;

const REFRESH_COOKIE_NAME: &str = "refresh_token";

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<(HeaderMap, Json<LoginResponse>)> {
    let mut conn = state.conn()?;

    let account: Option<User> = users::table
        .filter(users::email.eq(payload.email.trim()))
        .first(&mut conn)
        .optional()?;
    let account = account.ok_or_else(AppError::unauthorized)?;

    let valid = password::verify_password(&payload.password, &account.password_hash)
        .map_err(|_| AppError::unauthorized())?;
    if !valid {
        return Err(AppError::unauthorized());
    }

    open_session(&state, &mut conn, &account)
}

/// Rotates the refresh token: the presented one is revoked and a fresh
/// one is issued alongside the new access token.
pub async fn refresh(
    State(state): State<AppState>,
    jar: Option<TypedHeader<Cookie>>,
) -> AppResult<(HeaderMap, Json<LoginResponse>)> {
    let cookies = jar.ok_or_else(AppError::unauthorized)?;
    let presented = cookies
        .get(REFRESH_COOKIE_NAME)
        .ok_or_else(AppError::unauthorized)?;

    let mut conn = state.conn()?;
    let now = Utc::now().naive_utc();

    let active: Option<RefreshToken> = refresh_dsl::refresh_tokens
        .filter(refresh_dsl::token_hash.eq(digest(presented)))
        .filter(refresh_dsl::revoked_at.is_null())
        .filter(refresh_dsl::expires_at.gt(now))
        .first(&mut conn)
        .optional()?;
    let active = active.ok_or_else(AppError::unauthorized)?;

    diesel::update(refresh_dsl::refresh_tokens.find(active.id))
        .set((
            refresh_dsl::revoked_at.eq(now),
            refresh_dsl::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    let account: User = users::table.find(active.user_id).first(&mut conn)?;

    open_session(&state, &mut conn, &account)
}

pub async fn logout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    jar: Option<TypedHeader<Cookie>>,
) -> AppResult<(HeaderMap, StatusCode)> {
    let mut conn = state.conn()?;
    let now = Utc::now().naive_utc();

    let revoked_by_cookie = match jar
        .as_ref()
        .and_then(|cookies| cookies.get(REFRESH_COOKIE_NAME))
    {
        Some(presented) => diesel::update(
            refresh_dsl::refresh_tokens
                .filter(refresh_dsl::token_hash.eq(digest(presented)))
                .filter(refresh_dsl::user_id.eq(user.user_id))
                .filter(refresh_dsl::revoked_at.is_null()),
        )
        .set((
            refresh_dsl::revoked_at.eq(now),
            refresh_dsl::updated_at.eq(now),
        ))
        .execute(&mut conn)
        .unwrap_or(0),
        None => 0,
    };

    // No matching cookie: revoke every live session of the account
    // instead of silently doing nothing.
    if revoked_by_cookie == 0 {
        let _ = diesel::update(
            refresh_dsl::refresh_tokens
                .filter(refresh_dsl::user_id.eq(user.user_id))
                .filter(refresh_dsl::revoked_at.is_null()),
        )
        .set((
            refresh_dsl::revoked_at.eq(now),
            refresh_dsl::updated_at.eq(now),
        ))
        .execute(&mut conn);
    }

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, clear_cookie(&state.config));
    Ok((headers, StatusCode::NO_CONTENT))
}

pub async fn me(user: AuthenticatedUser) -> Json<AuthenticatedUser> {
    Json(user)
}

/// Mints an access token and a stored refresh token for the account,
/// returning the response body plus the Set-Cookie header.
fn open_session(
    state: &AppState,
    conn: &mut PgConnection,
    account: &User,
) -> AppResult<(HeaderMap, Json<LoginResponse>)> {
    let access_token = state.jwt.generate_token(account)?;

    let issued_at = Utc::now();
    let expires_at = issued_at + ChronoDuration::days(state.config.refresh_token_expiry_days);
    let refresh_value = mint_refresh_value();

    diesel::insert_into(refresh_tokens::table)
        .values(&NewRefreshToken {
            id: Uuid::new_v4(),
            user_id: account.id,
            token_hash: digest(&refresh_value),
            issued_at: issued_at.naive_utc(),
            expires_at: expires_at.naive_utc(),
        })
        .execute(conn)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        SET_COOKIE,
        session_cookie(&state.config, &refresh_value, expires_at),
    );

    Ok((
        headers,
        Json(LoginResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: state.config.jwt_expiry_minutes * 60,
        }),
    ))
}

fn digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn mint_refresh_value() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn session_cookie(config: &AppConfig, value: &str, expires_at: DateTime<Utc>) -> HeaderValue {
    let max_age = ChronoDuration::days(config.refresh_token_expiry_days).num_seconds();
    cookie_header(config, value, max_age, &expires_at.to_rfc2822())
}

fn clear_cookie(config: &AppConfig) -> HeaderValue {
    cookie_header(config, "", 0, "Thu, 01 Jan 1970 00:00:00 GMT")
}

fn cookie_header(config: &AppConfig, value: &str, max_age: i64, expires: &str) -> HeaderValue {
    let mut cookie = format!(
        "{REFRESH_COOKIE_NAME}={value}; Path=/; HttpOnly; SameSite=Strict; \
         Max-Age={max_age}; Expires={expires}"
    );
    if config.refresh_cookie_secure {
        cookie.push_str("; Secure");
    }
    if let Some(domain) = &config.refresh_cookie_domain {
        let _ = write!(cookie, "; Domain={domain}");
    }

    HeaderValue::from_str(&cookie).expect("cookie header is ascii")
}
