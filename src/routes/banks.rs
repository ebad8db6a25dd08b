use axum::{extract::State, Json};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::audit;
use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::Bank;
use crate::schema::banks;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UpdateBrandingRequest {
    pub display_name: Option<String>,
    pub logo_url: Option<String>,
    pub primary_color: Option<String>,
}

#[derive(Serialize)]
pub struct BankResponse {
    pub id: Uuid,
    pub name: String,
    pub display_name: Option<String>,
    pub logo_url: Option<String>,
    pub primary_color: Option<String>,
}

fn to_bank_response(bank: Bank) -> BankResponse {
    BankResponse {
        id: bank.id,
        name: bank.name,
        display_name: bank.display_name,
        logo_url: bank.logo_url,
        primary_color: bank.primary_color,
    }
}

pub async fn get_bank(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<BankResponse>> {
    let bank_id = user.require_bank()?;
    let mut conn = state.conn()?;
    let bank: Bank = banks::table.find(bank_id).first(&mut conn)?;
    Ok(Json(to_bank_response(bank)))
}

/// Branding is the only mutable part of a bank; its identity never
/// changes after onboarding.
pub async fn update_branding(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<UpdateBrandingRequest>,
) -> AppResult<Json<BankResponse>> {
    if !user.capabilities().can_edit_branding {
        return Err(AppError::forbidden(
            "editing branding requires an admin role",
        ));
    }
    let bank_id = user.require_bank()?;

    if let Some(color) = payload.primary_color.as_deref() {
        if !is_valid_hex_color(color) {
            return Err(AppError::bad_request(
                "primary_color must be a #rrggbb value",
            ));
        }
    }

    let mut conn = state.conn()?;
    let now = chrono::Utc::now().naive_utc();
    diesel::update(banks::table.find(bank_id))
        .set((
            payload
                .display_name
                .as_deref()
                .map(|v| banks::display_name.eq(Some(v.trim().to_string()))),
            payload
                .logo_url
                .as_deref()
                .map(|v| banks::logo_url.eq(Some(v.trim().to_string()))),
            payload
                .primary_color
                .as_deref()
                .map(|v| banks::primary_color.eq(Some(v.to_string()))),
            banks::updated_at.eq(now),
        ))
        .execute(&mut conn)?;

    let bank: Bank = banks::table.find(bank_id).first(&mut conn)?;

    audit::record(
        &mut conn,
        &user,
        "bank.branding_updated",
        json!({ "bank_id": bank.id }),
    );

    Ok(Json(to_bank_response(bank)))
}

fn is_valid_hex_color(value: &str) -> bool {
    let Some(digits) = value.strip_prefix('#') else {
        return false;
    };
    digits.len() == 6 && digits.chars().all(|ch| ch.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::is_valid_hex_color;

    #[test]
    fn accepts_six_digit_hex_colors() {
        assert!(is_valid_hex_color("#1a2B3c"));
    }

    #[test]
    fn rejects_malformed_colors() {
        assert!(!is_valid_hex_color("1a2b3c"));
        assert!(!is_valid_hex_color("#1a2b3"));
        assert!(!is_valid_hex_color("#1a2b3g"));
    }
}
