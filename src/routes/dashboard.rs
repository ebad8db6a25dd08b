use std::collections::HashMap;

use axum::{extract::State, Json};
use diesel::dsl::{count_star, sum};
use diesel::prelude::*;
use serde::Serialize;

use crate::auth::AuthenticatedUser;
use crate::error::AppResult;
use crate::schema::{contract_templates, contracts, notifications};
use crate::state::AppState;

#[derive(Serialize)]
pub struct DashboardStats {
    pub total_contracts: i64,
    pub contracts_by_status: HashMap<String, i64>,
    pub total_amount: f64,
    pub active_templates: i64,
    pub unread_notifications: i64,
}

pub async fn stats(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<DashboardStats>> {
    let bank_id = user.require_bank()?;
    let mut conn = state.conn()?;

    let total_contracts: i64 = contracts::table
        .filter(contracts::bank_id.eq(bank_id))
        .select(count_star())
        .first(&mut conn)?;

    let status_rows: Vec<(String, i64)> = contracts::table
        .filter(contracts::bank_id.eq(bank_id))
        .group_by(contracts::status)
        .select((contracts::status, count_star()))
        .load(&mut conn)?;
    let contracts_by_status: HashMap<String, i64> = status_rows.into_iter().collect();

    let total_amount: Option<f64> = contracts::table
        .filter(contracts::bank_id.eq(bank_id))
        .select(sum(contracts::amount))
        .first(&mut conn)?;

    let active_templates: i64 = contract_templates::table
        .filter(contract_templates::bank_id.eq(bank_id))
        .filter(contract_templates::active.eq(true))
        .select(count_star())
        .first(&mut conn)?;

    let unread_notifications: i64 = notifications::table
        .filter(notifications::user_id.eq(user.user_id))
        .filter(notifications::read.eq(false))
        .select(count_star())
        .first(&mut conn)?;

    Ok(Json(DashboardStats {
        total_contracts,
        contracts_by_status,
        total_amount: total_amount.unwrap_or(0.0),
        active_templates,
        unread_notifications,
    }))
}
