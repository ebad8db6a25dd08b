mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, body_to_vec, TestApp};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;

#[derive(Deserialize)]
struct Stats {
    total_contracts: i64,
    contracts_by_status: HashMap<String, i64>,
    total_amount: f64,
    active_templates: i64,
    unread_notifications: i64,
}

#[derive(Deserialize)]
struct BankInfo {
    name: String,
    display_name: Option<String>,
    primary_color: Option<String>,
}

#[tokio::test]
async fn stats_aggregate_per_bank() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let bank_id = app.insert_bank("Banque Horizon").await?;
    app.insert_user("admin@horizon.test", "adminpass", "admin", Some(bank_id))
        .await?;
    let token = app.login_token("admin@horizon.test", "adminpass").await?;

    for amount in [100000.0, 50000.0] {
        let response = app
            .post_json(
                "/api/contracts",
                &json!({
                    "client_name": "Acme SARL",
                    "contract_type": "business_loan",
                    "amount": amount,
                    "guarantee_type": "caution",
                    "guarantees": [{ "type": "caution" }],
                    "agency": "Paris 9",
                }),
                Some(&token),
            )
            .await?;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    app.post_json(
        "/api/templates",
        &json!({ "name": "SME loan", "contract_type": "business_loan" }),
        Some(&token),
    )
    .await?;

    let response = app.get("/api/dashboard/stats", Some(&token)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_vec(response.into_body()).await?;
    let stats: Stats = serde_json::from_slice(&body)?;
    assert_eq!(stats.total_contracts, 2);
    assert_eq!(stats.contracts_by_status.get("in_progress"), Some(&2));
    assert!((stats.total_amount - 150000.0).abs() < f64::EPSILON);
    assert_eq!(stats.active_templates, 1);
    assert_eq!(stats.unread_notifications, 0);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn branding_is_mutable_but_identity_is_not() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let bank_id = app.insert_bank("Banque Horizon").await?;
    app.insert_user("admin@horizon.test", "adminpass", "admin", Some(bank_id))
        .await?;
    app.insert_user("agent@horizon.test", "agentpass", "agent", Some(bank_id))
        .await?;
    let admin = app.login_token("admin@horizon.test", "adminpass").await?;
    let agent = app.login_token("agent@horizon.test", "agentpass").await?;

    let response = app
        .patch_json(
            "/api/banks/me/branding",
            &json!({ "display_name": "Horizon", "primary_color": "#0044cc" }),
            Some(&admin),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_vec(response.into_body()).await?;
    let bank: BankInfo = serde_json::from_slice(&body)?;
    assert_eq!(bank.name, "Banque Horizon");
    assert_eq!(bank.display_name.as_deref(), Some("Horizon"));
    assert_eq!(bank.primary_color.as_deref(), Some("#0044cc"));

    let response = app
        .patch_json(
            "/api/banks/me/branding",
            &json!({ "primary_color": "blue" }),
            Some(&admin),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .patch_json(
            "/api/banks/me/branding",
            &json!({ "display_name": "Rogue" }),
            Some(&agent),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    app.cleanup().await?;
    Ok(())
}
