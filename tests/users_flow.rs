mod common;

use anyhow::Result;
use axum::http::StatusCode;
use common::{acquire_db_lock, body_to_vec, TestApp};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Deserialize)]
struct UserInfo {
    id: Uuid,
    email: String,
    role: String,
}

#[tokio::test]
async fn admins_manage_users_but_cannot_mint_admins() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let bank_id = app.insert_bank("Banque Horizon").await?;
    app.insert_user("admin@horizon.test", "adminpass", "admin", Some(bank_id))
        .await?;
    app.insert_user("root@horizon.test", "rootpass", "super_admin", Some(bank_id))
        .await?;
    let admin = app.login_token("admin@horizon.test", "adminpass").await?;
    let root = app.login_token("root@horizon.test", "rootpass").await?;

    // An admin can create a regular account.
    let response = app
        .post_json(
            "/api/users",
            &json!({
                "email": "Analyst@Horizon.Test",
                "password": "analystpass",
                "full_name": "Ana Lyst",
                "role": "analyst",
            }),
            Some(&admin),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_to_vec(response.into_body()).await?;
    let created: UserInfo = serde_json::from_slice(&body)?;
    assert_eq!(created.email, "analyst@horizon.test");
    assert_eq!(created.role, "analyst");

    // But not hand out the admin role.
    let response = app
        .post_json(
            "/api/users",
            &json!({
                "email": "shadow@horizon.test",
                "password": "shadowpass",
                "full_name": "Shadow Admin",
                "role": "admin",
            }),
            Some(&admin),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .patch_json(
            &format!("/api/users/{}/role", created.id),
            &json!({ "role": "admin" }),
            Some(&admin),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // The super admin can.
    let response = app
        .patch_json(
            &format!("/api/users/{}/role", created.id),
            &json!({ "role": "admin" }),
            Some(&root),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_vec(response.into_body()).await?;
    let updated: UserInfo = serde_json::from_slice(&body)?;
    assert_eq!(updated.role, "admin");

    // Roles outside the closed set are rejected outright.
    let response = app
        .patch_json(
            &format!("/api/users/{}/role", created.id),
            &json!({ "role": "owner" }),
            Some(&root),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn non_admins_cannot_list_or_create_users() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let bank_id = app.insert_bank("Banque Horizon").await?;
    app.insert_user("agent@horizon.test", "agentpass", "agent", Some(bank_id))
        .await?;
    let agent = app.login_token("agent@horizon.test", "agentpass").await?;

    let response = app.get("/api/users", Some(&agent)).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .post_json(
            "/api/users",
            &json!({
                "email": "peer@horizon.test",
                "password": "peerpass1",
                "full_name": "Peer",
                "role": "agent",
            }),
            Some(&agent),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn audit_log_records_admin_actions() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let bank_id = app.insert_bank("Banque Horizon").await?;
    app.insert_user("admin@horizon.test", "adminpass", "admin", Some(bank_id))
        .await?;
    let admin = app.login_token("admin@horizon.test", "adminpass").await?;

    app.post_json(
        "/api/templates",
        &json!({ "name": "Audited template", "contract_type": "other" }),
        Some(&admin),
    )
    .await?;

    #[derive(Deserialize)]
    struct AuditEntry {
        action: String,
        user_email: Option<String>,
    }

    let response = app.get("/api/audit", Some(&admin)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_to_vec(response.into_body()).await?;
    let entries: Vec<AuditEntry> = serde_json::from_slice(&body)?;
    assert!(entries
        .iter()
        .any(|entry| entry.action == "template.created"));
    assert_eq!(
        entries[0].user_email.as_deref(),
        Some("admin@horizon.test")
    );

    // The audit view itself is capability-gated.
    app.insert_user("agent@horizon.test", "agentpass", "agent", Some(bank_id))
        .await?;
    let agent = app.login_token("agent@horizon.test", "agentpass").await?;
    let response = app.get("/api/audit", Some(&agent)).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn status_change_notifies_the_contract_creator() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let app = TestApp::new().await?;

    let bank_id = app.insert_bank("Banque Horizon").await?;
    app.insert_user("agent@horizon.test", "agentpass", "agent", Some(bank_id))
        .await?;
    app.insert_user("admin@horizon.test", "adminpass", "admin", Some(bank_id))
        .await?;
    let agent = app.login_token("agent@horizon.test", "agentpass").await?;
    let admin = app.login_token("admin@horizon.test", "adminpass").await?;

    let response = app
        .post_json(
            "/api/contracts",
            &json!({
                "client_name": "Acme SARL",
                "contract_type": "business_loan",
                "amount": 250000.0,
                "guarantee_type": "caution",
                "guarantees": [{ "type": "caution" }],
                "agency": "Paris 9",
            }),
            Some(&agent),
        )
        .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    #[derive(Deserialize)]
    struct ContractInfo {
        id: Uuid,
    }
    let body = body_to_vec(response.into_body()).await?;
    let contract: ContractInfo = serde_json::from_slice(&body)?;

    // Another user moving the status produces a notification for the
    // creator.
    app.post_json(
        &format!("/api/contracts/{}/status", contract.id),
        &json!({ "status": "validated" }),
        Some(&admin),
    )
    .await?;

    #[derive(Deserialize)]
    struct NotificationInfo {
        severity: String,
        read: bool,
        contract_id: Option<Uuid>,
    }

    let response = app.get("/api/notifications", Some(&agent)).await?;
    let body = body_to_vec(response.into_body()).await?;
    let notifications: Vec<NotificationInfo> = serde_json::from_slice(&body)?;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].severity, "info");
    assert!(!notifications[0].read);
    assert_eq!(notifications[0].contract_id, Some(contract.id));

    let response = app
        .post_json("/api/notifications/read-all", &json!({}), Some(&agent))
        .await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.get("/api/notifications", Some(&agent)).await?;
    let body = body_to_vec(response.into_body()).await?;
    let notifications: Vec<NotificationInfo> = serde_json::from_slice(&body)?;
    assert!(notifications[0].read);

    app.cleanup().await?;
    Ok(())
}
