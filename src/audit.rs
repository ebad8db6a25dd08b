use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::models::NewAuditLog;
use crate::schema::audit_logs;

/// Appends one audit record for the acting session. Best-effort: a failed
/// insert is logged and swallowed so it can never block or roll back the
/// mutation it accompanies.
pub fn record(conn: &mut PgConnection, actor: &AuthenticatedUser, action: &str, details: Value) {
    let entry = NewAuditLog {
        id: Uuid::new_v4(),
        user_id: Some(actor.user_id),
        user_email: Some(actor.email.clone()),
        bank_id: actor.bank_id,
        action: action.to_string(),
        details,
    };

    if let Err(err) = diesel::insert_into(audit_logs::table)
        .values(&entry)
        .execute(conn)
    {
        warn!(action = %action, error = %err, "failed to append audit record");
    }
}
