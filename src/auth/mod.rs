pub mod jwt;
pub mod password;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    state::AppState,
};

/// Closed role enumeration shared by user accounts and workflow-step
/// role restrictions.
pub const ROLES: &[&str] = &["super_admin", "admin", "director", "analyst", "agent"];

pub fn is_valid_role(role: &str) -> bool {
    ROLES.iter().any(|allowed| *allowed == role)
}

/// Session context for one authenticated request, recovered from the
/// bearer token. Handlers never look at raw role strings; they go through
/// [`AuthenticatedUser::capabilities`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: String,
    pub bank_id: Option<Uuid>,
}

/// What the session is allowed to do, derived once per request from the
/// role claim.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    pub can_manage_users: bool,
    pub can_assign_admin: bool,
    pub can_edit_branding: bool,
    pub can_view_audit: bool,
}

impl Capabilities {
    pub fn for_role(role: &str) -> Self {
        match role {
            "super_admin" => Self {
                can_manage_users: true,
                can_assign_admin: true,
                can_edit_branding: true,
                can_view_audit: true,
            },
            "admin" => Self {
                can_manage_users: true,
                can_assign_admin: false,
                can_edit_branding: true,
                can_view_audit: true,
            },
            "director" => Self {
                can_manage_users: false,
                can_assign_admin: false,
                can_edit_branding: false,
                can_view_audit: true,
            },
            _ => Self {
                can_manage_users: false,
                can_assign_admin: false,
                can_edit_branding: false,
                can_view_audit: false,
            },
        }
    }
}

impl AuthenticatedUser {
    pub fn capabilities(&self) -> Capabilities {
        Capabilities::for_role(&self.role)
    }

    /// Tenant id of the session, or an explicit error when the account is
    /// not attached to a bank.
    pub fn require_bank(&self) -> AppResult<Uuid> {
        self.bank_id
            .ok_or_else(|| AppError::bad_request("user has no associated bank"))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::unauthorized())?;

        let claims = state
            .jwt
            .verify_token(bearer.token())
            .map_err(|_| AppError::unauthorized())?;

        Ok(AuthenticatedUser {
            user_id: claims.sub,
            email: claims.email,
            role: claims.role,
            bank_id: claims.bank_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn super_admin_holds_every_capability() {
        let caps = Capabilities::for_role("super_admin");
        assert!(caps.can_manage_users);
        assert!(caps.can_assign_admin);
        assert!(caps.can_edit_branding);
        assert!(caps.can_view_audit);
    }

    #[test]
    fn admin_cannot_assign_admin() {
        let caps = Capabilities::for_role("admin");
        assert!(caps.can_manage_users);
        assert!(!caps.can_assign_admin);
    }

    #[test]
    fn agent_has_no_management_capabilities() {
        let caps = Capabilities::for_role("agent");
        assert!(!caps.can_manage_users);
        assert!(!caps.can_edit_branding);
        assert!(!caps.can_view_audit);
    }

    #[test]
    fn role_enumeration_is_closed() {
        assert!(is_valid_role("analyst"));
        assert!(!is_valid_role("owner"));
        assert!(!is_valid_role(""));
    }
}
