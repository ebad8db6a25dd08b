use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod ai;
pub mod audit;
pub mod auth;
pub mod banks;
pub mod contracts;
pub mod dashboard;
pub mod health;
pub mod notifications;
pub mod templates;
pub mod users;

pub fn create_router(state: AppState) -> Router<()> {
    // Without a configured origin list, every requesting origin is
    // mirrored back.
    let allow_origin = match state.config.cors_allowed_origin.as_deref() {
        Some(origins) => AllowOrigin::list(
            origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(|origin| {
                    origin
                        .parse::<HeaderValue>()
                        .expect("invalid CORS allowed origin")
                })
                .collect::<Vec<_>>(),
        ),
        None => AllowOrigin::mirror_request(),
    };
    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    let auth_routes = Router::new()
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me));

    let templates_routes = Router::new()
        .route(
            "/",
            get(templates::list_templates).post(templates::create_template),
        )
        .route(
            "/:id",
            get(templates::get_template)
                .patch(templates::update_template)
                .delete(templates::delete_template),
        )
        .route("/:id/fields", post(templates::add_field))
        .route(
            "/:id/fields/:field_id",
            patch(templates::update_field).delete(templates::delete_field),
        )
        .route("/:id/steps", post(templates::add_step))
        .route(
            "/:id/steps/:step_id",
            patch(templates::update_step).delete(templates::delete_step),
        );

    let contracts_routes = Router::new()
        .route(
            "/",
            get(contracts::list_contracts).post(contracts::create_contract),
        )
        .route(
            "/:id",
            get(contracts::get_contract)
                .patch(contracts::update_contract)
                .delete(contracts::delete_contract),
        )
        .route("/:id/status", post(contracts::set_status))
        .route("/:id/attachment", get(contracts::download_attachment));

    let users_routes = Router::new()
        .route("/", get(users::list_users).post(users::create_user))
        .route("/:id/role", patch(users::set_role));

    let banks_routes = Router::new()
        .route("/me", get(banks::get_bank))
        .route("/me/branding", patch(banks::update_branding));

    let notifications_routes = Router::new()
        .route("/", get(notifications::list_notifications))
        .route("/:id/read", post(notifications::mark_read))
        .route("/read-all", post(notifications::mark_all_read));

    let ai_routes = Router::new()
        .route("/chat", post(ai::chat))
        .route("/generate", post(ai::generate))
        .route("/extract", post(ai::extract));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/templates", templates_routes)
        .nest("/api/contracts", contracts_routes)
        .nest("/api/users", users_routes)
        .nest("/api/banks", banks_routes)
        .nest("/api/notifications", notifications_routes)
        .nest("/api/ai", ai_routes)
        .route("/api/audit", get(audit::list_audit_log))
        .route("/api/dashboard/stats", get(dashboard::stats))
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .nest("/api/auth", auth_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024 * 64))
}
