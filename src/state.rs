use std::sync::Arc;

use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, PooledConnection};

use crate::ai::CompletionClient;
use crate::auth::jwt::JwtService;
use crate::config::AppConfig;
use crate::db::PgPool;
use crate::error::{AppError, AppResult};
use crate::storage::ObjectStorage;

type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

/// Shared per-process context handed to every handler. The storage and
/// completion clients sit behind trait objects so tests can swap them.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn ObjectStorage>,
    pub completions: Arc<dyn CompletionClient>,
    pub jwt: JwtService,
}

impl AppState {
    pub fn conn(&self) -> AppResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("no database connection available: {err}")))
    }
}
