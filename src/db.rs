use std::time::Duration;

use anyhow::{Context, Result};
use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

pub const DEFAULT_MAX_POOL_SIZE: u32 = 4;

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

pub fn build_pool(database_url: &str, max_size: u32) -> Result<PgPool> {
    Pool::builder()
        .max_size(max_size.max(1))
        .connection_timeout(CONNECTION_TIMEOUT)
        .build(ConnectionManager::<PgConnection>::new(database_url))
        .context("failed to initialise the database pool")
}
