use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use covenant::ai::HttpCompletionClient;
use covenant::auth::jwt::JwtService;
use covenant::config::AppConfig;
use covenant::db;
use covenant::routes;
use covenant::state::AppState;
use covenant::storage::S3Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        database_url = %config.masked_database_url(),
        pool_size = config.database_max_pool_size,
        s3_bucket = %config.s3_bucket,
        completion_model = %config.completion_model,
        "starting covenant"
    );

    let listen_addr: SocketAddr =
        format!("{}:{}", config.server_host, config.server_port).parse()?;

    let pool = db::build_pool(&config.database_url, config.database_max_pool_size)?;
    let storage = Arc::new(S3Storage::connect(&config).await?);
    let completions = Arc::new(HttpCompletionClient::from_config(&config));
    let jwt = JwtService::from_config(&config)?;

    let state = AppState {
        pool,
        config: Arc::new(config),
        storage,
        completions,
        jwt,
    };
    let router = routes::create_router(state);

    let listener = TcpListener::bind(listen_addr).await?;
    tracing::info!("listening on {listen_addr}");

    axum::serve(listener, router).await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
