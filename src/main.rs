use std::net::SocketAddr;

use salesdesk::config::{self, AppConfig};
use salesdesk::{create_app, db};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_env();
    config::init_tracing();

    let app_config = AppConfig::from_env()?;
    let pool = db::init(&app_config.database_url).await?;
    let app = create_app(pool).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], app_config.port));
    tracing::info!(
        %addr,
        cache_ttl_secs = app_config.permission_cache_ttl.as_secs(),
        "salesdesk listening"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
