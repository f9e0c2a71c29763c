use std::time::Duration;

use crate::errors::AppError;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_CACHE_TTL_SECS: u64 = 30;

/// Process-level settings read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    /// How long a resolved principal may be served from cache. Role, grant or
    /// manager changes made elsewhere become visible after at most this long.
    pub permission_cache_ttl: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| AppError::configuration("DATABASE_URL not set"))?;

        Ok(Self {
            database_url,
            port: port_from_env()?,
            permission_cache_ttl: cache_ttl_from_env()?,
        })
    }
}

pub fn port_from_env() -> Result<u16, AppError> {
    match std::env::var("APP_PORT") {
        Ok(value) => value
            .parse::<u16>()
            .map_err(|_| AppError::configuration("APP_PORT must be a valid port number")),
        Err(_) => Ok(DEFAULT_PORT),
    }
}

pub fn cache_ttl_from_env() -> Result<Duration, AppError> {
    match std::env::var("PERMISSION_CACHE_TTL_SECS") {
        Ok(value) => value
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| AppError::configuration("PERMISSION_CACHE_TTL_SECS must be a non-negative integer")),
        Err(_) => Ok(Duration::from_secs(DEFAULT_CACHE_TTL_SECS)),
    }
}

pub fn load_env() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    let _ = dotenvy::from_path(crate_env);
}

pub fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
