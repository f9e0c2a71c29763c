use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

pub async fn init(database_url: &str) -> anyhow::Result<SqlitePool> {
	let pool = connect(database_url).await?;

	sqlx::migrate!()
		.run(&pool)
		.await
		.context("failed to run migrations")?;

	Ok(pool)
}

pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
	let options = SqliteConnectOptions::from_str(database_url)
		.context("invalid DATABASE_URL")?
		.create_if_missing(true)
		.foreign_keys(true);

	SqlitePoolOptions::new()
		.max_connections(10)
		.min_connections(1)
		.acquire_timeout(Duration::from_secs(10))
		.connect_with(options)
		.await
		.context("failed to connect to database")
}

/// Prefer `./migrations` when run from the repo root, else the crate-local folder.
pub async fn migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
	let local = Path::new("./migrations");
	let path = if local.exists() {
		local.to_path_buf()
	} else {
		Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
	};

	let display = path.display().to_string();
	sqlx::migrate::Migrator::new(path)
		.await
		.with_context(|| format!("failed to load migrations from {}", display))
}
