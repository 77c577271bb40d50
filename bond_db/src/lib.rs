pub mod guild;
pub mod lock;
pub mod modmail;
pub mod parse_queue;
pub mod permission;
pub mod profile;
pub mod recommendation;
pub mod series;
pub mod sprint;

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context as _, Result as AResult};
use serde::Deserialize;
use sqlx::{
	Pool, Postgres,
	migrate::Migrator,
	postgres::{PgConnectOptions, PgPoolOptions},
};
use tracing::info;

static MIGRATOR: Migrator = sqlx::migrate!();

#[derive(Deserialize, Clone, Debug)]
pub struct PostgresConfig {
	pub host: String,
	pub port: u16,
	pub user: String,
	pub database: String,
	pub password: String,
	pub max_connections: u32,
}

pub struct PostgresConn {
	pub pool: Pool<Postgres>,
}

impl PostgresConn {
	pub async fn new(config: &PostgresConfig) -> AResult<Self> {
		let pool_options = PgConnectOptions::new()
			.host(&config.host)
			.port(config.port)
			.username(&config.user)
			.database(&config.database)
			.password(&config.password);
		let pool = PgPoolOptions::default()
			.max_connections(config.max_connections)
			.connect_with(pool_options)
			.await
			.context("Failed to connect to database")?;
		info!(
			"Connected to postgres at {}:{}/{}",
			config.host, config.port, config.database
		);
		Ok(Self { pool })
	}

	pub async fn migrate(&self) -> AResult<()> {
		MIGRATOR
			.run(&self.pool)
			.await
			.context("Failed to run database migrations")?;
		Ok(())
	}
}

/// Seconds since the unix epoch, the unit every timestamp column uses.
#[must_use]
pub fn unix_now() -> i64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map_or(0, |t| i64::try_from(t.as_secs()).unwrap_or(i64::MAX))
}
