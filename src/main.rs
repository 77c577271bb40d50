use std::{env, path::PathBuf, sync::Arc};

use anyhow::{Context as _, Result as AResult};
use bond_commands::commands;
use bond_core::{
	ao3::{client::Ao3Client, queue::run_worker},
	bot_start,
	config::{
		settings::Config,
		types::{SharedState, UTILS_CONFIG},
	},
};
use bond_db::PostgresConn;
use serenity::all::Http;
use tokio::{spawn, task::JoinSet};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> AResult<()> {
	let path = env::args_os()
		.nth(1)
		.map_or_else(|| PathBuf::from("config.toml"), PathBuf::from);
	let config = Arc::new(Config::load(&path).with_context(|| format!("Loading {}", path.display()))?);

	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_new(&config.main.log_level)
				.with_context(|| format!("Invalid log_level `{}`", config.main.log_level))?,
		)
		.init();

	let postgres = PostgresConn::new(&config.postgres).await?;
	postgres.migrate().await?;
	if UTILS_CONFIG.set(Arc::clone(&config)).is_err() {
		warn!("Config was already set");
	}

	let shared = SharedState::new();
	let ao3 = Ao3Client::new(config.ao3.clone()).context("Failed to build the AO3 client")?;
	let announcer = config.queue_bot().map(|bot| Arc::new(Http::new(&bot.token)));
	if announcer.is_none() {
		warn!("No bot has the recs feature, parse results won't be announced");
	}
	spawn(run_worker(
		postgres.pool.clone(),
		ao3,
		announcer,
		Arc::clone(&shared.queue_notify),
	));

	let mut bots = JoinSet::new();
	for bot in &config.bots {
		info!("Starting {} with {:?}", bot.name, bot.features);
		bots.spawn(bot_start(
			bot.clone(),
			postgres.pool.clone(),
			shared.clone(),
			commands(&bot.features),
		));
	}
	while let Some(outcome) = bots.join_next().await {
		match outcome {
			Ok(Ok(())) => {}
			Ok(Err(err)) => error!("Bot stopped with an error: {err:?}"),
			Err(err) => error!("Bot task failed: {err}"),
		}
	}
	info!("All bots stopped");
	Ok(())
}
