pub mod ao3;
pub mod config;
mod events;
mod handlers;
pub mod sprints;
pub mod utils;

use std::sync::Arc;

use anyhow::{Context as _, Result as AResult};
use poise::{Command, Framework, FrameworkOptions, builtins::register_globally};
use serenity::{
	Client,
	all::{CreateAllowedMentions, GatewayIntents},
};
use sqlx::PgPool;
use tokio::{
	select,
	signal::unix::{SignalKind, signal},
	spawn,
};
use tracing::{error, info, warn};

use crate::{
	config::{
		settings::BotConfig,
		types::{Data, Error as SError, Feature, SharedState},
	},
	handlers::{event_handler, on_error},
};

async fn wait_until_shutdown() -> AResult<()> {
	let [mut s1, mut s2, mut s3] = [
		signal(SignalKind::hangup())?,
		signal(SignalKind::interrupt())?,
		signal(SignalKind::terminate())?,
	];

	select!(
		_ = s1.recv() => {},
		_ = s2.recv() => {},
		_ = s3.recv() => {},
	);
	Ok(())
}

fn intents_for(bot: &BotConfig) -> GatewayIntents {
	let mut intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES;
	if bot.has(Feature::Modmail) {
		intents |= GatewayIntents::DIRECT_MESSAGES | GatewayIntents::MESSAGE_CONTENT;
	}
	intents
}

/// Runs one bot until its shards stop
pub async fn bot_start(
	bot: BotConfig,
	db: PgPool,
	shared: SharedState,
	commands: Vec<Command<Data, SError>>,
) -> AResult<()> {
	let name = bot.name.clone();
	let token = bot.token.clone();
	let intents = intents_for(&bot);
	let user_data = Data::new(db, bot, &shared);

	let framework = Framework::builder()
		.options(FrameworkOptions {
			commands,
			allowed_mentions: Some(CreateAllowedMentions::default().replied_user(false).all_users(true)),
			on_error: |error| {
				Box::pin(async move {
					on_error(error)
						.await
						.unwrap_or_else(|err| error!("on_error: {:?}", err));
				})
			},
			event_handler: |ctx, event, framework, data| {
				Box::pin(event_handler(ctx, event, framework, data))
			},
			..Default::default()
		})
		.setup(move |ctx, ready, framework| {
			Box::pin(async move {
				register_globally(ctx, &framework.options().commands)
					.await
					.context("Failed to register slash commands")?;
				info!(
					"{}: registered {} commands",
					ready.user.name,
					framework.options().commands.len()
				);
				Ok(user_data)
			})
		})
		.build();

	let mut client = Client::builder(&token, intents)
		.framework(framework)
		.await
		.with_context(|| format!("Failed to create client for bot `{name}`"))?;

	let shard_manager = Arc::clone(&client.shard_manager);
	let bot_name = name.clone();
	spawn(async move {
		if let Err(err) = wait_until_shutdown().await {
			error!("Failed to listen for shutdown signals: {:?}", err);
			return;
		}
		warn!("{bot_name}: received shutdown signal, stopping shards");
		shard_manager.shutdown_all().await;
	});

	if let Err(e) = client.start_autosharded().await {
		warn!("{name}: client error: {:?}", e);
	}
	Ok(())
}
