use std::sync::Arc;

use anyhow::Result as AResult;
use bond_db::guild::insert_guild;
use serenity::all::{Context, Guild};
use tracing::info;

use crate::{
	config::types::{Data, Feature},
	sprints::SprintClock,
};

/// Runs for every guild after each READY as well as for new joins
pub async fn handle_guild_create(
	ctx: &Context,
	data: &Data,
	guild: &Guild,
	is_new: Option<bool>,
) -> AResult<()> {
	insert_guild(i64::from(guild.id), &data.db).await?;
	if is_new == Some(true) {
		info!("{} joined guild {} ({})", data.bot.name, guild.name, guild.id);
	}
	if data.bot.has(Feature::Sprints) {
		let armed = SprintClock::new(data, Arc::clone(&ctx.http))
			.rearm_guild(guild.id)
			.await?;
		if armed > 0 {
			info!("{}: re-armed {armed} unfinished sprints in {}", data.bot.name, guild.id);
		}
	}
	Ok(())
}
