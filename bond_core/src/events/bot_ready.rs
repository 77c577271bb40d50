use serenity::all::{ActivityData, Context, Ready};
use tracing::info;

use crate::config::types::Data;

pub fn handle_ready(ctx: &Context, data: &Data, ready: &Ready) {
	info!(
		"{} logged in as {} in {} guilds",
		data.bot.name,
		ready.user.name,
		ready.guilds.len()
	);
	if let Some(activity) = &data.bot.activity {
		ctx.set_activity(Some(ActivityData::custom(activity)));
	}
}
