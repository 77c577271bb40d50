use anyhow::Result as AResult;
use poise::{CreateReply, FrameworkContext, FrameworkError, builtins};
use serenity::all::{Context, FullEvent};
use tracing::{error, warn};

use crate::{
	config::types::{Data, Error, SContext, UserError},
	events::{
		bot_ready::handle_ready, guild_create::handle_guild_create,
		interaction::handle_interaction, message_sent::handle_message,
	},
};

async fn reply_ephemeral(ctx: SContext<'_>, content: impl Into<String>) -> AResult<()> {
	ctx.send(CreateReply::default().content(content).ephemeral(true))
		.await?;
	Ok(())
}

pub async fn on_error(error: FrameworkError<'_, Data, Error>) -> AResult<()> {
	match error {
		FrameworkError::Command { error, ctx, .. } => {
			if let Some(user_error) = error.downcast_ref::<UserError>() {
				reply_ephemeral(ctx, user_error.to_string()).await?;
			} else {
				error!("Error in command `{}`: {:?}", ctx.command().name, error);
				reply_ephemeral(ctx, "Something went wrong, the error was logged.").await?;
			}
		}
		FrameworkError::CommandCheckFailed { error, ctx, .. } => {
			let message = match error {
				Some(error) => match error.downcast_ref::<UserError>() {
					Some(user_error) => user_error.to_string(),
					None => {
						error!("Check for `{}` failed: {:?}", ctx.command().name, error);
						"Couldn't check your permissions, try again later.".to_owned()
					}
				},
				None => "You can't use this command here.".to_owned(),
			};
			reply_ephemeral(ctx, message).await?;
		}
		FrameworkError::MissingUserPermissions { ctx, .. } => {
			reply_ephemeral(ctx, "You're missing the permissions this command needs.").await?;
		}
		FrameworkError::GuildOnly { ctx, .. } => {
			reply_ephemeral(ctx, "This only works inside a server.").await?;
		}
		FrameworkError::NotAnOwner { ctx, .. } => {
			reply_ephemeral(ctx, "Only the bot owners can do that.").await?;
		}
		other => builtins::on_error(other).await?,
	}
	Ok(())
}

pub async fn event_handler(
	ctx: &Context,
	event: &FullEvent,
	_framework: FrameworkContext<'_, Data, Error>,
	data: &Data,
) -> Result<(), Error> {
	match event {
		FullEvent::Ready { data_about_bot } => {
			handle_ready(ctx, data, data_about_bot);
		}
		FullEvent::GuildCreate { guild, is_new } => {
			if let Err(error) = handle_guild_create(ctx, data, guild, *is_new).await {
				warn!("Error handling guild create: {error:?}");
			}
		}
		FullEvent::Message { new_message } => {
			if let Err(error) = handle_message(ctx, data, new_message).await {
				warn!("Error handling sent message: {error:?}");
			}
		}
		FullEvent::InteractionCreate { interaction } => {
			if let Err(error) = handle_interaction(ctx, data, interaction).await {
				warn!("Error handling interaction: {error:?}");
			}
		}
		_ => {}
	}
	Ok(())
}
