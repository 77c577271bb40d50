use anyhow::Result as AResult;
use bond_db::modmail;
use serenity::all::{Context, CreateEmbed, CreateMessage, GuildId, Message, ReactionType};
use tracing::warn;

use crate::{
	config::{
		constants::COLOUR_BLUE,
		types::{Data, Feature},
	},
	utils::modmail::{
		is_internal_note, open_ticket_button, relay_content, relay_from_staff, relay_from_user,
		ticket_lock,
	},
};

pub async fn handle_message(ctx: &Context, data: &Data, message: &Message) -> AResult<()> {
	if message.author.bot || !data.bot.has(Feature::Modmail) {
		return Ok(());
	}
	if message.guild_id.is_some() {
		handle_thread_message(ctx, data, message).await
	} else {
		handle_direct_message(ctx, data, message).await
	}
}

async fn handle_direct_message(ctx: &Context, data: &Data, message: &Message) -> AResult<()> {
	let Some(guild_id) = data.bot.modmail_guild_id.map(GuildId::new) else {
		warn!("{} got a DM but has no modmail_guild_id", data.bot.name);
		return Ok(());
	};
	let ticket =
		modmail::open_ticket_for_user(i64::from(guild_id), i64::from(message.author.id), &data.db)
			.await?;

	if let Some(ticket) = ticket {
		let content = relay_content(&message.content, &message.attachments);
		match relay_from_user(ctx, data, &ticket, &message.author, &content).await {
			Ok(()) => {
				message
					.react(&ctx.http, ReactionType::Unicode("✅".to_owned()))
					.await?;
			}
			Err(err) => {
				warn!("Failed to relay DM for ticket {}: {err:?}", ticket.id);
				message
					.reply(&ctx.http, "I couldn't pass that on to the staff, please try again.")
					.await?;
			}
		}
		return Ok(());
	}

	if let Some(lock) = ticket_lock(data, guild_id, message.author.id).await? {
		message
			.reply(&ctx.http, format!("Your ticket can't be opened. {lock}"))
			.await?;
		return Ok(());
	}
	message
		.channel_id
		.send_message(
			&ctx.http,
			CreateMessage::new()
				.embed(
					CreateEmbed::default()
						.title("Need the staff?")
						.description(
							"Press the button to open a ticket. The staff will answer you here.",
						)
						.colour(COLOUR_BLUE),
				)
				.components(vec![open_ticket_button()]),
		)
		.await?;
	Ok(())
}

async fn handle_thread_message(ctx: &Context, data: &Data, message: &Message) -> AResult<()> {
	let Some(ticket) = modmail::ticket_by_thread(i64::from(message.channel_id), &data.db).await?
	else {
		return Ok(());
	};
	if !ticket.is_open() || is_internal_note(&message.content) {
		return Ok(());
	}
	let content = relay_content(&message.content, &message.attachments);
	if let Err(err) = relay_from_staff(ctx, data, &ticket, &message.author, &content).await {
		warn!("Failed to relay staff reply for ticket {}: {err:?}", ticket.id);
		message
			.reply(
				&ctx.http,
				"The user couldn't be reached, they may have DMs closed.",
			)
			.await?;
		return Ok(());
	}
	message
		.react(&ctx.http, ReactionType::Unicode("📨".to_owned()))
		.await?;
	Ok(())
}
