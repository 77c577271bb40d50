use bond_core::{
	config::{
		constants::COLOUR_BLUE,
		types::{Error, SContext, UserError},
	},
	utils::{
		helpers::notice_embed,
		modmail::{close_ticket, open_ticket_button},
		permissions::require_moderator,
	},
};
use bond_db::modmail;
use poise::CreateReply;
use serenity::all::{CreateEmbed, CreateMessage};

#[poise::command(
	slash_command,
	guild_only,
	subcommands("modmail_panel", "modmail_close"),
	subcommand_required
)]
pub async fn modmail(_: SContext<'_>) -> Result<(), Error> {
	Ok(())
}

/// Post the "open ticket" button in this channel
#[poise::command(slash_command, guild_only, rename = "panel", check = "require_moderator")]
async fn modmail_panel(
	ctx: SContext<'_>,
	#[description = "Text above the button"]
	#[max_length = 1000]
	message: Option<String>,
) -> Result<(), Error> {
	let description = message.unwrap_or_else(|| {
		"Need to reach the staff privately? Press the button and tell us what's up. We'll \
		 answer in your DMs."
			.to_owned()
	});
	ctx.channel_id()
		.send_message(
			ctx.http(),
			CreateMessage::new()
				.embed(
					CreateEmbed::default()
						.title("Contact the staff")
						.description(description)
						.colour(COLOUR_BLUE),
				)
				.components(vec![open_ticket_button()]),
		)
		.await?;
	ctx.send(
		CreateReply::default()
			.content("Panel posted.")
			.ephemeral(true),
	)
	.await?;
	Ok(())
}

/// Close the ticket of this thread
#[poise::command(slash_command, guild_only, rename = "close", check = "require_moderator")]
async fn modmail_close(
	ctx: SContext<'_>,
	#[description = "Told to the user"]
	#[max_length = 500]
	reason: Option<String>,
) -> Result<(), Error> {
	let data = ctx.data();
	let Some(ticket) = modmail::ticket_by_thread(i64::from(ctx.channel_id()), &data.db).await? else {
		return Err(UserError::new("This isn't a modmail thread.").into());
	};
	if !ticket.is_open() {
		return Err(UserError::new("This ticket is already closed.").into());
	}
	// reply before the thread gets archived
	ctx.send(
		CreateReply::default()
			.embed(notice_embed("Closing", "Closing this ticket.", COLOUR_BLUE))
			.ephemeral(true),
	)
	.await?;
	let reason = reason
		.as_deref()
		.map(str::trim)
		.filter(|reason| !reason.is_empty());
	if !close_ticket(ctx.http(), data, &ticket, ctx.author(), reason).await? {
		return Err(UserError::new("Someone else closed it first.").into());
	}
	Ok(())
}
