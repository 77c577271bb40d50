use anyhow::Result as AResult;
use bond_db::modmail;
use serenity::all::{
	ComponentInteraction, Context, CreateInteractionResponse, CreateInteractionResponseMessage,
	EditInteractionResponse, GuildId, Interaction, ModalInteraction,
};
use tracing::warn;

use crate::{
	config::{
		constants::{MODMAIL_BODY_INPUT, MODMAIL_MODAL_PREFIX, MODMAIL_OPEN_BUTTON, MODMAIL_SUBJECT_INPUT},
		types::{Data, Feature},
	},
	utils::modmail::{modal_guild, modal_value, open_ticket, ticket_lock, ticket_modal},
};

/// Routes the persistent modmail button and its modal; command interactions
/// are left to the framework.
pub async fn handle_interaction(ctx: &Context, data: &Data, interaction: &Interaction) -> AResult<()> {
	if !data.bot.has(Feature::Modmail) {
		return Ok(());
	}
	match interaction {
		Interaction::Component(component) if component.data.custom_id == MODMAIL_OPEN_BUTTON => {
			open_button(ctx, data, component).await
		}
		Interaction::Modal(modal) if modal.data.custom_id.starts_with(MODMAIL_MODAL_PREFIX) => {
			submit_modal(ctx, data, modal).await
		}
		_ => Ok(()),
	}
}

async fn respond(ctx: &Context, component: &ComponentInteraction, content: &str) -> AResult<()> {
	component
		.create_response(
			&ctx.http,
			CreateInteractionResponse::Message(
				CreateInteractionResponseMessage::new()
					.content(content)
					.ephemeral(true),
			),
		)
		.await?;
	Ok(())
}

async fn open_button(ctx: &Context, data: &Data, component: &ComponentInteraction) -> AResult<()> {
	let Some(guild_id) = component
		.guild_id
		.or_else(|| data.bot.modmail_guild_id.map(GuildId::new))
	else {
		return respond(ctx, component, "Modmail isn't set up for this bot.").await;
	};
	if let Some(lock) = ticket_lock(data, guild_id, component.user.id).await? {
		return respond(ctx, component, &format!("Your ticket can't be opened. {lock}")).await;
	}
	if modmail::open_ticket_for_user(i64::from(guild_id), i64::from(component.user.id), &data.db)
		.await?
		.is_some()
	{
		return respond(
			ctx,
			component,
			"You already have an open ticket. DM me and I'll pass it on.",
		)
		.await;
	}
	component
		.create_response(&ctx.http, CreateInteractionResponse::Modal(ticket_modal(guild_id)))
		.await?;
	Ok(())
}

async fn submit_modal(ctx: &Context, data: &Data, modal: &ModalInteraction) -> AResult<()> {
	modal
		.create_response(
			&ctx.http,
			CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new().ephemeral(true)),
		)
		.await?;

	let reply = match (
		modal_guild(&modal.data.custom_id),
		modal_value(&modal.data, MODMAIL_SUBJECT_INPUT),
		modal_value(&modal.data, MODMAIL_BODY_INPUT),
	) {
		(Some(guild_id), Some(subject), Some(body)) => {
			match open_ticket(ctx, data, guild_id, &modal.user, subject, body).await {
				Ok(opening) => opening.reply(),
				Err(err) => {
					warn!("Failed to open modmail ticket for {}: {err:?}", modal.user.id);
					"Something went wrong while opening your ticket, please try again later."
						.to_owned()
				}
			}
		}
		_ => "Both a subject and a message are needed.".to_owned(),
	};
	modal
		.edit_response(&ctx.http, EditInteractionResponse::new().content(reply))
		.await?;
	Ok(())
}
