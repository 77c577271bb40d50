use anyhow::{Context as _, Result as AResult};
use bond_db::{
	guild,
	modmail::{self, ModmailTicket, TicketClaim},
};
use serenity::all::{
	ActionRowComponent, Attachment, ButtonStyle, ChannelId, Context, CreateActionRow, CreateButton,
	CreateEmbed, CreateEmbedAuthor, CreateInputText, CreateMessage, CreateModal, CreateThread,
	EditThread, GuildId, Http, InputTextStyle, ModalInteractionData, User, UserId,
};
use tracing::{info, warn};

use crate::{
	config::{
		constants::{
			COLOUR_BLUE, COLOUR_GREEN, COLOUR_ORANGE, MODMAIL_BODY_INPUT, MODMAIL_INTERNAL_PREFIX,
			MODMAIL_MODAL_PREFIX, MODMAIL_OPEN_BUTTON, MODMAIL_SUBJECT_INPUT,
		},
		types::{Data, Feature},
	},
	utils::{
		helpers::{post_to_log, truncate},
		permissions::{active_lock, lock_message},
	},
};

const MESSAGE_LIMIT: usize = 2000;

#[must_use]
pub fn open_ticket_button() -> CreateActionRow {
	CreateActionRow::Buttons(vec![
		CreateButton::new(MODMAIL_OPEN_BUTTON)
			.label("Open ticket")
			.emoji('📨')
			.style(ButtonStyle::Primary),
	])
}

#[must_use]
pub fn ticket_modal(guild_id: GuildId) -> CreateModal {
	CreateModal::new(format!("{MODMAIL_MODAL_PREFIX}{guild_id}"), "Contact the staff").components(vec![
		CreateActionRow::InputText(
			CreateInputText::new(InputTextStyle::Short, "Subject", MODMAIL_SUBJECT_INPUT)
				.placeholder("What is this about?")
				.min_length(3)
				.max_length(80)
				.required(true),
		),
		CreateActionRow::InputText(
			CreateInputText::new(InputTextStyle::Paragraph, "Message", MODMAIL_BODY_INPUT)
				.placeholder("Tell us what's going on")
				.min_length(1)
				.max_length(1800)
				.required(true),
		),
	])
}

/// Guild a ticket modal was opened for
#[must_use]
pub fn modal_guild(custom_id: &str) -> Option<GuildId> {
	custom_id
		.strip_prefix(MODMAIL_MODAL_PREFIX)?
		.parse::<u64>()
		.ok()
		.filter(|id| *id != 0)
		.map(GuildId::new)
}

/// Value of the text input `custom_id` in a submitted modal
#[must_use]
pub fn modal_value<'a>(data: &'a ModalInteractionData, custom_id: &str) -> Option<&'a str> {
	data.components
		.iter()
		.flat_map(|row| row.components.iter())
		.find_map(|component| match component {
			ActionRowComponent::InputText(input) if input.custom_id == custom_id => {
				input.value.as_deref()
			}
			_ => None,
		})
		.map(str::trim)
		.filter(|value| !value.is_empty())
}

#[must_use]
pub fn is_internal_note(content: &str) -> bool {
	content.trim_start().starts_with(MODMAIL_INTERNAL_PREFIX)
}

/// Message text plus attachment links, fitted into one Discord message
#[must_use]
pub fn relay_content(content: &str, attachments: &[Attachment]) -> String {
	let urls: Vec<&str> = attachments.iter().map(|a| a.url.as_str()).collect();
	relay_text(content, &urls)
}

fn relay_text(content: &str, urls: &[&str]) -> String {
	let mut text = content.trim().to_owned();
	for url in urls {
		if !text.is_empty() {
			text.push('\n');
		}
		text.push_str(url);
	}
	if text.is_empty() {
		text.push_str("*empty message*");
	}
	truncate(&text, MESSAGE_LIMIT).into_owned()
}

fn thread_name(user: &User, subject: &str) -> String {
	truncate(&format!("{} · {subject}", user.name), 100).into_owned()
}

pub enum TicketOpening {
	Opened(ModmailTicket),
	AlreadyOpen(ModmailTicket),
	NotConfigured,
	Locked(String),
}

impl TicketOpening {
	/// What to tell the user who tried to open a ticket
	#[must_use]
	pub fn reply(&self) -> String {
		match self {
			Self::Opened(_) => {
				"Your ticket is open. The staff will answer here in DMs; anything else you send \
				 me is added to the ticket."
					.to_owned()
			}
			Self::AlreadyOpen(_) => {
				"You already have an open ticket. Just DM me and I'll pass it on.".to_owned()
			}
			Self::NotConfigured => "Modmail isn't set up in that server yet.".to_owned(),
			Self::Locked(message) => format!("Your ticket can't be opened. {message}"),
		}
	}
}

pub async fn ticket_lock(data: &Data, guild_id: GuildId, user_id: UserId) -> AResult<Option<String>> {
	Ok(active_lock(data, guild_id, user_id, Feature::Modmail)
		.await?
		.map(|lock| lock_message(&lock, Feature::Modmail)))
}

/// Creates the staff thread and the ticket row for a user
pub async fn open_ticket(
	ctx: &Context,
	data: &Data,
	guild_id: GuildId,
	user: &User,
	subject: &str,
	body: &str,
) -> AResult<TicketOpening> {
	if let Some(message) = ticket_lock(data, guild_id, user.id).await? {
		return Ok(TicketOpening::Locked(message));
	}
	let guild_id_i64 = i64::from(guild_id);
	let user_id_i64 = i64::from(user.id);
	if let Some(ticket) = modmail::open_ticket_for_user(guild_id_i64, user_id_i64, &data.db).await? {
		return Ok(TicketOpening::AlreadyOpen(ticket));
	}
	let Some(staff_channel) = guild::get_guild_settings(guild_id_i64, &data.db)
		.await?
		.modmail_channel
	else {
		return Ok(TicketOpening::NotConfigured);
	};
	let staff_channel = ChannelId::new(staff_channel.cast_unsigned());

	let header = staff_channel
		.send_message(
			&ctx.http,
			CreateMessage::new().embed(
				CreateEmbed::default()
					.title(truncate(subject, 256))
					.author(CreateEmbedAuthor::new(&user.name).icon_url(user.face()))
					.description(format!(
						"New ticket from <@{}>. Replies in the thread go to the user; start a \
						 message with `{MODMAIL_INTERNAL_PREFIX}` to keep it internal.",
						user.id
					))
					.colour(COLOUR_ORANGE),
			),
		)
		.await
		.context("Failed to post modmail ticket header")?;
	let thread = staff_channel
		.create_thread_from_message(&ctx.http, header.id, CreateThread::new(thread_name(user, subject)))
		.await
		.context("Failed to create modmail thread")?;

	let ticket = match modmail::claim_ticket(
		guild_id_i64,
		user_id_i64,
		i64::from(thread.id),
		subject,
		&data.db,
	)
	.await?
	{
		TicketClaim::Opened(ticket) => ticket,
		TicketClaim::Taken(winner) => {
			thread
				.id
				.delete(&ctx.http)
				.await
				.context("Failed to remove duplicate modmail thread")?;
			return Ok(TicketOpening::AlreadyOpen(winner));
		}
	};

	thread
		.id
		.send_message(&ctx.http, user_message(user, body))
		.await
		.context("Failed to post modmail ticket body")?;
	modmail::log_message(ticket.id, user_id_i64, false, body, &data.db).await?;
	info!("Opened modmail ticket {} for user {} in guild {guild_id}", ticket.id, user.id);
	Ok(TicketOpening::Opened(ticket))
}

fn user_message(user: &User, content: &str) -> CreateMessage {
	CreateMessage::new().embed(
		CreateEmbed::default()
			.author(CreateEmbedAuthor::new(&user.name).icon_url(user.face()))
			.description(truncate(content, MESSAGE_LIMIT))
			.colour(COLOUR_BLUE),
	)
}

/// Forwards a DM into the user's ticket thread
pub async fn relay_from_user(
	ctx: &Context,
	data: &Data,
	ticket: &ModmailTicket,
	user: &User,
	content: &str,
) -> AResult<()> {
	ChannelId::new(ticket.thread_id.cast_unsigned())
		.send_message(&ctx.http, user_message(user, content))
		.await
		.context("Failed to relay DM into modmail thread")?;
	modmail::log_message(ticket.id, i64::from(user.id), false, content, &data.db).await
}

/// Forwards a staff reply from the thread to the ticket's user
pub async fn relay_from_staff(
	ctx: &Context,
	data: &Data,
	ticket: &ModmailTicket,
	staff: &User,
	content: &str,
) -> AResult<()> {
	let user = UserId::new(ticket.user_id.cast_unsigned());
	let guild_name = GuildId::new(ticket.guild_id.cast_unsigned())
		.name(&ctx.cache)
		.unwrap_or_else(|| "Server".to_owned());
	user.direct_message(
		&ctx.http,
		CreateMessage::new().embed(
			CreateEmbed::default()
				.author(CreateEmbedAuthor::new(format!("{guild_name} staff")))
				.description(truncate(content, MESSAGE_LIMIT))
				.colour(COLOUR_GREEN),
		),
	)
	.await
	.context("Failed to relay staff reply to user")?;
	modmail::log_message(ticket.id, i64::from(staff.id), true, content, &data.db).await
}

/// Closes `ticket`, tells the user and archives the thread
pub async fn close_ticket(
	http: &Http,
	data: &Data,
	ticket: &ModmailTicket,
	closed_by: &User,
	reason: Option<&str>,
) -> AResult<bool> {
	if !modmail::close_ticket(ticket.id, i64::from(closed_by.id), &data.db).await? {
		return Ok(false);
	}
	let reason_line = reason.map_or_else(String::new, |reason| format!("\nReason: {reason}"));
	let user = UserId::new(ticket.user_id.cast_unsigned());
	if let Err(err) = user
		.direct_message(
			http,
			CreateMessage::new().embed(
				CreateEmbed::default()
					.title("Ticket closed")
					.description(format!(
						"Your ticket \"{}\" was closed by the staff.{reason_line}\nDM me again \
						 if you need anything else.",
						ticket.subject
					))
					.colour(COLOUR_ORANGE),
			),
		)
		.await
	{
		warn!("Failed to tell user {user} about closed ticket {}: {err}", ticket.id);
	}
	let thread = ChannelId::new(ticket.thread_id.cast_unsigned());
	thread
		.say(http, format!("Ticket closed by <@{}>.{reason_line}", closed_by.id))
		.await
		.context("Failed to announce ticket close")?;
	thread
		.edit_thread(http, EditThread::new().archived(true).locked(true))
		.await
		.context("Failed to archive modmail thread")?;
	post_to_log(
		http,
		data,
		GuildId::new(ticket.guild_id.cast_unsigned()),
		CreateEmbed::default()
			.title("Ticket closed")
			.description(format!(
				"\"{}\" from <@{}> closed by <@{}> in <#{}>.{reason_line}",
				ticket.subject, ticket.user_id, closed_by.id, ticket.thread_id
			))
			.colour(COLOUR_ORANGE),
	)
	.await;
	info!("Closed modmail ticket {} ({})", ticket.id, closed_by.id);
	Ok(true)
}

#[cfg(test)]
mod tests {
	use serenity::all::GuildId;

	use super::{is_internal_note, modal_guild, relay_text};

	#[test]
	fn modal_ids_carry_the_guild() {
		assert_eq!(modal_guild("modmail:modal:1234"), Some(GuildId::new(1234)));
		assert_eq!(modal_guild("modmail:modal:0"), None);
		assert_eq!(modal_guild("modmail:modal:abc"), None);
		assert_eq!(modal_guild("other:1234"), None);
	}

	#[test]
	fn internal_notes_start_with_a_hash() {
		assert!(is_internal_note("# checking their history"));
		assert!(is_internal_note("  #note"));
		assert!(!is_internal_note("Hi! #1 priority"));
	}

	#[test]
	fn relayed_text_includes_attachments() {
		assert_eq!(
			relay_text("look", &["https://cdn.example/a.png"]),
			"look\nhttps://cdn.example/a.png"
		);
		assert_eq!(relay_text("", &[]), "*empty message*");
		assert_eq!(relay_text(&"x".repeat(2500), &[]).chars().count(), 2000);
	}
}
