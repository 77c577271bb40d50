use std::time::Duration;

use bond_core::config::types::{Error, SContext};
use poise::CreateReply;
use serenity::all::{
	ButtonStyle, ComponentInteractionCollector, CreateActionRow, CreateButton, CreateEmbed,
	CreateInteractionResponse, CreateInteractionResponseMessage,
};

const CONFIRM_TIMEOUT: Duration = Duration::from_secs(60);
pub const PAGE_TIMEOUT: Duration = Duration::from_secs(600);

#[must_use]
pub fn page_buttons(prefix: &str, page: i64, pages: i64) -> CreateActionRow {
	CreateActionRow::Buttons(vec![
		CreateButton::new(format!("{prefix}_prev"))
			.label("Previous")
			.style(ButtonStyle::Secondary)
			.disabled(page <= 0),
		CreateButton::new(format!("{prefix}_next"))
			.label("Next")
			.style(ButtonStyle::Secondary)
			.disabled(page.saturating_add(1) >= pages),
	])
}

/// Page after a press on `custom_id`, clamped to `0..pages`
#[must_use]
pub fn turn_page(custom_id: &str, page: i64, pages: i64) -> i64 {
	let last = pages.saturating_sub(1).max(0);
	if custom_id.ends_with("_next") {
		page.saturating_add(1).min(last)
	} else if custom_id.ends_with("_prev") {
		page.saturating_sub(1).max(0)
	} else {
		page
	}
}

/// Asks the author to confirm with buttons; silence counts as no
pub async fn confirm(ctx: SContext<'_>, embed: CreateEmbed) -> Result<bool, Error> {
	let prefix = ctx.id().to_string();
	let buttons = CreateActionRow::Buttons(vec![
		CreateButton::new(format!("{prefix}_confirm"))
			.label("Confirm")
			.style(ButtonStyle::Danger),
		CreateButton::new(format!("{prefix}_cancel"))
			.label("Cancel")
			.style(ButtonStyle::Secondary),
	]);
	let reply = ctx
		.send(
			CreateReply::default()
				.embed(embed.clone())
				.components(vec![buttons])
				.ephemeral(true),
		)
		.await?;

	let author = ctx.author().id;
	let filter_prefix = prefix.clone();
	let press = ComponentInteractionCollector::new(ctx.serenity_context())
		.author_id(author)
		.filter(move |press| press.data.custom_id.starts_with(filter_prefix.as_str()))
		.timeout(CONFIRM_TIMEOUT)
		.await;

	let Some(press) = press else {
		reply
			.edit(
				ctx,
				CreateReply::default()
					.content("Timed out, nothing was changed.")
					.components(vec![]),
			)
			.await?;
		return Ok(false);
	};
	let confirmed = press.data.custom_id == format!("{prefix}_confirm");
	press
		.create_response(
			ctx.serenity_context(),
			CreateInteractionResponse::UpdateMessage(
				CreateInteractionResponseMessage::new()
					.embed(embed)
					.components(vec![]),
			),
		)
		.await?;
	Ok(confirmed)
}

#[cfg(test)]
mod tests {
	use super::turn_page;

	#[test]
	fn pages_stay_in_range() {
		assert_eq!(turn_page("1_next", 0, 3), 1);
		assert_eq!(turn_page("1_next", 2, 3), 2);
		assert_eq!(turn_page("1_prev", 0, 3), 0);
		assert_eq!(turn_page("1_prev", 2, 3), 1);
		assert_eq!(turn_page("1_other", 1, 3), 1);
		assert_eq!(turn_page("1_next", 0, 0), 0);
	}
}
