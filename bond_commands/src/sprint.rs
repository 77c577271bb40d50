use std::sync::Arc;

use bond_core::{
	config::{
		constants::{
			COLOUR_BLUE, COLOUR_GREEN, COLOUR_ORANGE, SPRINT_MAX_DELAY_MINUTES, SPRINT_MAX_MINUTES,
			SPRINT_MIN_MINUTES,
		},
		types::{Error, SContext, UserError},
	},
	sprints::SprintClock,
	utils::{
		helpers::{discord_timestamp, format_count, notice_embed},
		permissions::{author_level, sprints_unlocked},
	},
};
use bond_db::{
	guild,
	permission::PermissionLevel,
	sprint::{self, Sprint, SprintStatus},
	unix_now,
};
use poise::CreateReply;
use serenity::all::CreateEmbed;
use tracing::info;

fn clock(ctx: SContext<'_>) -> SprintClock {
	SprintClock::new(ctx.data(), Arc::clone(&ctx.serenity_context().http))
}

/// Start and end of a sprint created at `now`
#[must_use]
pub fn sprint_window(now: i64, minutes: u32, delay: u32) -> (i64, i64) {
	let starts_at = now.saturating_add(i64::from(delay) * 60);
	(starts_at, starts_at.saturating_add(i64::from(minutes) * 60))
}

async fn channel_sprint(ctx: SContext<'_>) -> Result<Sprint, Error> {
	sprint::active_in_channel(i64::from(ctx.channel_id()), &ctx.data().db)
		.await?
		.ok_or_else(|| UserError::new("There's no sprint in this channel right now.").into())
}

#[poise::command(
	slash_command,
	guild_only,
	subcommands(
		"sprint_start",
		"sprint_join",
		"sprint_words",
		"sprint_status",
		"sprint_cancel"
	),
	subcommand_required
)]
pub async fn sprint(_: SContext<'_>) -> Result<(), Error> {
	Ok(())
}

/// Start a writing sprint in this channel
#[poise::command(slash_command, guild_only, rename = "start", check = "sprints_unlocked")]
async fn sprint_start(
	ctx: SContext<'_>,
	#[description = "How long to write"]
	#[min = 1]
	#[max = 120]
	minutes: u32,
	#[description = "Minutes until it starts"]
	#[min = 0]
	#[max = 30]
	delay: Option<u32>,
	#[description = "Your word count right now"]
	#[min = 0]
	words: Option<i64>,
) -> Result<(), Error> {
	let Some(guild_id) = ctx.guild_id() else {
		return Ok(());
	};
	let data = ctx.data();
	let delay = delay.unwrap_or(0);
	if !(SPRINT_MIN_MINUTES..=SPRINT_MAX_MINUTES).contains(&minutes) || delay > SPRINT_MAX_DELAY_MINUTES {
		return Err(UserError::new(format!(
			"Sprints last {SPRINT_MIN_MINUTES} to {SPRINT_MAX_MINUTES} minutes and start within \
			 {SPRINT_MAX_DELAY_MINUTES} minutes."
		))
		.into());
	}
	let settings = guild::get_guild_settings(i64::from(guild_id), &data.db).await?;
	if let Some(channel) = settings.sprint_channel
		&& channel != i64::from(ctx.channel_id())
	{
		return Err(UserError::new(format!("Sprints happen in <#{channel}> here.")).into());
	}

	let (starts_at, ends_at) = sprint_window(unix_now(), minutes, delay);
	let starter = i64::from(ctx.author().id);
	let Some(sprint) = sprint::create(
		i64::from(guild_id),
		i64::from(ctx.channel_id()),
		starter,
		starts_at,
		ends_at,
		&data.db,
	)
	.await?
	else {
		return Err(UserError::new("This channel already has a sprint going.").into());
	};
	sprint::join(sprint.id, starter, words.unwrap_or(0), &data.db).await?;
	clock(ctx).arm(sprint.id);
	info!("Sprint {} created by {starter} in {}", sprint.id, sprint.channel_id);

	let when = if delay == 0 {
		"Starting now".to_owned()
	} else {
		format!("Starts {}", discord_timestamp(starts_at, 'R'))
	};
	ctx.send(
		CreateReply::default().embed(notice_embed(
			"Sprint!",
			&format!(
				"{when}, {minutes} minutes, ends at {}.\nJoin with `/sprint join`.",
				discord_timestamp(ends_at, 'T')
			),
			COLOUR_GREEN,
		)),
	)
	.await?;
	Ok(())
}

/// Join the sprint in this channel
#[poise::command(slash_command, guild_only, rename = "join", check = "sprints_unlocked")]
async fn sprint_join(
	ctx: SContext<'_>,
	#[description = "Your word count right now"]
	#[min = 0]
	words: Option<i64>,
) -> Result<(), Error> {
	let sprint = channel_sprint(ctx).await?;
	if sprint.status()? == SprintStatus::Collecting {
		return Err(UserError::new("Too late, this sprint is already over.").into());
	}
	let words = words.unwrap_or(0);
	sprint::join(sprint.id, i64::from(ctx.author().id), words, &ctx.data().db).await?;
	ctx.send(CreateReply::default().embed(notice_embed(
		"Joined",
		&format!(
			"{} joined starting at {} words.",
			ctx.author().display_name(),
			format_count(words)
		),
		COLOUR_GREEN,
	)))
	.await?;
	Ok(())
}

/// Send your word count after the sprint
#[poise::command(slash_command, guild_only, rename = "words")]
async fn sprint_words(
	ctx: SContext<'_>,
	#[description = "Your total word count now"]
	#[min = 0]
	count: i64,
) -> Result<(), Error> {
	let sprint = channel_sprint(ctx).await?;
	if sprint.status()? == SprintStatus::Scheduled {
		return Err(UserError::new("The sprint hasn't started yet.").into());
	}
	let db = &ctx.data().db;
	let user_id = i64::from(ctx.author().id);
	let participants = sprint::participants(sprint.id, db).await?;
	let Some(me) = participants.iter().find(|participant| participant.user_id == user_id) else {
		return Err(UserError::new("You're not in this sprint, `/sprint join` first.").into());
	};
	if count < me.start_words {
		return Err(UserError::new(format!(
			"That's less than the {} words you started with.",
			format_count(me.start_words)
		))
		.into());
	}
	sprint::set_words(sprint.id, user_id, count, db).await?;
	ctx.send(
		CreateReply::default()
			.embed(notice_embed(
				"Counted",
				&format!("{} new words, nice!", format_count(count.saturating_sub(me.start_words))),
				COLOUR_GREEN,
			))
			.ephemeral(true),
	)
	.await?;
	Ok(())
}

/// What the sprint in this channel is up to
#[poise::command(slash_command, guild_only, rename = "status")]
async fn sprint_status(ctx: SContext<'_>) -> Result<(), Error> {
	let sprint = channel_sprint(ctx).await?;
	let participants = sprint::participants(sprint.id, &ctx.data().db).await?;
	let state = match sprint.status()? {
		SprintStatus::Scheduled => format!("Starts {}", discord_timestamp(sprint.starts_at, 'R')),
		SprintStatus::Running => format!("Ends {}", discord_timestamp(sprint.ends_at, 'R')),
		SprintStatus::Collecting => "Waiting for word counts".to_owned(),
		SprintStatus::Finished | SprintStatus::Cancelled => "Over".to_owned(),
	};
	let writers = participants
		.iter()
		.map(|participant| format!("<@{}>", participant.user_id))
		.collect::<Vec<_>>()
		.join(" ");
	ctx.send(
		CreateReply::default().embed(
			CreateEmbed::default()
				.title(format!("Sprint #{}", sprint.id))
				.description(state)
				.field("Started by", format!("<@{}>", sprint.starter_id), true)
				.field("Writers", participants.len().to_string(), true)
				.field("Who", if writers.is_empty() { "Nobody yet".to_owned() } else { writers }, false)
				.colour(COLOUR_BLUE),
		),
	)
	.await?;
	Ok(())
}

/// Cancel the sprint in this channel
#[poise::command(slash_command, guild_only, rename = "cancel")]
async fn sprint_cancel(ctx: SContext<'_>) -> Result<(), Error> {
	let sprint = channel_sprint(ctx).await?;
	if sprint.starter_id != i64::from(ctx.author().id)
		&& author_level(ctx).await? < PermissionLevel::Moderator
	{
		return Err(UserError::new("Only whoever started it or a Moderator can cancel it.").into());
	}
	if !sprint::set_status(sprint.id, SprintStatus::Cancelled, &ctx.data().db).await? {
		return Err(UserError::new("That sprint already ended.").into());
	}
	clock(ctx).disarm(sprint.id);
	info!("Sprint {} cancelled by {}", sprint.id, ctx.author().id);
	ctx.send(CreateReply::default().embed(notice_embed(
		"Sprint cancelled",
		"No words were counted.",
		COLOUR_ORANGE,
	)))
	.await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::sprint_window;

	#[test]
	fn window_starts_after_the_delay() {
		assert_eq!(sprint_window(1_000, 20, 0), (1_000, 2_200));
		assert_eq!(sprint_window(1_000, 20, 5), (1_300, 2_500));
	}
}
