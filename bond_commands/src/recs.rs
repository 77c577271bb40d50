use bond_core::{
	ao3::{
		queue::{EnqueueResult, QueueRequest, enqueue_link},
		url::{Ao3Link, parse_link},
	},
	config::{
		constants::{COLOUR_BLUE, COLOUR_GREEN, COLOUR_RED, COLOUR_YELLOW, NOTES_LIMIT, SEARCH_PAGE_SIZE},
		types::{Error, SContext, UserError, ao3_base_url},
	},
	utils::{
		helpers::{format_count, job_line, notice_embed, rec_embed, series_embed, truncate},
		permissions::{author_level, recs_unlocked, require_moderator, require_trusted},
	},
};
use bond_db::{
	guild,
	parse_queue::{self, JobStatus},
	permission::PermissionLevel,
	recommendation::{self, RandomFilter, Recommendation},
	series::{self, Series},
};
use poise::{ChoiceParameter, CreateReply};
use serenity::all::{
	ComponentInteractionCollector, CreateEmbed, CreateEmbedFooter, CreateInteractionResponse,
	CreateInteractionResponseMessage,
};
use sqlx::PgPool;
use tracing::info;

use crate::prompts::{PAGE_TIMEOUT, confirm, page_buttons, turn_page};

#[derive(ChoiceParameter, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rating {
	#[name = "General Audiences"]
	General,
	#[name = "Teen And Up Audiences"]
	Teen,
	Mature,
	Explicit,
	#[name = "Not Rated"]
	NotRated,
}

impl Rating {
	/// Rating text the way AO3 prints it
	const fn as_ao3(self) -> &'static str {
		match self {
			Self::General => "General Audiences",
			Self::Teen => "Teen And Up Audiences",
			Self::Mature => "Mature",
			Self::Explicit => "Explicit",
			Self::NotRated => "Not Rated",
		}
	}
}

fn link_or_refuse(url: &str) -> Result<Ao3Link, Error> {
	parse_link(url).map_err(|err| UserError::new(format!("That link can't be used: {err}.")).into())
}

#[must_use]
pub fn position_text(position: i64) -> String {
	match position {
		0 => "It's next up.".to_owned(),
		1 => "One job is ahead of it.".to_owned(),
		n => format!("{n} jobs are ahead of it."),
	}
}

#[must_use]
pub fn page_count(total: i64) -> i64 {
	if total <= 0 {
		return 0;
	}
	total
		.saturating_add(SEARCH_PAGE_SIZE)
		.saturating_sub(1)
		/ SEARCH_PAGE_SIZE
}

fn search_line(rec: &Recommendation) -> String {
	let authors = if rec.authors.is_empty() {
		"Anonymous".to_owned()
	} else {
		rec.authors.join(", ")
	};
	let words = rec
		.words
		.map_or_else(String::new, |words| format!(" · {} words", format_count(words)));
	format!(
		"**#{}** [{}]({}) by {}{words}",
		rec.id,
		truncate(&rec.title, 100),
		rec.url,
		truncate(&authors, 80)
	)
}

fn search_embed(query: &str, recs: &[Recommendation], page: i64, pages: i64, total: i64) -> CreateEmbed {
	CreateEmbed::default()
		.title(format!("Recs matching \"{}\"", truncate(query, 100)))
		.description(
			recs.iter()
				.map(search_line)
				.collect::<Vec<_>>()
				.join("\n"),
		)
		.colour(COLOUR_BLUE)
		.footer(CreateEmbedFooter::new(format!(
			"Page {}/{pages} · {total} results",
			page.saturating_add(1)
		)))
}

async fn catalogued_works(series: &Series, db: &PgPool) -> Result<Vec<Recommendation>, Error> {
	recommendation::by_work_ids(&series.work_ids, db).await
}

async fn fetch_rec(ctx: SContext<'_>, id: i64) -> Result<Recommendation, Error> {
	recommendation::get(id, &ctx.data().db)
		.await?
		.ok_or_else(|| UserError::new(format!("There's no rec #{id}.")).into())
}

/// The submitter and Moderators may change a rec
async fn may_edit(ctx: SContext<'_>, rec: &Recommendation) -> Result<bool, Error> {
	Ok(rec.recommended_by == i64::from(ctx.author().id)
		|| author_level(ctx).await? >= PermissionLevel::Moderator)
}

/// Refuses new recs outside the configured rec channel
async fn in_rec_channel(ctx: SContext<'_>) -> Result<(), Error> {
	let Some(guild_id) = ctx.guild_id() else {
		return Ok(());
	};
	let settings = guild::get_guild_settings(i64::from(guild_id), &ctx.data().db).await?;
	match settings.rec_channel {
		Some(channel) if channel != i64::from(ctx.channel_id()) => {
			Err(UserError::new(format!("Recs go in <#{channel}> here.")).into())
		}
		_ => Ok(()),
	}
}

async fn queue_link(
	ctx: SContext<'_>,
	link: Ao3Link,
	notes: Option<String>,
	refresh: bool,
) -> Result<(), Error> {
	ctx.defer().await?;
	let data = ctx.data();
	let request = QueueRequest {
		requested_by: i64::from(ctx.author().id),
		guild_id: ctx.guild_id().map(i64::from),
		channel_id: Some(i64::from(ctx.channel_id())),
		notes,
		refresh,
	};
	let reply = match enqueue_link(&data.db, &data.queue_notify, ao3_base_url(), link, request).await? {
		EnqueueResult::CataloguedWork(rec) => CreateReply::default()
			.content(format!("That one is already catalogued as rec #{}.", rec.id))
			.embed(rec_embed(&rec)),
		EnqueueResult::CataloguedSeries(series) => {
			let catalogued = catalogued_works(&series, &data.db).await?;
			CreateReply::default()
				.content(format!("That series is already catalogued as series #{}.", series.id))
				.embed(series_embed(&series, &catalogued))
		}
		EnqueueResult::Queued {
			job,
			position,
			existing,
		} => {
			let description = if existing {
				format!(
					"<{}> is already waiting as job #{}. {}",
					job.url,
					job.id,
					position_text(position)
				)
			} else {
				format!(
					"<{}> was queued as job #{}. {}\nI'll ping you here once it's parsed.",
					job.url,
					job.id,
					position_text(position)
				)
			};
			CreateReply::default().embed(notice_embed("Queued", &description, COLOUR_YELLOW))
		}
	};
	ctx.send(reply).await?;
	Ok(())
}

#[poise::command(
	slash_command,
	guild_only,
	subcommands(
		"rec_add",
		"rec_info",
		"rec_random",
		"rec_search",
		"rec_remove",
		"rec_notes",
		"rec_refresh"
	),
	subcommand_required
)]
pub async fn rec(_: SContext<'_>) -> Result<(), Error> {
	Ok(())
}

/// Recommend an AO3 work, chapter or series
#[poise::command(slash_command, guild_only, rename = "add", check = "recs_unlocked")]
async fn rec_add(
	ctx: SContext<'_>,
	#[description = "AO3 link"] url: String,
	#[description = "Why you recommend it"]
	#[max_length = 500]
	notes: Option<String>,
) -> Result<(), Error> {
	let link = link_or_refuse(&url)?;
	in_rec_channel(ctx).await?;
	let notes = notes
		.map(|notes| notes.trim().to_owned())
		.filter(|notes| !notes.is_empty());
	queue_link(ctx, link, notes, false).await
}

/// Show one rec
#[poise::command(slash_command, guild_only, rename = "info")]
async fn rec_info(ctx: SContext<'_>, #[description = "Rec number"] id: i64) -> Result<(), Error> {
	let rec = fetch_rec(ctx, id).await?;
	ctx.send(CreateReply::default().embed(rec_embed(&rec))).await?;
	Ok(())
}

/// Pick a random rec
#[poise::command(slash_command, guild_only, rename = "random")]
async fn rec_random(
	ctx: SContext<'_>,
	#[description = "Tag, fandom, relationship or character"] tag: Option<String>,
	#[description = "Rating"] rating: Option<Rating>,
) -> Result<(), Error> {
	let filter = RandomFilter {
		tag: tag
			.map(|tag| tag.trim().to_owned())
			.filter(|tag| !tag.is_empty()),
		rating: rating.map(|rating| rating.as_ao3().to_owned()),
	};
	match recommendation::random(&filter, &ctx.data().db).await? {
		Some(rec) => {
			ctx.send(CreateReply::default().embed(rec_embed(&rec))).await?;
		}
		None => {
			ctx.send(
				CreateReply::default()
					.embed(notice_embed(
						"No recs",
						"Nothing in the catalogue matches that.",
						COLOUR_YELLOW,
					))
					.ephemeral(true),
			)
			.await?;
		}
	}
	Ok(())
}

/// Search recs by title, author or tag
#[poise::command(slash_command, guild_only, rename = "search")]
async fn rec_search(
	ctx: SContext<'_>,
	#[description = "What to look for"]
	#[min_length = 2]
	#[max_length = 100]
	query: String,
) -> Result<(), Error> {
	let db = &ctx.data().db;
	let total = recommendation::count_search(&query, db).await?;
	if total == 0 {
		return Err(UserError::new(format!("No recs match \"{}\".", truncate(&query, 100))).into());
	}
	let pages = page_count(total);
	let mut page = 0;
	let recs = recommendation::search(&query, SEARCH_PAGE_SIZE, 0, db).await?;
	let prefix = ctx.id().to_string();
	let mut embed = search_embed(&query, &recs, page, pages, total);
	let reply = ctx
		.send(
			CreateReply::default()
				.embed(embed.clone())
				.components(vec![page_buttons(&prefix, page, pages)]),
		)
		.await?;

	loop {
		let filter_prefix = prefix.clone();
		let Some(press) = ComponentInteractionCollector::new(ctx.serenity_context())
			.author_id(ctx.author().id)
			.filter(move |press| press.data.custom_id.starts_with(filter_prefix.as_str()))
			.timeout(PAGE_TIMEOUT)
			.await
		else {
			break;
		};
		page = turn_page(&press.data.custom_id, page, pages);
		let recs = recommendation::search(
			&query,
			SEARCH_PAGE_SIZE,
			page.saturating_mul(SEARCH_PAGE_SIZE),
			db,
		)
		.await?;
		embed = search_embed(&query, &recs, page, pages, total);
		press
			.create_response(
				ctx.serenity_context(),
				CreateInteractionResponse::UpdateMessage(
					CreateInteractionResponseMessage::new()
						.embed(embed.clone())
						.components(vec![page_buttons(&prefix, page, pages)]),
				),
			)
			.await?;
	}
	reply
		.edit(ctx, CreateReply::default().embed(embed).components(vec![]))
		.await?;
	Ok(())
}

/// Remove a rec from the catalogue
#[poise::command(slash_command, guild_only, rename = "remove")]
async fn rec_remove(ctx: SContext<'_>, #[description = "Rec number"] id: i64) -> Result<(), Error> {
	let rec = fetch_rec(ctx, id).await?;
	if !may_edit(ctx, &rec).await? {
		return Err(UserError::new("Only the person who added it or a Moderator can remove it.").into());
	}
	let prompt = notice_embed(
		"Remove rec?",
		&format!("Rec #{} \"{}\" will be gone for good.", rec.id, rec.title),
		COLOUR_RED,
	);
	if !confirm(ctx, prompt).await? {
		return Ok(());
	}
	if recommendation::delete(rec.id, &ctx.data().db).await? {
		info!("Rec {} removed by {}", rec.id, ctx.author().id);
		ctx.send(
			CreateReply::default()
				.embed(notice_embed("Removed", &format!("Rec #{} is gone.", rec.id), COLOUR_GREEN))
				.ephemeral(true),
		)
		.await?;
	}
	Ok(())
}

/// Change or clear the notes on a rec
#[poise::command(slash_command, guild_only, rename = "notes", check = "recs_unlocked")]
async fn rec_notes(
	ctx: SContext<'_>,
	#[description = "Rec number"] id: i64,
	#[description = "New notes, leave empty to clear"]
	#[max_length = 500]
	text: Option<String>,
) -> Result<(), Error> {
	let rec = fetch_rec(ctx, id).await?;
	if !may_edit(ctx, &rec).await? {
		return Err(UserError::new("Only the person who added it or a Moderator can edit its notes.").into());
	}
	let notes = text
		.as_deref()
		.map(str::trim)
		.filter(|notes| !notes.is_empty())
		.map(|notes| truncate(notes, NOTES_LIMIT));
	recommendation::set_notes(rec.id, notes.as_deref(), &ctx.data().db).await?;
	let message = if notes.is_some() {
		format!("Notes on rec #{} updated.", rec.id)
	} else {
		format!("Notes on rec #{} cleared.", rec.id)
	};
	ctx.send(
		CreateReply::default()
			.embed(notice_embed("Done", &message, COLOUR_GREEN))
			.ephemeral(true),
	)
	.await?;
	Ok(())
}

/// Queue a rec again to pick up new chapters and stats
#[poise::command(slash_command, guild_only, rename = "refresh", check = "require_trusted")]
async fn rec_refresh(ctx: SContext<'_>, #[description = "Rec number"] id: i64) -> Result<(), Error> {
	let rec = fetch_rec(ctx, id).await?;
	queue_link(ctx, Ao3Link::Work(rec.ao3_work_id.cast_unsigned()), None, true).await
}

#[poise::command(
	slash_command,
	guild_only,
	subcommands("series_add", "series_info", "series_remove"),
	subcommand_required
)]
pub async fn series(_: SContext<'_>) -> Result<(), Error> {
	Ok(())
}

/// Recommend a whole AO3 series
#[poise::command(slash_command, guild_only, rename = "add", check = "recs_unlocked")]
async fn series_add(
	ctx: SContext<'_>,
	#[description = "AO3 series link"] url: String,
	#[description = "Why you recommend it"]
	#[max_length = 500]
	notes: Option<String>,
) -> Result<(), Error> {
	let link = link_or_refuse(&url)?;
	if !link.is_series() {
		return Err(UserError::new("That's not a series link, use `/rec add` for works.").into());
	}
	in_rec_channel(ctx).await?;
	let notes = notes
		.map(|notes| notes.trim().to_owned())
		.filter(|notes| !notes.is_empty());
	queue_link(ctx, link, notes, false).await
}

/// Show a catalogued series in reading order
#[poise::command(slash_command, guild_only, rename = "info")]
async fn series_info(ctx: SContext<'_>, #[description = "Series number"] id: i64) -> Result<(), Error> {
	let db = &ctx.data().db;
	let Some(series) = series::get(id, db).await? else {
		return Err(UserError::new(format!("There's no series #{id}.")).into());
	};
	let catalogued = catalogued_works(&series, db).await?;
	ctx.send(CreateReply::default().embed(series_embed(&series, &catalogued)))
		.await?;
	Ok(())
}

/// Remove a series; its works stay catalogued
#[poise::command(slash_command, guild_only, rename = "remove")]
async fn series_remove(ctx: SContext<'_>, #[description = "Series number"] id: i64) -> Result<(), Error> {
	let db = &ctx.data().db;
	let Some(series) = series::get(id, db).await? else {
		return Err(UserError::new(format!("There's no series #{id}.")).into());
	};
	if series.recommended_by != i64::from(ctx.author().id)
		&& author_level(ctx).await? < PermissionLevel::Moderator
	{
		return Err(UserError::new("Only the person who added it or a Moderator can remove it.").into());
	}
	let prompt = notice_embed(
		"Remove series?",
		&format!(
			"Series #{} \"{}\" will be gone. Recs of its works stay.",
			series.id, series.name
		),
		COLOUR_RED,
	);
	if !confirm(ctx, prompt).await? {
		return Ok(());
	}
	if series::delete(series.id, db).await? {
		info!("Series {} removed by {}", series.id, ctx.author().id);
		ctx.send(
			CreateReply::default()
				.embed(notice_embed("Removed", &format!("Series #{} is gone.", series.id), COLOUR_GREEN))
				.ephemeral(true),
		)
		.await?;
	}
	Ok(())
}

#[poise::command(
	slash_command,
	guild_only,
	subcommands("queue_status", "queue_retry"),
	subcommand_required
)]
pub async fn queue(_: SContext<'_>) -> Result<(), Error> {
	Ok(())
}

/// Your recent parse jobs and the queue at large
#[poise::command(slash_command, guild_only, rename = "status")]
async fn queue_status(ctx: SContext<'_>) -> Result<(), Error> {
	let db = &ctx.data().db;
	let jobs = parse_queue::jobs_for_user(i64::from(ctx.author().id), 10, db).await?;
	let counts = parse_queue::status_counts(db).await?;
	let catalogued = recommendation::count(db).await?;
	let overview = counts
		.iter()
		.map(|(status, count)| format!("{status}: {count}"))
		.collect::<Vec<_>>()
		.join(" · ");
	let mine = if jobs.is_empty() {
		"You haven't queued anything yet.".to_owned()
	} else {
		jobs.iter().map(job_line).collect::<Vec<_>>().join("\n")
	};
	let waiting: i64 = counts
		.iter()
		.filter(|(status, _)| status.is_active())
		.map(|(_, count)| *count)
		.sum();
	ctx.send(
		CreateReply::default()
			.embed(
				CreateEmbed::default()
					.title("Parse queue")
					.description(truncate(&mine, 4096))
					.field("Overall", overview, false)
					.field("Waiting", waiting.to_string(), true)
					.field("Recs catalogued", format_count(catalogued), true)
					.colour(COLOUR_BLUE),
			)
			.ephemeral(true),
	)
	.await?;
	Ok(())
}

/// Put a failed job back in the queue
#[poise::command(slash_command, guild_only, rename = "retry", check = "require_moderator")]
async fn queue_retry(ctx: SContext<'_>, #[description = "Job number"] job: i64) -> Result<(), Error> {
	let data = ctx.data();
	let Some(existing) = parse_queue::get(job, &data.db).await? else {
		return Err(UserError::new(format!("There's no job #{job}.")).into());
	};
	if existing.status().ok() != Some(JobStatus::Failed) {
		return Err(UserError::new(format!(
			"Job #{job} is {}, only failed jobs can be retried.",
			existing.status
		))
		.into());
	}
	if !parse_queue::requeue(job, &data.db).await? {
		return Err(UserError::new(format!(
			"Job #{job} couldn't be requeued, that link is already waiting in another job."
		))
		.into());
	}
	data.queue_notify.notify_one();
	info!("Job {job} requeued by {}", ctx.author().id);
	ctx.send(
		CreateReply::default()
			.embed(notice_embed(
				"Requeued",
				&format!("Job #{job} is pending again."),
				COLOUR_GREEN,
			))
			.ephemeral(true),
	)
	.await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::{page_count, position_text};

	#[test]
	fn pages_round_up() {
		assert_eq!(page_count(0), 0);
		assert_eq!(page_count(1), 1);
		assert_eq!(page_count(5), 1);
		assert_eq!(page_count(6), 2);
		assert_eq!(page_count(11), 3);
	}

	#[test]
	fn positions_read_naturally() {
		assert_eq!(position_text(0), "It's next up.");
		assert_eq!(position_text(1), "One job is ahead of it.");
		assert_eq!(position_text(4), "4 jobs are ahead of it.");
	}
}
