use std::borrow::Cow;

use bond_db::{
	guild, parse_queue::ParseJob, profile::Profile, recommendation::Recommendation,
	series::Series,
};
use serenity::all::{ChannelId, CreateEmbed, CreateEmbedFooter, CreateMessage, GuildId, Http};
use tracing::warn;

use crate::{
	ao3::url::tag_url,
	config::{
		constants::{
			COLOUR_BLUE, EMBED_DESCRIPTION_LIMIT, EMBED_FIELD_LIMIT, SUMMARY_PREVIEW_LIMIT,
			TAG_PREVIEW_LIMIT,
		},
		types::{Data, ao3_base_url},
	},
};

/// Cuts `text` to at most `limit` characters, marking the cut with an ellipsis
#[must_use]
pub fn truncate(text: &str, limit: usize) -> Cow<'_, str> {
	if text.chars().count() <= limit {
		return Cow::Borrowed(text);
	}
	let mut cut: String = text.chars().take(limit.saturating_sub(1)).collect();
	cut.push('…');
	Cow::Owned(cut)
}

#[must_use]
pub fn format_count(value: i64) -> String {
	let digits = value.unsigned_abs().to_string();
	let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
	if value < 0 {
		out.push('-');
	}
	for (index, digit) in digits.chars().enumerate() {
		if index > 0 && (digits.len() - index) % 3 == 0 {
			out.push(',');
		}
		out.push(digit);
	}
	out
}

/// `a, b, c and 4 more`, or `None` for an empty list
#[must_use]
pub fn preview_list(items: &[String], limit: usize) -> String {
	if items.is_empty() {
		return "None".to_owned();
	}
	let shown = items
		.iter()
		.take(limit)
		.map(String::as_str)
		.collect::<Vec<_>>()
		.join(", ");
	let hidden = items.len().saturating_sub(limit);
	if hidden == 0 {
		shown
	} else {
		format!("{shown} and {hidden} more")
	}
}

fn tag_links(tags: &[String]) -> String {
	let base = ao3_base_url();
	let linked: Vec<String> = tags
		.iter()
		.map(|tag| format!("[{tag}]({})", tag_url(base, tag)))
		.collect();
	let text = preview_list(&linked, TAG_PREVIEW_LIMIT);
	if text.chars().count() > EMBED_FIELD_LIMIT {
		truncate(&preview_list(tags, TAG_PREVIEW_LIMIT), EMBED_FIELD_LIMIT).into_owned()
	} else {
		text
	}
}

/// Discord timestamp markup, `style` being one of Discord's format letters
#[must_use]
pub fn discord_timestamp(unix: i64, style: char) -> String {
	format!("<t:{unix}:{style}>")
}

#[must_use]
pub fn notice_embed(title: &str, description: &str, colour: u32) -> CreateEmbed {
	CreateEmbed::default()
		.title(truncate(title, 256))
		.description(truncate(description, EMBED_DESCRIPTION_LIMIT))
		.colour(colour)
}

#[must_use]
pub fn rec_embed(rec: &Recommendation) -> CreateEmbed {
	let chapters = match (rec.chapters_written, rec.chapters_total) {
		(Some(written), Some(total)) => format!("{written}/{total}"),
		(Some(written), None) => format!("{written}/?"),
		_ => "?".to_owned(),
	};
	let stats = format!(
		"{} words · {chapters} chapters{}\n{} kudos · {} hits · {} bookmarks",
		rec.words.map_or_else(|| "?".to_owned(), format_count),
		if rec.complete { " · complete" } else { "" },
		rec.kudos.map_or_else(|| "0".to_owned(), format_count),
		rec.hits.map_or_else(|| "0".to_owned(), format_count),
		rec.bookmarks.map_or_else(|| "0".to_owned(), format_count),
	);

	let mut embed = CreateEmbed::default()
		.title(truncate(&rec.title, 256))
		.url(&rec.url)
		.colour(COLOUR_BLUE)
		.description(
			rec.summary
				.as_deref()
				.map_or(Cow::Borrowed("*No summary*"), |summary| {
					truncate(summary, SUMMARY_PREVIEW_LIMIT)
				}),
		)
		.field("By", preview_list(&rec.authors, TAG_PREVIEW_LIMIT), true)
		.field(
			"Rating",
			rec.rating.clone().unwrap_or_else(|| "Not Rated".to_owned()),
			true,
		)
		.field("Fandoms", tag_links(&rec.fandoms), false);
	if !rec.warnings.is_empty() {
		embed = embed.field("Warnings", preview_list(&rec.warnings, TAG_PREVIEW_LIMIT), false);
	}
	if !rec.relationships.is_empty() {
		embed = embed.field("Relationships", tag_links(&rec.relationships), false);
	}
	if !rec.characters.is_empty() {
		embed = embed.field("Characters", tag_links(&rec.characters), false);
	}
	if !rec.tags.is_empty() {
		embed = embed.field("Tags", tag_links(&rec.tags), false);
	}
	embed = embed.field("Stats", stats, false);
	if let Some(notes) = &rec.notes {
		embed = embed.field("Recommender's notes", truncate(notes, EMBED_FIELD_LIMIT), false);
	}
	let updated = rec.updated.as_deref().or(rec.published.as_deref());
	embed.footer(CreateEmbedFooter::new(format!(
		"Rec #{}{}",
		rec.id,
		updated.map_or_else(String::new, |date| format!(" · updated {date}"))
	)))
}

/// `catalogued` holds the member work ids that already have recs
#[must_use]
pub fn series_embed(series: &Series, catalogued: &[Recommendation]) -> CreateEmbed {
	let works = series
		.work_ids
		.iter()
		.enumerate()
		.map(|(index, work_id)| {
			catalogued
				.iter()
				.find(|rec| rec.ao3_work_id == *work_id)
				.map_or_else(
					|| format!("{}. work {work_id} (not catalogued)", index + 1),
					|rec| format!("{}. [{}]({}) · rec #{}", index + 1, rec.title, rec.url, rec.id),
				)
		})
		.collect::<Vec<_>>()
		.join("\n");
	let mut embed = CreateEmbed::default()
		.title(truncate(&series.name, 256))
		.url(&series.url)
		.colour(COLOUR_BLUE)
		.field("By", preview_list(&series.creators, TAG_PREVIEW_LIMIT), true)
		.field(
			"Works",
			format!(
				"{}{}",
				series.works_count,
				if series.complete { " · complete" } else { "" }
			),
			true,
		)
		.field(
			"Words",
			series.words.map_or_else(|| "?".to_owned(), format_count),
			true,
		)
		.footer(CreateEmbedFooter::new(format!("Series #{}", series.id)));
	if let Some(summary) = &series.summary {
		embed = embed.description(truncate(summary, SUMMARY_PREVIEW_LIMIT));
	}
	if !works.is_empty() {
		embed = embed.field("Reading order", truncate(&works, EMBED_FIELD_LIMIT), false);
	}
	embed
}

#[must_use]
pub fn job_line(job: &ParseJob) -> String {
	let mut line = format!("#{} · {} · <{}>", job.id, job.status, job.url);
	if job.status == "cooldown" {
		line.push_str(&format!(" · retry {}", discord_timestamp(job.next_attempt_at, 'R')));
	}
	if let Some(error) = &job.last_error {
		line.push_str(&format!("\n  ↳ {}", truncate(error, 200)));
	}
	line
}

#[must_use]
pub fn profile_embed(name: &str, avatar_url: &str, profile: &Profile) -> CreateEmbed {
	let field = |value: &Option<String>| {
		value
			.as_deref()
			.filter(|value| !value.is_empty())
			.unwrap_or("Not set")
			.to_owned()
	};
	let mut embed = CreateEmbed::default()
		.title(format!("{name}'s profile"))
		.thumbnail(avatar_url)
		.colour(COLOUR_BLUE)
		.field("Pronouns", field(&profile.pronouns), true)
		.field("Timezone", field(&profile.timezone), true)
		.field("Region", field(&profile.region), true);
	if let Some(username) = profile.ao3_username.as_deref().filter(|u| !u.is_empty()) {
		embed = embed.field(
			"AO3",
			format!("[{username}]({}/users/{username})", ao3_base_url()),
			true,
		);
	}
	embed = embed.field("Sprint words", format_count(profile.sprint_words), true);
	if let Some(bio) = profile.bio.as_deref().filter(|bio| !bio.is_empty()) {
		embed = embed.description(truncate(bio, EMBED_DESCRIPTION_LIMIT));
	}
	embed
}

/// Posts `embed` to the guild's log channel when one is set
pub async fn post_to_log(http: &Http, data: &Data, guild_id: GuildId, embed: CreateEmbed) {
	let channel = match guild::get_guild_settings(i64::from(guild_id), &data.db).await {
		Ok(settings) => settings.log_channel,
		Err(err) => {
			warn!("Failed to read log channel of {guild_id}: {err:?}");
			return;
		}
	};
	let Some(channel) = channel else {
		return;
	};
	if let Err(err) = ChannelId::new(channel.cast_unsigned())
		.send_message(http, CreateMessage::new().embed(embed))
		.await
	{
		warn!("Failed to post to log channel of {guild_id}: {err}");
	}
}

#[cfg(test)]
mod tests {
	use super::{format_count, preview_list, tag_links, truncate};
	use crate::config::constants::EMBED_FIELD_LIMIT;

	#[test]
	fn truncates_on_char_boundaries() {
		assert_eq!(truncate("short", 10), "short");
		assert_eq!(truncate("ünïcödé text", 5), "ünïc…");
		assert_eq!(truncate("abcdef", 6), "abcdef");
	}

	#[test]
	fn formats_counts() {
		assert_eq!(format_count(0), "0");
		assert_eq!(format_count(999), "999");
		assert_eq!(format_count(1_000), "1,000");
		assert_eq!(format_count(1_234_567), "1,234,567");
		assert_eq!(format_count(-45_000), "-45,000");
	}

	#[test]
	fn previews_lists() {
		let items: Vec<String> = ["a", "b", "c", "d"].map(str::to_owned).to_vec();
		assert_eq!(preview_list(&items, 2), "a, b and 2 more");
		assert_eq!(preview_list(&items, 4), "a, b, c, d");
		assert_eq!(preview_list(&[], 4), "None");
	}

	#[test]
	fn tag_fields_fit_an_embed_field() {
		let tags: Vec<String> = (0..12).map(|n| format!("{n} {}", "long tag ".repeat(20))).collect();
		let field = tag_links(&tags);
		assert!(field.chars().count() <= EMBED_FIELD_LIMIT);
		assert!(!field.contains("]("));

		let short: Vec<String> = ["Angst", "Fluff"].map(str::to_owned).to_vec();
		assert!(tag_links(&short).starts_with("[Angst](https://archiveofourown.org/tags/Angst/works)"));
	}
}
