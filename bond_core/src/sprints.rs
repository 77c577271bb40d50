//! Writing sprint timers.
//!
//! Each unfinished sprint has one task walking it through
//! `scheduled -> running -> collecting -> finished`, re-reading the row
//! before every step so a cancel from a command stops it.

use std::{cmp::Ordering, sync::Arc, time::Duration};

use anyhow::Result as AResult;
use bond_db::{
	profile,
	sprint::{self, Sprint, SprintParticipant, SprintStatus},
	unix_now,
};
use dashmap::DashMap;
use serenity::all::{ChannelId, CreateEmbed, CreateMessage, GuildId, Http};
use sqlx::PgPool;
use tokio::{spawn, task::JoinHandle, time::sleep};
use tracing::{debug, error, info, warn};

use crate::{
	config::{
		constants::{COLOUR_BLUE, COLOUR_GREEN, COLOUR_YELLOW, SPRINT_COLLECT_SECS},
		types::Data,
	},
	utils::helpers::{discord_timestamp, format_count},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SprintAction {
	Start,
	End,
	Finish,
}

/// What the timer does next and when, or `None` once the sprint is over
#[must_use]
pub fn next_step(sprint: &Sprint) -> Option<(i64, SprintAction)> {
	match sprint.status().ok()? {
		SprintStatus::Scheduled => Some((sprint.starts_at, SprintAction::Start)),
		SprintStatus::Running => Some((sprint.ends_at, SprintAction::End)),
		SprintStatus::Collecting => Some((
			sprint.ends_at.saturating_add(SPRINT_COLLECT_SECS),
			SprintAction::Finish,
		)),
		SprintStatus::Finished | SprintStatus::Cancelled => None,
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Standing {
	pub user_id: i64,
	/// `None` when no final count was sent
	pub written: Option<i64>,
}

/// Most words first; participants without a final count go last
#[must_use]
pub fn leaderboard(participants: &[SprintParticipant]) -> Vec<Standing> {
	let mut standings: Vec<Standing> = participants
		.iter()
		.map(|participant| Standing {
			user_id: participant.user_id,
			written: participant
				.end_words
				.map(|end| end.saturating_sub(participant.start_words)),
		})
		.collect();
	standings.sort_by(|a, b| match (a.written, b.written) {
		(Some(a_words), Some(b_words)) => b_words.cmp(&a_words).then(a.user_id.cmp(&b.user_id)),
		(Some(_), None) => Ordering::Less,
		(None, Some(_)) => Ordering::Greater,
		(None, None) => a.user_id.cmp(&b.user_id),
	});
	standings
}

#[must_use]
pub fn leaderboard_text(standings: &[Standing]) -> String {
	if standings.is_empty() {
		return "Nobody joined this one.".to_owned();
	}
	let mut rank = 0;
	standings
		.iter()
		.map(|standing| match standing.written {
			Some(words) => {
				rank += 1;
				format!("**{rank}.** <@{}> · {} words", standing.user_id, format_count(words))
			}
			None => format!("· <@{}> · no final count", standing.user_id),
		})
		.collect::<Vec<_>>()
		.join("\n")
}

/// Handle for arming and disarming sprint timers of one bot
#[derive(Clone)]
pub struct SprintClock {
	db: PgPool,
	http: Arc<Http>,
	timers: Arc<DashMap<i64, JoinHandle<()>>>,
}

impl SprintClock {
	#[must_use]
	pub fn new(data: &Data, http: Arc<Http>) -> Self {
		Self {
			db: data.db.clone(),
			http,
			timers: Arc::clone(&data.sprint_timers),
		}
	}

	pub fn arm(&self, sprint_id: i64) {
		let clock = self.clone();
		let handle = spawn(async move {
			if let Err(err) = clock.run(sprint_id).await {
				error!("Sprint {sprint_id} timer failed: {err:?}");
			}
			clock.timers.remove(&sprint_id);
		});
		if let Some(previous) = self.timers.insert(sprint_id, handle) {
			previous.abort();
		}
	}

	pub fn disarm(&self, sprint_id: i64) {
		if let Some((_, handle)) = self.timers.remove(&sprint_id) {
			handle.abort();
		}
	}

	/// Arms the unfinished sprints of a guild that have no live timer yet
	pub async fn rearm_guild(&self, guild_id: GuildId) -> AResult<usize> {
		let mut armed = 0;
		for sprint in sprint::unfinished_in_guild(i64::from(guild_id), &self.db).await? {
			if !self.timers.contains_key(&sprint.id) {
				self.arm(sprint.id);
				armed += 1;
			}
		}
		Ok(armed)
	}

	async fn run(&self, sprint_id: i64) -> AResult<()> {
		loop {
			let Some(sprint) = sprint::get(sprint_id, &self.db).await? else {
				return Ok(());
			};
			let Some((at, action)) = next_step(&sprint) else {
				return Ok(());
			};
			let wait = at.saturating_sub(unix_now());
			if wait > 0 {
				debug!("Sprint {sprint_id}: {action:?} in {wait}s");
				sleep(Duration::from_secs(wait.cast_unsigned())).await;
			}
			match action {
				SprintAction::Start => self.start(&sprint).await?,
				SprintAction::End => self.end(&sprint).await?,
				SprintAction::Finish => self.finish(&sprint).await?,
			}
		}
	}

	async fn announce(&self, sprint: &Sprint, message: CreateMessage) {
		if let Err(err) = ChannelId::new(sprint.channel_id.cast_unsigned())
			.send_message(self.http.as_ref(), message)
			.await
		{
			warn!("Failed to post sprint {} update: {err}", sprint.id);
		}
	}

	async fn mentions(&self, sprint: &Sprint) -> AResult<String> {
		Ok(sprint::participants(sprint.id, &self.db)
			.await?
			.iter()
			.map(|participant| format!("<@{}>", participant.user_id))
			.collect::<Vec<_>>()
			.join(" "))
	}

	async fn start(&self, sprint: &Sprint) -> AResult<()> {
		if !sprint::set_status(sprint.id, SprintStatus::Running, &self.db).await? {
			return Ok(());
		}
		info!("Sprint {} started", sprint.id);
		let message = CreateMessage::new()
			.content(self.mentions(sprint).await?)
			.embed(
				CreateEmbed::default()
					.title("Sprint started!")
					.description(format!(
						"Write until {}. Late? `/sprint join` still works.",
						discord_timestamp(sprint.ends_at, 'T')
					))
					.colour(COLOUR_GREEN),
			);
		self.announce(sprint, message).await;
		Ok(())
	}

	async fn end(&self, sprint: &Sprint) -> AResult<()> {
		if !sprint::set_status(sprint.id, SprintStatus::Collecting, &self.db).await? {
			return Ok(());
		}
		info!("Sprint {} ended, collecting word counts", sprint.id);
		let deadline = sprint.ends_at.saturating_add(SPRINT_COLLECT_SECS);
		let message = CreateMessage::new()
			.content(self.mentions(sprint).await?)
			.embed(
				CreateEmbed::default()
					.title("Pens down!")
					.description(format!(
						"Send your final word count with `/sprint words` before {}.",
						discord_timestamp(deadline, 'T')
					))
					.colour(COLOUR_YELLOW),
			);
		self.announce(sprint, message).await;
		Ok(())
	}

	async fn finish(&self, sprint: &Sprint) -> AResult<()> {
		if !sprint::set_status(sprint.id, SprintStatus::Finished, &self.db).await? {
			return Ok(());
		}
		let participants = sprint::participants(sprint.id, &self.db).await?;
		let standings = leaderboard(&participants);
		for standing in &standings {
			if let Some(words) = standing.written.filter(|words| *words > 0) {
				profile::add_sprint_words(standing.user_id, words, &self.db).await?;
			}
		}
		let total: i64 = standings
			.iter()
			.filter_map(|standing| standing.written)
			.filter(|words| *words > 0)
			.sum();
		info!("Sprint {} finished with {total} words", sprint.id);
		let message = CreateMessage::new().embed(
			CreateEmbed::default()
				.title("Sprint results")
				.description(leaderboard_text(&standings))
				.field("Words written together", format_count(total), false)
				.colour(COLOUR_BLUE),
		);
		self.announce(sprint, message).await;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use bond_db::sprint::{Sprint, SprintParticipant};

	use super::{SprintAction, Standing, leaderboard, leaderboard_text, next_step};
	use crate::config::constants::SPRINT_COLLECT_SECS;

	fn sprint(status: &str) -> Sprint {
		Sprint {
			id: 1,
			guild_id: 2,
			channel_id: 3,
			starter_id: 4,
			status: status.to_owned(),
			starts_at: 1_000,
			ends_at: 2_800,
			created_at: 900,
		}
	}

	fn participant(user_id: i64, start_words: i64, end_words: Option<i64>) -> SprintParticipant {
		SprintParticipant {
			sprint_id: 1,
			user_id,
			start_words,
			end_words,
		}
	}

	#[test]
	fn steps_follow_the_status() {
		assert_eq!(next_step(&sprint("scheduled")), Some((1_000, SprintAction::Start)));
		assert_eq!(next_step(&sprint("running")), Some((2_800, SprintAction::End)));
		assert_eq!(
			next_step(&sprint("collecting")),
			Some((2_800 + SPRINT_COLLECT_SECS, SprintAction::Finish))
		);
		assert_eq!(next_step(&sprint("finished")), None);
		assert_eq!(next_step(&sprint("cancelled")), None);
	}

	#[test]
	fn leaderboard_orders_by_words_written() {
		let standings = leaderboard(&[
			participant(10, 1_000, Some(1_500)),
			participant(11, 0, None),
			participant(12, 200, Some(1_400)),
			participant(13, 0, Some(500)),
		]);
		assert_eq!(
			standings,
			[
				Standing {
					user_id: 12,
					written: Some(1_200)
				},
				Standing {
					user_id: 10,
					written: Some(500)
				},
				Standing {
					user_id: 13,
					written: Some(500)
				},
				Standing {
					user_id: 11,
					written: None
				},
			]
		);
		assert_eq!(
			leaderboard_text(&standings),
			"**1.** <@12> · 1,200 words\n**2.** <@10> · 500 words\n**3.** <@13> · 500 \
			 words\n· <@11> · no final count"
		);
	}

	#[test]
	fn empty_sprints_say_so() {
		assert_eq!(leaderboard_text(&[]), "Nobody joined this one.");
	}
}
