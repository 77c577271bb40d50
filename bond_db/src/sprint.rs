use std::str::FromStr;

use anyhow::{Context as _, Result as AResult, bail};
use sqlx::{FromRow, PgExecutor, query, query_as};

use crate::unix_now;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SprintStatus {
	/// Waiting for the start delay
	Scheduled,
	Running,
	/// Time is up, final word counts are still accepted
	Collecting,
	Finished,
	Cancelled,
}

impl SprintStatus {
	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Scheduled => "scheduled",
			Self::Running => "running",
			Self::Collecting => "collecting",
			Self::Finished => "finished",
			Self::Cancelled => "cancelled",
		}
	}
}

impl FromStr for SprintStatus {
	type Err = anyhow::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(match s {
			"scheduled" => Self::Scheduled,
			"running" => Self::Running,
			"collecting" => Self::Collecting,
			"finished" => Self::Finished,
			"cancelled" => Self::Cancelled,
			_ => bail!("Unknown sprint status: {s}"),
		})
	}
}

#[derive(Clone, Debug, FromRow)]
pub struct Sprint {
	pub id: i64,
	pub guild_id: i64,
	pub channel_id: i64,
	pub starter_id: i64,
	pub status: String,
	pub starts_at: i64,
	pub ends_at: i64,
	pub created_at: i64,
}

impl Sprint {
	pub fn status(&self) -> AResult<SprintStatus> {
		self.status.parse()
	}
}

#[derive(Clone, Debug, FromRow, PartialEq, Eq)]
pub struct SprintParticipant {
	pub sprint_id: i64,
	pub user_id: i64,
	pub start_words: i64,
	pub end_words: Option<i64>,
}

const COLUMNS: &str = "id, guild_id, channel_id, starter_id, status, starts_at, ends_at, created_at";

/// Fails if the channel already has an unfinished sprint
pub async fn create(
	guild_id: i64,
	channel_id: i64,
	starter_id: i64,
	starts_at: i64,
	ends_at: i64,
	conn: impl PgExecutor<'_>,
) -> AResult<Option<Sprint>> {
	let status = if starts_at > unix_now() {
		SprintStatus::Scheduled
	} else {
		SprintStatus::Running
	};
	query_as::<_, Sprint>(&format!(
		"INSERT INTO sprints (guild_id, channel_id, starter_id, status, starts_at, ends_at,
                created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (channel_id) WHERE status IN ('scheduled', 'running', 'collecting')
            DO NOTHING
            RETURNING {COLUMNS}"
	))
	.bind(guild_id)
	.bind(channel_id)
	.bind(starter_id)
	.bind(status.as_str())
	.bind(starts_at)
	.bind(ends_at)
	.bind(unix_now())
	.fetch_optional(conn)
	.await
	.context("Failed to create sprint")
}

pub async fn get(id: i64, conn: impl PgExecutor<'_>) -> AResult<Option<Sprint>> {
	query_as::<_, Sprint>(&format!("SELECT {COLUMNS} FROM sprints WHERE id = $1"))
		.bind(id)
		.fetch_optional(conn)
		.await
		.context("Failed to fetch sprint")
}

pub async fn active_in_channel(channel_id: i64, conn: impl PgExecutor<'_>) -> AResult<Option<Sprint>> {
	query_as::<_, Sprint>(&format!(
		"SELECT {COLUMNS} FROM sprints
            WHERE channel_id = $1 AND status IN ('scheduled', 'running', 'collecting')"
	))
	.bind(channel_id)
	.fetch_optional(conn)
	.await
	.context("Failed to fetch active sprint")
}

/// Sprints in a guild whose timers still have to fire
pub async fn unfinished_in_guild(guild_id: i64, conn: impl PgExecutor<'_>) -> AResult<Vec<Sprint>> {
	query_as::<_, Sprint>(&format!(
		"SELECT {COLUMNS} FROM sprints
            WHERE guild_id = $1 AND status IN ('scheduled', 'running', 'collecting')
            ORDER BY ends_at"
	))
	.bind(guild_id)
	.fetch_all(conn)
	.await
	.context("Failed to fetch unfinished sprints")
}

/// Only moves forward from an unfinished state; returns false otherwise.
pub async fn set_status(id: i64, status: SprintStatus, conn: impl PgExecutor<'_>) -> AResult<bool> {
	let result = query(
		"UPDATE sprints SET status = $2
            WHERE id = $1 AND status IN ('scheduled', 'running', 'collecting')",
	)
	.bind(id)
	.bind(status.as_str())
	.execute(conn)
	.await
	.context("Failed to update sprint status")?;
	Ok(result.rows_affected() > 0)
}

/// Joining twice just updates the starting count
pub async fn join(
	sprint_id: i64,
	user_id: i64,
	start_words: i64,
	conn: impl PgExecutor<'_>,
) -> AResult<()> {
	query(
		"INSERT INTO sprint_participants (sprint_id, user_id, start_words)
            VALUES ($1, $2, $3)
            ON CONFLICT (sprint_id, user_id)
            DO UPDATE SET start_words = $3",
	)
	.bind(sprint_id)
	.bind(user_id)
	.bind(start_words)
	.execute(conn)
	.await
	.context("Failed to join sprint")?;
	Ok(())
}

/// Returns false if the user never joined
pub async fn set_words(
	sprint_id: i64,
	user_id: i64,
	end_words: i64,
	conn: impl PgExecutor<'_>,
) -> AResult<bool> {
	let result = query(
		"UPDATE sprint_participants SET end_words = $3
            WHERE sprint_id = $1 AND user_id = $2",
	)
	.bind(sprint_id)
	.bind(user_id)
	.bind(end_words)
	.execute(conn)
	.await
	.context("Failed to set sprint words")?;
	Ok(result.rows_affected() > 0)
}

pub async fn participants(
	sprint_id: i64,
	conn: impl PgExecutor<'_>,
) -> AResult<Vec<SprintParticipant>> {
	query_as::<_, SprintParticipant>(
		"SELECT sprint_id, user_id, start_words, end_words
            FROM sprint_participants
            WHERE sprint_id = $1
            ORDER BY user_id",
	)
	.bind(sprint_id)
	.fetch_all(conn)
	.await
	.context("Failed to fetch sprint participants")
}

#[cfg(test)]
mod tests {
	use sqlx::PgPool;

	use super::{SprintStatus, create, set_status, unfinished_in_guild};
	use crate::unix_now;

	#[test]
	fn statuses_parse_from_their_names() {
		for status in [
			SprintStatus::Scheduled,
			SprintStatus::Running,
			SprintStatus::Collecting,
			SprintStatus::Finished,
			SprintStatus::Cancelled,
		] {
			assert_eq!(status.as_str().parse::<SprintStatus>().ok(), Some(status));
		}
		assert!("paused".parse::<SprintStatus>().is_err());
	}

	#[sqlx::test]
	#[ignore = "needs DATABASE_URL pointing at Postgres"]
	async fn unfinished_sprints_are_listed_per_guild(pool: PgPool) {
		let now = unix_now();
		let running = create(1, 10, 5, now, now + 600, &pool).await.unwrap().unwrap();
		let done = create(1, 11, 5, now, now + 600, &pool).await.unwrap().unwrap();
		let elsewhere = create(2, 20, 5, now + 60, now + 600, &pool).await.unwrap().unwrap();
		assert!(set_status(done.id, SprintStatus::Finished, &pool).await.unwrap());

		let ids: Vec<i64> = unfinished_in_guild(1, &pool)
			.await
			.unwrap()
			.iter()
			.map(|sprint| sprint.id)
			.collect();
		assert_eq!(ids, [running.id]);
		assert_eq!(unfinished_in_guild(2, &pool).await.unwrap()[0].id, elsewhere.id);
	}
}
