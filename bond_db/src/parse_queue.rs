//! Persistent AO3 parse queue.
//!
//! A job moves `pending -> processing -> done`, or out of `processing` into
//! `cooldown` (claimable again once `next_attempt_at` has passed) or `failed`.
//! At most one active job exists per canonical URL.

use std::{fmt, str::FromStr};

use anyhow::{Context as _, Result as AResult, bail};
use sqlx::{FromRow, PgExecutor, query, query_as, query_scalar};

use crate::unix_now;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JobStatus {
	Pending,
	Processing,
	Cooldown,
	Done,
	Failed,
}

impl JobStatus {
	pub const ALL: [Self; 5] = [
		Self::Pending,
		Self::Processing,
		Self::Cooldown,
		Self::Done,
		Self::Failed,
	];

	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Pending => "pending",
			Self::Processing => "processing",
			Self::Cooldown => "cooldown",
			Self::Done => "done",
			Self::Failed => "failed",
		}
	}

	/// Still owns its URL: a second job for the same link is refused
	#[must_use]
	pub const fn is_active(self) -> bool {
		matches!(self, Self::Pending | Self::Processing | Self::Cooldown)
	}
}

impl fmt::Display for JobStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for JobStatus {
	type Err = anyhow::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.into_iter()
			.find(|status| status.as_str() == s)
			.map_or_else(|| bail!("Unknown job status: {s}"), Ok)
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobKind {
	Work,
	Series,
}

impl JobKind {
	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Work => "work",
			Self::Series => "series",
		}
	}
}

impl FromStr for JobKind {
	type Err = anyhow::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"work" => Ok(Self::Work),
			"series" => Ok(Self::Series),
			_ => bail!("Unknown job kind: {s}"),
		}
	}
}

#[derive(Clone, Debug, FromRow)]
pub struct ParseJob {
	pub id: i64,
	pub kind: String,
	pub url: String,
	pub status: String,
	pub attempts: i32,
	pub requested_by: i64,
	pub guild_id: Option<i64>,
	pub channel_id: Option<i64>,
	pub notes: Option<String>,
	pub last_error: Option<String>,
	pub next_attempt_at: i64,
	pub created_at: i64,
	pub updated_at: i64,
}

impl ParseJob {
	pub fn status(&self) -> AResult<JobStatus> {
		self.status.parse()
	}

	pub fn kind(&self) -> AResult<JobKind> {
		self.kind.parse()
	}
}

#[derive(Clone, Debug)]
pub struct NewJob {
	pub kind: JobKind,
	pub url: String,
	pub requested_by: i64,
	pub guild_id: Option<i64>,
	pub channel_id: Option<i64>,
	pub notes: Option<String>,
}

#[derive(Clone, Debug)]
pub enum EnqueueOutcome {
	Inserted(ParseJob),
	/// Another active job already covers this URL
	Existing(ParseJob),
}

const COLUMNS: &str = "id, kind, url, status, attempts, requested_by, guild_id, channel_id, \
                       notes, last_error, next_attempt_at, created_at, updated_at";

pub async fn enqueue(
	job: &NewJob,
	conn: &mut sqlx::PgConnection,
) -> AResult<EnqueueOutcome> {
	let now = unix_now();
	let inserted = query_as::<_, ParseJob>(&format!(
		"INSERT INTO parse_queue (kind, url, status, requested_by, guild_id, channel_id, notes,
                next_attempt_at, created_at, updated_at)
            VALUES ($1, $2, 'pending', $3, $4, $5, $6, $7, $7, $7)
            ON CONFLICT (url) WHERE status IN ('pending', 'processing', 'cooldown')
            DO NOTHING
            RETURNING {COLUMNS}"
	))
	.bind(job.kind.as_str())
	.bind(&job.url)
	.bind(job.requested_by)
	.bind(job.guild_id)
	.bind(job.channel_id)
	.bind(&job.notes)
	.bind(now)
	.fetch_optional(&mut *conn)
	.await
	.context("Failed to enqueue parse job")?;

	if let Some(job) = inserted {
		return Ok(EnqueueOutcome::Inserted(job));
	}
	find_active_by_url(&job.url, &mut *conn)
		.await?
		.map_or_else(
			|| bail!("Parse job for {} vanished while enqueueing", job.url),
			|existing| Ok(EnqueueOutcome::Existing(existing)),
		)
}

pub async fn find_active_by_url(url: &str, conn: impl PgExecutor<'_>) -> AResult<Option<ParseJob>> {
	query_as::<_, ParseJob>(&format!(
		"SELECT {COLUMNS} FROM parse_queue
            WHERE url = $1 AND status IN ('pending', 'processing', 'cooldown')"
	))
	.bind(url)
	.fetch_optional(conn)
	.await
	.context("Failed to look up active parse job")
}

pub async fn get(id: i64, conn: impl PgExecutor<'_>) -> AResult<Option<ParseJob>> {
	query_as::<_, ParseJob>(&format!("SELECT {COLUMNS} FROM parse_queue WHERE id = $1"))
		.bind(id)
		.fetch_optional(conn)
		.await
		.context("Failed to fetch parse job")
}

/// Takes the oldest claimable job, bumping its attempt counter.
///
/// `SKIP LOCKED` keeps two workers from ever claiming the same row.
pub async fn claim_next(now: i64, conn: impl PgExecutor<'_>) -> AResult<Option<ParseJob>> {
	query_as::<_, ParseJob>(&format!(
		"UPDATE parse_queue
            SET status = 'processing', attempts = attempts + 1, updated_at = $1
            WHERE id = (
                SELECT id FROM parse_queue
                WHERE status IN ('pending', 'cooldown') AND next_attempt_at <= $1
                ORDER BY next_attempt_at, id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {COLUMNS}"
	))
	.bind(now)
	.fetch_optional(conn)
	.await
	.context("Failed to claim parse job")
}

pub async fn mark_done(id: i64, conn: impl PgExecutor<'_>) -> AResult<()> {
	query(
		"UPDATE parse_queue
            SET status = 'done', last_error = NULL, updated_at = $2
            WHERE id = $1",
	)
	.bind(id)
	.bind(unix_now())
	.execute(conn)
	.await
	.context("Failed to mark parse job done")?;
	Ok(())
}

pub async fn mark_retry(
	id: i64,
	next_attempt_at: i64,
	error: &str,
	conn: impl PgExecutor<'_>,
) -> AResult<()> {
	query(
		"UPDATE parse_queue
            SET status = 'cooldown', next_attempt_at = $2, last_error = $3, updated_at = $4
            WHERE id = $1",
	)
	.bind(id)
	.bind(next_attempt_at)
	.bind(error)
	.bind(unix_now())
	.execute(conn)
	.await
	.context("Failed to put parse job in cooldown")?;
	Ok(())
}

pub async fn mark_failed(id: i64, error: &str, conn: impl PgExecutor<'_>) -> AResult<()> {
	query(
		"UPDATE parse_queue
            SET status = 'failed', last_error = $2, updated_at = $3
            WHERE id = $1",
	)
	.bind(id)
	.bind(error)
	.bind(unix_now())
	.execute(conn)
	.await
	.context("Failed to mark parse job failed")?;
	Ok(())
}

/// Jobs claimed before `older_than` and still in `processing` go back to `pending`.
pub async fn reset_stale(older_than: i64, conn: impl PgExecutor<'_>) -> AResult<u64> {
	let result = query(
		"UPDATE parse_queue
            SET status = 'pending', updated_at = $2
            WHERE status = 'processing' AND updated_at < $1",
	)
	.bind(older_than)
	.bind(unix_now())
	.execute(conn)
	.await
	.context("Failed to reset stale parse jobs")?;
	Ok(result.rows_affected())
}

/// Makes a failed job claimable again right away with a fresh attempt budget.
///
/// It lines up behind jobs that were already due, not ahead of them.
/// Returns false when the job is unknown, not failed, or its URL got a new
/// active job in the meantime.
pub async fn requeue(id: i64, conn: impl PgExecutor<'_>) -> AResult<bool> {
	let now = unix_now();
	let result = query(
		"UPDATE parse_queue
            SET status = 'pending', attempts = 0, next_attempt_at = $2, updated_at = $2
            WHERE id = $1 AND status = 'failed'
                AND NOT EXISTS (SELECT 1 FROM parse_queue active
                    WHERE active.url = parse_queue.url
                    AND active.status IN ('pending', 'processing', 'cooldown'))",
	)
	.bind(id)
	.bind(now)
	.execute(conn)
	.await
	.context("Failed to requeue parse job")?;
	Ok(result.rows_affected() > 0)
}

pub async fn jobs_for_user(
	user_id: i64,
	limit: i64,
	conn: impl PgExecutor<'_>,
) -> AResult<Vec<ParseJob>> {
	query_as::<_, ParseJob>(&format!(
		"SELECT {COLUMNS} FROM parse_queue
            WHERE requested_by = $1
            ORDER BY id DESC
            LIMIT $2"
	))
	.bind(user_id)
	.bind(limit)
	.fetch_all(conn)
	.await
	.context("Failed to fetch parse jobs for user")
}

pub async fn status_counts(conn: impl PgExecutor<'_>) -> AResult<Vec<(JobStatus, i64)>> {
	let rows = query_as::<_, (String, i64)>(
		"SELECT status, COUNT(*) FROM parse_queue GROUP BY status",
	)
	.fetch_all(conn)
	.await
	.context("Failed to count parse jobs")?;

	let mut counts: Vec<(JobStatus, i64)> = JobStatus::ALL.iter().map(|s| (*s, 0)).collect();
	for (status, count) in rows {
		let status: JobStatus = status.parse()?;
		if let Some(entry) = counts.iter_mut().find(|(s, _)| *s == status) {
			entry.1 = count;
		}
	}
	Ok(counts)
}

/// How many claimable jobs are ahead of `job` (0 = next up)
pub async fn position(job: &ParseJob, conn: impl PgExecutor<'_>) -> AResult<i64> {
	query_scalar::<_, i64>(
		"SELECT COUNT(*) FROM parse_queue
            WHERE status IN ('pending', 'cooldown')
            AND (next_attempt_at, id) < ($1, $2)",
	)
	.bind(job.next_attempt_at)
	.bind(job.id)
	.fetch_one(conn)
	.await
	.context("Failed to compute queue position")
}

#[cfg(test)]
mod tests {
	use sqlx::PgPool;

	use super::{
		EnqueueOutcome, JobKind, JobStatus, NewJob, ParseJob, claim_next, enqueue, get, mark_failed,
		requeue, reset_stale,
	};

	fn work_job(url: &str) -> NewJob {
		NewJob {
			kind: JobKind::Work,
			url: url.to_owned(),
			requested_by: 42,
			guild_id: Some(1),
			channel_id: Some(2),
			notes: None,
		}
	}

	async fn insert(url: &str, pool: &PgPool) -> ParseJob {
		let mut conn = pool.acquire().await.unwrap();
		match enqueue(&work_job(url), &mut conn).await.unwrap() {
			EnqueueOutcome::Inserted(job) => job,
			EnqueueOutcome::Existing(job) => panic!("{} was already queued", job.url),
		}
	}

	#[test]
	fn status_round_trips_through_text() {
		for status in JobStatus::ALL {
			assert_eq!(status.as_str().parse::<JobStatus>().ok(), Some(status));
		}
		assert!("queued".parse::<JobStatus>().is_err());
	}

	#[test]
	fn only_unfinished_jobs_are_active() {
		assert!(JobStatus::Pending.is_active());
		assert!(JobStatus::Processing.is_active());
		assert!(JobStatus::Cooldown.is_active());
		assert!(!JobStatus::Done.is_active());
		assert!(!JobStatus::Failed.is_active());
	}

	#[test]
	fn kind_parses() {
		assert_eq!("series".parse::<JobKind>().ok(), Some(JobKind::Series));
		assert!("chapter".parse::<JobKind>().is_err());
	}

	#[sqlx::test]
	#[ignore = "needs DATABASE_URL pointing at Postgres"]
	async fn one_active_job_per_url(pool: PgPool) {
		let first = insert("https://archiveofourown.org/works/1", &pool).await;
		let mut conn = pool.acquire().await.unwrap();
		assert!(matches!(
			enqueue(&work_job(&first.url), &mut conn).await.unwrap(),
			EnqueueOutcome::Existing(job) if job.id == first.id
		));

		mark_failed(first.id, "gone", &mut *conn).await.unwrap();
		assert!(matches!(
			enqueue(&work_job(&first.url), &mut conn).await.unwrap(),
			EnqueueOutcome::Inserted(job) if job.id != first.id
		));
		assert!(!requeue(first.id, &mut *conn).await.unwrap());
	}

	#[sqlx::test]
	#[ignore = "needs DATABASE_URL pointing at Postgres"]
	async fn only_long_claimed_jobs_are_reset(pool: PgPool) {
		let job = insert("https://archiveofourown.org/works/2", &pool).await;
		let claim_time = job.next_attempt_at + 10;
		let claimed = claim_next(claim_time, &pool).await.unwrap().unwrap();
		assert_eq!(claimed.id, job.id);
		assert_eq!(claimed.attempts, 1);

		assert_eq!(reset_stale(claim_time, &pool).await.unwrap(), 0);
		assert!(claim_next(claim_time, &pool).await.unwrap().is_none());

		assert_eq!(reset_stale(claim_time + 1, &pool).await.unwrap(), 1);
		let reset = get(job.id, &pool).await.unwrap().unwrap();
		assert_eq!(reset.status().unwrap(), JobStatus::Pending);
		assert_eq!(reset.attempts, 1);
	}

	#[sqlx::test]
	#[ignore = "needs DATABASE_URL pointing at Postgres"]
	async fn requeued_jobs_start_over(pool: PgPool) {
		let job = insert("https://archiveofourown.org/works/3", &pool).await;
		let claimed = claim_next(job.next_attempt_at, &pool).await.unwrap().unwrap();
		mark_failed(claimed.id, "boom", &pool).await.unwrap();
		assert!(claim_next(i64::MAX, &pool).await.unwrap().is_none());

		assert!(requeue(job.id, &pool).await.unwrap());
		assert!(!requeue(job.id, &pool).await.unwrap());
		let again = claim_next(i64::MAX, &pool).await.unwrap().unwrap();
		assert_eq!(again.id, job.id);
		assert_eq!(again.attempts, 1);
	}
}
