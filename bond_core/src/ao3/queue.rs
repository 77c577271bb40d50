//! Worker side of the AO3 parse queue.

use std::{sync::Arc, time::Duration};

use anyhow::{Context as _, Result as AResult};
use bond_db::{
	parse_queue::{self, EnqueueOutcome, JobKind, NewJob, ParseJob},
	recommendation::{self, Recommendation},
	series::{self, Series},
	unix_now,
};
use serenity::all::{ChannelId, CreateEmbed, CreateEmbedFooter, CreateMessage, Http};
use sqlx::PgPool;
use thiserror::Error;
use tokio::{select, sync::Notify, time::sleep};
use tracing::{error, info, warn};

use crate::{
	ao3::{
		client::{Ao3Client, Transport},
		error::Ao3Error,
		url::{Ao3Link, LinkError, parse_link},
	},
	config::{
		constants::{COLOUR_GREEN, COLOUR_RED},
		settings::Ao3Config,
	},
	utils::helpers::notice_embed,
};

#[derive(Debug, Error)]
pub enum JobError {
	#[error(transparent)]
	Ao3(#[from] Ao3Error),
	#[error("queued link is invalid: {0}")]
	Link(#[from] LinkError),
	#[error("queued link is not a {0}")]
	WrongKind(&'static str),
	#[error("internal error: {0:#}")]
	Internal(#[from] anyhow::Error),
}

impl JobError {
	#[must_use]
	pub const fn is_transient(&self) -> bool {
		match self {
			Self::Ao3(error) => error.is_transient(),
			Self::Internal(_) => true,
			Self::Link(_) | Self::WrongKind(_) => false,
		}
	}

	#[must_use]
	pub const fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::Ao3(error) => error.retry_after(),
			_ => None,
		}
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryPlan {
	Cooldown { next_attempt_at: i64 },
	Fail,
}

/// Decides what happens to a job whose `attempts`-th try just failed.
///
/// Transient failures back off exponentially from `base_cooldown_secs`, capped
/// at `max_cooldown_secs`, with up to 10% jitter on top, and never sooner than
/// a `Retry-After` AO3 sent.
#[must_use]
pub fn retry_plan(attempts: i32, error: &JobError, config: &Ao3Config, now: i64) -> RetryPlan {
	let max_attempts = i32::try_from(config.max_attempts).unwrap_or(i32::MAX);
	if !error.is_transient() || attempts >= max_attempts {
		return RetryPlan::Fail;
	}
	let exponent = u32::try_from(attempts.saturating_sub(1)).unwrap_or_default();
	let backoff = config
		.base_cooldown_secs
		.saturating_mul(2_u64.saturating_pow(exponent))
		.min(config.max_cooldown_secs);
	let mut delay = backoff.saturating_add(fastrand::u64(0..=backoff / 10));
	if let Some(after) = error.retry_after() {
		delay = delay.max(after.as_secs());
	}
	RetryPlan::Cooldown {
		next_attempt_at: now.saturating_add(i64::try_from(delay).unwrap_or(i64::MAX)),
	}
}

/// Jobs claimed before this are treated as abandoned by their worker
#[must_use]
pub fn stale_cutoff(now: i64, config: &Ao3Config) -> i64 {
	now.saturating_sub(i64::try_from(config.stale_job_secs).unwrap_or(i64::MAX))
}

/// Who asked for a link and where to report back
#[derive(Clone, Debug, Default)]
pub struct QueueRequest {
	pub requested_by: i64,
	pub guild_id: Option<i64>,
	pub channel_id: Option<i64>,
	pub notes: Option<String>,
	/// Queue even if the work is already catalogued, to refresh its metadata
	pub refresh: bool,
}

#[derive(Debug)]
pub enum EnqueueResult {
	CataloguedWork(Box<Recommendation>),
	CataloguedSeries(Box<Series>),
	Queued {
		job: ParseJob,
		/// Claimable jobs ahead of this one
		position: i64,
		/// True when an active job for the same link already existed
		existing: bool,
	},
}

pub async fn enqueue_link(
	pool: &PgPool,
	notify: &Notify,
	base_url: &str,
	link: Ao3Link,
	request: QueueRequest,
) -> AResult<EnqueueResult> {
	if !request.refresh {
		match link {
			Ao3Link::Work(id) => {
				if let Some(rec) = recommendation::get_by_work_id(id.cast_signed(), pool).await? {
					return Ok(EnqueueResult::CataloguedWork(Box::new(rec)));
				}
			}
			Ao3Link::Series(id) => {
				if let Some(series) = series::get_by_series_id(id.cast_signed(), pool).await? {
					return Ok(EnqueueResult::CataloguedSeries(Box::new(series)));
				}
			}
			Ao3Link::Chapter(_) => {}
		}
	}

	let new_job = NewJob {
		kind: if link.is_series() {
			JobKind::Series
		} else {
			JobKind::Work
		},
		url: link.canonical_url(base_url),
		requested_by: request.requested_by,
		guild_id: request.guild_id,
		channel_id: request.channel_id,
		notes: request.notes,
	};
	let mut conn = pool
		.acquire()
		.await
		.context("Failed to acquire connection for enqueue")?;
	let outcome = parse_queue::enqueue(&new_job, &mut conn).await?;
	let existing = matches!(outcome, EnqueueOutcome::Existing(_));
	if !existing {
		info!("Queued {} for user {}", new_job.url, new_job.requested_by);
		notify.notify_one();
	}
	let job = match outcome {
		EnqueueOutcome::Inserted(job) | EnqueueOutcome::Existing(job) => job,
	};
	let position = parse_queue::position(&job, &mut *conn).await?;
	Ok(EnqueueResult::Queued {
		job,
		position,
		existing,
	})
}

enum Processed {
	Work(Recommendation),
	Series { series: Series, queued: usize },
	/// A chapter link whose work was catalogued already
	Catalogued(Recommendation),
	/// A chapter link whose work another active job covers
	SameWork(ParseJob),
}

struct QueueWorker<T> {
	pool: PgPool,
	client: Ao3Client<T>,
	http: Option<Arc<Http>>,
}

impl<T: Transport> QueueWorker<T> {
	async fn process(&self, job: &ParseJob) -> Result<Processed, JobError> {
		let link = parse_link(&job.url)?;
		match job.kind()? {
			JobKind::Work => self.process_work(job, link).await,
			JobKind::Series => self.process_series(job, link).await,
		}
	}

	async fn process_work(&self, job: &ParseJob, link: Ao3Link) -> Result<Processed, JobError> {
		let base_url = &self.client.config().base_url;
		let work_id = match link {
			Ao3Link::Work(id) => id,
			Ao3Link::Chapter(chapter_id) => {
				let work_id = self.client.resolve_chapter(chapter_id).await?;
				if let Some(rec) =
					recommendation::get_by_work_id(work_id.cast_signed(), &self.pool).await?
				{
					return Ok(Processed::Catalogued(rec));
				}
				let work_url = Ao3Link::Work(work_id).canonical_url(base_url);
				if let Some(other) = parse_queue::find_active_by_url(&work_url, &self.pool).await? {
					return Ok(Processed::SameWork(other));
				}
				work_id
			}
			Ao3Link::Series(_) => return Err(JobError::WrongKind("work")),
		};
		let metadata = self.client.fetch_work(work_id).await?;
		let url = Ao3Link::Work(work_id).canonical_url(base_url);
		let rec = recommendation::upsert(
			&metadata.into_new_recommendation(url, job.requested_by, job.notes.clone()),
			&self.pool,
		)
		.await?;
		Ok(Processed::Work(rec))
	}

	async fn process_series(&self, job: &ParseJob, link: Ao3Link) -> Result<Processed, JobError> {
		let Ao3Link::Series(series_id) = link else {
			return Err(JobError::WrongKind("series"));
		};
		let metadata = self.client.fetch_series(series_id).await?;
		let base_url = &self.client.config().base_url;
		let url = link.canonical_url(base_url);
		let series = series::upsert(
			&metadata.into_new_series(url, job.requested_by, job.notes.clone()),
			&self.pool,
		)
		.await?;

		let catalogued = recommendation::existing_work_ids(&series.work_ids, &self.pool).await?;
		let mut conn = self
			.pool
			.acquire()
			.await
			.context("Failed to acquire connection for series works")?;
		let mut queued = 0;
		for work_id in series
			.work_ids
			.iter()
			.filter(|id| !catalogued.contains(id))
		{
			let member = NewJob {
				kind: JobKind::Work,
				url: Ao3Link::Work(work_id.cast_unsigned()).canonical_url(base_url),
				requested_by: job.requested_by,
				guild_id: job.guild_id,
				channel_id: job.channel_id,
				notes: None,
			};
			if matches!(
				parse_queue::enqueue(&member, &mut conn).await?,
				EnqueueOutcome::Inserted(_)
			) {
				queued += 1;
			}
		}
		Ok(Processed::Series { series, queued })
	}

	async fn handle(&self, job: ParseJob) -> AResult<()> {
		match self.process(&job).await {
			Ok(processed) => {
				parse_queue::mark_done(job.id, &self.pool).await?;
				let embed = match &processed {
					Processed::Work(rec) => {
						info!("Job {} done: work {} saved as rec {}", job.id, rec.ao3_work_id, rec.id);
						notice_embed(
							&rec.title,
							&format!("Saved as rec #{}. `/rec info {}` shows the details.", rec.id, rec.id),
							COLOUR_GREEN,
						)
						.url(&rec.url)
					}
					Processed::Series { series, queued } => {
						info!(
							"Job {} done: series {} saved, {queued} works queued",
							job.id, series.ao3_series_id
						);
						notice_embed(
							&series.name,
							&format!(
								"Saved as series #{}. {queued} of its {} works were queued.",
								series.id,
								series.work_ids.len()
							),
							COLOUR_GREEN,
						)
						.url(&series.url)
					}
					Processed::Catalogued(rec) => {
						info!("Job {} done: chapter of catalogued rec {}", job.id, rec.id);
						notice_embed(
							&rec.title,
							&format!("That chapter's work is already catalogued as rec #{}.", rec.id),
							COLOUR_GREEN,
						)
						.url(&rec.url)
					}
					Processed::SameWork(other) => {
						info!("Job {} done: work already queued as job {}", job.id, other.id);
						notice_embed(
							"Already queued",
							&format!(
								"That chapter belongs to <{}>, which is already queued as job #{}.",
								other.url, other.id
							),
							COLOUR_GREEN,
						)
					}
				};
				self.announce(&job, embed).await;
			}
			Err(job_error) => match retry_plan(
				job.attempts,
				&job_error,
				self.client.config(),
				unix_now(),
			) {
				RetryPlan::Cooldown { next_attempt_at } => {
					warn!(
						"Job {} attempt {} failed, cooling down until {next_attempt_at}: {job_error}",
						job.id, job.attempts
					);
					parse_queue::mark_retry(job.id, next_attempt_at, &job_error.to_string(), &self.pool)
						.await?;
				}
				RetryPlan::Fail => {
					warn!("Job {} failed for good: {job_error}", job.id);
					parse_queue::mark_failed(job.id, &job_error.to_string(), &self.pool).await?;
					let embed = notice_embed(
						"Couldn't add that link",
						&format!("<{}>\n{job_error}", job.url),
						COLOUR_RED,
					)
					.footer(CreateEmbedFooter::new(format!("Job #{}", job.id)));
					self.announce(&job, embed).await;
				}
			},
		}
		Ok(())
	}

	/// Hands jobs stuck in `processing` back to the queue
	async fn sweep(&self, now: i64) -> AResult<u64> {
		let count =
			parse_queue::reset_stale(stale_cutoff(now, self.client.config()), &self.pool).await?;
		if count > 0 {
			warn!("Reset {count} parse jobs stuck in processing");
		}
		Ok(count)
	}

	async fn announce(&self, job: &ParseJob, embed: CreateEmbed) {
		let (Some(http), Some(channel_id)) = (&self.http, job.channel_id) else {
			return;
		};
		let message = CreateMessage::new()
			.content(format!("<@{}>", job.requested_by))
			.embed(embed);
		if let Err(err) = ChannelId::new(channel_id.cast_unsigned())
			.send_message(http.as_ref(), message)
			.await
		{
			warn!("Failed to announce job {} in {channel_id}: {err}", job.id);
		}
	}
}

/// Runs the parse queue until the process exits.
///
/// Jobs a previous process left in `processing` go back to `pending` first;
/// afterwards every round also releases jobs whose outcome was never recorded.
pub async fn run_worker(
	pool: PgPool,
	client: Ao3Client,
	http: Option<Arc<Http>>,
	notify: Arc<Notify>,
) -> ! {
	let poll_interval = Duration::from_secs(client.config().poll_interval_secs.max(1));
	let worker = QueueWorker { pool, client, http };

	match parse_queue::reset_stale(unix_now().saturating_add(1), &worker.pool).await {
		Ok(0) => {}
		Ok(count) => info!("Reset {count} interrupted parse jobs"),
		Err(err) => error!("Failed to reset interrupted parse jobs: {err:?}"),
	}

	loop {
		if let Err(err) = worker.sweep(unix_now()).await {
			error!("Failed to release stuck parse jobs: {err:?}");
		}
		match parse_queue::claim_next(unix_now(), &worker.pool).await {
			Ok(Some(job)) => {
				info!("Processing job {} ({} {}), attempt {}", job.id, job.kind, job.url, job.attempts);
				if let Err(err) = worker.handle(job).await {
					error!("Failed to record parse job outcome: {err:?}");
				}
				continue;
			}
			Ok(None) => {}
			Err(err) => error!("{err:?}"),
		}
		select! {
			() = notify.notified() => {}
			() = sleep(poll_interval) => {}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use bond_db::{
		parse_queue::{self, JobStatus, ParseJob},
		recommendation, unix_now,
	};
	use reqwest::StatusCode;
	use sqlx::PgPool;
	use tokio::sync::Notify;

	use super::{
		EnqueueResult, JobError, QueueRequest, QueueWorker, RetryPlan, enqueue_link, retry_plan,
		stale_cutoff,
	};
	use crate::{
		ao3::{
			client::{Ao3Client, Page},
			error::Ao3Error,
			testing::{ScriptedAo3, page},
			url::{Ao3Link, LinkError},
		},
		config::settings::Ao3Config,
	};

	const WORK: &str = include_str!("../../tests/fixtures/work.html");
	const BASE: &str = "https://archiveofourown.org";

	const NOW: i64 = 1_700_000_000;

	fn config() -> Ao3Config {
		Ao3Config {
			max_attempts: 4,
			base_cooldown_secs: 100,
			max_cooldown_secs: 1000,
			..Ao3Config::default()
		}
	}

	fn cooldown(plan: RetryPlan) -> i64 {
		match plan {
			RetryPlan::Cooldown { next_attempt_at } => next_attempt_at - NOW,
			RetryPlan::Fail => panic!("expected a cooldown"),
		}
	}

	fn server_error() -> JobError {
		JobError::Ao3(Ao3Error::Server(StatusCode::BAD_GATEWAY))
	}

	#[test]
	fn permanent_errors_fail_immediately() {
		let config = config();
		assert_eq!(
			retry_plan(1, &JobError::Ao3(Ao3Error::NotFound), &config, NOW),
			RetryPlan::Fail
		);
		assert_eq!(
			retry_plan(1, &JobError::Link(LinkError::NotAo3), &config, NOW),
			RetryPlan::Fail
		);
	}

	#[test]
	fn transient_errors_back_off_exponentially() {
		let config = config();
		let first = cooldown(retry_plan(1, &server_error(), &config, NOW));
		assert!((100..=110).contains(&first), "{first}");
		let second = cooldown(retry_plan(2, &server_error(), &config, NOW));
		assert!((200..=220).contains(&second), "{second}");
		let third = cooldown(retry_plan(3, &server_error(), &config, NOW));
		assert!((400..=440).contains(&third), "{third}");
	}

	#[test]
	fn backoff_is_capped() {
		let config = Ao3Config {
			max_attempts: 30,
			..config()
		};
		let late = cooldown(retry_plan(20, &server_error(), &config, NOW));
		assert!((1000..=1100).contains(&late), "{late}");
	}

	#[test]
	fn rate_limits_wait_at_least_retry_after() {
		let error = JobError::Ao3(Ao3Error::RateLimited {
			retry_after: Some(Duration::from_secs(900)),
		});
		assert_eq!(cooldown(retry_plan(1, &error, &config(), NOW)), 900);
	}

	#[test]
	fn attempts_run_out() {
		assert_eq!(retry_plan(4, &server_error(), &config(), NOW), RetryPlan::Fail);
		assert!(matches!(
			retry_plan(3, &server_error(), &config(), NOW),
			RetryPlan::Cooldown { .. }
		));
	}

	#[test]
	fn stale_cutoff_trails_now() {
		let config = Ao3Config {
			stale_job_secs: 600,
			..config()
		};
		assert_eq!(stale_cutoff(NOW, &config), NOW - 600);
		let forever = Ao3Config {
			stale_job_secs: u64::MAX,
			..config
		};
		assert_eq!(stale_cutoff(NOW, &forever), NOW - i64::MAX);
	}

	fn worker(pool: &PgPool, replies: Vec<Result<Page, Ao3Error>>) -> QueueWorker<ScriptedAo3> {
		let config = Ao3Config {
			request_delay_ms: 0,
			..Ao3Config::default()
		};
		QueueWorker {
			pool: pool.clone(),
			client: Ao3Client::with_transport(ScriptedAo3::new(replies), config),
			http: None,
		}
	}

	async fn queue(pool: &PgPool, link: Ao3Link) -> ParseJob {
		let request = QueueRequest {
			requested_by: 42,
			..QueueRequest::default()
		};
		match enqueue_link(pool, &Notify::new(), BASE, link, request).await.unwrap() {
			EnqueueResult::Queued { job, .. } => job,
			other => panic!("expected a queued job, got {other:?}"),
		}
	}

	async fn claim(pool: &PgPool) -> ParseJob {
		parse_queue::claim_next(unix_now(), pool).await.unwrap().unwrap()
	}

	async fn status(pool: &PgPool, id: i64) -> JobStatus {
		parse_queue::get(id, pool).await.unwrap().unwrap().status().unwrap()
	}

	#[sqlx::test(migrations = "../bond_db/migrations")]
	#[ignore = "needs DATABASE_URL pointing at Postgres"]
	async fn work_jobs_become_recs(pool: PgPool) {
		let notify = Notify::new();
		let request = QueueRequest::default();
		let EnqueueResult::Queued { job, position, existing } =
			enqueue_link(&pool, &notify, BASE, Ao3Link::Work(1_234_567), request.clone())
				.await
				.unwrap()
		else {
			panic!("work should be queued");
		};
		assert_eq!((position, existing), (0, false));
		assert!(matches!(
			enqueue_link(&pool, &notify, BASE, Ao3Link::Work(1_234_567), request.clone()).await.unwrap(),
			EnqueueResult::Queued { job: again, existing: true, .. } if again.id == job.id
		));

		let worker = worker(&pool, vec![page(&job.url, WORK)]);
		worker.handle(claim(&pool).await).await.unwrap();
		assert_eq!(status(&pool, job.id).await, JobStatus::Done);
		let rec = recommendation::get_by_work_id(1_234_567, &pool).await.unwrap().unwrap();
		assert_eq!(rec.title, "The Long Way Home");

		assert!(matches!(
			enqueue_link(&pool, &notify, BASE, Ao3Link::Work(1_234_567), request).await.unwrap(),
			EnqueueResult::CataloguedWork(found) if found.id == rec.id
		));
	}

	#[sqlx::test(migrations = "../bond_db/migrations")]
	#[ignore = "needs DATABASE_URL pointing at Postgres"]
	async fn failures_cool_down_or_fail(pool: PgPool) {
		let flaky = queue(&pool, Ao3Link::Work(1)).await;
		let gone = queue(&pool, Ao3Link::Work(2)).await;
		let worker = worker(
			&pool,
			vec![Err(Ao3Error::Server(StatusCode::BAD_GATEWAY)), Err(Ao3Error::NotFound)],
		);

		let before = unix_now();
		worker.handle(claim(&pool).await).await.unwrap();
		let cooling = parse_queue::get(flaky.id, &pool).await.unwrap().unwrap();
		assert_eq!(cooling.status().unwrap(), JobStatus::Cooldown);
		assert!(cooling.next_attempt_at > before);
		assert!(cooling.last_error.is_some());

		worker.handle(claim(&pool).await).await.unwrap();
		assert_eq!(status(&pool, gone.id).await, JobStatus::Failed);
	}

	#[sqlx::test(migrations = "../bond_db/migrations")]
	#[ignore = "needs DATABASE_URL pointing at Postgres"]
	async fn chapters_of_catalogued_works_stop_early(pool: PgPool) {
		let work = queue(&pool, Ao3Link::Work(1_234_567)).await;
		let chapter = queue(&pool, Ao3Link::Chapter(5)).await;
		let worker = worker(
			&pool,
			vec![
				page(&work.url, WORK),
				page(&format!("{BASE}/works/1234567/chapters/5"), WORK),
			],
		);

		worker.handle(claim(&pool).await).await.unwrap();
		worker.handle(claim(&pool).await).await.unwrap();
		assert_eq!(status(&pool, chapter.id).await, JobStatus::Done);
		assert_eq!(worker.client.transport.requests().len(), 2);
		assert_eq!(recommendation::count(&pool).await.unwrap(), 1);
	}

	#[sqlx::test(migrations = "../bond_db/migrations")]
	#[ignore = "needs DATABASE_URL pointing at Postgres"]
	async fn chapters_defer_to_a_queued_work(pool: PgPool) {
		let chapter = queue(&pool, Ao3Link::Chapter(5)).await;
		let work = queue(&pool, Ao3Link::Work(1_234_567)).await;
		let worker = worker(&pool, vec![page(&format!("{BASE}/works/1234567/chapters/5"), WORK)]);

		worker.handle(claim(&pool).await).await.unwrap();
		assert_eq!(status(&pool, chapter.id).await, JobStatus::Done);
		assert_eq!(status(&pool, work.id).await, JobStatus::Pending);
		assert_eq!(recommendation::count(&pool).await.unwrap(), 0);
	}

	#[sqlx::test(migrations = "../bond_db/migrations")]
	#[ignore = "needs DATABASE_URL pointing at Postgres"]
	async fn stuck_jobs_are_swept(pool: PgPool) {
		let job = queue(&pool, Ao3Link::Work(3)).await;
		claim(&pool).await;
		let worker = worker(&pool, Vec::new());
		let stale_after = i64::try_from(worker.client.config().stale_job_secs).unwrap();

		assert_eq!(worker.sweep(unix_now()).await.unwrap(), 0);
		assert_eq!(status(&pool, job.id).await, JobStatus::Processing);
		assert_eq!(worker.sweep(unix_now() + stale_after + 1).await.unwrap(), 1);
		assert_eq!(status(&pool, job.id).await, JobStatus::Pending);
	}
}
