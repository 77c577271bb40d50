use anyhow::{Context as _, Result as AResult};
use sqlx::{FromRow, PgExecutor, query, query_as};

use crate::unix_now;

#[derive(Clone, Debug, FromRow)]
pub struct Series {
	pub id: i64,
	pub ao3_series_id: i64,
	pub url: String,
	pub name: String,
	pub creators: Vec<String>,
	pub summary: Option<String>,
	pub words: Option<i64>,
	pub works_count: i32,
	pub complete: bool,
	pub work_ids: Vec<i64>,
	pub recommended_by: i64,
	pub notes: Option<String>,
	pub created_at: i64,
	pub updated_at: i64,
}

#[derive(Clone, Debug, Default)]
pub struct NewSeries {
	pub ao3_series_id: i64,
	pub url: String,
	pub name: String,
	pub creators: Vec<String>,
	pub summary: Option<String>,
	pub words: Option<i64>,
	pub works_count: i32,
	pub complete: bool,
	pub work_ids: Vec<i64>,
	pub recommended_by: i64,
	pub notes: Option<String>,
}

const COLUMNS: &str = "id, ao3_series_id, url, name, creators, summary, words, works_count, \
                       complete, work_ids, recommended_by, notes, created_at, updated_at";

pub async fn upsert(series: &NewSeries, conn: impl PgExecutor<'_>) -> AResult<Series> {
	query_as::<_, Series>(&format!(
		"INSERT INTO series (ao3_series_id, url, name, creators, summary, words, works_count,
                complete, work_ids, recommended_by, notes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
            ON CONFLICT (ao3_series_id)
            DO UPDATE SET
                url = EXCLUDED.url,
                name = EXCLUDED.name,
                creators = EXCLUDED.creators,
                summary = EXCLUDED.summary,
                words = EXCLUDED.words,
                works_count = EXCLUDED.works_count,
                complete = EXCLUDED.complete,
                work_ids = EXCLUDED.work_ids,
                notes = COALESCE(series.notes, EXCLUDED.notes),
                updated_at = EXCLUDED.updated_at
            RETURNING {COLUMNS}"
	))
	.bind(series.ao3_series_id)
	.bind(&series.url)
	.bind(&series.name)
	.bind(&series.creators)
	.bind(&series.summary)
	.bind(series.words)
	.bind(series.works_count)
	.bind(series.complete)
	.bind(&series.work_ids)
	.bind(series.recommended_by)
	.bind(&series.notes)
	.bind(unix_now())
	.fetch_one(conn)
	.await
	.context("Failed to upsert series")
}

pub async fn get(id: i64, conn: impl PgExecutor<'_>) -> AResult<Option<Series>> {
	query_as::<_, Series>(&format!("SELECT {COLUMNS} FROM series WHERE id = $1"))
		.bind(id)
		.fetch_optional(conn)
		.await
		.context("Failed to fetch series")
}

pub async fn get_by_series_id(
	ao3_series_id: i64,
	conn: impl PgExecutor<'_>,
) -> AResult<Option<Series>> {
	query_as::<_, Series>(&format!(
		"SELECT {COLUMNS} FROM series WHERE ao3_series_id = $1"
	))
	.bind(ao3_series_id)
	.fetch_optional(conn)
	.await
	.context("Failed to fetch series by AO3 id")
}

pub async fn delete(id: i64, conn: impl PgExecutor<'_>) -> AResult<bool> {
	let result = query("DELETE FROM series WHERE id = $1")
		.bind(id)
		.execute(conn)
		.await
		.context("Failed to delete series")?;
	Ok(result.rows_affected() > 0)
}
