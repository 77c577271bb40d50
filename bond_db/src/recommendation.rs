use anyhow::{Context as _, Result as AResult};
use sqlx::{FromRow, PgExecutor, query, query_as, query_scalar};

use crate::unix_now;

#[derive(Clone, Debug, FromRow)]
pub struct Recommendation {
	pub id: i64,
	pub ao3_work_id: i64,
	pub url: String,
	pub title: String,
	pub authors: Vec<String>,
	pub summary: Option<String>,
	pub rating: Option<String>,
	pub warnings: Vec<String>,
	pub categories: Vec<String>,
	pub fandoms: Vec<String>,
	pub relationships: Vec<String>,
	pub characters: Vec<String>,
	pub tags: Vec<String>,
	pub language: Option<String>,
	pub words: Option<i64>,
	pub chapters_written: Option<i32>,
	pub chapters_total: Option<i32>,
	pub complete: bool,
	pub kudos: Option<i64>,
	pub hits: Option<i64>,
	pub bookmarks: Option<i64>,
	pub published: Option<String>,
	pub updated: Option<String>,
	pub ao3_series_ids: Vec<i64>,
	pub recommended_by: i64,
	pub notes: Option<String>,
	pub created_at: i64,
	pub updated_at: i64,
}

/// Everything the parser knows about a work, ready to be written
#[derive(Clone, Debug, Default)]
pub struct NewRecommendation {
	pub ao3_work_id: i64,
	pub url: String,
	pub title: String,
	pub authors: Vec<String>,
	pub summary: Option<String>,
	pub rating: Option<String>,
	pub warnings: Vec<String>,
	pub categories: Vec<String>,
	pub fandoms: Vec<String>,
	pub relationships: Vec<String>,
	pub characters: Vec<String>,
	pub tags: Vec<String>,
	pub language: Option<String>,
	pub words: Option<i64>,
	pub chapters_written: Option<i32>,
	pub chapters_total: Option<i32>,
	pub complete: bool,
	pub kudos: Option<i64>,
	pub hits: Option<i64>,
	pub bookmarks: Option<i64>,
	pub published: Option<String>,
	pub updated: Option<String>,
	pub ao3_series_ids: Vec<i64>,
	pub recommended_by: i64,
	pub notes: Option<String>,
}

/// Optional narrowing for `/rec random`
#[derive(Clone, Debug, Default)]
pub struct RandomFilter {
	pub tag: Option<String>,
	pub rating: Option<String>,
}

const COLUMNS: &str = "id, ao3_work_id, url, title, authors, summary, rating, warnings, \
                       categories, fandoms, relationships, characters, tags, language, words, \
                       chapters_written, chapters_total, complete, kudos, hits, bookmarks, \
                       published, updated, ao3_series_ids, recommended_by, notes, created_at, \
                       updated_at";

/// Inserts a new rec or refreshes the metadata of an existing one.
///
/// An existing rec keeps its submitter and its notes unless it had none.
pub async fn upsert(rec: &NewRecommendation, conn: impl PgExecutor<'_>) -> AResult<Recommendation> {
	let now = unix_now();
	query_as::<_, Recommendation>(&format!(
		"INSERT INTO recommendations (ao3_work_id, url, title, authors, summary, rating, warnings,
                categories, fandoms, relationships, characters, tags, language, words,
                chapters_written, chapters_total, complete, kudos, hits, bookmarks, published,
                updated, ao3_series_ids, recommended_by, notes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                $18, $19, $20, $21, $22, $23, $24, $25, $26, $26)
            ON CONFLICT (ao3_work_id)
            DO UPDATE SET
                url = EXCLUDED.url,
                title = EXCLUDED.title,
                authors = EXCLUDED.authors,
                summary = EXCLUDED.summary,
                rating = EXCLUDED.rating,
                warnings = EXCLUDED.warnings,
                categories = EXCLUDED.categories,
                fandoms = EXCLUDED.fandoms,
                relationships = EXCLUDED.relationships,
                characters = EXCLUDED.characters,
                tags = EXCLUDED.tags,
                language = EXCLUDED.language,
                words = EXCLUDED.words,
                chapters_written = EXCLUDED.chapters_written,
                chapters_total = EXCLUDED.chapters_total,
                complete = EXCLUDED.complete,
                kudos = EXCLUDED.kudos,
                hits = EXCLUDED.hits,
                bookmarks = EXCLUDED.bookmarks,
                published = EXCLUDED.published,
                updated = EXCLUDED.updated,
                ao3_series_ids = EXCLUDED.ao3_series_ids,
                notes = COALESCE(recommendations.notes, EXCLUDED.notes),
                updated_at = EXCLUDED.updated_at
            RETURNING {COLUMNS}"
	))
	.bind(rec.ao3_work_id)
	.bind(&rec.url)
	.bind(&rec.title)
	.bind(&rec.authors)
	.bind(&rec.summary)
	.bind(&rec.rating)
	.bind(&rec.warnings)
	.bind(&rec.categories)
	.bind(&rec.fandoms)
	.bind(&rec.relationships)
	.bind(&rec.characters)
	.bind(&rec.tags)
	.bind(&rec.language)
	.bind(rec.words)
	.bind(rec.chapters_written)
	.bind(rec.chapters_total)
	.bind(rec.complete)
	.bind(rec.kudos)
	.bind(rec.hits)
	.bind(rec.bookmarks)
	.bind(&rec.published)
	.bind(&rec.updated)
	.bind(&rec.ao3_series_ids)
	.bind(rec.recommended_by)
	.bind(&rec.notes)
	.bind(now)
	.fetch_one(conn)
	.await
	.context("Failed to upsert recommendation")
}

pub async fn get(id: i64, conn: impl PgExecutor<'_>) -> AResult<Option<Recommendation>> {
	query_as::<_, Recommendation>(&format!(
		"SELECT {COLUMNS} FROM recommendations WHERE id = $1"
	))
	.bind(id)
	.fetch_optional(conn)
	.await
	.context("Failed to fetch recommendation")
}

pub async fn get_by_work_id(
	ao3_work_id: i64,
	conn: impl PgExecutor<'_>,
) -> AResult<Option<Recommendation>> {
	query_as::<_, Recommendation>(&format!(
		"SELECT {COLUMNS} FROM recommendations WHERE ao3_work_id = $1"
	))
	.bind(ao3_work_id)
	.fetch_optional(conn)
	.await
	.context("Failed to fetch recommendation by work id")
}

/// Work ids out of `ids` that already have a rec
pub async fn existing_work_ids(ids: &[i64], conn: impl PgExecutor<'_>) -> AResult<Vec<i64>> {
	query_scalar::<_, i64>(
		"SELECT ao3_work_id FROM recommendations WHERE ao3_work_id = ANY($1)",
	)
	.bind(ids)
	.fetch_all(conn)
	.await
	.context("Failed to look up existing work ids")
}

pub async fn by_work_ids(ids: &[i64], conn: impl PgExecutor<'_>) -> AResult<Vec<Recommendation>> {
	query_as::<_, Recommendation>(&format!(
		"SELECT {COLUMNS} FROM recommendations WHERE ao3_work_id = ANY($1)"
	))
	.bind(ids)
	.fetch_all(conn)
	.await
	.context("Failed to fetch recommendations by work ids")
}

pub async fn delete(id: i64, conn: impl PgExecutor<'_>) -> AResult<bool> {
	let result = query("DELETE FROM recommendations WHERE id = $1")
		.bind(id)
		.execute(conn)
		.await
		.context("Failed to delete recommendation")?;
	Ok(result.rows_affected() > 0)
}

pub async fn set_notes(id: i64, notes: Option<&str>, conn: impl PgExecutor<'_>) -> AResult<bool> {
	let result = query("UPDATE recommendations SET notes = $2, updated_at = $3 WHERE id = $1")
		.bind(id)
		.bind(notes)
		.bind(unix_now())
		.execute(conn)
		.await
		.context("Failed to set recommendation notes")?;
	Ok(result.rows_affected() > 0)
}

pub async fn random(
	filter: &RandomFilter,
	conn: impl PgExecutor<'_>,
) -> AResult<Option<Recommendation>> {
	query_as::<_, Recommendation>(&format!(
		"SELECT {COLUMNS} FROM recommendations
            WHERE ($1::TEXT IS NULL
                OR EXISTS (SELECT 1 FROM unnest(tags || fandoms || relationships || characters) t
                    WHERE lower(t) = lower($1)))
            AND ($2::TEXT IS NULL OR lower(rating) = lower($2))
            ORDER BY random()
            LIMIT 1"
	))
	.bind(filter.tag.as_deref())
	.bind(filter.rating.as_deref())
	.fetch_optional(conn)
	.await
	.context("Failed to fetch random recommendation")
}

/// Case-insensitive match on title, author or any tag
pub async fn search(
	needle: &str,
	limit: i64,
	offset: i64,
	conn: impl PgExecutor<'_>,
) -> AResult<Vec<Recommendation>> {
	query_as::<_, Recommendation>(&format!(
		"SELECT {COLUMNS} FROM recommendations
            WHERE title ILIKE $1
                OR EXISTS (SELECT 1 FROM unnest(authors || tags || fandoms || relationships
                    || characters) t WHERE t ILIKE $1)
            ORDER BY title, id
            LIMIT $2 OFFSET $3"
	))
	.bind(like_pattern(needle))
	.bind(limit)
	.bind(offset)
	.fetch_all(conn)
	.await
	.context("Failed to search recommendations")
}

pub async fn count_search(needle: &str, conn: impl PgExecutor<'_>) -> AResult<i64> {
	query_scalar::<_, i64>(
		"SELECT COUNT(*) FROM recommendations
            WHERE title ILIKE $1
                OR EXISTS (SELECT 1 FROM unnest(authors || tags || fandoms || relationships
                    || characters) t WHERE t ILIKE $1)",
	)
	.bind(like_pattern(needle))
	.fetch_one(conn)
	.await
	.context("Failed to count recommendations")
}

pub async fn count(conn: impl PgExecutor<'_>) -> AResult<i64> {
	query_scalar::<_, i64>("SELECT COUNT(*) FROM recommendations")
		.fetch_one(conn)
		.await
		.context("Failed to count recommendations")
}

/// Escapes `LIKE` wildcards in user input and wraps it in `%...%`
#[must_use]
pub fn like_pattern(needle: &str) -> String {
	let mut pattern = String::with_capacity(needle.len().saturating_add(2));
	pattern.push('%');
	for c in needle.trim().chars() {
		if matches!(c, '%' | '_' | '\\') {
			pattern.push('\\');
		}
		pattern.push(c);
	}
	pattern.push('%');
	pattern
}

#[cfg(test)]
mod tests {
	use super::like_pattern;

	#[test]
	fn like_pattern_escapes_wildcards() {
		assert_eq!(like_pattern(" dean "), "%dean%");
		assert_eq!(like_pattern("100%_done"), "%100\\%\\_done%");
		assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
	}
}
