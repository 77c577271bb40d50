use anyhow::{Context as _, Result as AResult};
use sqlx::{FromRow, PgExecutor, query, query_as};

use crate::unix_now;

#[derive(Clone, Debug, Default, FromRow)]
pub struct Profile {
	pub user_id: i64,
	pub pronouns: Option<String>,
	pub timezone: Option<String>,
	pub region: Option<String>,
	pub ao3_username: Option<String>,
	pub bio: Option<String>,
	pub sprint_words: i64,
	pub created_at: i64,
	pub updated_at: i64,
}

/// The user editable part of a profile
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProfileFields {
	pub pronouns: Option<String>,
	pub timezone: Option<String>,
	pub region: Option<String>,
	pub ao3_username: Option<String>,
	pub bio: Option<String>,
}

const COLUMNS: &str = "user_id, pronouns, timezone, region, ao3_username, bio, sprint_words, \
                       created_at, updated_at";

pub async fn get(user_id: i64, conn: impl PgExecutor<'_>) -> AResult<Option<Profile>> {
	query_as::<_, Profile>(&format!("SELECT {COLUMNS} FROM profiles WHERE user_id = $1"))
		.bind(user_id)
		.fetch_optional(conn)
		.await
		.context("Failed to fetch profile")
}

pub async fn upsert(
	user_id: i64,
	fields: &ProfileFields,
	conn: impl PgExecutor<'_>,
) -> AResult<Profile> {
	query_as::<_, Profile>(&format!(
		"INSERT INTO profiles (user_id, pronouns, timezone, region, ao3_username, bio,
                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            ON CONFLICT (user_id)
            DO UPDATE SET
                pronouns = $2,
                timezone = $3,
                region = $4,
                ao3_username = $5,
                bio = $6,
                updated_at = $7
            RETURNING {COLUMNS}"
	))
	.bind(user_id)
	.bind(&fields.pronouns)
	.bind(&fields.timezone)
	.bind(&fields.region)
	.bind(&fields.ao3_username)
	.bind(&fields.bio)
	.bind(unix_now())
	.fetch_one(conn)
	.await
	.context("Failed to save profile")
}

/// Adds sprint words, creating an empty profile if needed
pub async fn add_sprint_words(user_id: i64, words: i64, conn: impl PgExecutor<'_>) -> AResult<()> {
	query(
		"INSERT INTO profiles (user_id, sprint_words, created_at, updated_at)
            VALUES ($1, $2, $3, $3)
            ON CONFLICT (user_id)
            DO UPDATE SET
                sprint_words = profiles.sprint_words + $2,
                updated_at = $3",
	)
	.bind(user_id)
	.bind(words)
	.bind(unix_now())
	.execute(conn)
	.await
	.context("Failed to add sprint words")?;
	Ok(())
}

pub async fn delete(user_id: i64, conn: impl PgExecutor<'_>) -> AResult<bool> {
	let result = query("DELETE FROM profiles WHERE user_id = $1")
		.bind(user_id)
		.execute(conn)
		.await
		.context("Failed to delete profile")?;
	Ok(result.rows_affected() > 0)
}
