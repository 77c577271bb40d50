use anyhow::{Context as _, Result as AResult};
use sqlx::{FromRow, PgExecutor, query, query_as};

use crate::unix_now;

/// Feature name that covers every feature
pub const ALL_FEATURES: &str = "all";

#[derive(Clone, Debug, FromRow, PartialEq, Eq)]
pub struct ModerationLock {
	pub id: i64,
	pub guild_id: i64,
	pub user_id: i64,
	pub feature: String,
	pub reason: Option<String>,
	pub locked_by: i64,
	pub expires_at: Option<i64>,
	pub created_at: i64,
}

impl ModerationLock {
	#[must_use]
	pub fn is_expired(&self, now: i64) -> bool {
		self.expires_at.is_some_and(|expires_at| expires_at <= now)
	}

	/// Whether this lock keeps the user away from `feature`
	#[must_use]
	pub fn covers(&self, feature: &str, now: i64) -> bool {
		!self.is_expired(now) && (self.feature == ALL_FEATURES || self.feature == feature)
	}
}

const COLUMNS: &str = "id, guild_id, user_id, feature, reason, locked_by, expires_at, created_at";

/// Locking an already locked feature replaces reason and expiry
pub async fn lock(
	guild_id: i64,
	user_id: i64,
	feature: &str,
	reason: Option<&str>,
	locked_by: i64,
	expires_at: Option<i64>,
	conn: impl PgExecutor<'_>,
) -> AResult<ModerationLock> {
	query_as::<_, ModerationLock>(&format!(
		"INSERT INTO moderation_locks (guild_id, user_id, feature, reason, locked_by,
                expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (guild_id, user_id, feature)
            DO UPDATE SET
                reason = $4,
                locked_by = $5,
                expires_at = $6,
                created_at = $7
            RETURNING {COLUMNS}"
	))
	.bind(guild_id)
	.bind(user_id)
	.bind(feature)
	.bind(reason)
	.bind(locked_by)
	.bind(expires_at)
	.bind(unix_now())
	.fetch_one(conn)
	.await
	.context("Failed to lock user")
}

pub async fn unlock(
	guild_id: i64,
	user_id: i64,
	feature: &str,
	conn: impl PgExecutor<'_>,
) -> AResult<bool> {
	let result = query(
		"DELETE FROM moderation_locks
            WHERE guild_id = $1 AND user_id = $2 AND feature = $3",
	)
	.bind(guild_id)
	.bind(user_id)
	.bind(feature)
	.execute(conn)
	.await
	.context("Failed to unlock user")?;
	Ok(result.rows_affected() > 0)
}

/// Locks of a user in any guild that have not expired yet.
///
/// Not scoped to a guild: DMs to the modmail bot have none.
pub async fn active_locks_for_user(
	user_id: i64,
	conn: impl PgExecutor<'_>,
) -> AResult<Vec<ModerationLock>> {
	query_as::<_, ModerationLock>(&format!(
		"SELECT {COLUMNS} FROM moderation_locks
            WHERE user_id = $1 AND (expires_at IS NULL OR expires_at > $2)
            ORDER BY created_at DESC"
	))
	.bind(user_id)
	.bind(unix_now())
	.fetch_all(conn)
	.await
	.context("Failed to fetch user locks")
}

pub async fn list_for_guild(guild_id: i64, conn: impl PgExecutor<'_>) -> AResult<Vec<ModerationLock>> {
	query_as::<_, ModerationLock>(&format!(
		"SELECT {COLUMNS} FROM moderation_locks
            WHERE guild_id = $1 AND (expires_at IS NULL OR expires_at > $2)
            ORDER BY created_at DESC"
	))
	.bind(guild_id)
	.bind(unix_now())
	.fetch_all(conn)
	.await
	.context("Failed to fetch guild locks")
}

#[cfg(test)]
mod tests {
	use super::{ALL_FEATURES, ModerationLock};

	fn lock(feature: &str, expires_at: Option<i64>) -> ModerationLock {
		ModerationLock {
			id: 1,
			guild_id: 10,
			user_id: 20,
			feature: feature.to_owned(),
			reason: None,
			locked_by: 30,
			expires_at,
			created_at: 0,
		}
	}

	#[test]
	fn lock_covers_its_feature_until_expiry() {
		let recs = lock("recs", Some(100));
		assert!(recs.covers("recs", 99));
		assert!(!recs.covers("recs", 100));
		assert!(!recs.covers("sprints", 50));
	}

	#[test]
	fn all_lock_covers_everything_forever() {
		let all = lock(ALL_FEATURES, None);
		assert!(all.covers("modmail", i64::MAX));
		assert!(all.covers("profiles", 0));
	}
}
