use std::fmt;

use anyhow::{Context as _, Result as AResult, bail};
use sqlx::{FromRow, PgExecutor, query, query_as};

/// Ordered: a higher level may do everything a lower one can
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PermissionLevel {
	#[default]
	Member,
	Trusted,
	Moderator,
	Admin,
}

impl PermissionLevel {
	#[must_use]
	pub const fn as_i16(self) -> i16 {
		match self {
			Self::Member => 0,
			Self::Trusted => 1,
			Self::Moderator => 2,
			Self::Admin => 3,
		}
	}

	pub fn from_i16(value: i16) -> AResult<Self> {
		Ok(match value {
			0 => Self::Member,
			1 => Self::Trusted,
			2 => Self::Moderator,
			3 => Self::Admin,
			_ => bail!("Unknown permission level: {value}"),
		})
	}
}

impl fmt::Display for PermissionLevel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Member => "Member",
			Self::Trusted => "Trusted",
			Self::Moderator => "Moderator",
			Self::Admin => "Admin",
		})
	}
}

#[derive(Clone, Debug, FromRow, PartialEq, Eq)]
pub struct RoleLevel {
	pub guild_id: i64,
	pub role_id: i64,
	pub level: i16,
}

impl RoleLevel {
	/// Rows with an unknown level count as plain members
	#[must_use]
	pub fn level(&self) -> PermissionLevel {
		PermissionLevel::from_i16(self.level).unwrap_or_default()
	}
}

/// Highest level granted by any of `roles`
#[must_use]
pub fn resolve_level(table: &[RoleLevel], roles: &[i64]) -> PermissionLevel {
	table
		.iter()
		.filter(|entry| roles.contains(&entry.role_id))
		.map(RoleLevel::level)
		.max()
		.unwrap_or_default()
}

pub async fn set_role_level(
	guild_id: i64,
	role_id: i64,
	level: PermissionLevel,
	conn: impl PgExecutor<'_>,
) -> AResult<()> {
	query(
		"INSERT INTO role_levels (guild_id, role_id, level)
            VALUES ($1, $2, $3)
            ON CONFLICT (guild_id, role_id)
            DO UPDATE SET level = $3",
	)
	.bind(guild_id)
	.bind(role_id)
	.bind(level.as_i16())
	.execute(conn)
	.await
	.context("Failed to set role level")?;
	Ok(())
}

pub async fn remove_role_level(
	guild_id: i64,
	role_id: i64,
	conn: impl PgExecutor<'_>,
) -> AResult<bool> {
	let result = query("DELETE FROM role_levels WHERE guild_id = $1 AND role_id = $2")
		.bind(guild_id)
		.bind(role_id)
		.execute(conn)
		.await
		.context("Failed to remove role level")?;
	Ok(result.rows_affected() > 0)
}

pub async fn levels_for_guild(guild_id: i64, conn: impl PgExecutor<'_>) -> AResult<Vec<RoleLevel>> {
	query_as::<_, RoleLevel>(
		"SELECT guild_id, role_id, level FROM role_levels
            WHERE guild_id = $1
            ORDER BY level DESC, role_id",
	)
	.bind(guild_id)
	.fetch_all(conn)
	.await
	.context("Failed to fetch role levels")
}

#[cfg(test)]
mod tests {
	use super::{PermissionLevel, RoleLevel, resolve_level};

	fn entry(role_id: i64, level: PermissionLevel) -> RoleLevel {
		RoleLevel {
			guild_id: 1,
			role_id,
			level: level.as_i16(),
		}
	}

	#[test]
	fn highest_role_wins() {
		let table = [
			entry(10, PermissionLevel::Trusted),
			entry(20, PermissionLevel::Moderator),
			entry(30, PermissionLevel::Admin),
		];
		assert_eq!(resolve_level(&table, &[10, 20]), PermissionLevel::Moderator);
		assert_eq!(resolve_level(&table, &[30]), PermissionLevel::Admin);
		assert_eq!(resolve_level(&table, &[99]), PermissionLevel::Member);
		assert_eq!(resolve_level(&[], &[10]), PermissionLevel::Member);
	}

	#[test]
	fn unknown_stored_level_is_member() {
		let broken = RoleLevel {
			guild_id: 1,
			role_id: 5,
			level: 42,
		};
		assert_eq!(broken.level(), PermissionLevel::Member);
		assert!(PermissionLevel::Admin > PermissionLevel::Moderator);
	}
}
