use std::sync::Arc;

use anyhow::Result as AResult;
use bond_db::{
	lock::{self, ModerationLock},
	permission::{self, PermissionLevel, RoleLevel, resolve_level},
	unix_now,
};
use serenity::all::{GuildId, UserId};

use crate::{
	config::types::{Data, Error, Feature, SContext, UserError},
	utils::helpers::discord_timestamp,
};

/// Owners and Administrators outrank every configured role
#[must_use]
pub fn level_for(
	is_owner: bool,
	is_administrator: bool,
	table: &[RoleLevel],
	roles: &[i64],
) -> PermissionLevel {
	if is_owner || is_administrator {
		PermissionLevel::Admin
	} else {
		resolve_level(table, roles)
	}
}

pub async fn role_levels(data: &Data, guild_id: GuildId) -> AResult<Arc<Vec<RoleLevel>>> {
	if let Some(levels) = data.role_levels.get(&guild_id) {
		return Ok(levels);
	}
	let levels = Arc::new(permission::levels_for_guild(i64::from(guild_id), &data.db).await?);
	data.role_levels.insert(guild_id, Arc::clone(&levels));
	Ok(levels)
}

pub fn forget_role_levels(data: &Data, guild_id: GuildId) {
	data.role_levels.invalidate(&guild_id);
}

pub async fn author_level(ctx: SContext<'_>) -> AResult<PermissionLevel> {
	let Some(guild_id) = ctx.guild_id() else {
		return Ok(PermissionLevel::Member);
	};
	let Some(member) = ctx.author_member().await else {
		return Ok(PermissionLevel::Member);
	};
	let is_owner = ctx
		.guild()
		.is_some_and(|guild| guild.owner_id == ctx.author().id);
	let is_administrator = member
		.permissions
		.is_some_and(|permissions| permissions.administrator());
	let roles: Vec<i64> = member.roles.iter().map(|role| i64::from(*role)).collect();
	let table = role_levels(ctx.data(), guild_id).await?;
	Ok(level_for(is_owner, is_administrator, &table, &roles))
}

async fn require_level(ctx: SContext<'_>, level: PermissionLevel) -> Result<bool, Error> {
	if author_level(ctx).await? >= level {
		Ok(true)
	} else {
		Err(UserError::new(format!("This needs at least the {level} level in this server.")).into())
	}
}

pub async fn require_trusted(ctx: SContext<'_>) -> Result<bool, Error> {
	require_level(ctx, PermissionLevel::Trusted).await
}

pub async fn require_moderator(ctx: SContext<'_>) -> Result<bool, Error> {
	require_level(ctx, PermissionLevel::Moderator).await
}

pub async fn require_admin(ctx: SContext<'_>) -> Result<bool, Error> {
	require_level(ctx, PermissionLevel::Admin).await
}

pub async fn user_locks(data: &Data, user_id: UserId) -> AResult<Arc<Vec<ModerationLock>>> {
	if let Some(locks) = data.user_locks.get(&user_id) {
		return Ok(locks);
	}
	let locks = Arc::new(lock::active_locks_for_user(i64::from(user_id), &data.db).await?);
	data.user_locks.insert(user_id, Arc::clone(&locks));
	Ok(locks)
}

pub fn forget_user_locks(data: &Data, user_id: UserId) {
	data.user_locks.invalidate(&user_id);
}

/// The lock keeping `user_id` from `feature` in `guild_id`, if any
pub async fn active_lock(
	data: &Data,
	guild_id: GuildId,
	user_id: UserId,
	feature: Feature,
) -> AResult<Option<ModerationLock>> {
	let now = unix_now();
	let guild_id = i64::from(guild_id);
	Ok(user_locks(data, user_id)
		.await?
		.iter()
		.find(|lock| lock.guild_id == guild_id && lock.covers(feature.as_str(), now))
		.cloned())
}

#[must_use]
pub fn lock_message(lock: &ModerationLock, feature: Feature) -> String {
	let mut message = format!("You're locked from using {feature} here");
	if let Some(expires_at) = lock.expires_at {
		message.push_str(&format!(" until {}", discord_timestamp(expires_at, 'f')));
	}
	message.push('.');
	if let Some(reason) = &lock.reason {
		message.push_str(&format!("\nReason: {reason}"));
	}
	message
}

async fn require_unlocked(ctx: SContext<'_>, feature: Feature) -> Result<bool, Error> {
	let Some(guild_id) = ctx.guild_id() else {
		return Ok(true);
	};
	match active_lock(ctx.data(), guild_id, ctx.author().id, feature).await? {
		Some(lock) => Err(UserError::new(lock_message(&lock, feature)).into()),
		None => Ok(true),
	}
}

pub async fn recs_unlocked(ctx: SContext<'_>) -> Result<bool, Error> {
	require_unlocked(ctx, Feature::Recs).await
}

pub async fn profiles_unlocked(ctx: SContext<'_>) -> Result<bool, Error> {
	require_unlocked(ctx, Feature::Profiles).await
}

pub async fn sprints_unlocked(ctx: SContext<'_>) -> Result<bool, Error> {
	require_unlocked(ctx, Feature::Sprints).await
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;

	use bond_db::{
		lock::ModerationLock,
		permission::{PermissionLevel, RoleLevel},
	};
	use serenity::all::{GuildId, UserId};
	use sqlx::postgres::PgPoolOptions;

	use super::{forget_role_levels, forget_user_locks, level_for, lock_message};
	use crate::config::{
		settings::BotConfig,
		types::{Data, Feature, SharedState},
	};

	fn bot(name: &str, features: Vec<Feature>) -> BotConfig {
		BotConfig {
			name: name.to_owned(),
			token: String::new(),
			activity: None,
			features,
			modmail_guild_id: None,
		}
	}

	fn lock() -> ModerationLock {
		ModerationLock {
			id: 1,
			guild_id: 1,
			user_id: 2,
			feature: "recs".to_owned(),
			reason: Some("spam".to_owned()),
			locked_by: 3,
			expires_at: Some(1_700_000_000),
			created_at: 0,
		}
	}

	fn table() -> Vec<RoleLevel> {
		vec![
			RoleLevel {
				guild_id: 1,
				role_id: 10,
				level: PermissionLevel::Trusted.as_i16(),
			},
			RoleLevel {
				guild_id: 1,
				role_id: 20,
				level: PermissionLevel::Moderator.as_i16(),
			},
		]
	}

	#[test]
	fn owners_and_administrators_are_admins() {
		assert_eq!(level_for(true, false, &[], &[]), PermissionLevel::Admin);
		assert_eq!(level_for(false, true, &table(), &[10]), PermissionLevel::Admin);
	}

	#[test]
	fn roles_grant_their_highest_level() {
		assert_eq!(level_for(false, false, &table(), &[10, 20]), PermissionLevel::Moderator);
		assert_eq!(level_for(false, false, &table(), &[10]), PermissionLevel::Trusted);
		assert_eq!(level_for(false, false, &table(), &[99]), PermissionLevel::Member);
	}

	#[test]
	fn lock_messages_mention_expiry_and_reason() {
		assert_eq!(
			lock_message(&lock(), Feature::Recs),
			"You're locked from using recs here until <t:1700000000:f>.\nReason: spam"
		);
	}

	#[tokio::test]
	async fn invalidation_reaches_every_bot() {
		let pool = PgPoolOptions::new()
			.connect_lazy("postgres://localhost/profound_bond")
			.unwrap();
		let shared = SharedState::new();
		let library = Data::new(pool.clone(), bot("library", vec![Feature::Recs]), &shared);
		let staff = Data::new(pool, bot("staff", vec![Feature::Moderation]), &shared);
		let (user, guild) = (UserId::new(2), GuildId::new(1));

		library.user_locks.insert(user, Arc::new(Vec::new()));
		library.role_levels.insert(guild, Arc::new(Vec::new()));
		assert!(staff.user_locks.get(&user).is_some());

		forget_user_locks(&staff, user);
		forget_role_levels(&staff, guild);
		assert!(library.user_locks.get(&user).is_none());
		assert!(library.role_levels.get(&guild).is_none());

		staff.user_locks.insert(user, Arc::new(vec![lock()]));
		assert_eq!(library.user_locks.get(&user).map(|locks| locks.len()), Some(1));
		assert!(Arc::ptr_eq(&library.sprint_timers, &staff.sprint_timers));
		assert!(Arc::ptr_eq(&library.queue_notify, &staff.queue_notify));
	}
}
