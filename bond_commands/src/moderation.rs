use bond_core::{
	config::{
		constants::{COLOUR_BLUE, COLOUR_GREEN, COLOUR_ORANGE},
		types::{Error, SContext, UserError},
	},
	utils::{
		helpers::{discord_timestamp, notice_embed, post_to_log, truncate},
		permissions::{forget_role_levels, forget_user_locks, require_admin, require_moderator},
	},
};
use bond_db::{
	guild::{self, ChannelKind},
	lock::{self, ALL_FEATURES, ModerationLock},
	permission::{self, PermissionLevel},
	unix_now,
};
use poise::{ChoiceParameter, CreateReply};
use serenity::all::{CreateEmbed, GuildChannel, Role, User};
use tracing::info;

const MAX_LOCK_HOURS: u32 = 24 * 365;

#[derive(ChoiceParameter, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockFeature {
	#[name = "Everything"]
	All,
	#[name = "Recs"]
	Recs,
	#[name = "Profiles"]
	Profiles,
	#[name = "Sprints"]
	Sprints,
	#[name = "Modmail"]
	Modmail,
}

impl LockFeature {
	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::All => ALL_FEATURES,
			Self::Recs => "recs",
			Self::Profiles => "profiles",
			Self::Sprints => "sprints",
			Self::Modmail => "modmail",
		}
	}
}

#[derive(ChoiceParameter, Clone, Copy, Debug, PartialEq, Eq)]
pub enum GrantedLevel {
	Trusted,
	Moderator,
	Admin,
}

impl From<GrantedLevel> for PermissionLevel {
	fn from(level: GrantedLevel) -> Self {
		match level {
			GrantedLevel::Trusted => Self::Trusted,
			GrantedLevel::Moderator => Self::Moderator,
			GrantedLevel::Admin => Self::Admin,
		}
	}
}

#[derive(ChoiceParameter, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelChoice {
	#[name = "Recs"]
	Recs,
	#[name = "Sprints"]
	Sprints,
	#[name = "Modmail"]
	Modmail,
	#[name = "Log"]
	Log,
}

impl From<ChannelChoice> for ChannelKind {
	fn from(choice: ChannelChoice) -> Self {
		match choice {
			ChannelChoice::Recs => Self::Recs,
			ChannelChoice::Sprints => Self::Sprints,
			ChannelChoice::Modmail => Self::Modmail,
			ChannelChoice::Log => Self::Log,
		}
	}
}

/// Expiry for a lock of `hours` placed at `now`; `None` never expires
#[must_use]
pub fn lock_expiry(now: i64, hours: Option<u32>) -> Option<i64> {
	hours.map(|hours| now.saturating_add(i64::from(hours.min(MAX_LOCK_HOURS)) * 3600))
}

#[must_use]
pub fn lock_line(lock: &ModerationLock) -> String {
	let mut line = format!("<@{}> · {} · by <@{}>", lock.user_id, lock.feature, lock.locked_by);
	match lock.expires_at {
		Some(expires_at) => line.push_str(&format!(" · ends {}", discord_timestamp(expires_at, 'R'))),
		None => line.push_str(" · permanent"),
	}
	if let Some(reason) = &lock.reason {
		line.push_str(&format!("\n  ↳ {}", truncate(reason, 200)));
	}
	line
}

/// Keep a member away from a feature
#[poise::command(slash_command, guild_only, rename = "lock", check = "require_moderator")]
pub async fn lock_user(
	ctx: SContext<'_>,
	#[description = "Who to lock"] user: User,
	#[description = "What to lock them out of"] feature: LockFeature,
	#[description = "How many hours, forever if empty"]
	#[min = 1]
	#[max = 8760]
	hours: Option<u32>,
	#[description = "Why"]
	#[max_length = 300]
	reason: Option<String>,
) -> Result<(), Error> {
	let Some(guild_id) = ctx.guild_id() else {
		return Ok(());
	};
	if user.bot {
		return Err(UserError::new("Bots can't be locked.").into());
	}
	if user.id == ctx.author().id {
		return Err(UserError::new("You can't lock yourself.").into());
	}
	let data = ctx.data();
	let reason = reason
		.as_deref()
		.map(str::trim)
		.filter(|reason| !reason.is_empty());
	let placed = lock::lock(
		i64::from(guild_id),
		i64::from(user.id),
		feature.as_str(),
		reason,
		i64::from(ctx.author().id),
		lock_expiry(unix_now(), hours),
		&data.db,
	)
	.await?;
	forget_user_locks(data, user.id);
	info!(
		"{} locked {} from {} in {guild_id}",
		ctx.author().id,
		user.id,
		placed.feature
	);
	let embed = notice_embed("Locked", &lock_line(&placed), COLOUR_ORANGE);
	ctx.send(CreateReply::default().embed(embed.clone())).await?;
	post_to_log(ctx.http(), data, guild_id, embed).await;
	Ok(())
}

/// Lift a lock
#[poise::command(slash_command, guild_only, rename = "unlock", check = "require_moderator")]
pub async fn unlock_user(
	ctx: SContext<'_>,
	#[description = "Who to unlock"] user: User,
	#[description = "Which lock to lift"] feature: LockFeature,
) -> Result<(), Error> {
	let Some(guild_id) = ctx.guild_id() else {
		return Ok(());
	};
	let data = ctx.data();
	if !lock::unlock(i64::from(guild_id), i64::from(user.id), feature.as_str(), &data.db).await? {
		return Err(UserError::new(format!(
			"{} has no {} lock.",
			user.display_name(),
			feature.as_str()
		))
		.into());
	}
	forget_user_locks(data, user.id);
	info!("{} unlocked {} from {}", ctx.author().id, user.id, feature.as_str());
	let embed = notice_embed(
		"Unlocked",
		&format!(
			"<@{}> can use {} again, unlocked by <@{}>.",
			user.id,
			feature.as_str(),
			ctx.author().id
		),
		COLOUR_GREEN,
	);
	ctx.send(CreateReply::default().embed(embed.clone())).await?;
	post_to_log(ctx.http(), data, guild_id, embed).await;
	Ok(())
}

/// Active locks in this server
#[poise::command(slash_command, guild_only, rename = "locks", check = "require_moderator")]
pub async fn list_locks(
	ctx: SContext<'_>,
	#[description = "Only this member"] user: Option<User>,
) -> Result<(), Error> {
	let Some(guild_id) = ctx.guild_id() else {
		return Ok(());
	};
	let locks = lock::list_for_guild(i64::from(guild_id), &ctx.data().db).await?;
	let lines: Vec<String> = locks
		.iter()
		.filter(|lock| user.as_ref().is_none_or(|user| lock.user_id == i64::from(user.id)))
		.map(lock_line)
		.collect();
	let description = if lines.is_empty() {
		"No active locks.".to_owned()
	} else {
		lines.join("\n")
	};
	ctx.send(
		CreateReply::default()
			.embed(
				CreateEmbed::default()
					.title("Locks")
					.description(truncate(&description, 4096))
					.colour(COLOUR_BLUE),
			)
			.ephemeral(true),
	)
	.await?;
	Ok(())
}

#[poise::command(
	slash_command,
	guild_only,
	subcommands("permissions_set", "permissions_remove", "permissions_list"),
	subcommand_required
)]
pub async fn permissions(_: SContext<'_>) -> Result<(), Error> {
	Ok(())
}

/// Give a role a bot permission level
#[poise::command(slash_command, guild_only, rename = "set", check = "require_admin")]
async fn permissions_set(
	ctx: SContext<'_>,
	#[description = "Role"] role: Role,
	#[description = "Level"] level: GrantedLevel,
) -> Result<(), Error> {
	let Some(guild_id) = ctx.guild_id() else {
		return Ok(());
	};
	let level = PermissionLevel::from(level);
	let data = ctx.data();
	permission::set_role_level(i64::from(guild_id), i64::from(role.id), level, &data.db).await?;
	forget_role_levels(data, guild_id);
	info!("{} set role {} to {level} in {guild_id}", ctx.author().id, role.id);
	let embed = notice_embed(
		"Permissions",
		&format!("<@&{}> is now {level}.", role.id),
		COLOUR_GREEN,
	);
	ctx.send(CreateReply::default().embed(embed.clone())).await?;
	post_to_log(ctx.http(), data, guild_id, embed).await;
	Ok(())
}

/// Take a role's bot permission level away
#[poise::command(slash_command, guild_only, rename = "remove", check = "require_admin")]
async fn permissions_remove(ctx: SContext<'_>, #[description = "Role"] role: Role) -> Result<(), Error> {
	let Some(guild_id) = ctx.guild_id() else {
		return Ok(());
	};
	let data = ctx.data();
	if !permission::remove_role_level(i64::from(guild_id), i64::from(role.id), &data.db).await? {
		return Err(UserError::new(format!("<@&{}> has no level set.", role.id)).into());
	}
	forget_role_levels(data, guild_id);
	let embed = notice_embed(
		"Permissions",
		&format!("<@&{}> is back to {}.", role.id, PermissionLevel::Member),
		COLOUR_GREEN,
	);
	ctx.send(CreateReply::default().embed(embed.clone())).await?;
	post_to_log(ctx.http(), data, guild_id, embed).await;
	Ok(())
}

/// Roles with bot permission levels
#[poise::command(slash_command, guild_only, rename = "list", check = "require_admin")]
async fn permissions_list(ctx: SContext<'_>) -> Result<(), Error> {
	let Some(guild_id) = ctx.guild_id() else {
		return Ok(());
	};
	let levels = permission::levels_for_guild(i64::from(guild_id), &ctx.data().db).await?;
	let description = if levels.is_empty() {
		"No roles have a level yet. Server admins always count as Admin.".to_owned()
	} else {
		levels
			.iter()
			.map(|entry| format!("<@&{}> · {}", entry.role_id, entry.level()))
			.collect::<Vec<_>>()
			.join("\n")
	};
	ctx.send(
		CreateReply::default()
			.embed(
				CreateEmbed::default()
					.title("Permission levels")
					.description(description)
					.colour(COLOUR_BLUE),
			)
			.ephemeral(true),
	)
	.await?;
	Ok(())
}

#[poise::command(slash_command, guild_only, subcommands("settings_channel"), subcommand_required)]
pub async fn settings(_: SContext<'_>) -> Result<(), Error> {
	Ok(())
}

/// Point the bots at a channel
#[poise::command(slash_command, guild_only, rename = "channel", check = "require_admin")]
async fn settings_channel(
	ctx: SContext<'_>,
	#[description = "What the channel is for"] kind: ChannelChoice,
	#[description = "Channel, clears the setting if empty"] channel: Option<GuildChannel>,
) -> Result<(), Error> {
	let Some(guild_id) = ctx.guild_id() else {
		return Ok(());
	};
	let db = &ctx.data().db;
	guild::insert_guild(i64::from(guild_id), db).await?;
	guild::set_channel(
		i64::from(guild_id),
		ChannelKind::from(kind),
		channel.as_ref().map(|channel| i64::from(channel.id)),
		db,
	)
	.await?;
	let message = channel.map_or_else(
		|| format!("{} channel cleared.", kind.name()),
		|channel| format!("{} channel set to <#{}>.", kind.name(), channel.id),
	);
	ctx.send(
		CreateReply::default()
			.embed(notice_embed("Settings", &message, COLOUR_GREEN))
			.ephemeral(true),
	)
	.await?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use bond_db::lock::ModerationLock;

	use super::{LockFeature, lock_expiry, lock_line};

	#[test]
	fn expiry_is_capped_at_a_year() {
		assert_eq!(lock_expiry(100, None), None);
		assert_eq!(lock_expiry(100, Some(2)), Some(7_300));
		assert_eq!(lock_expiry(0, Some(100_000)), Some(24 * 365 * 3600));
	}

	#[test]
	fn all_maps_to_the_catch_all_feature() {
		assert_eq!(LockFeature::All.as_str(), "all");
		assert_eq!(LockFeature::Modmail.as_str(), "modmail");
	}

	#[test]
	fn lock_lines_show_expiry_and_reason() {
		let lock = ModerationLock {
			id: 1,
			guild_id: 2,
			user_id: 3,
			feature: "recs".to_owned(),
			reason: Some("spam".to_owned()),
			locked_by: 4,
			expires_at: None,
			created_at: 0,
		};
		assert_eq!(lock_line(&lock), "<@3> · recs · by <@4> · permanent\n  ↳ spam");
	}
}
