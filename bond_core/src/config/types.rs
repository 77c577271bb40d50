use std::{
	borrow::Cow,
	fmt,
	sync::{Arc, OnceLock},
	time::Duration,
};

use anyhow::Error as AError;
use bond_db::{lock::ModerationLock, permission::RoleLevel};
use dashmap::DashMap;
use mini_moka::sync::Cache;
use poise::Context as PContext;
use serde::Deserialize;
use serenity::all::{GuildId, UserId};
use sqlx::PgPool;
use thiserror::Error as ThisError;
use tokio::{sync::Notify, task::JoinHandle};

use crate::config::settings::{BotConfig, Config};

/// A slice of the platform a bot can be given
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
	Recs,
	Profiles,
	Sprints,
	Moderation,
	Modmail,
}

impl Feature {
	pub const ALL: [Self; 5] = [
		Self::Recs,
		Self::Profiles,
		Self::Sprints,
		Self::Moderation,
		Self::Modmail,
	];

	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Recs => "recs",
			Self::Profiles => "profiles",
			Self::Sprints => "sprints",
			Self::Moderation => "moderation",
			Self::Modmail => "modmail",
		}
	}
}

impl fmt::Display for Feature {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

pub type RoleLevelMap = Cache<GuildId, Arc<Vec<RoleLevel>>>;
pub type UserLockMap = Cache<UserId, Arc<Vec<ModerationLock>>>;

/// State every bot in the process works from, so a write through one bot
/// is seen by all of them
#[derive(Clone)]
pub struct SharedState {
	/// Wakes the parse queue worker after an enqueue
	pub queue_notify: Arc<Notify>,
	pub role_levels: RoleLevelMap,
	pub user_locks: UserLockMap,
	/// Live timer per sprint id
	pub sprint_timers: Arc<DashMap<i64, JoinHandle<()>>>,
}

impl SharedState {
	#[must_use]
	pub fn new() -> Self {
		Self {
			queue_notify: Arc::new(Notify::new()),
			role_levels: Cache::builder()
				.max_capacity(1000)
				.time_to_live(Duration::from_secs(600))
				.build(),
			user_locks: Cache::builder()
				.max_capacity(10_000)
				.time_to_live(Duration::from_secs(300))
				.build(),
			sprint_timers: Arc::new(DashMap::new()),
		}
	}
}

impl Default for SharedState {
	fn default() -> Self {
		Self::new()
	}
}

pub struct Data {
	pub db: PgPool,
	pub bot: BotConfig,
	/// Wakes the parse queue worker after an enqueue
	pub queue_notify: Arc<Notify>,
	pub role_levels: RoleLevelMap,
	pub user_locks: UserLockMap,
	/// Live timer per sprint id
	pub sprint_timers: Arc<DashMap<i64, JoinHandle<()>>>,
}

impl Data {
	#[must_use]
	pub fn new(db: PgPool, bot: BotConfig, shared: &SharedState) -> Self {
		let shared = shared.clone();
		Self {
			db,
			bot,
			queue_notify: shared.queue_notify,
			role_levels: shared.role_levels,
			user_locks: shared.user_locks,
			sprint_timers: shared.sprint_timers,
		}
	}
}

pub type Error = AError;
pub type SContext<'a> = PContext<'a, Data, Error>;

/// A refusal whose message is safe to show the invoking user as is
#[derive(Debug, ThisError)]
#[error("{0}")]
pub struct UserError(pub Cow<'static, str>);

impl UserError {
	pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
		Self(message.into())
	}
}

pub static UTILS_CONFIG: OnceLock<Arc<Config>> = OnceLock::new();

/// AO3 base URL from the loaded config, or the public archive
#[must_use]
pub fn ao3_base_url() -> &'static str {
	UTILS_CONFIG
		.get()
		.map_or("https://archiveofourown.org", |config| config.ao3.base_url.as_str())
}
